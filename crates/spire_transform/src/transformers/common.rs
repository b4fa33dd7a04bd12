//! Generated inputs and helpers shared by several transformers.

use crate::context::TransformContext;
use crate::names;
use spire_core::{CompileError, CompileResult, Location};
use spire_schema::{
    is_builtin_scalar, Definition, DirectiveSite, EnumType, FieldDefinition, InputObjectType, InputValue,
    ObjectType, SchemaDocument, TypeRef,
};
use spire_stack::KeyAttribute;

/// Directives that turn a field into a relationship
pub const RELATION_DIRECTIVES: &[&str] = &["hasOne", "hasMany", "belongsTo", "manyToMany"];

/// Location of a directive site
pub fn site_location(site: &DirectiveSite) -> Location {
    match &site.field_name {
        Some(field) => Location::of_field(&site.type_name, field),
        None => Location::of_type(&site.type_name),
    }
}

/// Check if a type name is a scalar or an enum
pub fn is_leaf(doc: &SchemaDocument, base: &str) -> bool {
    is_builtin_scalar(base)
        || doc
            .definitions
            .iter()
            .any(|d| d.name() == base && matches!(d, Definition::Enum(_) | Definition::Scalar(_)))
}

/// Check if a field is a relationship, declared or implied by a model type
pub fn is_relation(field: &FieldDefinition, ctx: &TransformContext) -> bool {
    RELATION_DIRECTIVES.iter().any(|d| field.has_directive(d)) || ctx.is_model(field.ty.base_name())
}

/// Look up a declared object type
///
/// # Errors
///
/// Returns `InternalInvariantViolation` when it is missing
pub fn object<'a>(doc: &'a SchemaDocument, name: &str) -> CompileResult<&'a ObjectType> {
    doc.object(name)
        .ok_or_else(|| CompileError::internal(format!("type '{name}' disappeared from the schema")))
}

/// Look up a declared object type for mutation
///
/// # Errors
///
/// Returns `InternalInvariantViolation` when it is missing
pub fn object_mut<'a>(doc: &'a mut SchemaDocument, name: &str) -> CompileResult<&'a mut ObjectType> {
    doc.object_mut(name)
        .ok_or_else(|| CompileError::internal(format!("type '{name}' disappeared from the schema")))
}

/// Add a generated root field
///
/// # Errors
///
/// Returns `SchemaValidation` when the schema already declares the field
pub fn add_root_field(doc: &mut SchemaDocument, root: &str, field: FieldDefinition) -> CompileResult<()> {
    let name = field.name.clone();
    if !doc.object_or_insert(root).add_field_if_missing(field) {
        return Err(CompileError::schema(
            Location::of_field(root, &name),
            "field is generated and must not be declared",
        ));
    }
    Ok(())
}

/// Add the sort direction, attribute type and size types
pub fn ensure_shared_types(doc: &mut SchemaDocument) {
    doc.add_if_missing(Definition::Enum(EnumType::new(names::SORT_DIRECTION, &["ASC", "DESC"])));
    doc.add_if_missing(Definition::Enum(EnumType::new(
        names::ATTRIBUTE_TYPES,
        &[
            "binary", "binarySet", "bool", "list", "map", "number", "numberSet", "string", "stringSet", "_null",
        ],
    )));
    if !doc.has_type(names::SIZE_INPUT) {
        let int = || TypeRef::named("Int");
        doc.definitions.push(Definition::Input(
            InputObjectType::new(names::SIZE_INPUT)
                .with_field("ne", int())
                .with_field("eq", int())
                .with_field("le", int())
                .with_field("lt", int())
                .with_field("ge", int())
                .with_field("gt", int())
                .with_field("between", TypeRef::list_of(int())),
        ));
    }
}

// AWS scalars filter as strings; enums and custom scalars filter as themselves
fn filter_scalar(base: &str) -> String {
    match base {
        "ID" | "String" | "Int" | "Float" | "Boolean" => base.to_string(),
        b if is_builtin_scalar(b) => "String".to_string(),
        other => other.to_string(),
    }
}

/// Filter input for a scalar or enum, created on first use
pub fn ensure_scalar_filter(doc: &mut SchemaDocument, base: &str) -> String {
    let name = names::scalar_filter_input(base);
    if doc.has_type(&name) {
        return name;
    }
    ensure_shared_types(doc);
    let value = filter_scalar(base);
    let ty = || TypeRef::named(value.clone());
    let mut input = InputObjectType::new(&name);
    if doc.enum_type(base).is_some() {
        input = input.with_field("eq", ty()).with_field("ne", ty());
    } else if value == "Boolean" {
        input = input
            .with_field("ne", ty())
            .with_field("eq", ty())
            .with_field("attributeExists", TypeRef::named("Boolean"))
            .with_field("attributeType", TypeRef::named(names::ATTRIBUTE_TYPES));
    } else {
        for op in ["ne", "eq", "le", "lt", "ge", "gt"] {
            input = input.with_field(op, ty());
        }
        let numeric = matches!(value.as_str(), "Int" | "Float");
        if !numeric {
            input = input.with_field("contains", ty()).with_field("notContains", ty());
        }
        input = input.with_field("between", TypeRef::list_of(ty()));
        if !numeric {
            input = input.with_field("beginsWith", ty());
        }
        input = input
            .with_field("attributeExists", TypeRef::named("Boolean"))
            .with_field("attributeType", TypeRef::named(names::ATTRIBUTE_TYPES));
        if !numeric {
            input = input.with_field("size", TypeRef::named(names::SIZE_INPUT));
        }
    }
    doc.definitions.push(Definition::Input(input));
    name
}

/// Key condition input for one sort field type, created on first use
pub fn ensure_key_condition(doc: &mut SchemaDocument, base: &str) -> String {
    let name = names::key_condition_input(base);
    if doc.has_type(&name) {
        return name;
    }
    let value = match base {
        "ID" | "Int" | "Float" => base,
        _ => "String",
    };
    let ty = || TypeRef::named(value);
    let mut input = InputObjectType::new(&name);
    for op in ["eq", "le", "lt", "ge", "gt"] {
        input = input.with_field(op, ty());
    }
    input = input.with_field("between", TypeRef::list_of(ty()));
    if !matches!(value, "Int" | "Float") {
        input = input.with_field("beginsWith", ty());
    }
    doc.definitions.push(Definition::Input(input));
    name
}

/// Base type name of a field on a type, `String` when unknown
pub fn field_base(object: &ObjectType, field: &str) -> String {
    object
        .field(field)
        .map_or_else(|| "String".to_string(), |f| f.ty.base_name().to_string())
}

/// The sort-key condition argument for a key with the given sort fields
///
/// A single sort field gets a scalar key condition; several sort fields share
/// one composite argument.
pub fn sort_key_argument(
    doc: &mut SchemaDocument,
    model: &str,
    object: &ObjectType,
    sort: &[String],
) -> Option<InputValue> {
    match sort {
        [] => None,
        [single] => {
            let input = ensure_key_condition(doc, &field_base(object, single));
            Some(InputValue::new(single, TypeRef::named(input)))
        }
        several => {
            let key_input = names::composite_key_input(model, several);
            if !doc.has_type(&key_input) {
                let mut input = InputObjectType::new(&key_input);
                for field in several {
                    input = input.with_field(field, TypeRef::named(field_base(object, field)));
                }
                doc.definitions.push(Definition::Input(input));
            }
            let condition = names::composite_key_condition_input(model, several);
            if !doc.has_type(&condition) {
                let key = || TypeRef::named(key_input.clone());
                let mut input = InputObjectType::new(&condition);
                for op in ["eq", "le", "lt", "ge", "gt"] {
                    input = input.with_field(op, key());
                }
                input = input
                    .with_field("between", TypeRef::list_of(key()))
                    .with_field("beginsWith", key());
                doc.definitions.push(Definition::Input(input));
            }
            Some(InputValue::new(
                names::composite_sort_argument(several),
                TypeRef::named(condition),
            ))
        }
    }
}

/// Name of the argument carrying the sort-key condition
pub fn sort_argument_name(sort: &[String]) -> Option<String> {
    match sort {
        [] => None,
        [single] => Some(single.clone()),
        several => Some(names::composite_sort_argument(several)),
    }
}

/// Input mirroring a non-model object type, created on first use
///
/// Nested object fields map to their own inputs; relationship fields are left
/// out.
pub fn ensure_embedded_input(doc: &mut SchemaDocument, ctx: &TransformContext, type_name: &str) -> String {
    let name = names::embedded_input(type_name);
    if doc.has_type(&name) {
        return name;
    }
    let Some(object) = doc.object(type_name).cloned() else {
        return name;
    };
    // Reserve the name so self-referencing types terminate
    doc.definitions.push(Definition::Input(InputObjectType::new(&name)));
    let mut fields = Vec::new();
    for field in &object.fields {
        if is_relation(field, ctx) {
            continue;
        }
        if let Some(ty) = input_type(doc, ctx, &field.ty) {
            fields.push(InputValue::new(&field.name, ty));
        }
    }
    if let Some(Definition::Input(input)) = doc.definitions.iter_mut().find(|d| d.name() == name) {
        input.fields = fields;
    }
    name
}

/// Input counterpart of an output field type; `None` for types with none
pub fn input_type(doc: &mut SchemaDocument, ctx: &TransformContext, ty: &TypeRef) -> Option<TypeRef> {
    let base = ty.base_name().to_string();
    if is_leaf(doc, &base) {
        return Some(ty.clone());
    }
    if doc.object(&base).is_some() && !ctx.is_model(&base) {
        let input = ensure_embedded_input(doc, ctx, &base);
        return Some(ty.with_base(&input));
    }
    None
}

/// Storage attribute type of a scalar: numbers are `N`, everything else `S`
pub fn attribute_type(base: &str) -> &'static str {
    match base {
        "Int" | "Float" | "AWSTimestamp" => "N",
        _ => "S",
    }
}

/// Key attribute of a single field, or the combined attribute of several sort fields
pub fn key_attribute(object: &ObjectType, fields: &[String]) -> Option<KeyAttribute> {
    match fields {
        [] => None,
        [single] => Some(KeyAttribute::new(single, attribute_type(&field_base(object, single)))),
        several => Some(KeyAttribute::new(names::composite_sort_argument(several), "S")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_core::TransformConfig;
    use spire_schema::parse_fragments;

    #[test]
    fn test_scalar_filters_by_kind() {
        let mut doc = parse_fragments(&["enum Status { OPEN DONE }"]).unwrap();
        assert_eq!(ensure_scalar_filter(&mut doc, "AWSDateTime"), "ModelStringInput");
        assert_eq!(ensure_scalar_filter(&mut doc, "String"), "ModelStringInput");
        assert_eq!(ensure_scalar_filter(&mut doc, "Int"), "ModelIntInput");
        assert_eq!(ensure_scalar_filter(&mut doc, "Status"), "ModelStatusInput");

        let string = doc.input("ModelStringInput").unwrap();
        assert!(string.fields.iter().any(|f| f.name == "beginsWith"));
        let int = doc.input("ModelIntInput").unwrap();
        assert!(!int.fields.iter().any(|f| f.name == "beginsWith"));
        let status = doc.input("ModelStatusInput").unwrap();
        assert_eq!(status.fields.len(), 2);
        assert!(doc.enum_type(names::ATTRIBUTE_TYPES).is_some());
    }

    #[test]
    fn test_composite_sort_argument() {
        let mut doc = parse_fragments(&["type Order { customer: ID! status: String! date: AWSDate! }"]).unwrap();
        let object = doc.object("Order").cloned().unwrap();
        let sort = vec!["status".to_string(), "date".to_string()];
        let arg = sort_key_argument(&mut doc, "Order", &object, &sort).unwrap();
        assert_eq!(arg.name, "statusDate");
        assert!(doc.input("ModelOrderStatusAndDateCompositeKeyInput").is_some());
        assert_eq!(key_attribute(&object, &sort).unwrap().name, "statusDate");
        assert_eq!(key_attribute(&object, &sort[..1]).unwrap().attribute_type, "S");
    }

    #[test]
    fn test_embedded_input_skips_relations() {
        let mut doc = parse_fragments(&[
            "type Address { street: String city: City }",
            "type City { name: String! }",
        ])
        .unwrap();
        let ctx = TransformContext::new(TransformConfig::new());
        assert_eq!(ensure_embedded_input(&mut doc, &ctx, "Address"), "AddressInput");
        let address = doc.input("AddressInput").unwrap();
        assert_eq!(address.fields.len(), 2);
        assert_eq!(address.fields[1].ty.to_string(), "CityInput");
        assert!(doc.input("CityInput").is_some());
    }
}
