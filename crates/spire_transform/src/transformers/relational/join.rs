//! Join model synthesis for `@manyToMany`.

use super::PLUGIN;
use crate::context::TransformContext;
use crate::model_config::{EdgeKind, RelationalEdge};
use crate::names;
use indexmap::IndexMap;
use spire_core::naming::is_valid_name;
use spire_core::{CompileError, CompileResult, Location};
use spire_schema::{Definition, Directive, DirectiveSite, FieldDefinition, ObjectType, SchemaDocument, TypeRef, Value};
use tracing::debug;

/// Key fields a model declares, with their base types, read straight from the document
fn declared_key(object: &ObjectType) -> Vec<(String, String)> {
    let Some(field) = object.fields.iter().find(|f| f.has_directive("primaryKey")) else {
        return vec![("id".to_string(), "ID".to_string())];
    };
    let mut key = vec![(field.name.clone(), field.ty.base_name().to_string())];
    let sort = field
        .directive("primaryKey")
        .and_then(|d| d.argument("sortKeyFields"))
        .and_then(Value::as_string_list)
        .unwrap_or_default();
    for name in sort {
        let base = object
            .field(&name)
            .map_or_else(|| "String".to_string(), |f| f.ty.base_name().to_string());
        key.push((name, base));
    }
    key
}

fn relation_name(site: &DirectiveSite, location: &Location) -> CompileResult<String> {
    if let Some(arg) = site.directive.arguments.keys().find(|a| a.as_str() != "relationName") {
        return Err(CompileError::invalid_directive(
            "manyToMany",
            location.clone(),
            format!("unknown argument '{arg}'"),
        ));
    }
    match site.directive.argument("relationName") {
        Some(Value::String(name)) if is_valid_name(name) => Ok(name.clone()),
        _ => Err(CompileError::invalid_directive(
            "manyToMany",
            location.clone(),
            "'relationName' must be a valid type name",
        )),
    }
}

/// Rewrite every `@manyToMany` pair into a join model and two `@hasMany` fields
///
/// The relation is recorded in the context as a pair of `ManyToMany` edges so
/// later passes can tag the join model and the rewritten fields.
///
/// # Errors
///
/// Returns `InvalidDirective` unless every relation name is declared exactly
/// twice, by two different `@model` types naming each other, and is not
/// already taken by another type
pub fn synthesize_join_models(mut doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
    let mut relations: IndexMap<String, Vec<DirectiveSite>> = IndexMap::new();
    for site in doc.directive_sites("manyToMany") {
        let location = match &site.field_name {
            Some(field) => Location::of_field(&site.type_name, field),
            None => {
                return Err(CompileError::invalid_directive(
                    "manyToMany",
                    Location::of_type(&site.type_name),
                    "only applies to fields",
                ));
            }
        };
        let name = relation_name(&site, &location)?;
        relations.entry(name).or_default().push(site);
    }

    for (name, sites) in relations {
        let [a, b] = sites.as_slice() else {
            let location = sites
                .first()
                .and_then(|s| s.field_name.as_ref().map(|f| Location::of_field(&s.type_name, f)))
                .unwrap_or_else(|| Location::of_type(&name));
            return Err(CompileError::invalid_directive(
                "manyToMany",
                location,
                format!("relation '{name}' must be declared by exactly two fields, found {}", sites.len()),
            ));
        };
        let join = check_pair(&doc, &name, a, b)?;
        let (a_field, b_field) = (field_of(a)?, field_of(b)?);

        let a_key = declared_key(&join.0);
        let b_key = declared_key(&join.1);
        let a_refs: Vec<String> = a_key.iter().map(|(k, _)| names::join_key(&a.type_name, k)).collect();
        let b_refs: Vec<String> = b_key.iter().map(|(k, _)| names::join_key(&b.type_name, k)).collect();

        let mut model = ObjectType::new(&name);
        model.directives.push(Directive::new("model"));
        if let Some(auth) = merged_auth(&join.0, &join.1) {
            model.directives.push(auth);
        }
        model.fields.push(FieldDefinition::new("id", TypeRef::required("ID")));
        for (side, key, refs) in [(&a.type_name, &a_key, &a_refs), (&b.type_name, &b_key, &b_refs)] {
            for (i, ((_, base), field)) in key.iter().zip(refs).enumerate() {
                let mut definition = FieldDefinition::new(field, TypeRef::required(base));
                if i == 0 {
                    let mut index = Directive::new("index")
                        .with_argument("name", Value::String(format!("by{side}")));
                    if refs.len() > 1 {
                        index = index.with_argument(
                            "sortKeyFields",
                            Value::List(refs[1..].iter().cloned().map(Value::String).collect()),
                        );
                    }
                    definition = definition.with_directive(index);
                }
                model.fields.push(definition);
            }
        }
        for (side, refs) in [(&a.type_name, &a_refs), (&b.type_name, &b_refs)] {
            model.fields.push(
                FieldDefinition::new(names::join_field(side), TypeRef::required(side))
                    .with_directive(references("belongsTo", refs)),
            );
        }

        rewrite_side(&mut doc, &a.type_name, &a_field, &name, &a_refs)?;
        rewrite_side(&mut doc, &b.type_name, &b_field, &name, &b_refs)?;
        doc.definitions.push(Definition::Object(model));

        for (from, field, to) in [(a, &a_field, b), (b, &b_field, a)] {
            let mut edge = RelationalEdge::declared(
                EdgeKind::ManyToMany,
                &from.type_name,
                field,
                &to.type_name,
                Vec::new(),
            );
            edge.relation_name = Some(name.clone());
            ctx.edges.push(edge);
        }
        debug!(plugin = PLUGIN, relation = %name, "synthesized join model");
    }
    Ok(doc)
}

fn field_of(site: &DirectiveSite) -> CompileResult<String> {
    site.field_name
        .clone()
        .ok_or_else(|| CompileError::internal("many-to-many site lost its field"))
}

fn check_pair(doc: &SchemaDocument, name: &str, a: &DirectiveSite, b: &DirectiveSite) -> CompileResult<(ObjectType, ObjectType)> {
    let location = Location::of_field(&a.type_name, a.field_name.as_deref().unwrap_or_default());
    let invalid = |reason: String| CompileError::invalid_directive("manyToMany", location.clone(), reason);

    if a.type_name == b.type_name {
        return Err(invalid(format!("relation '{name}' cannot relate {} to itself", a.type_name)));
    }
    if doc.has_type(name) {
        return Err(invalid(format!("relation name '{name}' is already used by a type")));
    }
    let lookup = |site: &DirectiveSite| -> CompileResult<(ObjectType, FieldDefinition)> {
        let object = doc
            .object(&site.type_name)
            .ok_or_else(|| CompileError::internal(format!("type '{}' disappeared", site.type_name)))?;
        let field = object
            .field(site.field_name.as_deref().unwrap_or_default())
            .ok_or_else(|| CompileError::internal(format!("field of '{}' disappeared", site.type_name)))?;
        Ok((object.clone(), field.clone()))
    };
    let (a_object, a_field) = lookup(a)?;
    let (b_object, b_field) = lookup(b)?;
    for (object, field, other) in [(&a_object, &a_field, &b.type_name), (&b_object, &b_field, &a.type_name)] {
        if !object.has_directive("model") {
            return Err(invalid(format!("{} must be a @model type", object.name)));
        }
        if !field.ty.is_list() || field.ty.base_name() != other {
            return Err(invalid(format!(
                "{}.{} must be a list of {other} to take part in '{name}'",
                object.name, field.name
            )));
        }
    }
    Ok((a_object, b_object))
}

fn references(directive: &str, fields: &[String]) -> Directive {
    Directive::new(directive).with_argument(
        "references",
        Value::List(fields.iter().cloned().map(Value::String).collect()),
    )
}

fn merged_auth(a: &ObjectType, b: &ObjectType) -> Option<Directive> {
    let mut rules: Vec<Value> = Vec::new();
    for object in [a, b] {
        for directive in object.directives.iter().filter(|d| d.name == "auth") {
            for rule in directive.argument("rules").map(Value::as_list).unwrap_or_default() {
                if !rules.contains(rule) {
                    rules.push(rule.clone());
                }
            }
        }
    }
    (!rules.is_empty()).then(|| Directive::new("auth").with_argument("rules", Value::List(rules)))
}

fn rewrite_side(doc: &mut SchemaDocument, type_name: &str, field: &str, join: &str, refs: &[String]) -> CompileResult<()> {
    let definition = doc
        .object_mut(type_name)
        .and_then(|t| t.field_mut(field))
        .ok_or_else(|| CompileError::internal(format!("{type_name}.{field} disappeared")))?;
    definition.ty = definition.ty.with_base(join);
    definition.directives.retain(|d| d.name != "manyToMany");
    definition.directives.push(references("hasMany", refs));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_core::TransformConfig;
    use spire_schema::parse_fragments;

    fn run(sdl: &str) -> CompileResult<(SchemaDocument, TransformContext)> {
        let doc = parse_fragments(&[sdl]).unwrap();
        let mut ctx = TransformContext::new(TransformConfig::new());
        let doc = synthesize_join_models(doc, &mut ctx)?;
        Ok((doc, ctx))
    }

    #[test]
    fn test_join_model_shape() {
        let (doc, ctx) = run(
            "type Post @model { id: ID! tags: [Tag] @manyToMany(relationName: \"PostTags\") } type Tag @model { id: ID! posts: [Post] @manyToMany(relationName: \"PostTags\") }",
        )
        .unwrap();
        let join = doc.object("PostTags").unwrap();
        let fields: Vec<&str> = join.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["id", "postId", "tagId", "post", "tag"]);
        assert!(join.has_directive("model"));
        assert!(join.field("postId").unwrap().has_directive("index"));
        assert_eq!(join.fields.iter().filter(|f| f.has_directive("belongsTo")).count(), 2);

        let tags = doc.object("Post").unwrap().field("tags").unwrap();
        assert_eq!(tags.ty.base_name(), "PostTags");
        assert!(tags.has_directive("hasMany"));
        assert!(!tags.has_directive("manyToMany"));
        assert_eq!(ctx.edges.len(), 2);
    }

    #[test]
    fn test_composite_keys_and_auth_union() {
        let (doc, _) = run(
            "type Post @model @auth(rules: [{allow: public}]) { slug: String! @primaryKey(sortKeyFields: [\"day\"]) day: AWSDate! tags: [Tag] @manyToMany(relationName: \"PostTags\") } type Tag @model @auth(rules: [{allow: private}, {allow: public}]) { id: ID! posts: [Post] @manyToMany(relationName: \"PostTags\") }",
        )
        .unwrap();
        let join = doc.object("PostTags").unwrap();
        assert!(join.has_field("postSlug"));
        assert_eq!(join.field("postDay").unwrap().ty.to_string(), "AWSDate!");
        let rules = join.directive("auth").unwrap().argument("rules").unwrap().as_list();
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_invalid_relations() {
        assert!(run("type A @model { id: ID! bs: [B] @manyToMany(relationName: \"AB\") } type B @model { id: ID! }").is_err());
        assert!(run("type A @model { id: ID! xs: [A] @manyToMany(relationName: \"AA\") ys: [A] @manyToMany(relationName: \"AA\") }").is_err());
        assert!(run(
            "type AB { id: ID! } type A @model { id: ID! bs: [B] @manyToMany(relationName: \"AB\") } type B @model { id: ID! as: [A] @manyToMany(relationName: \"AB\") }"
        )
        .is_err());
        assert!(run(
            "type A @model { id: ID! bs: B @manyToMany(relationName: \"AB\") } type B @model { id: ID! as: [A] @manyToMany(relationName: \"AB\") }"
        )
        .is_err());
    }
}
