//! `@primaryKey`: custom partition and sort keys.

use super::common::{is_leaf, site_location};
use crate::context::TransformContext;
use crate::model_config::PrimaryKey;
use crate::transformer::Transformer;
use spire_core::{CompileError, CompileResult, Location};
use spire_schema::{DirectiveSite, ObjectType, SchemaDocument};
use tracing::debug;

const PLUGIN: &str = "primaryKey";

/// Owns `@primaryKey`
pub struct PrimaryKeyTransformer;

impl Transformer for PrimaryKeyTransformer {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn directives(&self) -> &'static [&'static str] {
        &["primaryKey"]
    }

    fn validate(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let mut keyed: Vec<String> = Vec::new();
        for site in doc.directive_sites("primaryKey") {
            let key = parse_key(doc, ctx, &site)?;
            if keyed.contains(&site.type_name) {
                return Err(CompileError::invalid_directive(
                    PLUGIN,
                    Location::of_type(&site.type_name),
                    "a type can have only one primary key",
                ));
            }
            debug!(plugin = PLUGIN, model = %site.type_name, partition = %key.partition, "primary key");
            keyed.push(site.type_name);
        }
        Ok(())
    }

    fn configure(&self, doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        for site in doc.directive_sites("primaryKey") {
            let key = parse_key(&doc, ctx, &site)?;
            ctx.model_mut(&site.type_name)?.primary_key = key;
        }
        Ok(doc)
    }
}

fn check_key_field(object: &ObjectType, doc: &SchemaDocument, field: &str, location: &Location) -> CompileResult<()> {
    let Some(definition) = object.field(field) else {
        return Err(CompileError::invalid_directive(
            PLUGIN,
            location.clone(),
            format!("key field '{field}' does not exist on {}", object.name),
        ));
    };
    if definition.ty.is_list() || !is_leaf(doc, definition.ty.base_name()) {
        return Err(CompileError::invalid_directive(
            PLUGIN,
            location.clone(),
            format!("key field '{field}' must be a scalar or enum"),
        ));
    }
    Ok(())
}

fn parse_key(doc: &SchemaDocument, ctx: &TransformContext, site: &DirectiveSite) -> CompileResult<PrimaryKey> {
    let location = site_location(site);
    let Some(partition) = site.field_name.clone() else {
        return Err(CompileError::invalid_directive(PLUGIN, location, "only applies to fields"));
    };
    if !ctx.is_model(&site.type_name) {
        return Err(CompileError::invalid_directive(PLUGIN, location, "only applies to @model types"));
    }
    if let Some(arg) = site.directive.arguments.keys().find(|a| a.as_str() != "sortKeyFields") {
        return Err(CompileError::invalid_directive(PLUGIN, location, format!("unknown argument '{arg}'")));
    }
    let object = doc
        .object(&site.type_name)
        .ok_or_else(|| CompileError::internal(format!("type '{}' disappeared", site.type_name)))?;

    check_key_field(object, doc, &partition, &location)?;
    if object.field(&partition).is_some_and(|f| !f.ty.is_non_null()) {
        return Err(CompileError::invalid_directive(PLUGIN, location, "the partition key must be non-null"));
    }

    let sort = match site.directive.argument("sortKeyFields") {
        None => Vec::new(),
        Some(value) => value.as_string_list().ok_or_else(|| {
            CompileError::invalid_directive(PLUGIN, location.clone(), "sortKeyFields must be a list of field names")
        })?,
    };
    for (i, field) in sort.iter().enumerate() {
        if *field == partition || sort[..i].contains(field) {
            return Err(CompileError::invalid_directive(
                PLUGIN,
                location,
                format!("key field '{field}' is used more than once"),
            ));
        }
        check_key_field(object, doc, field, &location)?;
    }
    Ok(PrimaryKey { partition, sort })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::model::ModelTransformer;
    use spire_core::TransformConfig;
    use spire_schema::parse_fragments;

    fn configure(sdl: &str) -> CompileResult<TransformContext> {
        let doc = parse_fragments(&[sdl]).unwrap();
        let mut ctx = TransformContext::new(TransformConfig::new());
        let doc = ModelTransformer.configure(doc, &mut ctx)?;
        PrimaryKeyTransformer.validate(&doc, &mut ctx)?;
        PrimaryKeyTransformer.configure(doc, &mut ctx)?;
        Ok(ctx)
    }

    #[test]
    fn test_key_with_sort_fields() {
        let ctx = configure(
            "type Order @model { customer: ID! @primaryKey(sortKeyFields: [\"status\", \"placedAt\"]) status: String! placedAt: AWSDateTime! }",
        )
        .unwrap();
        let key = &ctx.models["Order"].primary_key;
        assert_eq!(key.fields(), vec!["customer", "status", "placedAt"]);
    }

    #[test]
    fn test_model_without_id_gets_no_id_field_when_keyed() {
        let doc = parse_fragments(&["type Tag @model { label: String! @primaryKey }"]).unwrap();
        let mut ctx = TransformContext::new(TransformConfig::new());
        let doc = ModelTransformer.configure(doc, &mut ctx).unwrap();
        assert!(!doc.object("Tag").unwrap().has_field("id"));
    }

    #[test]
    fn test_invalid_keys() {
        let nullable = configure("type A @model { k: String @primaryKey }").unwrap_err();
        assert_eq!(nullable.code(), "InvalidDirectiveError");
        assert!(configure("type A @model { k: [String]! @primaryKey }").is_err());
        assert!(configure("type A @model { k: String! @primaryKey(sortKeyFields: [\"missing\"]) }").is_err());
        assert!(configure("type A @model { k: String! @primaryKey j: String! @primaryKey }").is_err());
        assert!(configure("type A { k: String! @primaryKey }").is_err());
    }
}
