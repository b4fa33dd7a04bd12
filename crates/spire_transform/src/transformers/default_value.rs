//! `@default`: create-time field defaults.
//!
//! The value is given as a string and checked against the field type here,
//! so a bad default fails the compile rather than the first create.

use super::common::{is_relation, site_location};
use crate::context::TransformContext;
use crate::transformer::Transformer;
use once_cell::sync::Lazy;
use regex::Regex;
use spire_core::{CompileError, CompileResult, Location};
use spire_schema::{DirectiveSite, SchemaDocument, Value};
use std::net::IpAddr;
use tracing::debug;

const PLUGIN: &str = "default";

static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(Z|[+-]\d{2}:\d{2}(:\d{2})?)?$").expect("date pattern is valid")
});
static TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{2}:\d{2}(:\d{2}(\.\d{1,9})?)?(Z|[+-]\d{2}:\d{2}(:\d{2})?)?$")
        .expect("time pattern is valid")
});
static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(:\d{2}(\.\d{1,9})?)?(Z|[+-]\d{2}:\d{2}(:\d{2})?)$")
        .expect("date-time pattern is valid")
});
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern is valid")
});
static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://[^\s/?#]+[^\s]*$").expect("url pattern is valid")
});
static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 ()-]{4,}$").expect("phone pattern is valid"));

/// Owns `@default`
pub struct DefaultValueTransformer;

impl Transformer for DefaultValueTransformer {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn directives(&self) -> &'static [&'static str] {
        &["default"]
    }

    fn validate(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        for site in doc.directive_sites("default") {
            parse_default(doc, ctx, &site)?;
        }
        Ok(())
    }

    fn configure(&self, doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        for site in doc.directive_sites("default") {
            let (field, value) = parse_default(&doc, ctx, &site)?;
            debug!(plugin = PLUGIN, model = %site.type_name, field = %field, "default value");
            ctx.model_mut(&site.type_name)?.defaults.insert(field, value);
        }
        Ok(doc)
    }
}

fn parse_default(doc: &SchemaDocument, ctx: &TransformContext, site: &DirectiveSite) -> CompileResult<(String, String)> {
    let location = site_location(site);
    let invalid = |reason: String| CompileError::invalid_directive(PLUGIN, location.clone(), reason);

    let Some(field_name) = &site.field_name else {
        return Err(invalid("only applies to fields".to_string()));
    };
    let model = ctx.model(&site.type_name).map_err(|_| invalid("only applies to fields of @model types".to_string()))?;
    if model.primary_key.contains(field_name) {
        return Err(invalid("primary key fields cannot have a default".to_string()));
    }
    if site.directive.arguments.len() != 1 {
        return Err(invalid("takes exactly one argument, 'value'".to_string()));
    }
    let value = match site.directive.argument("value") {
        Some(Value::String(value)) => value.clone(),
        _ => return Err(invalid("'value' must be a string".to_string())),
    };

    let field = doc
        .object(&site.type_name)
        .and_then(|t| t.field(field_name))
        .ok_or_else(|| CompileError::internal(format!("{location} disappeared")))?;
    if is_relation(field, ctx) {
        return Err(invalid("relationship fields cannot have a default".to_string()));
    }
    if field.ty.is_list() {
        return Err(invalid("list fields cannot have a default".to_string()));
    }
    check_value(doc, field.ty.base_name(), &value, &location)?;
    Ok((field_name.clone(), value))
}

/// Check that a default literal is a value of the given type
///
/// # Errors
///
/// Returns `InvalidDirective` when it is not
pub fn check_value(doc: &SchemaDocument, base: &str, value: &str, location: &Location) -> CompileResult<()> {
    let valid = match base {
        "ID" | "String" => true,
        "Int" | "AWSTimestamp" => value.parse::<i64>().is_ok(),
        "Float" => value.parse::<f64>().is_ok_and(f64::is_finite),
        "Boolean" => matches!(value, "true" | "false"),
        "AWSJSON" => serde_json::from_str::<serde_json::Value>(value).is_ok(),
        "AWSDate" => DATE.is_match(value),
        "AWSTime" => TIME.is_match(value),
        "AWSDateTime" => DATE_TIME.is_match(value),
        "AWSEmail" => EMAIL.is_match(value),
        "AWSURL" => URL.is_match(value),
        "AWSPhone" => PHONE.is_match(value),
        "AWSIPAddress" => value.split('/').next().is_some_and(|ip| ip.parse::<IpAddr>().is_ok()),
        other => match doc.enum_type(other) {
            Some(enumeration) => enumeration.has_value(value),
            // custom scalars and object types
            None => {
                return Err(CompileError::invalid_directive(
                    PLUGIN,
                    location.clone(),
                    format!("fields of type {other} cannot have a default"),
                ));
            }
        },
    };
    if valid {
        Ok(())
    } else {
        Err(CompileError::invalid_directive(
            PLUGIN,
            location.clone(),
            format!("'{value}' is not a valid {base}"),
        ))
    }
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
        DefaultValueTransformer.validate(&doc, &mut ctx)?;
        DefaultValueTransformer.configure(doc, &mut ctx)?;
        Ok(ctx)
    }

    #[test]
    fn test_defaults_recorded() {
        let ctx = configure(
            "enum Status { DRAFT LIVE } type Post @model { status: Status @default(value: \"DRAFT\") views: Int @default(value: \"0\") }",
        )
        .unwrap();
        let defaults = &ctx.models["Post"].defaults;
        assert_eq!(defaults.get("status").map(String::as_str), Some("DRAFT"));
        assert_eq!(defaults.get("views").map(String::as_str), Some("0"));
    }

    #[test]
    fn test_default_type_checks() {
        let doc = parse_fragments(&["enum Status { DRAFT LIVE }"]).unwrap();
        let loc = Location::of_field("Post", "x");
        let ok = |base: &str, value: &str| check_value(&doc, base, value, &loc).is_ok();
        assert!(ok("Int", "42"));
        assert!(!ok("Int", "4.2"));
        assert!(ok("Float", "4.2"));
        assert!(ok("Boolean", "false"));
        assert!(!ok("Boolean", "yes"));
        assert!(ok("Status", "LIVE"));
        assert!(!ok("Status", "ARCHIVED"));
        assert!(ok("AWSJSON", "{\"a\": [1, 2]}"));
        assert!(!ok("AWSJSON", "{a: 1}"));
        assert!(ok("AWSDate", "2024-02-29"));
        assert!(ok("AWSDateTime", "2024-02-29T10:00:00.000Z"));
        assert!(!ok("AWSDateTime", "2024-02-29"));
        assert!(ok("AWSEmail", "dev@example.com"));
        assert!(ok("AWSURL", "https://example.com/a?b=c"));
        assert!(ok("AWSIPAddress", "10.0.0.1/8"));
        assert!(!ok("AWSIPAddress", "10.0.0"));
    }

    #[test]
    fn test_misplaced_defaults() {
        assert!(configure("type A @model { id: ID! @default(value: \"x\") }").is_err());
        assert!(configure("type A @model { tags: [String] @default(value: \"x\") }").is_err());
        assert!(configure("type A @model { n: Int @default(value: 3) }").is_err());
        assert!(configure("type A { n: Int @default(value: \"3\") }").is_err());
    }
}
