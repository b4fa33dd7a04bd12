//! `@validate`: input constraints checked before create and update.

use super::common::site_location;
use crate::context::TransformContext;
use crate::model_config::{Validation, ValidationKind};
use crate::names;
use crate::resolver::{Function, Slot};
use crate::templates;
use crate::transformer::Transformer;
use regex::Regex;
use spire_core::naming::upper_first;
use spire_core::{CompileError, CompileResult};
use spire_schema::{DirectiveSite, SchemaDocument, Value};
use tracing::debug;

const PLUGIN: &str = "validate";
const ARGUMENTS: &[&str] = &["type", "value", "errorMessage"];
const STRING_TYPES: &[&str] = &["String", "ID", "AWSEmail", "AWSURL", "AWSPhone", "AWSJSON", "AWSIPAddress"];

/// Owns `@validate`
pub struct ValidateTransformer;

impl Transformer for ValidateTransformer {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn directives(&self) -> &'static [&'static str] {
        &["validate"]
    }

    fn validate(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let mut seen: Vec<(String, String, ValidationKind)> = Vec::new();
        for site in doc.directive_sites("validate") {
            let (field, validation) = parse_validation(doc, ctx, &site)?;
            let entry = (site.type_name.clone(), field, validation.kind);
            if seen.contains(&entry) {
                return Err(CompileError::invalid_directive(
                    PLUGIN,
                    site_location(&site),
                    format!("'{}' is declared more than once on the field", validation.kind.name()),
                ));
            }
            seen.push(entry);
        }
        Ok(())
    }

    fn configure(&self, doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        for site in doc.directive_sites("validate") {
            let (field, validation) = parse_validation(&doc, ctx, &site)?;
            ctx.model_mut(&site.type_name)?
                .validations
                .entry(field)
                .or_default()
                .push(validation);
        }
        Ok(doc)
    }

    fn generate_resolvers(&self, _doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let mut contributions = Vec::new();
        for config in ctx.models.values().filter(|c| !c.validations.is_empty()) {
            for mutation in [&config.operations.create, &config.operations.update].into_iter().flatten() {
                for (field, checks) in &config.validations {
                    contributions.push((
                        config.name.clone(),
                        mutation.clone(),
                        Function::new(
                            format!("Validate{}", upper_first(field)),
                            PLUGIN,
                            templates::validations(field, checks),
                            templates::empty_request(),
                        ),
                    ));
                }
            }
        }
        for (model, mutation, function) in contributions {
            debug!(plugin = PLUGIN, model = %model, field = %mutation, "validation");
            ctx.resolvers
                .pipeline(names::MUTATION, &mutation, &model)
                .append(Slot::PostAuth, function);
        }
        Ok(())
    }
}

fn parse_validation(
    doc: &SchemaDocument,
    ctx: &TransformContext,
    site: &DirectiveSite,
) -> CompileResult<(String, Validation)> {
    let location = site_location(site);
    let invalid = |reason: String| CompileError::invalid_directive(PLUGIN, location.clone(), reason);

    let Some(field_name) = &site.field_name else {
        return Err(invalid("only applies to fields".to_string()));
    };
    if !ctx.is_model(&site.type_name) {
        return Err(invalid("only applies to fields of @model types".to_string()));
    }
    if let Some(arg) = site.directive.arguments.keys().find(|a| !ARGUMENTS.contains(&a.as_str())) {
        return Err(invalid(format!("unknown argument '{arg}'")));
    }
    let kind = site
        .directive
        .argument("type")
        .and_then(Value::as_str)
        .and_then(ValidationKind::from_name)
        .ok_or_else(|| invalid("'type' must name a validation".to_string()))?;
    let value = match site.directive.argument("value") {
        Some(Value::String(v)) => v.clone(),
        _ => return Err(invalid("'value' must be a string".to_string())),
    };

    let field = doc
        .object(&site.type_name)
        .and_then(|t| t.field(field_name))
        .ok_or_else(|| CompileError::internal(format!("{location} disappeared")))?;
    let base = field.ty.base_name();
    if field.ty.is_list() {
        return Err(invalid("list fields cannot be validated".to_string()));
    }

    if kind.is_numeric() {
        let parses = match base {
            "Int" => value.parse::<i64>().is_ok(),
            "Float" => value.parse::<f64>().is_ok_and(f64::is_finite),
            _ => return Err(invalid(format!("'{}' applies to Int and Float fields", kind.name()))),
        };
        if !parses {
            return Err(invalid(format!("'{value}' is not a valid {base}")));
        }
    } else {
        if !STRING_TYPES.contains(&base) {
            return Err(invalid(format!("'{}' applies to string fields", kind.name())));
        }
        match kind {
            ValidationKind::MinLength | ValidationKind::MaxLength => {
                if value.parse::<u32>().is_err() {
                    return Err(invalid(format!("length '{value}' must be a non-negative integer")));
                }
            }
            ValidationKind::Matches => {
                if let Err(e) = Regex::new(&value) {
                    return Err(invalid(format!("pattern does not compile: {e}")));
                }
            }
            _ => {}
        }
    }

    let error_message = match site.directive.argument("errorMessage") {
        None | Some(Value::Null) => default_message(field_name, kind, &value),
        Some(Value::String(m)) => m.clone(),
        Some(_) => return Err(invalid("'errorMessage' must be a string".to_string())),
    };
    Ok((
        field_name.clone(),
        Validation {
            kind,
            value,
            error_message,
        },
    ))
}

fn default_message(field: &str, kind: ValidationKind, value: &str) -> String {
    let rule = match kind {
        ValidationKind::MinLength => format!("must be at least {value} characters long"),
        ValidationKind::MaxLength => format!("must be at most {value} characters long"),
        ValidationKind::StartsWith => format!("must start with '{value}'"),
        ValidationKind::EndsWith => format!("must end with '{value}'"),
        ValidationKind::Matches => format!("must match {value}"),
        ValidationKind::Gt => format!("must be greater than {value}"),
        ValidationKind::Lt => format!("must be less than {value}"),
        ValidationKind::Gte => format!("must be at least {value}"),
        ValidationKind::Lte => format!("must be at most {value}"),
    };
    format!("{field} {rule}")
}
