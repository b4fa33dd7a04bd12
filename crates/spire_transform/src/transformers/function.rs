//! `@function`: resolve a field by invoking one or more named functions.

use super::common::site_location;
use crate::context::TransformContext;
use crate::names;
use crate::resolver::Function;
use crate::templates;
use crate::transformer::Transformer;
use indexmap::IndexMap;
use spire_core::{CompileError, CompileResult};
use spire_schema::{DirectiveSite, SchemaDocument, Value};
use spire_stack::{DataSourceKind, DataSourceProps, Resource, ResourceProps};
use tracing::debug;

const PLUGIN: &str = "function";
/// Group holding function data sources and the resolvers using them
pub const FUNCTION_STACK: &str = "FunctionDirectiveStack";

/// A parsed `@function` use
#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    type_name: String,
    field_name: String,
    function: String,
    region: Option<String>,
}

/// Owns `@function`
pub struct FunctionTransformer;

impl Transformer for FunctionTransformer {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn directives(&self) -> &'static [&'static str] {
        &["function"]
    }

    fn validate(&self, doc: &SchemaDocument, _ctx: &mut TransformContext) -> CompileResult<()> {
        invocations(doc).map(|_| ())
    }

    fn generate_resolvers(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        for invocation in invocations(doc)? {
            let data_source = names::lambda_data_source(&invocation.function);
            debug!(
                plugin = PLUGIN,
                field = %format!("{}.{}", invocation.type_name, invocation.field_name),
                function = %invocation.function,
                "function invocation"
            );
            ctx.resolvers
                .pipeline(&invocation.type_name, &invocation.field_name, FUNCTION_STACK)
                .claim_data_load(
                    Function::new("InvokeFunction", PLUGIN, templates::lambda_invoke(), templates::result_response())
                        .with_data_source(data_source),
                )?;
        }
        Ok(())
    }

    fn generate_resources(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let mut targets: IndexMap<String, String> = IndexMap::new();
        for invocation in invocations(doc)? {
            let target = match &invocation.region {
                Some(region) => format!("{region}:{}", invocation.function),
                None => invocation.function.clone(),
            };
            targets.entry(names::lambda_data_source(&invocation.function)).or_insert(target);
        }
        for (id, target) in targets {
            ctx.resources.add(
                Resource::new(
                    &id,
                    FUNCTION_STACK,
                    ResourceProps::DataSource(DataSourceProps {
                        name: id.clone(),
                        kind: DataSourceKind::Lambda,
                        target: Some(target),
                    }),
                )
                .with_reference(names::API_RESOURCE),
            )?;
        }
        Ok(())
    }
}

/// Every `@function` use in document order
fn invocations(doc: &SchemaDocument) -> CompileResult<Vec<Invocation>> {
    doc.directive_sites("function").iter().map(parse_invocation).collect()
}

fn parse_invocation(site: &DirectiveSite) -> CompileResult<Invocation> {
    let location = site_location(site);
    let invalid = |reason: &str| CompileError::invalid_directive(PLUGIN, location.clone(), reason);

    let Some(field_name) = &site.field_name else {
        return Err(invalid("only applies to fields"));
    };
    if let Some(arg) = site.directive.arguments.keys().find(|a| !matches!(a.as_str(), "name" | "region")) {
        return Err(CompileError::invalid_directive(
            PLUGIN,
            location.clone(),
            format!("unknown argument '{arg}'"),
        ));
    }
    let function = match site.directive.argument("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
        _ => return Err(invalid("'name' must be a non-empty string")),
    };
    if names::lambda_data_source(&function) == "LambdaDataSource" {
        return Err(invalid("'name' must contain letters or digits"));
    }
    let region = match site.directive.argument("region") {
        None | Some(Value::Null) => None,
        Some(Value::String(region)) if !region.is_empty() => Some(region.clone()),
        Some(_) => return Err(invalid("'region' must be a non-empty string")),
    };
    Ok(Invocation {
        type_name: site.type_name.clone(),
        field_name: field_name.clone(),
        function,
        region,
    })
}
