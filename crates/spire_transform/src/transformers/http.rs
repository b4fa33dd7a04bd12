//! `@http`: resolve a field with a request to an HTTP endpoint.
//!
//! One data source is contributed per distinct origin. `:name` path segments
//! become a required `params` argument so callers always supply them.

use super::common::{object_mut, site_location};
use crate::context::TransformContext;
use crate::names;
use crate::resolver::Function;
use crate::templates;
use crate::transformer::Transformer;
use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use spire_core::naming::is_valid_name;
use spire_core::{CompileError, CompileResult, Location};
use spire_schema::{Definition, DirectiveSite, InputObjectType, InputValue, SchemaDocument, TypeRef, Value};
use spire_stack::{DataSourceKind, DataSourceProps, Resource, ResourceProps};
use tracing::debug;

const PLUGIN: &str = "http";
/// Group holding HTTP data sources and the resolvers using them
pub const HTTP_STACK: &str = "HttpStack";

static URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<origin>https?://[^/\s?#]+)(?P<path>/[^\s?#]*)?$").expect("url pattern is valid")
});

/// HTTP verb of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "DELETE" => Some(Self::Delete),
            "PATCH" => Some(Self::Patch),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }

    fn sends_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    type_name: String,
    field_name: String,
    origin: String,
    path: String,
    method: Method,
    headers: Vec<(String, String)>,
    params: Vec<String>,
}

/// Owns `@http`
pub struct HttpTransformer;

impl Transformer for HttpTransformer {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn directives(&self) -> &'static [&'static str] {
        &["http"]
    }

    fn validate(&self, doc: &SchemaDocument, _ctx: &mut TransformContext) -> CompileResult<()> {
        let mut seen = IndexSet::new();
        for endpoint in endpoints(doc)? {
            if !seen.insert((endpoint.type_name.clone(), endpoint.field_name.clone())) {
                return Err(CompileError::invalid_directive(
                    PLUGIN,
                    Location::of_field(&endpoint.type_name, &endpoint.field_name),
                    "a field can call only one endpoint",
                ));
            }
        }
        Ok(())
    }

    fn generate_schema(&self, mut doc: SchemaDocument, _ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        for endpoint in endpoints(&doc)?.into_iter().filter(|e| !e.params.is_empty()) {
            let input_name = names::http_params_input(&endpoint.type_name, &endpoint.field_name);
            let mut input = InputObjectType::new(&input_name);
            for param in &endpoint.params {
                input = input.with_field(param, TypeRef::required("String"));
            }
            doc.add_if_missing(Definition::Input(input));

            let field = object_mut(&mut doc, &endpoint.type_name)?
                .field_mut(&endpoint.field_name)
                .ok_or_else(|| CompileError::internal(format!("{}.{} disappeared", endpoint.type_name, endpoint.field_name)))?;
            match field.arguments.iter().find(|a| a.name == "params") {
                Some(existing) if existing.ty.base_name() == input_name => {}
                Some(_) => {
                    return Err(CompileError::invalid_directive(
                        PLUGIN,
                        Location::of_field(&endpoint.type_name, &endpoint.field_name),
                        "the 'params' argument is reserved for path parameters",
                    ));
                }
                None => field
                    .arguments
                    .push(InputValue::new("params", TypeRef::required(&input_name))),
            }
        }
        Ok(doc)
    }

    fn generate_resolvers(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        for endpoint in endpoints(doc)? {
            debug!(
                plugin = PLUGIN,
                field = %format!("{}.{}", endpoint.type_name, endpoint.field_name),
                method = endpoint.method.name(),
                origin = %endpoint.origin,
                "http endpoint"
            );
            ctx.resolvers
                .pipeline(&endpoint.type_name, &endpoint.field_name, HTTP_STACK)
                .claim_data_load(
                    Function::new(
                        "HttpRequest",
                        PLUGIN,
                        templates::http_request(
                            endpoint.method.name(),
                            &endpoint.path,
                            &endpoint.headers,
                            endpoint.method.sends_body(),
                        ),
                        templates::http_response(),
                    )
                    .with_data_source(names::http_data_source(&endpoint.origin)),
                )?;
        }
        Ok(())
    }

    fn generate_resources(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let origins: IndexSet<String> = endpoints(doc)?.into_iter().map(|e| e.origin).collect();
        for origin in origins {
            let id = names::http_data_source(&origin);
            if ctx.resources.contains(&id) {
                continue;
            }
            ctx.resources.add(
                Resource::new(
                    &id,
                    HTTP_STACK,
                    ResourceProps::DataSource(DataSourceProps {
                        name: id.clone(),
                        kind: DataSourceKind::Http,
                        target: Some(origin),
                    }),
                )
                .with_reference(names::API_RESOURCE),
            )?;
        }
        Ok(())
    }
}

fn endpoints(doc: &SchemaDocument) -> CompileResult<Vec<Endpoint>> {
    doc.directive_sites("http").iter().map(parse_endpoint).collect()
}

fn parse_endpoint(site: &DirectiveSite) -> CompileResult<Endpoint> {
    let location = site_location(site);
    let invalid = |reason: String| CompileError::invalid_directive(PLUGIN, location.clone(), reason);

    let Some(field_name) = &site.field_name else {
        return Err(invalid("only applies to fields".to_string()));
    };
    if let Some(arg) = site
        .directive
        .arguments
        .keys()
        .find(|a| !matches!(a.as_str(), "url" | "method" | "headers"))
    {
        return Err(invalid(format!("unknown argument '{arg}'")));
    }
    let url = match site.directive.argument("url") {
        Some(Value::String(url)) => url,
        _ => return Err(invalid("'url' must be a string".to_string())),
    };
    let captures = URL
        .captures(url)
        .ok_or_else(|| invalid(format!("'{url}' is not an http(s) URL without query or fragment")))?;
    let origin = captures["origin"].to_string();
    let path = captures.name("path").map_or("/", |m| m.as_str()).to_string();

    let mut params = Vec::new();
    for segment in path.split('/') {
        if let Some(param) = segment.strip_prefix(':') {
            if !is_valid_name(param) {
                return Err(invalid(format!("path parameter ':{param}' is not a valid name")));
            }
            if params.iter().any(|p| p == param) {
                return Err(invalid(format!("path parameter ':{param}' appears twice")));
            }
            params.push(param.to_string());
        }
    }

    let method = match site.directive.argument("method") {
        None | Some(Value::Null) => Method::Get,
        Some(value) => value
            .as_str()
            .and_then(Method::from_name)
            .ok_or_else(|| invalid("'method' must be one of GET, POST, PUT, DELETE, PATCH".to_string()))?,
    };

    let mut headers = Vec::new();
    for header in site.directive.argument("headers").map(Value::as_list).unwrap_or_default() {
        let pair = header.as_object().and_then(|h| {
            let key = h.get("key")?.as_str()?;
            let value = h.get("value")?.as_str()?;
            (h.len() == 2 && !key.is_empty()).then(|| (key.to_string(), value.to_string()))
        });
        match pair {
            Some(pair) => headers.push(pair),
            None => return Err(invalid("headers must be objects of the form { key, value }".to_string())),
        }
    }

    Ok(Endpoint {
        type_name: site.type_name.clone(),
        field_name: field_name.clone(),
        origin,
        path,
        method,
        headers,
        params,
    })
}
