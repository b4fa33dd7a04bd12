//! `@index`: secondary indexes and their query fields.

use super::common::{add_root_field, is_leaf, object, site_location, sort_argument_name, sort_key_argument};
use crate::context::TransformContext;
use crate::model_config::{IndexOrigin, SecondaryIndex};
use crate::names;
use crate::resolver::{Function, Slot};
use crate::templates;
use crate::transformer::Transformer;
use spire_core::naming::is_valid_name;
use spire_core::{CompileError, CompileResult, Location};
use spire_schema::{DirectiveSite, FieldDefinition, InputValue, SchemaDocument, TypeRef, Value};
use tracing::{debug, warn};

const PLUGIN: &str = "index";
const ARGUMENTS: &[&str] = &["name", "sortKeyFields", "queryField"];

/// Owns `@index`
pub struct IndexTransformer;

struct DeclaredIndex {
    name: String,
    partition: String,
    sort: Vec<String>,
    query_field: Option<String>,
}

impl Transformer for IndexTransformer {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn directives(&self) -> &'static [&'static str] {
        &["index"]
    }

    fn validate(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let mut names_by_type: Vec<(String, String)> = Vec::new();
        for site in doc.directive_sites("index") {
            let declared = parse_index(doc, ctx, &site)?;
            let entry = (site.type_name.clone(), declared.name.clone());
            if names_by_type.contains(&entry) {
                return Err(CompileError::invalid_directive(
                    PLUGIN,
                    site_location(&site),
                    format!("index name '{}' is already used on {}", declared.name, site.type_name),
                ));
            }
            names_by_type.push(entry);
        }
        Ok(())
    }

    fn configure(&self, doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        let provisioned = ctx.config.feature_flags.secondary_key_as_gsi;
        for site in doc.directive_sites("index") {
            let declared = parse_index(&doc, ctx, &site)?;
            let location = site_location(&site);
            let mut key = vec![declared.partition.clone()];
            key.extend(declared.sort.iter().cloned());

            let model = ctx.model_mut(&site.type_name)?;
            let redundant = model
                .indexes
                .iter()
                .find(|i| i.keyed_by(&key))
                .map(|i| i.name.clone());
            model.indexes.push(SecondaryIndex {
                name: declared.name.clone(),
                partition: declared.partition,
                sort: declared.sort,
                query_field: declared.query_field.filter(|_| provisioned),
                provisioned,
                origin: IndexOrigin::Declared,
            });

            if let Some(existing) = redundant {
                warn!(plugin = PLUGIN, model = %site.type_name, index = %declared.name, "redundant index");
                ctx.diagnostics.warn(
                    "redundant-index",
                    format!("index '{}' has the same key as '{existing}'", declared.name),
                    Some(location),
                );
            }
            if !provisioned {
                debug!(plugin = PLUGIN, model = %site.type_name, index = %declared.name, "index recorded without provisioning");
            }
        }
        Ok(doc)
    }

    fn generate_schema(&self, mut doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        for config in ctx.models.values() {
            let declared: Vec<&SecondaryIndex> = config
                .indexes
                .iter()
                .filter(|i| i.origin == IndexOrigin::Declared && i.provisioned)
                .collect();
            if declared.is_empty() {
                continue;
            }
            let object = object(&doc, &config.name)?.clone();
            for index in declared {
                let Some(query) = &index.query_field else {
                    continue;
                };
                let partition = object
                    .field(&index.partition)
                    .map(|f| f.ty.clone().non_null())
                    .unwrap_or_else(|| TypeRef::required("ID"));
                let mut field = FieldDefinition::new(query, TypeRef::named(names::connection_type(&config.name)));
                field.arguments.push(InputValue::new(&index.partition, partition));
                if let Some(sort) = sort_key_argument(&mut doc, &config.name, &object, &index.sort) {
                    field.arguments.push(sort);
                }
                let field = field
                    .with_argument("sortDirection", TypeRef::named(names::SORT_DIRECTION))
                    .with_argument("filter", TypeRef::named(names::filter_input(&config.name)))
                    .with_argument("limit", TypeRef::named("Int"))
                    .with_argument("nextToken", TypeRef::named("String"));
                add_root_field(&mut doc, names::QUERY, field)?;
            }
        }
        Ok(doc)
    }

    fn generate_resolvers(&self, _doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let limit = ctx.list_limit();
        let mut queries = Vec::new();
        for config in ctx.models.values() {
            for index in config.indexes.iter().filter(|i| i.origin == IndexOrigin::Declared && i.provisioned) {
                if let Some(query) = &index.query_field {
                    queries.push((config.name.clone(), config.data_source_id(), index.clone(), query.clone()));
                }
            }
        }
        for (model, data_source, index, query) in queries {
            let sort = sort_argument_name(&index.sort);
            let pipeline = ctx.resolvers.pipeline(names::QUERY, &query, &model);
            pipeline.claim_data_load(
                Function::new(
                    "QueryIndex",
                    PLUGIN,
                    templates::query(Some(&index.name), &index.partition, sort.as_deref(), limit),
                    templates::result_response(),
                )
                .with_data_source(data_source),
            )?;
            pipeline.append(
                Slot::PostDataLoad,
                Function::new("ShapeResult", PLUGIN, templates::empty_request(), templates::previous_result()),
            );
        }
        Ok(())
    }
}

fn string_argument(site: &DirectiveSite, name: &str, location: &Location) -> CompileResult<Option<String>> {
    match site.directive.argument(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if is_valid_name(s) => Ok(Some(s.clone())),
        Some(_) => Err(CompileError::invalid_directive(
            PLUGIN,
            location.clone(),
            format!("'{name}' must be a valid name"),
        )),
    }
}

fn parse_index(doc: &SchemaDocument, ctx: &TransformContext, site: &DirectiveSite) -> CompileResult<DeclaredIndex> {
    let location = site_location(site);
    let Some(partition) = site.field_name.clone() else {
        return Err(CompileError::invalid_directive(PLUGIN, location, "only applies to fields"));
    };
    if !ctx.is_model(&site.type_name) {
        return Err(CompileError::invalid_directive(PLUGIN, location, "only applies to @model types"));
    }
    if let Some(arg) = site.directive.arguments.keys().find(|a| !ARGUMENTS.contains(&a.as_str())) {
        return Err(CompileError::invalid_directive(PLUGIN, location, format!("unknown argument '{arg}'")));
    }
    let object = object(doc, &site.type_name)?;

    let sort = match site.directive.argument("sortKeyFields") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => value.as_string_list().ok_or_else(|| {
            CompileError::invalid_directive(PLUGIN, location.clone(), "sortKeyFields must be a list of field names")
        })?,
    };
    for field in std::iter::once(&partition).chain(&sort) {
        let usable = object
            .field(field)
            .is_some_and(|f| !f.ty.is_list() && is_leaf(doc, f.ty.base_name()));
        if !usable {
            return Err(CompileError::invalid_directive(
                PLUGIN,
                location,
                format!("key field '{field}' must be a scalar or enum field of {}", site.type_name),
            ));
        }
    }

    let name = string_argument(site, "name", &location)?
        .unwrap_or_else(|| names::default_index_name(&partition, &sort));
    let query_field = match string_argument(site, "queryField", &location)? {
        Some(query) => Some(query),
        None if ctx.config.feature_flags.enable_auto_index_query_names => {
            Some(names::index_query(&site.type_name, &partition, &sort))
        }
        None => None,
    };
    Ok(DeclaredIndex {
        name,
        partition,
        sort,
        query_field,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::model::ModelTransformer;
    use spire_core::{FeatureFlags, TransformConfig};
    use spire_schema::parse_fragments;

    fn run(sdl: &str, config: TransformConfig) -> CompileResult<(SchemaDocument, TransformContext)> {
        let doc = parse_fragments(&[sdl]).unwrap();
        let mut ctx = TransformContext::new(config);
        let doc = ModelTransformer.configure(doc, &mut ctx)?;
        IndexTransformer.validate(&doc, &mut ctx)?;
        let doc = IndexTransformer.configure(doc, &mut ctx)?;
        let doc = ModelTransformer.generate_schema(doc, &mut ctx)?;
        let doc = IndexTransformer.generate_schema(doc, &mut ctx)?;
        Ok((doc, ctx))
    }

    const TODO: &str = "type Todo @model { id: ID! owner: String! @index(name: \"byOwner\", sortKeyFields: [\"createdAt\"], queryField: \"todosByOwner\") }";

    #[test]
    fn test_index_query_generated() {
        let (doc, ctx) = run(TODO, TransformConfig::new()).unwrap();
        let index = ctx.models["Todo"].index("byOwner").unwrap();
        assert!(index.provisioned);
        let query = doc.object("Query").unwrap().field("todosByOwner").unwrap();
        let args: Vec<&str> = query.arguments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(args, vec!["owner", "createdAt", "sortDirection", "filter", "limit", "nextToken"]);
    }

    #[test]
    fn test_gsi_flag_off_records_only() {
        let config = TransformConfig::new().with_flags(FeatureFlags::default().with_secondary_key_as_gsi(false));
        let (doc, ctx) = run(TODO, config).unwrap();
        let index = ctx.models["Todo"].index("byOwner").unwrap();
        assert!(!index.provisioned);
        assert!(index.query_field.is_none());
        assert!(!doc.object("Query").unwrap().has_field("todosByOwner"));
    }

    #[test]
    fn test_auto_query_names() {
        let config = TransformConfig::new().with_flags(FeatureFlags::default().with_auto_index_query_names(true));
        let (doc, _) = run("type Todo @model { owner: String @index }", config).unwrap();
        assert!(doc.object("Query").unwrap().has_field("listTodosByOwner"));
    }

    #[test]
    fn test_duplicate_index_name_fails() {
        let err = run(
            "type Todo @model { a: String @index(name: \"byX\") b: String @index(name: \"byX\") }",
            TransformConfig::new(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "InvalidDirectiveError");
    }

    #[test]
    fn test_redundant_index_warns() {
        let (_, ctx) = run(
            "type Todo @model { a: String @index(name: \"byA\") @index(name: \"alsoByA\") }",
            TransformConfig::new(),
        )
        .unwrap();
        assert!(ctx.diagnostics.contains_code("redundant-index"));
    }
}
