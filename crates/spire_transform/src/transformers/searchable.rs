//! `@searchable`: full-text search over a model through a shared search domain.
//!
//! Every searchable model streams its table into one domain. The search
//! query, its data source and the streaming function live in their own group
//! so the model groups never depend on it.

use super::common::{add_root_field, is_leaf, is_relation, object, site_location};
use crate::context::TransformContext;
use crate::model_config::{ModelConfig, SearchConfig};
use crate::names;
use crate::resolver::{Function, Slot};
use crate::templates;
use crate::transformer::Transformer;
use spire_core::naming::is_valid_name;
use spire_core::{CompileError, CompileResult};
use spire_schema::{
    Definition, EnumType, FieldDefinition, InputObjectType, ObjectType, SchemaDocument, TypeRef, Value,
};
use spire_stack::{
    DataSourceKind, DataSourceProps, Resource, ResourceProps, SearchDomainProps, StreamingFunctionProps,
};
use tracing::debug;

const PLUGIN: &str = "searchable";
/// Group holding the search domain and everything that talks to it
pub const SEARCHABLE_STACK: &str = "SearchableStack";
/// The search data source
pub const SEARCH_DATA_SOURCE: &str = "SearchableDataSource";
const SEARCH_DOMAIN: &str = "SearchDomain";
const STREAMING_FUNCTION: &str = "SearchableStreamingFunction";
const SORT_DIRECTION: &str = "SearchableSortDirection";

/// Owns `@searchable`
pub struct SearchableTransformer;

impl Transformer for SearchableTransformer {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn directives(&self) -> &'static [&'static str] {
        &["searchable"]
    }

    fn validate(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        for site in doc.directive_sites("searchable") {
            let location = site_location(&site);
            if site.field_name.is_some() {
                return Err(CompileError::invalid_directive(PLUGIN, location, "only applies to object types"));
            }
            if !ctx.is_model(&site.type_name) {
                return Err(CompileError::invalid_directive(PLUGIN, location, "only applies to @model types"));
            }
            if let Some(arg) = site.directive.arguments.keys().find(|a| a.as_str() != "queries") {
                return Err(CompileError::invalid_directive(
                    PLUGIN,
                    location,
                    format!("unknown argument '{arg}'"),
                ));
            }
        }
        Ok(())
    }

    fn configure(&self, doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        for site in doc.directive_sites("searchable") {
            let location = site_location(&site);
            let query_field = match site.directive.argument("queries") {
                None => Some(names::search_query(&site.type_name)),
                Some(Value::Null) => None,
                Some(Value::Object(map)) => match map.get("search") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(name)) if is_valid_name(name) => Some(name.clone()),
                    Some(_) => {
                        return Err(CompileError::invalid_directive(
                            PLUGIN,
                            location,
                            "'queries.search' must be a field name or null",
                        ));
                    }
                },
                Some(_) => {
                    return Err(CompileError::invalid_directive(
                        PLUGIN,
                        location,
                        "'queries' must be an object or null",
                    ));
                }
            };
            debug!(plugin = PLUGIN, model = %site.type_name, query = ?query_field, "searchable model");
            ctx.model_mut(&site.type_name)?.searchable = Some(SearchConfig { query_field });
        }
        Ok(doc)
    }

    fn generate_schema(&self, mut doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        let searchable: Vec<ModelConfig> = ctx.models.values().filter(|c| c.searchable.is_some()).cloned().collect();
        if searchable.is_empty() {
            return Ok(doc);
        }
        doc.add_if_missing(Definition::Enum(EnumType::new(SORT_DIRECTION, &["asc", "desc"])));
        for config in &searchable {
            let object = object(&doc, &config.name)?.clone();
            let leaves: Vec<&FieldDefinition> = object
                .fields
                .iter()
                .filter(|f| !f.ty.is_list() && !is_relation(f, ctx) && is_leaf(&doc, f.ty.base_name()))
                .collect();

            let filter = names::searchable_filter_input(&config.name);
            let mut input = InputObjectType::new(&filter);
            for field in &leaves {
                let scalar = ensure_search_scalar_filter(&mut doc, field.ty.base_name());
                input = input.with_field(&field.name, TypeRef::named(scalar));
            }
            input = input
                .with_field("and", TypeRef::list_of(TypeRef::named(&filter)))
                .with_field("or", TypeRef::list_of(TypeRef::named(&filter)))
                .with_field("not", TypeRef::named(&filter));
            doc.add_if_missing(Definition::Input(input));

            let sortable = names::searchable_sortable_fields(&config.name);
            let field_names: Vec<&str> = leaves.iter().map(|f| f.name.as_str()).collect();
            doc.add_if_missing(Definition::Enum(EnumType::new(&sortable, &field_names)));
            let sort = names::searchable_sort_input(&config.name);
            doc.add_if_missing(Definition::Input(
                InputObjectType::new(&sort)
                    .with_field("field", TypeRef::named(&sortable))
                    .with_field("direction", TypeRef::named(SORT_DIRECTION)),
            ));

            let connection = names::searchable_connection(&config.name);
            doc.add_if_missing(Definition::Object(
                ObjectType::new(&connection)
                    .with_field(FieldDefinition::new(
                        "items",
                        TypeRef::list_of(TypeRef::named(&config.name)).non_null(),
                    ))
                    .with_field(FieldDefinition::new("nextToken", TypeRef::named("String")))
                    .with_field(FieldDefinition::new("total", TypeRef::named("Int"))),
            ));

            if let Some(query) = config.searchable.as_ref().and_then(|s| s.query_field.as_ref()) {
                let field = FieldDefinition::new(query, TypeRef::named(&connection))
                    .with_argument("filter", TypeRef::named(&filter))
                    .with_argument("sort", TypeRef::list_of(TypeRef::named(&sort)))
                    .with_argument("limit", TypeRef::named("Int"))
                    .with_argument("nextToken", TypeRef::named("String"))
                    .with_argument("from", TypeRef::named("Int"));
                add_root_field(&mut doc, names::QUERY, field)?;
            }
        }
        Ok(doc)
    }

    fn generate_resolvers(&self, _doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let limit = ctx.list_limit();
        let queries: Vec<(String, String)> = ctx
            .models
            .values()
            .filter_map(|c| {
                let query = c.searchable.as_ref()?.query_field.clone()?;
                Some((c.name.clone(), query))
            })
            .collect();
        for (model, query) in queries {
            let pipeline = ctx.resolvers.pipeline(names::QUERY, &query, SEARCHABLE_STACK);
            pipeline.claim_data_load(
                Function::new("Search", PLUGIN, templates::search(&model, limit), templates::search_response())
                    .with_data_source(SEARCH_DATA_SOURCE),
            )?;
            pipeline.append(
                Slot::PostDataLoad,
                Function::new("ShapeResult", PLUGIN, templates::empty_request(), templates::previous_result()),
            );
        }
        Ok(())
    }

    fn generate_resources(&self, _doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        let tables: Vec<String> = ctx
            .models
            .values()
            .filter(|c| c.searchable.is_some())
            .map(ModelConfig::table_id)
            .collect();
        if tables.is_empty() {
            return Ok(());
        }
        ctx.resources.add(Resource::new(
            SEARCH_DOMAIN,
            SEARCHABLE_STACK,
            ResourceProps::SearchDomain(SearchDomainProps {
                instance_type: "t3.small.elasticsearch".to_string(),
                instance_count: ctx.config.feature_flags.searchable_instance_count,
                volume_size_gb: 10,
            }),
        ))?;
        ctx.resources.add(
            Resource::new(
                SEARCH_DATA_SOURCE,
                SEARCHABLE_STACK,
                ResourceProps::DataSource(DataSourceProps {
                    name: SEARCH_DATA_SOURCE.to_string(),
                    kind: DataSourceKind::Search,
                    target: Some(SEARCH_DOMAIN.to_string()),
                }),
            )
            .with_reference(names::API_RESOURCE)
            .with_reference(SEARCH_DOMAIN),
        )?;
        ctx.resources.add(
            Resource::new(
                STREAMING_FUNCTION,
                SEARCHABLE_STACK,
                ResourceProps::StreamingFunction(StreamingFunctionProps {
                    handler: "index.handler".to_string(),
                    runtime: "python3.12".to_string(),
                    memory_mb: 256,
                    source_tables: tables.clone(),
                }),
            )
            .with_reference(SEARCH_DOMAIN)
            .with_references(tables),
        )?;
        Ok(())
    }
}

/// Search filter input for a scalar or enum, created on first use
fn ensure_search_scalar_filter(doc: &mut SchemaDocument, base: &str) -> String {
    let name = names::searchable_scalar_filter(base);
    if doc.has_type(&name) {
        return name;
    }
    let scalar = match base {
        "ID" | "Int" | "Float" | "Boolean" => base,
        _ => "String",
    };
    let ty = || TypeRef::named(scalar);
    let mut input = InputObjectType::new(&name);
    if scalar == "Boolean" {
        input = input.with_field("eq", ty()).with_field("ne", ty());
    } else {
        for op in ["ne", "gt", "lt", "gte", "lte", "eq"] {
            input = input.with_field(op, ty());
        }
        if !matches!(scalar, "Int" | "Float") {
            for op in ["match", "matchPhrase", "matchPhrasePrefix", "multiMatch", "wildcard", "regexp"] {
                input = input.with_field(op, ty());
            }
        }
        input = input
            .with_field("exists", TypeRef::named("Boolean"))
            .with_field("range", TypeRef::list_of(ty()));
    }
    doc.definitions.push(Definition::Input(input));
    name
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
        SearchableTransformer.validate(&doc, &mut ctx)?;
        let doc = SearchableTransformer.configure(doc, &mut ctx)?;
        let doc = ModelTransformer.generate_schema(doc, &mut ctx)?;
        let doc = SearchableTransformer.generate_schema(doc, &mut ctx)?;
        SearchableTransformer.generate_resolvers(&doc, &mut ctx)?;
        SearchableTransformer.generate_resources(&doc, &mut ctx)?;
        Ok((doc, ctx))
    }

    #[test]
    fn test_search_schema() {
        let (doc, ctx) = run(
            "enum Status { OPEN DONE } type Todo @model @searchable { name: String status: Status done: Boolean tags: [String] }",
            TransformConfig::new(),
        )
        .unwrap();
        let query = doc.object("Query").unwrap().field("searchTodos").unwrap();
        assert_eq!(query.ty.to_string(), "SearchableTodoConnection");
        let filter = doc.input("SearchableTodoFilterInput").unwrap();
        assert!(filter.fields.iter().any(|f| f.name == "status"));
        assert!(!filter.fields.iter().any(|f| f.name == "tags"));
        let sortable = doc.enum_type("SearchableTodoSortableFields").unwrap();
        assert!(sortable.has_value("name"));
        assert!(ctx.resolvers.get("Query", "searchTodos").unwrap().group() == SEARCHABLE_STACK);
    }

    #[test]
    fn test_domain_resources() {
        let config = TransformConfig::new().with_flags(FeatureFlags {
            searchable_instance_count: 3,
            ..FeatureFlags::default()
        });
        let (_, ctx) = run("type Todo @model @searchable(queries: { search: \"findTodos\" }) { name: String }", config).unwrap();
        let domain = ctx.resources.get(SEARCH_DOMAIN).unwrap();
        match &domain.props {
            ResourceProps::SearchDomain(props) => assert_eq!(props.instance_count, 3),
            other => panic!("unexpected props {other:?}"),
        }
        let streaming = ctx.resources.get(STREAMING_FUNCTION).unwrap();
        assert!(streaming.references.contains("TodoTable"));
        assert!(ctx.resolvers.contains("Query", "findTodos"));
    }

    #[test]
    fn test_search_query_disabled() {
        let (doc, ctx) = run("type Todo @model @searchable(queries: null) { name: String }", TransformConfig::new()).unwrap();
        assert!(!doc.object("Query").unwrap().has_field("searchTodos"));
        assert!(ctx.resolvers.is_empty());
        assert!(ctx.models["Todo"].searchable.is_some());
    }

    #[test]
    fn test_searchable_needs_model() {
        assert!(run("type Todo @searchable { name: String }", TransformConfig::new()).is_err());
    }
}
