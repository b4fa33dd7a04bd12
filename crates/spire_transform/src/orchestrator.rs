//! Runs the transformers over a document, phase by phase.
//!
//! Phases run in a fixed sequence and each phase visits every transformer in
//! registry order. After every document-producing phase the document is
//! checked against the base rules again; a failure at that point is a
//! compiler defect, since the user's document already passed.

use crate::context::TransformContext;
use crate::names;
use crate::resolver::ResolverPipeline;
use crate::transformer::TransformerRegistry;
use spire_core::{AuthProvider, CompileError, CompileResult};
use spire_schema::{check_directives, check_document, SchemaDocument};
use spire_stack::{
    ApiKeyProps, ApiProps, DataSourceKind, DataSourceProps, FunctionProps, ResolverProps, Resource,
    ResourceProps, SchemaProps, ROOT_GROUP,
};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Transform phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Document rewriting before validation
    Preprocess,
    /// Validation and configuration
    Configure,
    /// Generated types and root fields
    GenerateSchema,
    /// Pipeline contributions
    GenerateResolvers,
    /// Resource contributions
    GenerateResources,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preprocess => "preprocess",
            Self::Configure => "configure",
            Self::GenerateSchema => "generateSchema",
            Self::GenerateResolvers => "generateResolvers",
            Self::GenerateResources => "generateResources",
        };
        f.write_str(name)
    }
}

/// Drives a registry of transformers through every phase
pub struct Orchestrator {
    registry: TransformerRegistry,
}

impl Orchestrator {
    /// Use the given transformers in their registered order
    #[must_use]
    pub fn new(registry: TransformerRegistry) -> Self {
        Self { registry }
    }

    /// The registry
    #[must_use]
    pub fn registry(&self) -> &TransformerRegistry {
        &self.registry
    }

    /// Run every phase and return the final document
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a check or a transformer; nothing
    /// of a failed run is usable
    pub fn run(&self, doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        let known = self.registry.directives();
        check_directives(&doc, &known)?;
        check_document(&doc)?;

        let mut doc = doc;
        for transformer in self.registry.iter() {
            debug!(plugin = transformer.name(), phase = %Phase::Preprocess, "running");
            doc = transformer.preprocess(doc, ctx)?;
        }
        self.recheck(&doc, Phase::Preprocess)?;

        for transformer in self.registry.iter() {
            debug!(plugin = transformer.name(), phase = %Phase::Configure, "running");
            transformer.validate(&doc, ctx)?;
            doc = transformer.configure(doc, ctx)?;
        }
        self.recheck(&doc, Phase::Configure)?;

        for transformer in self.registry.iter() {
            debug!(plugin = transformer.name(), phase = %Phase::GenerateSchema, "running");
            doc = transformer.generate_schema(doc, ctx)?;
        }
        self.recheck(&doc, Phase::GenerateSchema)?;

        for transformer in self.registry.iter() {
            debug!(plugin = transformer.name(), phase = %Phase::GenerateResolvers, "running");
            transformer.generate_resolvers(&doc, ctx)?;
        }

        contribute_root_resources(ctx)?;
        for transformer in self.registry.iter() {
            debug!(plugin = transformer.name(), phase = %Phase::GenerateResources, "running");
            transformer.generate_resources(&doc, ctx)?;
        }

        info!(
            models = ctx.models.len(),
            pipelines = ctx.resolvers.len(),
            resources = ctx.resources.len(),
            "transform phases complete"
        );
        Ok(doc)
    }

    fn recheck(&self, doc: &SchemaDocument, phase: Phase) -> CompileResult<()> {
        check_directives(doc, &self.registry.directives())
            .and_then(|()| check_document(doc))
            .map_err(|e| CompileError::internal(format!("document invalid after {phase}: {e}")))
    }
}

/// Providers the API accepts: configured ones first, then any named by a rule
#[must_use]
pub fn api_providers(ctx: &TransformContext) -> Vec<AuthProvider> {
    let mut providers: Vec<AuthProvider> = ctx.config.auth_providers.clone().unwrap_or_default();
    for provider in &ctx.providers_used {
        if !providers.contains(provider) {
            providers.push(*provider);
        }
    }
    if providers.is_empty() {
        providers.push(AuthProvider::ApiKey);
    }
    providers
}

fn contribute_root_resources(ctx: &mut TransformContext) -> CompileResult<()> {
    let providers = api_providers(ctx);
    let api = ApiProps {
        name: ctx.config.api_name.clone(),
        default_auth: providers[0].runtime_auth_type().to_string(),
        additional_auth: providers[1..]
            .iter()
            .map(|p| p.runtime_auth_type().to_string())
            .collect(),
        xray_enabled: false,
    };
    ctx.resources
        .add(Resource::new(names::API_RESOURCE, ROOT_GROUP, ResourceProps::GraphQlApi(api)).pinned())?;
    ctx.resources.add(
        Resource::new(
            names::SCHEMA_RESOURCE,
            ROOT_GROUP,
            ResourceProps::GraphQlSchema(SchemaProps {
                definition_path: "schema.graphql".to_string(),
            }),
        )
        .with_reference(names::API_RESOURCE)
        .pinned(),
    )?;
    if providers.contains(&AuthProvider::ApiKey) {
        ctx.resources.add(
            Resource::new(
                names::API_KEY_RESOURCE,
                ROOT_GROUP,
                ResourceProps::ApiKey(ApiKeyProps {
                    expires_after_days: 7,
                    description: None,
                }),
            )
            .with_reference(names::API_RESOURCE)
            .pinned(),
        )?;
    }
    ctx.resources.add(
        Resource::new(
            names::NONE_DATA_SOURCE,
            ROOT_GROUP,
            ResourceProps::DataSource(DataSourceProps {
                name: names::NONE_DATA_SOURCE.to_string(),
                kind: DataSourceKind::None,
                target: None,
            }),
        )
        .with_reference(names::API_RESOURCE),
    )?;
    Ok(())
}

/// Contribute a resolver and its pipeline functions for every pipeline
///
/// Resolvers and functions are placed in the group their pipeline names and
/// stay movable, so the allocator can promote them out of reference cycles.
///
/// # Errors
///
/// Returns `InternalInvariantViolation` if a function names a data source that
/// was never contributed, or an id is taken twice
pub fn contribute_pipeline_resources(
    pipelines: &BTreeMap<String, ResolverPipeline>,
    ctx: &mut TransformContext,
) -> CompileResult<()> {
    for pipeline in pipelines.values() {
        let mut function_ids = Vec::with_capacity(pipeline.len());
        for (slot, position, function) in pipeline.functions() {
            let id = names::function_id(&pipeline.type_name, &pipeline.field_name, slot.name(), position);
            let data_source = function
                .data_source
                .clone()
                .unwrap_or_else(|| names::NONE_DATA_SOURCE.to_string());
            if !ctx.resources.contains(&data_source) {
                return Err(CompileError::internal(format!(
                    "{}: function '{}' uses unknown data source '{data_source}'",
                    pipeline.key(),
                    function.name
                )));
            }
            let base = format!(
                "resolvers/{}.{}.{}.{position}",
                pipeline.type_name, pipeline.field_name, slot
            );
            ctx.resources.add(
                Resource::new(
                    &id,
                    &pipeline.group,
                    ResourceProps::PipelineFunction(FunctionProps {
                        name: function.name.clone(),
                        data_source: data_source.clone(),
                        request_path: format!("{base}.req.vtl"),
                        response_path: format!("{base}.res.vtl"),
                    }),
                )
                .with_reference(names::API_RESOURCE)
                .with_reference(data_source),
            )?;
            function_ids.push(id);
        }

        ctx.resources.add(
            Resource::new(
                names::resolver_id(&pipeline.type_name, &pipeline.field_name),
                &pipeline.group,
                ResourceProps::Resolver(ResolverProps {
                    type_name: pipeline.type_name.clone(),
                    field_name: pipeline.field_name.clone(),
                    functions: function_ids.clone(),
                    caching_ttl: None,
                }),
            )
            .with_reference(names::API_RESOURCE)
            .with_reference(names::SCHEMA_RESOURCE)
            .with_references(function_ids),
        )?;
    }
    Ok(())
}
