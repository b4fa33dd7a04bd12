//! # SPIRE Transform
//!
//! Compiles annotated schema fragments into a finished schema, per-field
//! resolver pipelines, access control matrices and a dependency-ordered
//! resource graph.
//!
//! ```text
//! fragments -> parse -> default auth -> transformer phases
//!           -> pipelines -> resources -> visitor -> allocation -> output
//! ```
//!
//! A compile is a pure function of its inputs: no I/O, no shared state, and
//! identical inputs give byte-identical output.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod model_config;
pub mod names;
pub mod orchestrator;
pub mod output;
pub mod resolver;
pub mod templates;
pub mod transformer;
pub mod transformers;

pub use context::TransformContext;
pub use model_config::{EdgeKind, ModelConfig, RelationalEdge};
pub use orchestrator::{Orchestrator, Phase};
pub use output::CompiledSchema;
pub use resolver::{Function, Guard, ResolverPipeline, Slot};
pub use transformer::{Transformer, TransformerRegistry};
pub use transformers::{default_registry, default_transformers};

use spire_core::{CompileResult, TransformConfig};
use spire_schema::{expand_default_auth, parse_fragments, print_document};
use spire_stack::{allocate, apply_visitor, ResourceSet, ResourceVisitor};
use tracing::{debug, info};

/// Schema compiler
///
/// Holds the optional resource visitor; everything else is built per
/// compile.
#[derive(Default)]
pub struct Compiler {
    visitor: Option<Box<dyn ResourceVisitor>>,
}

impl Compiler {
    /// Create a compiler without a resource visitor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adjust resource properties after every transformer contributed
    #[must_use]
    pub fn with_visitor(mut self, visitor: Box<dyn ResourceVisitor>) -> Self {
        self.visitor = Some(visitor);
        self
    }

    /// Compile schema fragments, in order, under a configuration
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; nothing of a failed compile is kept
    pub fn compile<S: AsRef<str>>(&mut self, fragments: &[S], config: &TransformConfig) -> CompileResult<CompiledSchema> {
        let mut ctx = TransformContext::new(config.clone());
        let doc = parse_fragments(fragments)?;
        let doc = expand_default_auth(doc, &mut ctx.diagnostics)?;
        for toggle in config.feature_flags.unrecognized_names() {
            debug!(toggle = %toggle, "ignoring unrecognized feature toggle");
        }

        let orchestrator = Orchestrator::new(default_registry()?);
        let mut doc = orchestrator.run(doc, &mut ctx)?;

        let pipelines = std::mem::take(&mut ctx.resolvers).materialize(&doc)?;
        orchestrator::contribute_pipeline_resources(&pipelines, &mut ctx)?;
        if let Some(visitor) = self.visitor.as_mut() {
            apply_visitor(&mut ctx.resources, visitor.as_mut());
        }
        for (id, group) in &config.stack_mapping {
            if !ctx.resources.contains(id) {
                ctx.diagnostics.warn(
                    "unknown-stack-mapping",
                    format!("stack mapping of '{id}' to '{group}' names no generated resource"),
                    None,
                );
            }
        }
        let graph = allocate(std::mem::replace(&mut ctx.resources, ResourceSet::new()), &config.stack_mapping)?;

        doc.strip_directives(&orchestrator.registry().directives());
        let schema = print_document(&doc);

        let compiled = CompiledSchema::assemble(
            schema,
            pipelines,
            graph,
            ctx.matrices,
            ctx.models,
            ctx.diagnostics.into_vec(),
        )?;
        info!(
            pipelines = compiled.pipelines.len(),
            groups = compiled.resources.groups.len(),
            diagnostics = compiled.diagnostics.len(),
            fingerprint = %compiled.fingerprint,
            "compiled schema"
        );
        Ok(compiled)
    }
}

/// Compile with no resource visitor
///
/// # Errors
///
/// See [`Compiler::compile`]
pub fn compile<S: AsRef<str>>(fragments: &[S], config: &TransformConfig) -> CompileResult<CompiledSchema> {
    Compiler::new().compile(fragments, config)
}
