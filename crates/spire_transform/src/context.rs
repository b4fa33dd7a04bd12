//! Per-compile transform context.

use crate::model_config::{ModelConfig, RelationalEdge};
use crate::resolver::ResolverBuilder;
use indexmap::IndexMap;
use spire_auth::{AccessControlMatrix, ScopedRule};
use spire_core::{AuthProvider, CompileError, CompileResult, Diagnostics, TransformConfig};
use spire_stack::ResourceSet;
use std::collections::BTreeSet;

/// State shared by the transformers of one compile
///
/// Created fresh for every compile and passed explicitly to each transformer
/// phase; nothing outlives the compile.
#[derive(Debug)]
pub struct TransformContext {
    /// Configuration of this compile
    pub config: TransformConfig,
    /// Non-fatal findings
    pub diagnostics: Diagnostics,
    /// Model configurations by type name, in declaration order
    pub models: IndexMap<String, ModelConfig>,
    /// Relationship directives recorded by the first relational pass
    pub edges: Vec<RelationalEdge>,
    /// Parsed authorization rules by type name
    pub auth_rules: IndexMap<String, Vec<ScopedRule>>,
    /// Resolved access control matrices by type name
    pub matrices: IndexMap<String, AccessControlMatrix>,
    /// Providers named by any rule
    pub providers_used: BTreeSet<AuthProvider>,
    /// Pipeline contributions
    pub resolvers: ResolverBuilder,
    /// Contributed resources
    pub resources: ResourceSet,
}

impl TransformContext {
    /// Create a context for one compile
    #[must_use]
    pub fn new(config: TransformConfig) -> Self {
        Self {
            config,
            diagnostics: Diagnostics::new(),
            models: IndexMap::new(),
            edges: Vec::new(),
            auth_rules: IndexMap::new(),
            matrices: IndexMap::new(),
            providers_used: BTreeSet::new(),
            resolvers: ResolverBuilder::new(),
            resources: ResourceSet::new(),
        }
    }

    /// Check if a type is a configured model
    #[must_use]
    pub fn is_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Configuration of a model that must exist
    ///
    /// # Errors
    ///
    /// Returns `InternalInvariantViolation` if the model was never configured
    pub fn model(&self, name: &str) -> CompileResult<&ModelConfig> {
        self.models
            .get(name)
            .ok_or_else(|| CompileError::internal(format!("model '{name}' has no configuration")))
    }

    /// Mutable configuration of a model that must exist
    ///
    /// # Errors
    ///
    /// Returns `InternalInvariantViolation` if the model was never configured
    pub fn model_mut(&mut self, name: &str) -> CompileResult<&mut ModelConfig> {
        self.models
            .get_mut(name)
            .ok_or_else(|| CompileError::internal(format!("model '{name}' has no configuration")))
    }

    /// Default page size of list resolvers
    #[must_use]
    pub fn list_limit(&self) -> u32 {
        self.config.feature_flags.default_list_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_internal() {
        let mut ctx = TransformContext::new(TransformConfig::new());
        assert!(ctx.model("Todo").unwrap_err().is_internal());
        ctx.models.insert("Todo".into(), ModelConfig::new("Todo"));
        assert!(ctx.is_model("Todo"));
        ctx.model_mut("Todo").unwrap().searchable = None;
        assert_eq!(ctx.list_limit(), 100);
    }
}
