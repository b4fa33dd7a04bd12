//! The transformer interface and the ordered registry.

use crate::context::TransformContext;
use spire_core::{CompileError, CompileResult};
use spire_schema::SchemaDocument;

/// A directive plugin
///
/// Each transformer owns one directive family and takes part in every phase
/// of a compile. Document-producing phases take the document by value and
/// return its successor; the others read the final shape of the document.
/// Every method has a no-op default.
#[allow(unused_variables)]
pub trait Transformer {
    /// Stable transformer name
    fn name(&self) -> &'static str;

    /// Directives this transformer owns
    fn directives(&self) -> &'static [&'static str];

    /// Rewrite the document before validation
    ///
    /// # Errors
    ///
    /// Returns an error if the directives cannot be expanded
    fn preprocess(&self, doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        Ok(doc)
    }

    /// Check directive usage; runs right before [`Transformer::configure`]
    ///
    /// # Errors
    ///
    /// Returns the first misuse found
    fn validate(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        Ok(())
    }

    /// Mutate declared types and record configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be resolved
    fn configure(&self, doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        Ok(doc)
    }

    /// Add generated types and root fields
    ///
    /// # Errors
    ///
    /// Returns an error if a generated type cannot be added
    fn generate_schema(&self, doc: SchemaDocument, ctx: &mut TransformContext) -> CompileResult<SchemaDocument> {
        Ok(doc)
    }

    /// Contribute pipeline functions
    ///
    /// # Errors
    ///
    /// Returns `ResolverSlotConflict` for clashing contributions
    fn generate_resolvers(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        Ok(())
    }

    /// Contribute resources
    ///
    /// # Errors
    ///
    /// Returns an error if a resource id is contributed twice
    fn generate_resources(&self, doc: &SchemaDocument, ctx: &mut TransformContext) -> CompileResult<()> {
        Ok(())
    }
}

/// Ordered list of transformers for one compile
pub struct TransformerRegistry {
    transformers: Vec<Box<dyn Transformer>>,
}

impl TransformerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            transformers: Vec::new(),
        }
    }

    /// Append a transformer; it runs after every transformer registered before it
    ///
    /// # Errors
    ///
    /// Returns `InternalInvariantViolation` if the name or one of its
    /// directives is already registered
    pub fn register(&mut self, transformer: Box<dyn Transformer>) -> CompileResult<()> {
        let name = transformer.name();
        if self.transformers.iter().any(|t| t.name() == name) {
            return Err(CompileError::internal(format!(
                "transformer '{name}' registered twice"
            )));
        }
        for directive in transformer.directives() {
            if let Some(owner) = self.owner_of(directive) {
                return Err(CompileError::internal(format!(
                    "directive @{directive} claimed by both '{owner}' and '{name}'"
                )));
            }
        }
        self.transformers.push(transformer);
        Ok(())
    }

    /// Name of the transformer owning a directive
    #[must_use]
    pub fn owner_of(&self, directive: &str) -> Option<&'static str> {
        self.transformers
            .iter()
            .find(|t| t.directives().contains(&directive))
            .map(|t| t.name())
    }

    /// Every directive owned by a registered transformer
    #[must_use]
    pub fn directives(&self) -> Vec<&'static str> {
        self.transformers
            .iter()
            .flat_map(|t| t.directives().iter().copied())
            .collect()
    }

    /// Transformer names in run order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    /// Transformers in run order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Transformer> {
        self.transformers.iter().map(|t| t.as_ref())
    }

    /// Number of transformers
    #[must_use]
    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, &'static [&'static str]);

    impl Transformer for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn directives(&self) -> &'static [&'static str] {
            self.1
        }
    }

    #[test]
    fn test_register_order_and_ownership() {
        let mut registry = TransformerRegistry::new();
        registry.register(Box::new(Named("model", &["model"]))).unwrap();
        registry.register(Box::new(Named("relational", &["hasMany", "belongsTo"]))).unwrap();
        assert_eq!(registry.names(), vec!["model", "relational"]);
        assert_eq!(registry.owner_of("belongsTo"), Some("relational"));
        assert_eq!(registry.directives(), vec!["model", "hasMany", "belongsTo"]);
    }

    #[test]
    fn test_duplicate_registration_is_internal() {
        let mut registry = TransformerRegistry::new();
        registry.register(Box::new(Named("model", &["model"]))).unwrap();
        assert!(registry.register(Box::new(Named("model", &[]))).unwrap_err().is_internal());
        assert!(registry.register(Box::new(Named("other", &["model"]))).unwrap_err().is_internal());
        assert_eq!(registry.len(), 1);
    }
}
