//! The built-in directive transformers.

pub mod auth;
pub mod common;
pub mod default_value;
pub mod function;
pub mod http;
pub mod index;
pub mod model;
pub mod primary_key;
pub mod relational;
pub mod searchable;
pub mod validate;

pub use auth::AuthTransformer;
pub use default_value::DefaultValueTransformer;
pub use function::FunctionTransformer;
pub use http::HttpTransformer;
pub use index::IndexTransformer;
pub use model::ModelTransformer;
pub use primary_key::PrimaryKeyTransformer;
pub use relational::RelationalTransformer;
pub use searchable::SearchableTransformer;
pub use validate::ValidateTransformer;

use crate::transformer::{Transformer, TransformerRegistry};
use spire_core::CompileResult;

/// Built-in transformers in run order
#[must_use]
pub fn default_transformers() -> Vec<Box<dyn Transformer>> {
    vec![
        Box::new(ModelTransformer),
        Box::new(PrimaryKeyTransformer),
        Box::new(IndexTransformer),
        Box::new(DefaultValueTransformer),
        Box::new(ValidateTransformer),
        Box::new(RelationalTransformer),
        Box::new(SearchableTransformer),
        Box::new(FunctionTransformer),
        Box::new(HttpTransformer),
        Box::new(AuthTransformer),
    ]
}

/// A registry holding every built-in transformer
///
/// # Errors
///
/// Returns `InternalInvariantViolation` if two built-ins claim one directive
pub fn default_registry() -> CompileResult<TransformerRegistry> {
    let mut registry = TransformerRegistry::new();
    for transformer in default_transformers() {
        registry.register(transformer)?;
    }
    Ok(registry)
}
