//! SPIRE Core Types
//!
//! This crate contains pure types shared by every compiler stage, with no I/O:
//! the error taxonomy, non-fatal diagnostics, the transform configuration,
//! content hashing and naming helpers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod hash;
pub mod naming;

// Re-exports
pub use config::{AuthProvider, FeatureFlags, TransformConfig};
pub use diagnostic::{Diagnostic, Diagnostics, Severity};
pub use error::{CompileError, CompileResult, Location};
pub use hash::Hash;
