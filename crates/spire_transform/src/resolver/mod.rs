//! Resolver pipelines.
//!
//! Every generated field operation compiles into the fixed slot sequence
//! `init -> preAuth -> auth -> postAuth -> preDataLoad -> postDataLoad -> finish`.
//! Transformers contribute functions into slots; the builder materializes the
//! pipelines once every transformer has run.

pub mod builder;
pub mod pipeline;
pub mod slot;

pub use builder::{PipelineBuilder, ResolverBuilder};
pub use pipeline::{Guard, ResolverPipeline, SlotFunctions};
pub use slot::{Function, Slot};
