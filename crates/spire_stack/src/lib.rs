//! # SPIRE Stack
//!
//! Typed resource descriptors, the resource visitor, and the allocator that
//! partitions resources into dependency-ordered groups.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocate;
pub mod graph;
pub mod resource;
pub mod visitor;

pub use allocate::{
    allocate, Allocator, CrossReference, ResourceGraph, StackGroup, CONNECTION_STACK, ROOT_GROUP,
};
pub use graph::ResourceSet;
pub use resource::{
    ApiKeyProps, ApiProps, DataSourceKind, DataSourceProps, FunctionProps, GlobalIndex,
    KeyAttribute, PolicyStatement, ResolverProps, Resource, ResourceKind, ResourceProps,
    RoleProps, SchemaProps, SearchDomainProps, StreamingFunctionProps, TableProps,
};
pub use visitor::{apply_visitor, ResourceVisitor};
