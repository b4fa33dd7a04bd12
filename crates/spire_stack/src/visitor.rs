//! Typed resource visitor.
//!
//! The visitor is the single extension point for adjusting generated
//! resources. Each callback receives the resource id for identification and
//! mutable access to that resource's typed properties. Ids, groups and
//! references stay out of reach.

use crate::graph::ResourceSet;
use crate::resource::{
    ApiKeyProps, ApiProps, DataSourceProps, FunctionProps, ResolverProps, ResourceProps,
    RoleProps, SchemaProps, SearchDomainProps, StreamingFunctionProps, TableProps,
};

/// Callbacks invoked once per resource, by kind
#[allow(unused_variables)]
pub trait ResourceVisitor {
    /// Visit the API
    fn visit_api(&mut self, id: &str, props: &mut ApiProps) {}
    /// Visit the schema
    fn visit_schema(&mut self, id: &str, props: &mut SchemaProps) {}
    /// Visit an API key
    fn visit_api_key(&mut self, id: &str, props: &mut ApiKeyProps) {}
    /// Visit a table
    fn visit_table(&mut self, id: &str, props: &mut TableProps) {}
    /// Visit a data source
    fn visit_data_source(&mut self, id: &str, props: &mut DataSourceProps) {}
    /// Visit a role
    fn visit_role(&mut self, id: &str, props: &mut RoleProps) {}
    /// Visit a resolver
    fn visit_resolver(&mut self, id: &str, props: &mut ResolverProps) {}
    /// Visit a pipeline function
    fn visit_function(&mut self, id: &str, props: &mut FunctionProps) {}
    /// Visit a search domain
    fn visit_search_domain(&mut self, id: &str, props: &mut SearchDomainProps) {}
    /// Visit a streaming function
    fn visit_streaming_function(&mut self, id: &str, props: &mut StreamingFunctionProps) {}
}

/// Apply a visitor to every resource in contribution order
pub fn apply_visitor(set: &mut ResourceSet, visitor: &mut dyn ResourceVisitor) {
    for resource in set.iter_mut() {
        let id = resource.id.as_str();
        match &mut resource.props {
            ResourceProps::GraphQlApi(p) => visitor.visit_api(id, p),
            ResourceProps::GraphQlSchema(p) => visitor.visit_schema(id, p),
            ResourceProps::ApiKey(p) => visitor.visit_api_key(id, p),
            ResourceProps::Table(p) => visitor.visit_table(id, p),
            ResourceProps::DataSource(p) => visitor.visit_data_source(id, p),
            ResourceProps::Role(p) => visitor.visit_role(id, p),
            ResourceProps::Resolver(p) => visitor.visit_resolver(id, p),
            ResourceProps::PipelineFunction(p) => visitor.visit_function(id, p),
            ResourceProps::SearchDomain(p) => visitor.visit_search_domain(id, p),
            ResourceProps::StreamingFunction(p) => visitor.visit_streaming_function(id, p),
        }
    }
}
