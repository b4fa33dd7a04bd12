//! Typed resource descriptors.
//!
//! Every descriptor carries an id, the group it is initially placed in, the
//! ids it references, and typed properties. Only the properties are open to
//! the resource visitor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// The API itself
    GraphQlApi,
    /// Schema attached to the API
    GraphQlSchema,
    /// API key credential
    ApiKey,
    /// Storage table
    Table,
    /// Data source binding
    DataSource,
    /// Service role
    Role,
    /// Field resolver
    Resolver,
    /// Pipeline function
    PipelineFunction,
    /// Full-text search domain
    SearchDomain,
    /// Function streaming table changes into search
    StreamingFunction,
}

impl ResourceKind {
    /// Whether resources of this kind stay in their placed group
    #[must_use]
    pub fn pinned_by_default(self) -> bool {
        matches!(self, Self::Table | Self::DataSource | Self::Role)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Key attribute of a table or index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute type: `S`, `N` or `B`
    pub attribute_type: String,
}

impl KeyAttribute {
    /// Create a key attribute
    #[must_use]
    pub fn new(name: impl Into<String>, attribute_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute_type: attribute_type.into(),
        }
    }
}

/// Global secondary index on a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalIndex {
    /// Index name
    pub name: String,
    /// Partition key
    pub partition_key: KeyAttribute,
    /// Sort key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<KeyAttribute>,
}

/// Properties of [`ResourceKind::GraphQlApi`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProps {
    /// API name
    pub name: String,
    /// Default authentication type
    pub default_auth: String,
    /// Additional authentication types
    pub additional_auth: Vec<String>,
    /// Tracing enabled
    pub xray_enabled: bool,
}

/// Properties of [`ResourceKind::GraphQlSchema`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaProps {
    /// Artifact path of the schema text
    pub definition_path: String,
}

/// Properties of [`ResourceKind::ApiKey`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyProps {
    /// Days until expiry
    pub expires_after_days: u32,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Properties of [`ResourceKind::Table`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableProps {
    /// Table name
    pub table_name: String,
    /// Partition key
    pub partition_key: KeyAttribute,
    /// Sort key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<KeyAttribute>,
    /// Global secondary indexes
    pub global_indexes: Vec<GlobalIndex>,
    /// `PAY_PER_REQUEST` or `PROVISIONED`
    pub billing_mode: String,
    /// Change stream enabled
    pub stream_enabled: bool,
    /// Point-in-time recovery enabled
    pub point_in_time_recovery: bool,
    /// Time-to-live attribute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_attribute: Option<String>,
}

/// Backend a data source binds to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSourceKind {
    /// Storage table
    Table,
    /// No backend; logic-only functions
    None,
    /// Function invocation
    Lambda,
    /// HTTP endpoint
    Http,
    /// Search domain
    Search,
}

/// Properties of [`ResourceKind::DataSource`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceProps {
    /// Data source name
    pub name: String,
    /// Backend kind
    pub kind: DataSourceKind,
    /// Backend address (table name, function name, endpoint)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// One permission statement of a role
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatement {
    /// Allowed actions
    pub actions: Vec<String>,
    /// Resource ids the actions apply to
    pub resources: Vec<String>,
}

/// Properties of [`ResourceKind::Role`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleProps {
    /// Role name
    pub role_name: String,
    /// Service principal allowed to assume the role
    pub assumed_by: String,
    /// Permission statements
    pub statements: Vec<PolicyStatement>,
}

/// Properties of [`ResourceKind::Resolver`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverProps {
    /// Parent type
    pub type_name: String,
    /// Field
    pub field_name: String,
    /// Pipeline function ids in execution order
    pub functions: Vec<String>,
    /// Caching TTL in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caching_ttl: Option<u32>,
}

/// Properties of [`ResourceKind::PipelineFunction`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionProps {
    /// Function name
    pub name: String,
    /// Data source name
    pub data_source: String,
    /// Artifact path of the request template
    pub request_path: String,
    /// Artifact path of the response template
    pub response_path: String,
}

/// Properties of [`ResourceKind::SearchDomain`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDomainProps {
    /// Instance type
    pub instance_type: String,
    /// Instance count
    pub instance_count: u32,
    /// Volume size in GiB
    pub volume_size_gb: u32,
}

/// Properties of [`ResourceKind::StreamingFunction`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingFunctionProps {
    /// Handler entry point
    pub handler: String,
    /// Runtime identifier
    pub runtime: String,
    /// Memory in MiB
    pub memory_mb: u32,
    /// Tables streamed into the domain
    pub source_tables: Vec<String>,
}

/// Typed properties, one variant per kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "properties")]
pub enum ResourceProps {
    /// API
    GraphQlApi(ApiProps),
    /// Schema
    GraphQlSchema(SchemaProps),
    /// API key
    ApiKey(ApiKeyProps),
    /// Table
    Table(TableProps),
    /// Data source
    DataSource(DataSourceProps),
    /// Role
    Role(RoleProps),
    /// Resolver
    Resolver(ResolverProps),
    /// Pipeline function
    PipelineFunction(FunctionProps),
    /// Search domain
    SearchDomain(SearchDomainProps),
    /// Streaming function
    StreamingFunction(StreamingFunctionProps),
}

impl ResourceProps {
    /// Kind of the properties
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::GraphQlApi(_) => ResourceKind::GraphQlApi,
            Self::GraphQlSchema(_) => ResourceKind::GraphQlSchema,
            Self::ApiKey(_) => ResourceKind::ApiKey,
            Self::Table(_) => ResourceKind::Table,
            Self::DataSource(_) => ResourceKind::DataSource,
            Self::Role(_) => ResourceKind::Role,
            Self::Resolver(_) => ResourceKind::Resolver,
            Self::PipelineFunction(_) => ResourceKind::PipelineFunction,
            Self::SearchDomain(_) => ResourceKind::SearchDomain,
            Self::StreamingFunction(_) => ResourceKind::StreamingFunction,
        }
    }
}

/// A resource descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique id
    pub id: String,
    /// Group the resource is placed in
    pub group: String,
    /// Ids this resource references
    pub references: BTreeSet<String>,
    /// Whether the allocator may move the resource
    pub pinned: bool,
    /// Typed properties
    #[serde(flatten)]
    pub props: ResourceProps,
}

impl Resource {
    /// Create a resource; tables, data sources and roles start pinned
    #[must_use]
    pub fn new(id: impl Into<String>, group: impl Into<String>, props: ResourceProps) -> Self {
        let pinned = props.kind().pinned_by_default();
        Self {
            id: id.into(),
            group: group.into(),
            references: BTreeSet::new(),
            pinned,
            props,
        }
    }

    /// Add a referenced id
    #[must_use]
    pub fn with_reference(mut self, id: impl Into<String>) -> Self {
        self.references.insert(id.into());
        self
    }

    /// Add several referenced ids
    #[must_use]
    pub fn with_references<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Pin the resource to its group
    #[must_use]
    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    /// Kind of the resource
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.props.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_source() -> Resource {
        Resource::new(
            "TodoDataSource",
            "Todo",
            ResourceProps::DataSource(DataSourceProps {
                name: "TodoTable".into(),
                kind: DataSourceKind::Table,
                target: Some("TodoTable".into()),
            }),
        )
        .with_reference("TodoTable")
        .with_reference("TodoRole")
    }

    #[test]
    fn test_pinned_by_kind() {
        assert!(data_source().pinned);
        let resolver = Resource::new(
            "QueryGetTodoResolver",
            "Todo",
            ResourceProps::Resolver(ResolverProps {
                type_name: "Query".into(),
                field_name: "getTodo".into(),
                functions: vec![],
                caching_ttl: None,
            }),
        );
        assert!(!resolver.pinned);
        assert!(resolver.pinned().pinned);
    }

    #[test]
    fn test_references_are_sorted_sets() {
        let ds = data_source().with_reference("TodoRole");
        let refs: Vec<&str> = ds.references.iter().map(String::as_str).collect();
        assert_eq!(refs, vec!["TodoRole", "TodoTable"]);
    }

    #[test]
    fn test_serialize_shape() {
        let json = serde_json::to_value(data_source()).unwrap();
        assert_eq!(json["kind"], "DataSource");
        assert_eq!(json["properties"]["kind"], "TABLE");
        assert_eq!(json["group"], "Todo");
    }
}
