//! Per-model configuration accumulated by the transformers.

use crate::names;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Primary key of a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKey {
    /// Partition field
    pub partition: String,
    /// Sort key fields, in order
    pub sort: Vec<String>,
}

impl PrimaryKey {
    /// Key on a single field
    #[must_use]
    pub fn on(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: Vec::new(),
        }
    }

    /// Partition field followed by the sort fields
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        let mut fields = Vec::with_capacity(1 + self.sort.len());
        fields.push(self.partition.clone());
        fields.extend(self.sort.iter().cloned());
        fields
    }

    /// Check if a field is part of the key
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.partition == field || self.sort.iter().any(|s| s == field)
    }
}

/// Where a secondary index came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexOrigin {
    /// An `@index` directive
    Declared,
    /// Synthesized for a relationship
    Relation,
}

/// Secondary index of a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryIndex {
    /// Index name
    pub name: String,
    /// Partition field
    pub partition: String,
    /// Sort key fields
    pub sort: Vec<String>,
    /// Generated query field, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_field: Option<String>,
    /// Whether the index is provisioned on the table
    pub provisioned: bool,
    /// Where it came from
    pub origin: IndexOrigin,
}

impl SecondaryIndex {
    /// Check if the index is keyed exactly by these fields
    #[must_use]
    pub fn keyed_by(&self, fields: &[String]) -> bool {
        fields.first() == Some(&self.partition) && fields[1..] == self.sort[..]
    }
}

/// Relationship kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    /// `@hasOne`
    HasOne,
    /// `@hasMany`
    HasMany,
    /// `@belongsTo`
    BelongsTo,
    /// `@manyToMany`
    ManyToMany,
}

impl EdgeKind {
    /// Directive spelling
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::HasOne => "hasOne",
            Self::HasMany => "hasMany",
            Self::BelongsTo => "belongsTo",
            Self::ManyToMany => "manyToMany",
        }
    }

    /// Parse a directive name
    #[must_use]
    pub fn from_directive(name: &str) -> Option<Self> {
        match name {
            "hasOne" => Some(Self::HasOne),
            "hasMany" => Some(Self::HasMany),
            "belongsTo" => Some(Self::BelongsTo),
            "manyToMany" => Some(Self::ManyToMany),
            _ => None,
        }
    }
}

/// Which side of an edge stores the key fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeySide {
    /// The type declaring the relationship field
    Source,
    /// The related type
    Target,
}

/// A resolved relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationalEdge {
    /// Relationship kind
    pub kind: EdgeKind,
    /// Type declaring the field
    pub source_type: String,
    /// Relationship field
    pub source_field: String,
    /// Related type
    pub target_type: String,
    /// Reference fields as declared
    pub references: Vec<String>,
    /// Key fields after pairing and synthesis
    pub key_fields: Vec<String>,
    /// Side storing the key fields
    pub key_side: KeySide,
    /// Index queried to traverse the edge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Many-to-many relation name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation_name: Option<String>,
}

impl RelationalEdge {
    /// Record a declared edge; keys are resolved later
    #[must_use]
    pub fn declared(
        kind: EdgeKind,
        source_type: impl Into<String>,
        source_field: impl Into<String>,
        target_type: impl Into<String>,
        references: Vec<String>,
    ) -> Self {
        Self {
            kind,
            source_type: source_type.into(),
            source_field: source_field.into(),
            target_type: target_type.into(),
            references,
            key_fields: Vec::new(),
            key_side: KeySide::Source,
            index: None,
            relation_name: None,
        }
    }

    /// `Type.field`
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}", self.source_type, self.source_field)
    }
}

/// Root fields generated for a model; `None` disables one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOperations {
    /// Get query
    pub get: Option<String>,
    /// List query
    pub list: Option<String>,
    /// Create mutation
    pub create: Option<String>,
    /// Update mutation
    pub update: Option<String>,
    /// Delete mutation
    pub delete: Option<String>,
    /// Subscriptions fired by create
    pub on_create: Vec<String>,
    /// Subscriptions fired by update
    pub on_update: Vec<String>,
    /// Subscriptions fired by delete
    pub on_delete: Vec<String>,
}

impl ModelOperations {
    /// Every operation enabled with default names
    #[must_use]
    pub fn defaults(model: &str) -> Self {
        Self {
            get: Some(names::get_query(model)),
            list: Some(names::list_query(model)),
            create: Some(names::mutation("create", model)),
            update: Some(names::mutation("update", model)),
            delete: Some(names::mutation("delete", model)),
            on_create: vec![names::subscription("create", model)],
            on_update: vec![names::subscription("update", model)],
            on_delete: vec![names::subscription("delete", model)],
        }
    }
}

/// Timestamp fields maintained by mutations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamps {
    /// Set on create
    pub created_at: Option<String>,
    /// Set on create and update
    pub updated_at: Option<String>,
}

impl Default for Timestamps {
    fn default() -> Self {
        Self {
            created_at: Some("createdAt".to_string()),
            updated_at: Some("updatedAt".to_string()),
        }
    }
}

/// Kind of field validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationKind {
    /// Shortest string length
    MinLength,
    /// Longest string length
    MaxLength,
    /// Required prefix
    StartsWith,
    /// Required suffix
    EndsWith,
    /// Regular expression match
    Matches,
    /// Strictly greater than
    Gt,
    /// Strictly less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
}

impl ValidationKind {
    /// Parse the schema spelling
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "minLength" => Some(Self::MinLength),
            "maxLength" => Some(Self::MaxLength),
            "startsWith" => Some(Self::StartsWith),
            "endsWith" => Some(Self::EndsWith),
            "matches" => Some(Self::Matches),
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "gte" => Some(Self::Gte),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    /// Schema spelling
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::MinLength => "minLength",
            Self::MaxLength => "maxLength",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Matches => "matches",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
        }
    }

    /// Whether the check applies to numbers rather than strings
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Gte | Self::Lte)
    }
}

/// One `@validate` constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    /// Check
    pub kind: ValidationKind,
    /// Operand as written
    pub value: String,
    /// Error message returned on failure
    pub error_message: String,
}

/// Full-text search settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    /// Generated search query, if enabled
    pub query_field: Option<String>,
}

/// Everything known about one `@model` type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Type name
    pub name: String,
    /// Field names of the final type
    pub fields: Vec<String>,
    /// Primary key
    pub primary_key: PrimaryKey,
    /// Secondary indexes
    pub indexes: Vec<SecondaryIndex>,
    /// Relationships declared on the type
    pub edges: Vec<RelationalEdge>,
    /// Generated root fields
    pub operations: ModelOperations,
    /// Timestamp fields
    pub timestamps: Timestamps,
    /// Field defaults
    pub defaults: IndexMap<String, String>,
    /// Field validations
    pub validations: IndexMap<String, Vec<Validation>>,
    /// Search settings when `@searchable`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searchable: Option<SearchConfig>,
    /// Relation name when synthesized for a many-to-many relationship
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_for: Option<String>,
}

impl ModelConfig {
    /// Configuration with an `id` key and every default operation
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            operations: ModelOperations::defaults(&name),
            name,
            fields: Vec::new(),
            primary_key: PrimaryKey::on("id"),
            indexes: Vec::new(),
            edges: Vec::new(),
            timestamps: Timestamps::default(),
            defaults: IndexMap::new(),
            validations: IndexMap::new(),
            searchable: None,
            join_for: None,
        }
    }

    /// Look up an index by name
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&SecondaryIndex> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Look up the edge of a field
    #[must_use]
    pub fn edge(&self, field: &str) -> Option<&RelationalEdge> {
        self.edges.iter().find(|e| e.source_field == field)
    }

    /// Root fields this model generates, in query, mutation, subscription order
    #[must_use]
    pub fn root_fields(&self) -> Vec<(&'static str, String)> {
        let ops = &self.operations;
        let mut out = Vec::new();
        for name in [&ops.get, &ops.list].into_iter().flatten() {
            out.push((names::QUERY, name.clone()));
        }
        for index in &self.indexes {
            if let Some(query) = index.query_field.as_ref().filter(|_| index.provisioned) {
                out.push((names::QUERY, query.clone()));
            }
        }
        if let Some(query) = self.searchable.as_ref().and_then(|s| s.query_field.as_ref()) {
            out.push((names::QUERY, query.clone()));
        }
        for name in [&ops.create, &ops.update, &ops.delete].into_iter().flatten() {
            out.push((names::MUTATION, name.clone()));
        }
        for name in ops.on_create.iter().chain(&ops.on_update).chain(&ops.on_delete) {
            out.push((names::SUBSCRIPTION, name.clone()));
        }
        out
    }

    /// Table resource id
    #[must_use]
    pub fn table_id(&self) -> String {
        names::table_id(&self.name)
    }

    /// Data source resource id
    #[must_use]
    pub fn data_source_id(&self) -> String {
        names::data_source_id(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_fields() {
        let key = PrimaryKey {
            partition: "pk".into(),
            sort: vec!["a".into(), "b".into()],
        };
        assert_eq!(key.fields(), vec!["pk", "a", "b"]);
        assert!(key.contains("b"));
        assert!(!key.contains("c"));
    }

    #[test]
    fn test_index_keyed_by() {
        let index = SecondaryIndex {
            name: "byOwner".into(),
            partition: "owner".into(),
            sort: vec!["createdAt".into()],
            query_field: None,
            provisioned: true,
            origin: IndexOrigin::Declared,
        };
        assert!(index.keyed_by(&["owner".into(), "createdAt".into()]));
        assert!(!index.keyed_by(&["owner".into()]));
        assert!(!index.keyed_by(&[]));
    }

    #[test]
    fn test_root_fields_follow_operations() {
        let mut config = ModelConfig::new("Todo");
        config.operations.delete = None;
        config.operations.on_create.clear();
        let fields = config.root_fields();
        assert!(fields.contains(&("Query", "listTodos".to_string())));
        assert!(!fields.iter().any(|(_, f)| f == "deleteTodo"));
        assert!(!fields.iter().any(|(_, f)| f == "onCreateTodo"));
        assert_eq!(fields.len(), 6);
    }
}
