//! Access control matrix.

use crate::rule::{Operation, Role};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Resolved permission table for one type
///
/// Rows are roles, columns are operations, and each entry is the set of
/// fields the role may touch with that operation. Anything absent is denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlMatrix {
    /// Type the matrix describes
    pub type_name: String,
    /// Fields of the type in declaration order
    pub fields: Vec<String>,
    /// Every role mentioned by a rule on the type or its fields
    pub roles: BTreeMap<String, Role>,
    /// role -> operation -> allowed fields (declaration order)
    pub grants: BTreeMap<String, BTreeMap<Operation, Vec<String>>>,
    /// Fields carrying their own rules
    pub field_scoped: BTreeSet<String>,
}

impl AccessControlMatrix {
    /// Create a matrix denying everything
    #[must_use]
    pub fn new(type_name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
            roles: BTreeMap::new(),
            grants: BTreeMap::new(),
            field_scoped: BTreeSet::new(),
        }
    }

    /// Register a role row
    pub fn add_role(&mut self, role: Role) {
        self.grants.entry(role.name.clone()).or_default();
        self.roles.insert(role.name.clone(), role);
    }

    /// Allow `role` to perform `operation` on `field`
    ///
    /// Callers grant fields in declaration order.
    pub fn allow(&mut self, role: &str, operation: Operation, field: &str) {
        let fields = self
            .grants
            .entry(role.to_string())
            .or_default()
            .entry(operation)
            .or_default();
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    }

    /// Check a single cell
    #[must_use]
    pub fn is_allowed(&self, role: &str, field: &str, operation: Operation) -> bool {
        self.allowed_fields(role, operation).iter().any(|f| f == field)
    }

    /// Fields a role may touch with an operation
    #[must_use]
    pub fn allowed_fields(&self, role: &str, operation: Operation) -> &[String] {
        self.grants
            .get(role)
            .and_then(|ops| ops.get(&operation))
            .map_or(&[], Vec::as_slice)
    }

    /// Roles allowed the operation on at least one field
    #[must_use]
    pub fn roles_for(&self, operation: Operation) -> Vec<&Role> {
        self.roles
            .values()
            .filter(|r| !self.allowed_fields(&r.name, operation).is_empty())
            .collect()
    }

    /// Roles allowed the operation on every field
    #[must_use]
    pub fn roles_for_all_fields(&self, operation: Operation) -> Vec<&Role> {
        self.roles
            .values()
            .filter(|r| self.allowed_fields(&r.name, operation).len() == self.fields.len())
            .collect()
    }

    /// Roles allowed the operation on one field
    #[must_use]
    pub fn roles_for_field(&self, field: &str, operation: Operation) -> Vec<&Role> {
        self.roles
            .values()
            .filter(|r| self.is_allowed(&r.name, field, operation))
            .collect()
    }

    /// Whether any rule was gathered for this type
    #[must_use]
    pub fn has_rules(&self) -> bool {
        !self.roles.is_empty()
    }

    /// Whether every (role, operation) pair is denied
    #[must_use]
    pub fn denies_all(&self) -> bool {
        self.grants
            .values()
            .all(|ops| ops.values().all(Vec::is_empty))
    }

    /// Check if a field has its own rules
    #[must_use]
    pub fn is_field_scoped(&self, field: &str) -> bool {
        self.field_scoped.contains(field)
    }

    /// Whether reading a field needs its own check
    ///
    /// True for fields with their own rules and for fields that some role
    /// admitted to read the type may not read.
    #[must_use]
    pub fn needs_field_guard(&self, field: &str) -> bool {
        self.is_field_scoped(field)
            || self
                .roles_for(Operation::Read)
                .iter()
                .any(|r| !self.is_allowed(&r.name, field, Operation::Read))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RoleKind;
    use spire_core::AuthProvider;

    fn matrix() -> AccessControlMatrix {
        let mut acm = AccessControlMatrix::new("Todo", vec!["id".into(), "content".into()]);
        acm.add_role(Role::new(AuthProvider::ApiKey, RoleKind::Public));
        acm.add_role(Role::new(AuthProvider::UserPools, RoleKind::Private));
        acm.allow("apiKey:public", Operation::Read, "id");
        acm.allow("apiKey:public", Operation::Read, "content");
        acm.allow("userPools:private", Operation::Update, "content");
        acm
    }

    #[test]
    fn test_cells() {
        let acm = matrix();
        assert!(acm.is_allowed("apiKey:public", "content", Operation::Read));
        assert!(!acm.is_allowed("apiKey:public", "content", Operation::Update));
        assert!(!acm.is_allowed("nobody", "id", Operation::Read));
        assert_eq!(acm.allowed_fields("userPools:private", Operation::Update), ["content"]);
    }

    #[test]
    fn test_role_queries() {
        let acm = matrix();
        assert_eq!(acm.roles_for(Operation::Update).len(), 1);
        assert_eq!(acm.roles_for_all_fields(Operation::Update).len(), 0);
        assert_eq!(acm.roles_for_all_fields(Operation::Read)[0].name, "apiKey:public");
        assert_eq!(acm.roles_for_field("id", Operation::Read).len(), 1);
    }

    #[test]
    fn test_field_guard_for_partial_readers() {
        let mut acm = matrix();
        assert!(!acm.needs_field_guard("id"));
        acm.allow("userPools:private", Operation::Read, "content");
        assert!(acm.needs_field_guard("id"));
        assert!(!acm.needs_field_guard("content"));
        acm.field_scoped.insert("content".into());
        assert!(acm.needs_field_guard("content"));
    }

    #[test]
    fn test_empty_matrix_denies_all() {
        let acm = AccessControlMatrix::new("Todo", vec!["id".into()]);
        assert!(acm.denies_all());
        assert!(!acm.has_rules());
        assert!(!matrix().denies_all());
    }

    #[test]
    fn test_allow_is_idempotent() {
        let mut acm = matrix();
        acm.allow("apiKey:public", Operation::Read, "id");
        assert_eq!(acm.allowed_fields("apiKey:public", Operation::Read).len(), 2);
    }

    #[test]
    fn test_serializes_operations_as_names() {
        let json = serde_json::to_value(matrix()).unwrap();
        assert_eq!(json["grants"]["apiKey:public"]["read"][1], "content");
    }
}
