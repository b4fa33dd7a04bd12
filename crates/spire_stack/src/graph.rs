//! The set of contributed resources.

use crate::resource::{Resource, ResourceKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use spire_core::{CompileError, CompileResult};

/// Resources keyed by id, in contribution order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSet {
    resources: IndexMap<String, Resource>,
}

impl ResourceSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource
    ///
    /// # Errors
    ///
    /// Returns `InternalInvariantViolation` if the id is already taken
    pub fn add(&mut self, resource: Resource) -> CompileResult<()> {
        if self.resources.contains_key(&resource.id) {
            return Err(CompileError::internal(format!(
                "resource id '{}' contributed twice",
                resource.id
            )));
        }
        self.resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    /// Add a resource unless the id exists; returns whether it was added
    pub fn add_if_missing(&mut self, resource: Resource) -> bool {
        if self.resources.contains_key(&resource.id) {
            return false;
        }
        self.resources.insert(resource.id.clone(), resource);
        true
    }

    /// Look up a resource
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Look up a resource mutably
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Resource> {
        self.resources.get_mut(id)
    }

    /// Check for an id
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    /// Iterate in contribution order
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Iterate mutably in contribution order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }

    /// Resources of one kind
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.values().filter(move |r| r.kind() == kind)
    }

    /// Number of resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Check that every reference resolves to a resource in the set
    ///
    /// # Errors
    ///
    /// Returns `InternalInvariantViolation` naming the first dangling reference
    pub fn check_references(&self) -> CompileResult<()> {
        for resource in self.resources.values() {
            if let Some(missing) = resource.references.iter().find(|r| !self.contains(r)) {
                return Err(CompileError::internal(format!(
                    "resource '{}' references unknown resource '{missing}'",
                    resource.id
                )));
            }
        }
        Ok(())
    }

    /// Consume into the underlying map
    #[must_use]
    pub fn into_inner(self) -> IndexMap<String, Resource> {
        self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceProps, SchemaProps};

    fn schema(id: &str) -> Resource {
        Resource::new(
            id,
            "root",
            ResourceProps::GraphQlSchema(SchemaProps {
                definition_path: "schema.graphql".into(),
            }),
        )
    }

    #[test]
    fn test_duplicate_id_is_internal() {
        let mut set = ResourceSet::new();
        set.add(schema("Schema")).unwrap();
        let err = set.add(schema("Schema")).unwrap_err();
        assert!(err.is_internal());
        assert!(!set.add_if_missing(schema("Schema")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_dangling_reference() {
        let mut set = ResourceSet::new();
        set.add(schema("Schema").with_reference("Api")).unwrap();
        assert!(set.check_references().is_err());
        set.add(schema("Api")).unwrap();
        assert!(set.check_references().is_ok());
    }

    #[test]
    fn test_of_kind() {
        let mut set = ResourceSet::new();
        set.add(schema("A")).unwrap();
        set.add(schema("B")).unwrap();
        assert_eq!(set.of_kind(ResourceKind::GraphQlSchema).count(), 2);
        assert_eq!(set.of_kind(ResourceKind::Table).count(), 0);
    }
}
