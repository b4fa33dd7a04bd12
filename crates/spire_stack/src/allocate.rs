//! Stack allocation.
//!
//! Resources are partitioned into named groups. A group depends on another
//! when one of its resources references a resource placed there. Groups that
//! reference each other cyclically have their movable cross-referencing
//! resources promoted to [`CONNECTION_STACK`] until the group graph is acyclic,
//! then groups are emitted in dependency order.

use crate::graph::ResourceSet;
use crate::resource::Resource;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use spire_core::{CompileError, CompileResult};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Group holding API-wide resources
pub const ROOT_GROUP: &str = "root";

/// Common group cross-referencing resources are promoted to
pub const CONNECTION_STACK: &str = "ConnectionStack";

/// One named group of resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackGroup {
    /// Group name
    pub name: String,
    /// Resource ids in contribution order
    pub resources: Vec<String>,
    /// Groups this group references, sorted
    pub depends_on: Vec<String>,
}

/// A reference from a resource in one group to a resource in another
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossReference {
    /// Referencing group
    pub from_group: String,
    /// Referencing resource
    pub from: String,
    /// Referenced group
    pub to_group: String,
    /// Referenced resource
    pub to: String,
}

/// Allocated resource graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGraph {
    /// Groups, dependencies first
    pub groups: Vec<StackGroup>,
    /// Cross-group references, sorted
    pub edges: Vec<CrossReference>,
    /// Every resource with its final group
    pub resources: IndexMap<String, Resource>,
}

impl ResourceGraph {
    /// Group a resource ended up in
    #[must_use]
    pub fn assignment(&self, id: &str) -> Option<&str> {
        self.resources.get(id).map(|r| r.group.as_str())
    }

    /// Look up a group
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&StackGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Group names in dependency order
    #[must_use]
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    /// Resources of one group in contribution order
    pub fn resources_in<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Resource> {
        self.resources.values().filter(move |r| r.group == group)
    }
}

/// Allocator with configured group overrides
pub struct Allocator {
    mapping: IndexMap<String, String>,
}

impl Allocator {
    /// Create an allocator without overrides
    #[must_use]
    pub fn new() -> Self {
        Self {
            mapping: IndexMap::new(),
        }
    }

    /// Use resource id -> group overrides; mapped resources become pinned
    #[must_use]
    pub fn with_mapping(mut self, mapping: IndexMap<String, String>) -> Self {
        self.mapping = mapping;
        self
    }

    /// Partition resources into dependency-ordered groups
    ///
    /// # Errors
    ///
    /// Returns `CircularResourceReference` when a cycle between groups is made
    /// only of pinned resources, and `InternalInvariantViolation` for dangling
    /// references
    pub fn allocate(&self, set: ResourceSet) -> CompileResult<ResourceGraph> {
        set.check_references()?;
        let mut resources = set.into_inner();

        for (id, group) in &self.mapping {
            if let Some(resource) = resources.get_mut(id) {
                resource.group = group.clone();
                resource.pinned = true;
            } else {
                warn!(resource = %id, group = %group, "stack mapping names unknown resource");
            }
        }

        loop {
            let deps = group_dependencies(&resources);
            let cyclic: Vec<BTreeSet<String>> = strongly_connected(&deps)
                .into_iter()
                .filter(|c| c.len() > 1)
                .collect();
            if cyclic.is_empty() {
                break;
            }

            for component in cyclic {
                let movable: Vec<String> = resources
                    .values()
                    .filter(|r| {
                        !r.pinned
                            && r.group != CONNECTION_STACK
                            && component.contains(&r.group)
                            && r.references.iter().any(|t| {
                                resources
                                    .get(t)
                                    .is_some_and(|t| t.group != r.group && component.contains(&t.group))
                            })
                    })
                    .map(|r| r.id.clone())
                    .collect();

                if movable.is_empty() {
                    return Err(CompileError::CircularResourceReference {
                        groups: component.into_iter().collect(),
                    });
                }

                debug!(
                    groups = ?component,
                    moved = movable.len(),
                    "promoting cross-referencing resources"
                );
                for id in movable {
                    if let Some(resource) = resources.get_mut(&id) {
                        resource.group = CONNECTION_STACK.to_string();
                    }
                }
            }
        }

        let deps = group_dependencies(&resources);
        let order = topological_order(&deps)?;

        let mut groups: Vec<StackGroup> = order
            .into_iter()
            .map(|name| StackGroup {
                resources: Vec::new(),
                depends_on: deps
                    .get(&name)
                    .map(|d| d.iter().cloned().collect())
                    .unwrap_or_default(),
                name,
            })
            .collect();
        for resource in resources.values() {
            if let Some(group) = groups.iter_mut().find(|g| g.name == resource.group) {
                group.resources.push(resource.id.clone());
            }
        }

        let mut edges = BTreeSet::new();
        for resource in resources.values() {
            for target in &resource.references {
                if let Some(target) = resources.get(target) {
                    if target.group != resource.group {
                        edges.insert(CrossReference {
                            from_group: resource.group.clone(),
                            from: resource.id.clone(),
                            to_group: target.group.clone(),
                            to: target.id.clone(),
                        });
                    }
                }
            }
        }

        info!(
            groups = groups.len(),
            resources = resources.len(),
            edges = edges.len(),
            "allocated resource groups"
        );
        Ok(ResourceGraph {
            groups,
            edges: edges.into_iter().collect(),
            resources,
        })
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Allocate with the given resource id -> group overrides
///
/// # Errors
///
/// See [`Allocator::allocate`]
pub fn allocate(set: ResourceSet, mapping: &IndexMap<String, String>) -> CompileResult<ResourceGraph> {
    Allocator::new().with_mapping(mapping.clone()).allocate(set)
}

/// group -> groups it references; every group with a resource is a key
fn group_dependencies(resources: &IndexMap<String, Resource>) -> BTreeMap<String, BTreeSet<String>> {
    let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for resource in resources.values() {
        let entry = deps.entry(resource.group.clone()).or_default();
        for target in &resource.references {
            if let Some(target) = resources.get(target) {
                if target.group != resource.group {
                    entry.insert(target.group.clone());
                }
            }
        }
    }
    deps
}

/// Tarjan's strongly connected components, visiting groups in name order
fn strongly_connected(deps: &BTreeMap<String, BTreeSet<String>>) -> Vec<BTreeSet<String>> {
    struct State<'a> {
        deps: &'a BTreeMap<String, BTreeSet<String>>,
        index: BTreeMap<&'a str, usize>,
        low: BTreeMap<&'a str, usize>,
        stack: IndexSet<&'a str>,
        next: usize,
        components: Vec<BTreeSet<String>>,
    }

    fn visit<'a>(state: &mut State<'a>, node: &'a str) {
        state.index.insert(node, state.next);
        state.low.insert(node, state.next);
        state.next += 1;
        state.stack.insert(node);

        if let Some(targets) = state.deps.get(node) {
            for target in targets {
                let target = target.as_str();
                if !state.index.contains_key(target) {
                    visit(state, target);
                    let low = state.low[node].min(state.low[target]);
                    state.low.insert(node, low);
                } else if state.stack.contains(target) {
                    let low = state.low[node].min(state.index[target]);
                    state.low.insert(node, low);
                }
            }
        }

        if state.low[node] == state.index[node] {
            let mut component = BTreeSet::new();
            while let Some(member) = state.stack.pop() {
                component.insert(member.to_string());
                if member == node {
                    break;
                }
            }
            state.components.push(component);
        }
    }

    let mut state = State {
        deps,
        index: BTreeMap::new(),
        low: BTreeMap::new(),
        stack: IndexSet::new(),
        next: 0,
        components: Vec::new(),
    };
    for node in deps.keys() {
        if !state.index.contains_key(node.as_str()) {
            visit(&mut state, node);
        }
    }
    state.components
}

/// Kahn's algorithm; dependencies first, ties by name
fn topological_order(deps: &BTreeMap<String, BTreeSet<String>>) -> CompileResult<Vec<String>> {
    let mut remaining: BTreeMap<&str, usize> = deps
        .iter()
        .map(|(group, targets)| (group.as_str(), targets.len()))
        .collect();
    let mut ready: BTreeSet<&str> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(group, _)| *group)
        .collect();
    let mut order = Vec::with_capacity(deps.len());

    while let Some(group) = ready.pop_first() {
        remaining.remove(group);
        order.push(group.to_string());
        for (dependent, targets) in deps {
            if targets.contains(group) {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }
    }

    if !remaining.is_empty() {
        return Err(CompileError::CircularResourceReference {
            groups: remaining.keys().map(|g| (*g).to_string()).collect(),
        });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DataSourceKind, DataSourceProps, ResolverProps, ResourceProps};
    use proptest::prelude::*;

    fn data_source(id: &str, group: &str) -> Resource {
        Resource::new(
            id,
            group,
            ResourceProps::DataSource(DataSourceProps {
                name: id.into(),
                kind: DataSourceKind::Table,
                target: None,
            }),
        )
    }

    fn resolver(id: &str, group: &str) -> Resource {
        Resource::new(
            id,
            group,
            ResourceProps::Resolver(ResolverProps {
                type_name: "Query".into(),
                field_name: id.into(),
                functions: vec![],
                caching_ttl: None,
            }),
        )
    }

    fn set(resources: Vec<Resource>) -> ResourceSet {
        let mut set = ResourceSet::new();
        for r in resources {
            set.add(r).unwrap();
        }
        set
    }

    #[test]
    fn test_dependency_order() {
        let graph = Allocator::new()
            .allocate(set(vec![
                data_source("Api", ROOT_GROUP),
                data_source("TodoDS", "Todo").with_reference("Api"),
                resolver("getTodo", "Todo").with_reference("TodoDS"),
            ]))
            .unwrap();

        assert_eq!(graph.group_names(), vec!["root", "Todo"]);
        assert_eq!(graph.group("Todo").unwrap().depends_on, vec!["root"]);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.group("Todo").unwrap().resources, vec!["TodoDS", "getTodo"]);
    }

    #[test]
    fn test_cycle_promoted_to_connection_stack() {
        let graph = Allocator::new()
            .allocate(set(vec![
                data_source("PostDS", "Post"),
                data_source("CommentDS", "Comment"),
                resolver("Post.comments", "Post").with_reference("CommentDS"),
                resolver("Comment.post", "Comment").with_reference("PostDS"),
            ]))
            .unwrap();

        assert_eq!(graph.assignment("Post.comments"), Some(CONNECTION_STACK));
        assert_eq!(graph.assignment("Comment.post"), Some(CONNECTION_STACK));
        assert_eq!(graph.assignment("PostDS"), Some("Post"));
        assert_eq!(graph.group_names(), vec!["Comment", "Post", CONNECTION_STACK]);
        assert_eq!(
            graph.group(CONNECTION_STACK).unwrap().depends_on,
            vec!["Comment", "Post"]
        );
    }

    #[test]
    fn test_pinned_cycle_fails() {
        let err = Allocator::new()
            .allocate(set(vec![
                data_source("A", "GroupA").with_reference("B"),
                data_source("B", "GroupB").with_reference("A"),
            ]))
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::CircularResourceReference {
                groups: vec!["GroupA".into(), "GroupB".into()]
            }
        );
    }

    #[test]
    fn test_mapping_pins_and_moves() {
        let mut mapping = IndexMap::new();
        mapping.insert("getTodo".to_string(), "Custom".to_string());
        let graph = Allocator::new()
            .with_mapping(mapping)
            .allocate(set(vec![
                data_source("TodoDS", "Todo"),
                resolver("getTodo", "Todo").with_reference("TodoDS"),
            ]))
            .unwrap();
        assert_eq!(graph.assignment("getTodo"), Some("Custom"));
        assert!(graph.resources["getTodo"].pinned);
        assert_eq!(graph.group_names(), vec!["Todo", "Custom"]);
    }

    #[test]
    fn test_dangling_reference_is_internal() {
        let err = Allocator::new()
            .allocate(set(vec![resolver("r", "G").with_reference("missing")]))
            .unwrap_err();
        assert!(err.is_internal());
    }

    proptest! {
        #[test]
        fn prop_unpinned_cross_links_always_allocate(
            links in prop::collection::vec((0usize..5, 0usize..5), 0..20)
        ) {
            let mut resources: Vec<Resource> = (0..5)
                .map(|i| data_source(&format!("DS{i}"), &format!("G{i}")))
                .collect();
            for (n, (from, to)) in links.iter().enumerate() {
                resources.push(
                    resolver(&format!("R{n}"), &format!("G{from}")).with_reference(format!("DS{to}")),
                );
            }
            let graph = Allocator::new().allocate(set(resources)).unwrap();

            // Every dependency appears before its dependent
            let names = graph.group_names();
            for group in &graph.groups {
                let pos = names.iter().position(|n| *n == group.name).unwrap();
                for dep in &group.depends_on {
                    let dep_pos = names.iter().position(|n| n == dep).unwrap();
                    prop_assert!(dep_pos < pos);
                }
            }
        }
    }
}
