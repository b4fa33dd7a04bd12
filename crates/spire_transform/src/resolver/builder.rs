//! Accumulating slot contributions and materializing pipelines.
//!
//! Contributions either append to a slot or claim an explicit 1-based
//! position in it. Appends take the position after the highest one in use, so
//! contribution order is kept. Two claims on one position are a conflict.
//! Data loads are claimed per plugin: one plugin may chain several, a second
//! plugin loading data for the same field conflicts.

use super::pipeline::{Guard, ResolverPipeline, SlotFunctions};
use super::slot::{Function, Slot};
use indexmap::IndexMap;
use spire_core::{CompileError, CompileResult};
use spire_schema::SchemaDocument;
use std::collections::BTreeMap;
use tracing::debug;

/// Contributions to one field's pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineBuilder {
    type_name: String,
    field_name: String,
    group: String,
    slots: BTreeMap<Slot, BTreeMap<u32, Function>>,
}

impl PipelineBuilder {
    /// Start an empty pipeline owned by `group`
    #[must_use]
    pub fn new(type_name: impl Into<String>, field_name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
            group: group.into(),
            slots: BTreeMap::new(),
        }
    }

    /// `Type.field`
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}", self.type_name, self.field_name)
    }

    /// Group the resolver is provisioned in
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Append a function to a slot
    pub fn append(&mut self, slot: Slot, function: Function) {
        let entries = self.slots.entry(slot).or_default();
        let position = entries.keys().next_back().map_or(1, |last| last + 1);
        entries.insert(position, function);
    }

    /// Place a function at an explicit 1-based position of a slot
    ///
    /// # Errors
    ///
    /// Returns `ResolverSlotConflict` if the position is taken
    pub fn insert_at(&mut self, slot: Slot, position: u32, function: Function) -> CompileResult<()> {
        let key = self.key();
        let entries = self.slots.entry(slot).or_default();
        if let Some(existing) = entries.get(&position) {
            return Err(CompileError::ResolverSlotConflict {
                pipeline: key,
                slot: slot.name().to_string(),
                position,
                existing: format!("{} ({})", existing.name, existing.plugin),
                incoming: format!("{} ({})", function.name, function.plugin),
            });
        }
        entries.insert(position, function);
        Ok(())
    }

    /// Add a data-loading function to `preDataLoad`
    ///
    /// # Errors
    ///
    /// Returns `ResolverSlotConflict` if another plugin already loads data
    /// for this field
    pub fn claim_data_load(&mut self, function: Function) -> CompileResult<()> {
        let owner = self
            .slots
            .get(&Slot::PreDataLoad)
            .and_then(|s| s.iter().find(|(_, f)| f.invokes_data_source()))
            .map(|(position, f)| (*position, f.plugin.clone()));
        match owner {
            Some((position, plugin)) if plugin != function.plugin => {
                self.insert_at(Slot::PreDataLoad, position, function)
            }
            _ => {
                self.append(Slot::PreDataLoad, function);
                Ok(())
            }
        }
    }

    /// Functions currently in a slot, by position
    pub fn slot(&self, slot: Slot) -> impl Iterator<Item = &Function> {
        self.slots.get(&slot).into_iter().flat_map(|s| s.values())
    }

    /// Check if a slot holds any function
    #[must_use]
    pub fn has(&self, slot: Slot) -> bool {
        self.slots.get(&slot).is_some_and(|s| !s.is_empty())
    }

    /// Finish the pipeline
    ///
    /// # Errors
    ///
    /// Returns `InternalInvariantViolation` if no function loads data or a
    /// data-loading function sits outside `preDataLoad`
    pub fn build(self) -> CompileResult<ResolverPipeline> {
        let key = self.key();
        let mut slots = Vec::with_capacity(Slot::ALL.len());
        let mut data_source = None;

        for slot in Slot::ALL {
            let functions: Vec<Function> = self
                .slots
                .get(&slot)
                .map(|s| s.values().cloned().collect())
                .unwrap_or_default();
            for f in functions.iter().filter(|f| f.invokes_data_source()) {
                if slot != Slot::PreDataLoad {
                    return Err(CompileError::internal(format!(
                        "{key}: function '{}' invokes a data source from {slot}",
                        f.name
                    )));
                }
                if data_source.is_none() {
                    data_source = f.data_source.clone();
                }
            }
            slots.push(SlotFunctions { slot, functions });
        }

        if data_source.is_none() {
            return Err(CompileError::internal(format!(
                "{key}: pipeline has no data-loading function"
            )));
        }

        let guard = if self.has(Slot::Auth) {
            Guard::Enforced
        } else {
            Guard::DenyAll
        };
        Ok(ResolverPipeline {
            type_name: self.type_name,
            field_name: self.field_name,
            group: self.group,
            slots,
            data_source,
            guard,
        })
    }
}

/// Every pipeline of a compile, keyed by `Type.field`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverBuilder {
    pipelines: IndexMap<String, PipelineBuilder>,
}

impl ResolverBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline of a field, created in `group` if it does not exist yet
    pub fn pipeline(&mut self, type_name: &str, field_name: &str, group: &str) -> &mut PipelineBuilder {
        self.pipelines
            .entry(format!("{type_name}.{field_name}"))
            .or_insert_with(|| PipelineBuilder::new(type_name, field_name, group))
    }

    /// Existing pipeline of a field
    pub fn get_mut(&mut self, type_name: &str, field_name: &str) -> Option<&mut PipelineBuilder> {
        self.pipelines.get_mut(&format!("{type_name}.{field_name}"))
    }

    /// Existing pipeline of a field
    #[must_use]
    pub fn get(&self, type_name: &str, field_name: &str) -> Option<&PipelineBuilder> {
        self.pipelines.get(&format!("{type_name}.{field_name}"))
    }

    /// Check if a field has a pipeline
    #[must_use]
    pub fn contains(&self, type_name: &str, field_name: &str) -> bool {
        self.get(type_name, field_name).is_some()
    }

    /// Keys in contribution order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    /// Number of pipelines
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Build every pipeline against the final document, sorted by key
    ///
    /// # Errors
    ///
    /// Returns `InternalInvariantViolation` for a pipeline whose field is
    /// missing from the document, or any violation reported by
    /// [`PipelineBuilder::build`]
    pub fn materialize(self, doc: &SchemaDocument) -> CompileResult<BTreeMap<String, ResolverPipeline>> {
        let mut out = BTreeMap::new();
        for (key, builder) in self.pipelines {
            let present = doc
                .object(&builder.type_name)
                .is_some_and(|t| t.has_field(&builder.field_name));
            if !present {
                return Err(CompileError::internal(format!(
                    "pipeline {key} targets a field missing from the schema"
                )));
            }
            let pipeline = builder.build()?;
            debug!(pipeline = %key, functions = pipeline.len(), guard = ?pipeline.guard, "materialized pipeline");
            out.insert(key, pipeline);
        }
        Ok(out)
    }
}
