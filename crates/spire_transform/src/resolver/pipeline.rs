//! Materialized resolver pipelines.

use super::slot::{Function, Slot};
use serde::{Deserialize, Serialize};

/// Recorded authorization outcome of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Guard {
    /// The `auth` slot decides
    Enforced,
    /// No rule applies; every caller is denied
    DenyAll,
}

/// Functions of one slot, in execution order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotFunctions {
    /// The slot
    pub slot: Slot,
    /// Its functions
    pub functions: Vec<Function>,
}

/// A field's finished pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverPipeline {
    /// Parent type
    pub type_name: String,
    /// Field
    pub field_name: String,
    /// Group the resolver is provisioned in
    pub group: String,
    /// Every slot, in execution order
    pub slots: Vec<SlotFunctions>,
    /// Data source of the first data-loading function
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    /// Authorization outcome
    pub guard: Guard,
}

impl ResolverPipeline {
    /// `Type.field`
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}", self.type_name, self.field_name)
    }

    /// Functions of one slot
    #[must_use]
    pub fn slot(&self, slot: Slot) -> &[Function] {
        self.slots
            .iter()
            .find(|s| s.slot == slot)
            .map(|s| s.functions.as_slice())
            .unwrap_or_default()
    }

    /// Slot sequence of the pipeline
    #[must_use]
    pub fn slot_order(&self) -> Vec<Slot> {
        self.slots.iter().map(|s| s.slot).collect()
    }

    /// Every function in execution order with its slot and 1-based position
    pub fn functions(&self) -> impl Iterator<Item = (Slot, usize, &Function)> {
        self.slots.iter().flat_map(|s| {
            s.functions
                .iter()
                .enumerate()
                .map(move |(i, f)| (s.slot, i + 1, f))
        })
    }

    /// Number of functions across all slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().map(|s| s.functions.len()).sum()
    }

    /// Check if no slot holds a function
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
