//! Slots and the functions placed in them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed stage of a resolver pipeline
///
/// Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Slot {
    /// Argument preparation and defaults
    Init,
    /// Work before authorization
    PreAuth,
    /// Authorization
    Auth,
    /// Work after authorization, before any data access
    PostAuth,
    /// Data source invocation
    PreDataLoad,
    /// Shaping the data source result
    PostDataLoad,
    /// Final response handling
    Finish,
}

impl Slot {
    /// Every slot in execution order
    pub const ALL: [Slot; 7] = [
        Self::Init,
        Self::PreAuth,
        Self::Auth,
        Self::PostAuth,
        Self::PreDataLoad,
        Self::PostDataLoad,
        Self::Finish,
    ];

    /// Slot name as used in artifact paths
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::PreAuth => "preAuth",
            Self::Auth => "auth",
            Self::PostAuth => "postAuth",
            Self::PreDataLoad => "preDataLoad",
            Self::PostDataLoad => "postDataLoad",
            Self::Finish => "finish",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A request/response logic pair contributed by one transformer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    /// Name, unique within its pipeline
    pub name: String,
    /// Contributing transformer
    pub plugin: String,
    /// Request template
    pub request: String,
    /// Response template
    pub response: String,
    /// Data source invoked by the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
}

impl Function {
    /// Function that does not invoke a data source
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        plugin: impl Into<String>,
        request: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            plugin: plugin.into(),
            request: request.into(),
            response: response.into(),
            data_source: None,
        }
    }

    /// Invoke a data source
    #[must_use]
    pub fn with_data_source(mut self, data_source: impl Into<String>) -> Self {
        self.data_source = Some(data_source.into());
        self
    }

    /// Check if the function invokes a data source
    #[must_use]
    pub fn invokes_data_source(&self) -> bool {
        self.data_source.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_order_is_declaration_order() {
        let mut sorted = Slot::ALL;
        sorted.sort();
        assert_eq!(sorted, Slot::ALL);
        assert!(Slot::Auth < Slot::PreDataLoad);
        assert_eq!(Slot::PostDataLoad.to_string(), "postDataLoad");
    }

    #[test]
    fn test_function_data_source() {
        let f = Function::new("GetItem", "model", "{}", "{}");
        assert!(!f.invokes_data_source());
        assert!(f.with_data_source("TodoDataSource").invokes_data_source());
    }
}
