//! Non-fatal findings returned alongside a successful compile.

use crate::error::Location;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    /// Informational note
    Info,
    /// Something the author should probably change
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single non-fatal finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Stable code, e.g. `deprecated-argument`
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Where the finding applies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}[{}] {}: {}", self.severity, self.code, loc, self.message),
            None => write!(f, "{}[{}] {}", self.severity, self.code, self.message),
        }
    }
}

/// Ordered collection of diagnostics for one compile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning
    pub fn warn(&mut self, code: &str, message: impl Into<String>, location: Option<Location>) {
        self.push(Severity::Warning, code, message.into(), location);
    }

    /// Record an informational note
    pub fn info(&mut self, code: &str, message: impl Into<String>, location: Option<Location>) {
        self.push(Severity::Info, code, message.into(), location);
    }

    fn push(&mut self, severity: Severity, code: &str, message: String, location: Option<Location>) {
        let diagnostic = Diagnostic {
            severity,
            code: code.to_string(),
            message,
            location,
        };
        // The same finding can be reached from both sides of a relation
        if !self.items.contains(&diagnostic) {
            self.items.push(diagnostic);
        }
    }

    /// Append every diagnostic from another collection
    pub fn extend(&mut self, other: Diagnostics) {
        for d in other.items {
            self.push(d.severity, &d.code, d.message, d.location);
        }
    }

    /// Iterate in recording order
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Number of warnings
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    /// Check if a diagnostic with the given code was recorded
    #[must_use]
    pub fn contains_code(&self, code: &str) -> bool {
        self.items.iter().any(|d| d.code == code)
    }

    /// Total count
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Consume into a vector
    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
