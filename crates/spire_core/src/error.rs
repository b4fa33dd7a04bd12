//! Compile error taxonomy.
//!
//! Every variant except [`CompileError::InternalInvariantViolation`] describes a
//! problem with the input schema or configuration. The internal variant means
//! an assumption the compiler relies on was false and is reported distinctly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compile result type
pub type CompileResult<T> = Result<T, CompileError>;

/// A type, optionally narrowed to one of its fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Type name
    pub type_name: String,
    /// Field name, when the problem is attached to a field
    pub field: Option<String>,
}

impl Location {
    /// Location of a type
    #[must_use]
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field: None,
        }
    }

    /// Location of a field on a type
    #[must_use]
    pub fn of_field(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field: Some(field.into()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}", self.type_name, field),
            None => write!(f, "{}", self.type_name),
        }
    }
}

/// Fatal compile error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Malformed schema text
    #[error("parse error in fragment {fragment} at {line}:{column}: {message}")]
    Parse {
        /// Index of the input fragment
        fragment: usize,
        /// 1-based line
        line: u32,
        /// 1-based column
        column: u32,
        /// What went wrong
        message: String,
    },

    /// A directive with no registered transformer
    #[error("unknown directive @{directive} on {location}")]
    UnknownDirective {
        /// Directive name without `@`
        directive: String,
        /// Where it was attached
        location: Location,
    },

    /// A known directive used with invalid arguments or in an invalid place
    #[error("invalid @{directive} on {location}: {reason}")]
    InvalidDirective {
        /// Directive name without `@`
        directive: String,
        /// Where it was attached
        location: Location,
        /// What went wrong
        reason: String,
    },

    /// An authorization rule that cannot be enforced
    #[error("invalid auth rule on {location}: {reason}")]
    InvalidAuthRule {
        /// Where the rule was attached
        location: Location,
        /// What went wrong
        reason: String,
    },

    /// Paired relationship directives that disagree
    #[error("conflicting relationship on {location}: {reason}")]
    RelationalEdgeConflict {
        /// The relationship field
        location: Location,
        /// What went wrong
        reason: String,
    },

    /// Two contributions claimed the same position in a resolver slot
    #[error("resolver slot conflict in {pipeline} at {slot}[{position}]: {existing} vs {incoming}")]
    ResolverSlotConflict {
        /// Pipeline name (`Type.field`)
        pipeline: String,
        /// Slot name
        slot: String,
        /// Claimed position
        position: u32,
        /// Function already at the position
        existing: String,
        /// Function that tried to claim it
        incoming: String,
    },

    /// Base semantic error in the schema document
    #[error("schema validation failed for {location}: {reason}")]
    SchemaValidation {
        /// Offending type or field
        location: Location,
        /// What went wrong
        reason: String,
    },

    /// Resource groups that cannot be ordered
    #[error("circular resource reference between groups: {}", groups.join(" <-> "))]
    CircularResourceReference {
        /// Groups forming the cycle, sorted
        groups: Vec<String>,
    },

    /// Compiler defect
    #[error("internal invariant violated: {message}")]
    InternalInvariantViolation {
        /// Violated assumption
        message: String,
    },
}

impl CompileError {
    /// Create an invalid directive error
    #[must_use]
    pub fn invalid_directive(
        directive: impl Into<String>,
        location: Location,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidDirective {
            directive: directive.into(),
            location,
            reason: reason.into(),
        }
    }

    /// Create an invalid auth rule error
    #[must_use]
    pub fn invalid_auth_rule(location: Location, reason: impl Into<String>) -> Self {
        Self::InvalidAuthRule {
            location,
            reason: reason.into(),
        }
    }

    /// Create a relational edge conflict
    #[must_use]
    pub fn edge_conflict(location: Location, reason: impl Into<String>) -> Self {
        Self::RelationalEdgeConflict {
            location,
            reason: reason.into(),
        }
    }

    /// Create a schema validation error
    #[must_use]
    pub fn schema(location: Location, reason: impl Into<String>) -> Self {
        Self::SchemaValidation {
            location,
            reason: reason.into(),
        }
    }

    /// Create an internal invariant violation
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalInvariantViolation {
            message: message.into(),
        }
    }

    /// Whether this error indicates a compiler defect rather than a bad schema
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::InternalInvariantViolation { .. })
    }

    /// Stable machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "ParseError",
            Self::UnknownDirective { .. } => "UnknownDirectiveError",
            Self::InvalidDirective { .. } => "InvalidDirectiveError",
            Self::InvalidAuthRule { .. } => "InvalidAuthRuleError",
            Self::RelationalEdgeConflict { .. } => "RelationalEdgeConflictError",
            Self::ResolverSlotConflict { .. } => "ResolverSlotConflictError",
            Self::SchemaValidation { .. } => "SchemaValidationError",
            Self::CircularResourceReference { .. } => "CircularResourceReferenceError",
            Self::InternalInvariantViolation { .. } => "InternalInvariantViolation",
        }
    }
}
