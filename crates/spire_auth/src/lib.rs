//! SPIRE Authorization
//!
//! Parses `@auth` rules, resolves them into a per-type access control
//! matrix, and derives the enforcement plans rendered into resolver `auth`
//! slots. Rule combination is expressed through the [`Access`] lattice so the
//! result is independent of the order rules are gathered in.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod access;
pub mod enforce;
pub mod matrix;
pub mod resolve;
pub mod rule;

pub use access::Access;
pub use enforce::{AuthPlan, Condition, Grant, PlanKind};
pub use matrix::AccessControlMatrix;
pub use resolve::{ScopedRule, resolve};
pub use rule::{
    AuthRule, GroupSource, Operation, Role, RoleKind, Strategy, parse_auth_directive,
    DEFAULT_GROUP_CLAIM, DEFAULT_OWNER_FIELD,
};
