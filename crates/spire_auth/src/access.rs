//! Access lattice combining rule contributions.
//!
//! Each rule contributes, for every (role, field, operation) cell it touches,
//! an [`Access`] value. Cells are combined with [`Access::join`]: the more
//! specific level wins, and contributions at the same level are OR-ed. The
//! join is associative, commutative and idempotent, so the final matrix does
//! not depend on the order rules are visited in.

use serde::{Deserialize, Serialize};

/// Access decision for one (role, field, operation) cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Access {
    /// No rule mentions the cell
    #[default]
    Unset,
    /// Decided by a type-level rule
    Type(bool),
    /// Decided by a field-level rule
    Field(bool),
}

impl Access {
    fn level(self) -> u8 {
        match self {
            Self::Unset => 0,
            Self::Type(_) => 1,
            Self::Field(_) => 2,
        }
    }

    /// Combine two contributions
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (Self::Type(a), Self::Type(b)) => Self::Type(a || b),
            (Self::Field(a), Self::Field(b)) => Self::Field(a || b),
            (a, b) if a.level() >= b.level() => a,
            (_, b) => b,
        }
    }

    /// Whether the cell grants access; unset cells deny
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Type(true) | Self::Field(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: [Access; 5] = [
        Access::Unset,
        Access::Type(false),
        Access::Type(true),
        Access::Field(false),
        Access::Field(true),
    ];

    #[test]
    fn test_default_denies() {
        assert!(!Access::default().is_allowed());
    }

    #[test]
    fn test_field_level_overrides_type_level() {
        assert_eq!(Access::Type(true).join(Access::Field(false)), Access::Field(false));
        assert_eq!(Access::Field(false).join(Access::Type(true)), Access::Field(false));
    }

    #[test]
    fn test_same_level_is_additive() {
        assert_eq!(Access::Type(false).join(Access::Type(true)), Access::Type(true));
        assert_eq!(Access::Field(true).join(Access::Field(false)), Access::Field(true));
    }

    #[test]
    fn test_unset_is_identity() {
        for a in ALL {
            assert_eq!(Access::Unset.join(a), a);
            assert_eq!(a.join(Access::Unset), a);
        }
    }

    fn access() -> impl Strategy<Value = Access> {
        prop::sample::select(ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_join_is_commutative(a in access(), b in access()) {
            prop_assert_eq!(a.join(b), b.join(a));
        }

        #[test]
        fn prop_join_is_associative(a in access(), b in access(), c in access()) {
            prop_assert_eq!(a.join(b).join(c), a.join(b.join(c)));
        }

        #[test]
        fn prop_join_is_idempotent(a in access()) {
            prop_assert_eq!(a.join(a), a);
        }
    }
}
