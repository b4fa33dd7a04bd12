//! Matrix resolution from gathered rules.

use crate::access::Access;
use crate::matrix::AccessControlMatrix;
use crate::rule::{AuthRule, Operation, Role};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A rule together with the field it is attached to, if any
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopedRule {
    /// The rule
    pub rule: AuthRule,
    /// Field the rule is attached to; `None` for type-level rules
    pub field: Option<String>,
}

impl ScopedRule {
    /// Type-level rule
    #[must_use]
    pub fn on_type(rule: AuthRule) -> Self {
        Self { rule, field: None }
    }

    /// Field-level rule
    #[must_use]
    pub fn on_field(rule: AuthRule, field: impl Into<String>) -> Self {
        Self {
            rule,
            field: Some(field.into()),
        }
    }
}

/// Resolve rules into a matrix for one type
///
/// Type-level rules contribute `Type(true)` to every field for their roles and
/// operations. Field-level rules contribute `Field(true)` to their field, and
/// any field carrying field-level rules contributes `Field(false)` to every
/// other role and operation so a type-level grant cannot reach it. Rules on
/// fields outside `fields` are ignored.
#[must_use]
pub fn resolve(type_name: &str, fields: &[String], rules: &[ScopedRule]) -> AccessControlMatrix {
    let mut roles: BTreeMap<String, Role> = BTreeMap::new();
    let mut cells: BTreeMap<(String, &str, Operation), Access> = BTreeMap::new();
    let field_scoped: BTreeSet<&str> = rules
        .iter()
        .filter_map(|r| r.field.as_deref())
        .filter(|f| fields.iter().any(|known| known.as_str() == *f))
        .collect();

    for scoped in rules {
        let targets: Vec<&str> = match &scoped.field {
            None => fields.iter().map(String::as_str).collect(),
            Some(field) => match fields.iter().find(|f| *f == field) {
                Some(f) => vec![f.as_str()],
                None => continue,
            },
        };
        let contribution = if scoped.field.is_some() {
            Access::Field(true)
        } else {
            Access::Type(true)
        };

        for role in scoped.rule.roles() {
            for &field in &targets {
                for &op in &scoped.rule.operations {
                    let cell = cells.entry((role.name.clone(), field, op)).or_default();
                    *cell = cell.join(contribution);
                }
            }
            roles.entry(role.name.clone()).or_insert(role);
        }
    }

    for &field in &field_scoped {
        for role in roles.keys() {
            for op in Operation::ALL {
                let cell = cells.entry((role.clone(), field, op)).or_default();
                *cell = cell.join(Access::Field(false));
            }
        }
    }

    let mut acm = AccessControlMatrix::new(type_name, fields.to_vec());
    acm.field_scoped = field_scoped.iter().map(|f| (*f).to_string()).collect();
    for role in roles.into_values() {
        acm.add_role(role);
    }
    let role_names: Vec<String> = acm.roles.keys().cloned().collect();
    for role in &role_names {
        for op in Operation::ALL {
            for field in fields {
                let allowed = cells
                    .get(&(role.clone(), field.as_str(), op))
                    .is_some_and(|a| a.is_allowed());
                if allowed {
                    acm.allow(role, op, field);
                }
            }
        }
    }
    debug!(
        type_name,
        roles = acm.roles.len(),
        field_scoped = acm.field_scoped.len(),
        "resolved access control matrix"
    );
    acm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{GroupSource, Strategy};
    use proptest::prelude::*;

    fn fields() -> Vec<String> {
        vec!["id".into(), "content".into(), "secret".into()]
    }

    fn owner() -> AuthRule {
        AuthRule::new(Strategy::Owner {
            owner_field: "owner".into(),
            identity_claim: "sub::username".into(),
        })
    }

    fn admins() -> AuthRule {
        AuthRule::new(Strategy::Groups {
            source: GroupSource::Static(vec!["Admin".into()]),
            group_claim: "cognito:groups".into(),
        })
    }

    #[test]
    fn test_no_rules_denies_everything() {
        let acm = resolve("Todo", &fields(), &[]);
        assert!(acm.denies_all());
        assert!(acm.roles.is_empty());
    }

    #[test]
    fn test_public_rule_grants_crud_on_all_fields() {
        let acm = resolve("Todo", &fields(), &[ScopedRule::on_type(AuthRule::new(Strategy::Public))]);
        for op in Operation::ALL {
            assert_eq!(acm.allowed_fields("apiKey:public", op).len(), 3);
        }
    }

    #[test]
    fn test_type_rules_are_additive() {
        let read = AuthRule::new(Strategy::Private).with_operations(&[Operation::Read]);
        let write = AuthRule::new(Strategy::Private).with_operations(&[Operation::Create]);
        let acm = resolve(
            "Todo",
            &fields(),
            &[ScopedRule::on_type(read), ScopedRule::on_type(write)],
        );
        assert!(acm.is_allowed("userPools:private", "content", Operation::Read));
        assert!(acm.is_allowed("userPools:private", "content", Operation::Create));
        assert!(!acm.is_allowed("userPools:private", "content", Operation::Delete));
    }

    #[test]
    fn test_field_rule_replaces_type_grant() {
        let rules = [
            ScopedRule::on_type(AuthRule::new(Strategy::Private)),
            ScopedRule::on_type(owner()),
            ScopedRule::on_field(owner().with_operations(&[Operation::Read]), "secret"),
        ];
        let acm = resolve("Todo", &fields(), &rules);

        let owner_role = "userPools:owner:owner:sub::username";
        assert!(acm.is_allowed(owner_role, "secret", Operation::Read));
        assert!(!acm.is_allowed(owner_role, "secret", Operation::Update));
        assert!(!acm.is_allowed("userPools:private", "secret", Operation::Read));
        assert!(acm.is_allowed("userPools:private", "content", Operation::Read));
        assert!(acm.is_field_scoped("secret"));
    }

    #[test]
    fn test_field_rule_can_add_role_only_on_that_field() {
        let rules = [
            ScopedRule::on_type(owner()),
            ScopedRule::on_field(admins().with_operations(&[Operation::Read]), "content"),
        ];
        let acm = resolve("Todo", &fields(), &rules);
        assert_eq!(
            acm.allowed_fields("userPools:staticGroup:Admin", Operation::Read),
            ["content"]
        );
        assert!(!acm.is_allowed("userPools:owner:owner:sub::username", "content", Operation::Read));
    }

    #[test]
    fn test_same_role_different_provider_union() {
        let a = AuthRule::new(Strategy::Public).with_operations(&[Operation::Read]);
        let b = AuthRule::new(Strategy::Public)
            .with_provider(spire_core::AuthProvider::Iam)
            .with_operations(&[Operation::Create]);
        let acm = resolve("Todo", &fields(), &[ScopedRule::on_type(a), ScopedRule::on_type(b)]);
        assert!(acm.is_allowed("apiKey:public", "id", Operation::Read));
        assert!(acm.is_allowed("iam:public", "id", Operation::Create));
        assert_eq!(acm.roles_for(Operation::Read).len(), 1);
    }

    fn rule_pool() -> Vec<ScopedRule> {
        vec![
            ScopedRule::on_type(AuthRule::new(Strategy::Public).with_operations(&[Operation::Read])),
            ScopedRule::on_type(owner()),
            ScopedRule::on_type(admins().with_operations(&[Operation::Delete])),
            ScopedRule::on_field(owner().with_operations(&[Operation::Read]), "secret"),
            ScopedRule::on_field(admins(), "content"),
            ScopedRule::on_field(AuthRule::new(Strategy::Private), "secret"),
        ]
    }

    proptest! {
        #[test]
        fn prop_resolution_ignores_rule_order(
            picks in prop::collection::vec(0usize..6, 0..10),
            shuffle_seed in any::<u64>(),
        ) {
            let pool = rule_pool();
            let rules: Vec<ScopedRule> = picks.iter().map(|&i| pool[i].clone()).collect();

            let mut permuted = rules.clone();
            let len = permuted.len();
            if len > 1 {
                let mut seed = shuffle_seed;
                for i in (1..len).rev() {
                    seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let j = (seed % (i as u64 + 1)) as usize;
                    permuted.swap(i, j);
                }
            }

            prop_assert_eq!(
                resolve("Todo", &fields(), &rules),
                resolve("Todo", &fields(), &permuted)
            );
        }
    }
}
