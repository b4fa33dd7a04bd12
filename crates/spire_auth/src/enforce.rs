//! Enforcement plans and their rendered `auth` slot logic.
//!
//! A plan lists, for one resolver, which roles may proceed and under which
//! condition. Rendering turns it into the request template of the pipeline
//! function placed in the `auth` slot.

use crate::matrix::AccessControlMatrix;
use crate::rule::{Operation, Role, RoleKind};
use serde::{Deserialize, Serialize};
use spire_core::AuthProvider;
use std::fmt::Write;

/// What the guarded resolver does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanKind {
    /// get/list/search/index queries
    Query,
    /// Create mutation
    Create,
    /// Update mutation
    Update,
    /// Delete mutation
    Delete,
    /// Subscription
    Subscription,
    /// Resolver of a single field
    Field,
}

impl PlanKind {
    /// Matrix operation the kind is checked against
    #[must_use]
    pub fn operation(self) -> Operation {
        match self {
            Self::Query | Self::Subscription | Self::Field => Operation::Read,
            Self::Create => Operation::Create,
            Self::Update => Operation::Update,
            Self::Delete => Operation::Delete,
        }
    }

    fn reads_input(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

/// Condition under which a role passes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Condition {
    /// Provider authentication alone is enough
    Allow,
    /// Caller identity equals the record's owner field
    Owner {
        /// Owner field
        field: String,
        /// Identity claim
        claim: String,
    },
    /// Caller belongs to a fixed group
    StaticGroup {
        /// Group name
        group: String,
        /// Group claim
        claim: String,
    },
    /// Caller belongs to a group named on the record
    DynamicGroup {
        /// Field carrying group names
        field: String,
        /// Group claim
        claim: String,
    },
}

impl Condition {
    fn of(role: &Role) -> Self {
        match &role.kind {
            RoleKind::Public | RoleKind::Private | RoleKind::Custom => Self::Allow,
            RoleKind::Owner { field, claim } => Self::Owner {
                field: field.clone(),
                claim: claim.clone(),
            },
            RoleKind::StaticGroup { group, claim } => Self::StaticGroup {
                group: group.clone(),
                claim: claim.clone(),
            },
            RoleKind::DynamicGroup { field, claim } => Self::DynamicGroup {
                field: field.clone(),
                claim: claim.clone(),
            },
        }
    }
}

/// One role admitted by a plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    /// Role name
    pub role: String,
    /// Provider the caller must have used
    pub provider: AuthProvider,
    /// Additional condition
    pub condition: Condition,
    /// Fields the role may touch; `None` when unrestricted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

/// Authorization plan for one resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPlan {
    /// Type whose matrix the plan was derived from
    pub type_name: String,
    /// Resolver kind
    pub kind: PlanKind,
    /// Admitted roles, in role-name order
    pub grants: Vec<Grant>,
    /// Populate the owner field on create even when a group already admits the caller
    pub populate_owner: bool,
}

impl AuthPlan {
    /// Plan for a model-level resolver
    ///
    /// Query, create and update admit roles granted the operation on at least
    /// one field; create and update additionally restrict the input to the
    /// granted fields. Delete admits only roles granted delete on every field.
    #[must_use]
    pub fn for_model(acm: &AccessControlMatrix, kind: PlanKind) -> Self {
        let operation = kind.operation();
        let roles = match kind {
            PlanKind::Delete => acm.roles_for_all_fields(operation),
            _ => acm.roles_for(operation),
        };
        let grants = roles
            .into_iter()
            .map(|role| {
                let allowed = acm.allowed_fields(&role.name, operation);
                let fields = (kind.reads_input() && allowed.len() < acm.fields.len())
                    .then(|| allowed.to_vec());
                Grant {
                    role: role.name.clone(),
                    provider: role.provider,
                    condition: Condition::of(role),
                    fields,
                }
            })
            .collect();
        Self {
            type_name: acm.type_name.clone(),
            kind,
            grants,
            populate_owner: true,
        }
    }

    /// Plan for reading one field
    #[must_use]
    pub fn for_field(acm: &AccessControlMatrix, field: &str) -> Self {
        let grants = acm
            .roles_for_field(field, Operation::Read)
            .into_iter()
            .map(|role| Grant {
                role: role.name.clone(),
                provider: role.provider,
                condition: Condition::of(role),
                fields: None,
            })
            .collect();
        Self {
            type_name: acm.type_name.clone(),
            kind: PlanKind::Field,
            grants,
            populate_owner: false,
        }
    }

    /// Set owner population on create
    #[must_use]
    pub fn with_populate_owner(mut self, on: bool) -> Self {
        self.populate_owner = on;
        self
    }

    /// Whether no role can pass
    #[must_use]
    pub fn is_deny_all(&self) -> bool {
        self.grants.is_empty()
    }

    /// Providers the plan admits, in provider order
    #[must_use]
    pub fn providers(&self) -> Vec<AuthProvider> {
        let mut providers: Vec<AuthProvider> = self.grants.iter().map(|g| g.provider).collect();
        providers.sort();
        providers.dedup();
        providers
    }

    /// Request template for the `auth` slot function
    #[must_use]
    pub fn render_request(&self) -> String {
        let mut out = String::new();
        out.push_str("## [Start] Authorization Steps. **\n");
        out.push_str("$util.qr($ctx.stash.put(\"hasAuth\", true))\n");

        if self.is_deny_all() {
            out.push_str("$util.unauthorized()\n");
            out.push_str("## [End] Authorization Steps. **\n");
            return out;
        }

        out.push_str("#set( $isAuthorized = false )\n");
        out.push_str("#set( $authFilter = [] )\n");

        for provider in self.providers() {
            let _ = writeln!(out, "#if( $util.authType() == \"{}\" )", provider.runtime_auth_type());
            // Unconditional and static-group grants render first
            let mut grants: Vec<&Grant> = self.grants.iter().filter(|g| g.provider == provider).collect();
            grants.sort_by_key(|g| matches!(g.condition, Condition::Owner { .. } | Condition::DynamicGroup { .. }));
            for grant in grants {
                self.render_grant(&mut out, grant);
            }
            out.push_str("#end\n");
        }

        if self.kind == PlanKind::Query || self.kind == PlanKind::Subscription {
            out.push_str("#if( !$isAuthorized && !$authFilter.isEmpty() )\n");
            out.push_str("  $util.qr($ctx.stash.put(\"authFilter\", { \"or\": $authFilter }))\n");
            out.push_str("  #set( $isAuthorized = true )\n");
            out.push_str("#end\n");
        } else if !matches!(self.kind, PlanKind::Create) {
            out.push_str("#if( !$isAuthorized && !$authFilter.isEmpty() )\n");
            out.push_str("  $util.qr($ctx.stash.put(\"authCondition\", { \"or\": $authFilter }))\n");
            out.push_str("  #set( $isAuthorized = true )\n");
            out.push_str("#end\n");
        }

        out.push_str("#if( !$isAuthorized )\n  $util.unauthorized()\n#end\n");
        out.push_str("$util.toJson({\"version\":\"2018-05-29\",\"payload\":{}})\n");
        out.push_str("## [End] Authorization Steps. **\n");
        out
    }

    fn render_grant(&self, out: &mut String, grant: &Grant) {
        let _ = writeln!(out, "  ## role {}", grant.role);
        let admit = match &grant.fields {
            Some(fields) => {
                let list = fields.iter().map(|f| format!("\"{f}\"")).collect::<Vec<_>>().join(", ");
                format!(
                    "#if( $util.map.copyAndRemoveAllKeys($ctx.args.input, [{list}]).isEmpty() )\n      #set( $isAuthorized = true )\n    #end"
                )
            }
            None => "#set( $isAuthorized = true )".to_string(),
        };

        match &grant.condition {
            Condition::Allow => {
                let _ = writeln!(out, "  #if( !$isAuthorized )\n    {admit}\n  #end");
            }
            Condition::StaticGroup { group, claim } => {
                let _ = writeln!(
                    out,
                    "  #set( $callerGroups = $util.defaultIfNull($ctx.identity.claims.get(\"{claim}\"), []) )\n  #if( !$isAuthorized && $callerGroups.contains(\"{group}\") )\n    {admit}\n  #end"
                );
            }
            Condition::Owner { field, claim } => {
                out.push_str(&identity_lines("ownerValue", claim));
                match self.kind {
                    PlanKind::Create => {
                        let guard = if self.populate_owner { "" } else { "!$isAuthorized && " };
                        let _ = writeln!(
                            out,
                            "  #if( {guard}$util.isNull($ctx.args.input.{field}) )\n    $util.qr($ctx.args.input.put(\"{field}\", $ownerValue))\n  #end\n  #if( $ctx.args.input.{field} == $ownerValue )\n    {admit}\n  #end"
                        );
                    }
                    PlanKind::Field => {
                        let _ = writeln!(
                            out,
                            "  #if( !$isAuthorized && $ctx.source.{field} == $ownerValue )\n    #set( $isAuthorized = true )\n  #end"
                        );
                    }
                    _ => {
                        let _ = writeln!(
                            out,
                            "  $util.qr($authFilter.add({{ \"{field}\": {{ \"eq\": $ownerValue }} }}))"
                        );
                    }
                }
            }
            Condition::DynamicGroup { field, claim } => {
                let _ = writeln!(
                    out,
                    "  #set( $callerGroups = $util.defaultIfNull($ctx.identity.claims.get(\"{claim}\"), []) )"
                );
                match self.kind {
                    PlanKind::Create => {
                        let _ = writeln!(
                            out,
                            "  #foreach( $group in $util.defaultIfNull($ctx.args.input.{field}, []) )\n    #if( $callerGroups.contains($group) )\n      {admit}\n    #end\n  #end"
                        );
                    }
                    PlanKind::Field => {
                        let _ = writeln!(
                            out,
                            "  #foreach( $group in $util.defaultIfNull($ctx.source.{field}, []) )\n    #if( $callerGroups.contains($group) )\n      #set( $isAuthorized = true )\n    #end\n  #end"
                        );
                    }
                    _ => {
                        let _ = writeln!(
                            out,
                            "  #foreach( $group in $callerGroups )\n    $util.qr($authFilter.add({{ \"{field}\": {{ \"contains\": $group }} }}))\n  #end"
                        );
                    }
                }
            }
        }
    }

    /// Response template for the `auth` slot function
    #[must_use]
    pub fn render_response(&self) -> String {
        "$util.toJson({})\n".to_string()
    }
}

/// Template lines setting `$<var>` to the caller's identity for a claim
///
/// Compound claims such as `sub::username` join each part with `::`.
#[must_use]
pub fn identity_lines(var: &str, claim: &str) -> String {
    let mut out = String::new();
    for (i, part) in claim.split("::").enumerate() {
        let target = if i == 0 { var } else { "claimPart" };
        let _ = writeln!(
            out,
            "  #set( ${target} = $util.defaultIfNull($ctx.identity.claims.get(\"{part}\"), \"___xamznone____\") )"
        );
        if i > 0 {
            let _ = writeln!(out, "  #set( ${var} = \"${var}::$claimPart\" )");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{resolve, ScopedRule};
    use crate::rule::{AuthRule, GroupSource, Strategy};

    fn fields() -> Vec<String> {
        vec!["id".into(), "content".into(), "owner".into()]
    }

    fn owner_rule() -> AuthRule {
        AuthRule::new(Strategy::Owner {
            owner_field: "owner".into(),
            identity_claim: "sub::username".into(),
        })
    }

    #[test]
    fn test_public_plan() {
        let acm = resolve("Todo", &fields(), &[ScopedRule::on_type(AuthRule::new(Strategy::Public))]);
        let plan = AuthPlan::for_model(&acm, PlanKind::Query);
        assert_eq!(plan.grants.len(), 1);
        assert_eq!(plan.grants[0].condition, Condition::Allow);
        let vtl = plan.render_request();
        assert!(vtl.contains("API Key Authorization"));
        assert!(vtl.contains("$util.unauthorized()"));
    }

    #[test]
    fn test_deny_all_plan() {
        let acm = resolve("Todo", &fields(), &[]);
        let plan = AuthPlan::for_model(&acm, PlanKind::Create);
        assert!(plan.is_deny_all());
        assert!(plan.render_request().contains("$util.unauthorized()"));
        assert!(!plan.render_request().contains("$isAuthorized"));
    }

    #[test]
    fn test_owner_create_populates_owner() {
        let acm = resolve("Todo", &fields(), &[ScopedRule::on_type(owner_rule())]);
        let vtl = AuthPlan::for_model(&acm, PlanKind::Create).render_request();
        assert!(vtl.contains("$ctx.args.input.put(\"owner\", $ownerValue)"));
        assert!(vtl.contains("User Pool Authorization"));
    }

    #[test]
    fn test_owner_query_builds_filter() {
        let acm = resolve("Todo", &fields(), &[ScopedRule::on_type(owner_rule())]);
        let vtl = AuthPlan::for_model(&acm, PlanKind::Query).render_request();
        assert!(vtl.contains("$authFilter.add"));
        assert!(vtl.contains("authFilter\", { \"or\""));
    }

    #[test]
    fn test_delete_requires_all_fields() {
        let rules = [
            ScopedRule::on_type(AuthRule::new(Strategy::Private)),
            ScopedRule::on_field(owner_rule().with_operations(&[Operation::Read]), "content"),
        ];
        let acm = resolve("Todo", &fields(), &rules);
        assert!(AuthPlan::for_model(&acm, PlanKind::Delete).is_deny_all());
        let update = AuthPlan::for_model(&acm, PlanKind::Update);
        assert_eq!(
            update.grants[0].fields,
            Some(vec!["id".to_string(), "owner".to_string()])
        );
    }

    #[test]
    fn test_field_plan_and_group_conditions() {
        let rules = [ScopedRule::on_field(
            AuthRule::new(Strategy::Groups {
                source: GroupSource::Static(vec!["Admin".into()]),
                group_claim: "cognito:groups".into(),
            }),
            "content",
        )];
        let acm = resolve("Todo", &fields(), &rules);
        let plan = AuthPlan::for_field(&acm, "content");
        assert_eq!(plan.providers(), vec![AuthProvider::UserPools]);
        assert!(plan.render_request().contains("$callerGroups.contains(\"Admin\")"));
        assert!(AuthPlan::for_field(&acm, "id").is_deny_all());
    }

    #[test]
    fn test_identity_lines() {
        let lines = identity_lines("ownerValue", "sub::username");
        assert_eq!(lines.matches("$ctx.identity.claims.get").count(), 2);
        assert!(lines.contains("#set( $ownerValue = \"$ownerValue::$claimPart\" )"));

        let single = identity_lines("ownerValue", "username");
        assert_eq!(single.lines().count(), 1);
    }
}
