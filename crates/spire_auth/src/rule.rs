//! Authorization rules and the roles they grant.
//!
//! An `@auth(rules: [...])` directive is parsed into [`AuthRule`] values. Each
//! rule expands into one or more [`Role`]s, the row keys of the access control
//! matrix.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use spire_core::{AuthProvider, CompileError, CompileResult, Diagnostics, Location, TransformConfig};
use spire_schema::{Directive, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Default owner field
pub const DEFAULT_OWNER_FIELD: &str = "owner";

/// Default group claim
pub const DEFAULT_GROUP_CLAIM: &str = "cognito:groups";

/// Identity claim when `useSubUsernameForDefaultIdentityClaim` is on
pub const SUB_USERNAME_CLAIM: &str = "sub::username";

/// Identity claim when `useSubUsernameForDefaultIdentityClaim` is off
pub const USERNAME_CLAIM: &str = "username";

/// Data operation a rule grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    /// Create records
    Create,
    /// Read records (queries, subscriptions, search)
    Read,
    /// Update records
    Update,
    /// Delete records
    Delete,
}

impl Operation {
    /// Every operation
    pub const ALL: [Operation; 4] = [Self::Create, Self::Read, Self::Update, Self::Delete];

    /// Parse an operation name, accepting the read aliases
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(Self::Create),
            "read" | "get" | "list" | "listen" | "search" | "sync" => Some(Self::Read),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Canonical name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a group rule reads its group names from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupSource {
    /// Fixed group names
    Static(Vec<String>),
    /// Group names stored on the record in this field
    Dynamic(String),
}

/// Who a rule applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "allow")]
pub enum Strategy {
    /// Anyone holding the provider's credential
    Public,
    /// Any signed-in identity
    Private,
    /// The identity stored in the owner field
    Owner {
        /// Field holding the owner identity
        owner_field: String,
        /// Token claim compared against the owner field
        identity_claim: String,
    },
    /// Members of groups
    Groups {
        /// Group names or the field carrying them
        source: GroupSource,
        /// Token claim carrying the caller's groups
        group_claim: String,
    },
    /// Custom authorizer function
    Custom,
}

impl Strategy {
    /// Schema spelling of the strategy
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Owner { .. } => "owner",
            Self::Groups { .. } => "groups",
            Self::Custom => "custom",
        }
    }

    /// Providers this strategy can be enforced with; the first is the default
    #[must_use]
    pub fn providers(&self) -> &'static [AuthProvider] {
        match self {
            Self::Public => &[AuthProvider::ApiKey, AuthProvider::Iam],
            Self::Private => &[AuthProvider::UserPools, AuthProvider::Oidc, AuthProvider::Iam],
            Self::Owner { .. } | Self::Groups { .. } => &[AuthProvider::UserPools, AuthProvider::Oidc],
            Self::Custom => &[AuthProvider::Function],
        }
    }
}

/// A single parsed authorization rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRule {
    /// Who the rule applies to
    pub strategy: Strategy,
    /// Identity provider enforcing the rule
    pub provider: AuthProvider,
    /// Granted operations
    pub operations: BTreeSet<Operation>,
}

impl AuthRule {
    /// Rule granting every operation with the strategy's default provider
    #[must_use]
    pub fn new(strategy: Strategy) -> Self {
        let provider = strategy.providers()[0];
        Self {
            strategy,
            provider,
            operations: Operation::ALL.into_iter().collect(),
        }
    }

    /// Replace the provider
    #[must_use]
    pub fn with_provider(mut self, provider: AuthProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Replace the granted operations
    #[must_use]
    pub fn with_operations(mut self, operations: &[Operation]) -> Self {
        self.operations = operations.iter().copied().collect();
        self
    }

    /// Check if the rule grants an operation
    #[must_use]
    pub fn grants(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    /// Roles this rule grants to; static group rules yield one role per group
    #[must_use]
    pub fn roles(&self) -> Vec<Role> {
        let provider = self.provider;
        match &self.strategy {
            Strategy::Public => vec![Role::new(provider, RoleKind::Public)],
            Strategy::Private => vec![Role::new(provider, RoleKind::Private)],
            Strategy::Custom => vec![Role::new(provider, RoleKind::Custom)],
            Strategy::Owner {
                owner_field,
                identity_claim,
            } => vec![Role::new(
                provider,
                RoleKind::Owner {
                    field: owner_field.clone(),
                    claim: identity_claim.clone(),
                },
            )],
            Strategy::Groups {
                source: GroupSource::Static(groups),
                group_claim,
            } => groups
                .iter()
                .map(|g| {
                    Role::new(
                        provider,
                        RoleKind::StaticGroup {
                            group: g.clone(),
                            claim: group_claim.clone(),
                        },
                    )
                })
                .collect(),
            Strategy::Groups {
                source: GroupSource::Dynamic(field),
                group_claim,
            } => vec![Role::new(
                provider,
                RoleKind::DynamicGroup {
                    field: field.clone(),
                    claim: group_claim.clone(),
                },
            )],
        }
    }
}

/// Shape of a role
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RoleKind {
    /// Unconditional for the provider
    Public,
    /// Any authenticated identity of the provider
    Private,
    /// Record owner
    Owner {
        /// Owner field
        field: String,
        /// Identity claim
        claim: String,
    },
    /// Member of a fixed group
    StaticGroup {
        /// Group name
        group: String,
        /// Group claim
        claim: String,
    },
    /// Member of a group named on the record
    DynamicGroup {
        /// Field carrying group names
        field: String,
        /// Group claim
        claim: String,
    },
    /// Custom authorizer
    Custom,
}

/// A row key of the access control matrix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Role {
    /// Stable role name, e.g. `userPools:owner:owner:sub::username`
    pub name: String,
    /// Provider enforcing the role
    pub provider: AuthProvider,
    /// Role shape
    pub kind: RoleKind,
}

impl Role {
    /// Create a role, deriving its name
    #[must_use]
    pub fn new(provider: AuthProvider, kind: RoleKind) -> Self {
        let name = match &kind {
            RoleKind::Public => format!("{provider}:public"),
            RoleKind::Private => format!("{provider}:private"),
            RoleKind::Custom => format!("{provider}:custom"),
            RoleKind::Owner { field, claim } => format!("{provider}:owner:{field}:{claim}"),
            RoleKind::StaticGroup { group, .. } => format!("{provider}:staticGroup:{group}"),
            RoleKind::DynamicGroup { field, .. } => format!("{provider}:dynamicGroup:{field}"),
        };
        Self {
            name,
            provider,
            kind,
        }
    }

    /// Check if the role depends on data stored on the record
    #[must_use]
    pub fn is_record_scoped(&self) -> bool {
        matches!(self.kind, RoleKind::Owner { .. } | RoleKind::DynamicGroup { .. })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

const RULE_KEYS: &[&str] = &[
    "allow",
    "provider",
    "operations",
    "ownerField",
    "identityClaim",
    "groupClaim",
    "groups",
    "groupsField",
    "queries",
    "mutations",
];

/// Parse the rules of an `@auth` directive
///
/// # Errors
///
/// Returns `InvalidAuthRule` for malformed rules, unknown operations, and
/// strategy/provider combinations that cannot be enforced
pub fn parse_auth_directive(
    directive: &Directive,
    location: &Location,
    config: &TransformConfig,
    diagnostics: &mut Diagnostics,
) -> CompileResult<Vec<AuthRule>> {
    let invalid = |reason: String| CompileError::invalid_auth_rule(location.clone(), reason);

    let Some(rules) = directive.argument("rules") else {
        return Err(invalid("@auth requires a 'rules' argument".to_string()));
    };
    if directive.arguments.len() > 1 {
        return Err(invalid("@auth only accepts a 'rules' argument".to_string()));
    }

    let mut parsed = Vec::new();
    for (index, rule) in rules.as_list().into_iter().enumerate() {
        let Some(fields) = rule.as_object() else {
            return Err(invalid(format!("rule {index} is not an object")));
        };
        if let Some(key) = fields.keys().find(|k| !RULE_KEYS.contains(&k.as_str())) {
            return Err(invalid(format!("rule {index} has unknown argument '{key}'")));
        }
        parsed.push(parse_rule(fields, index, location, config, diagnostics)?);
    }
    Ok(parsed)
}

fn parse_rule(
    fields: &indexmap::IndexMap<String, Value>,
    index: usize,
    location: &Location,
    config: &TransformConfig,
    diagnostics: &mut Diagnostics,
) -> CompileResult<AuthRule> {
    let invalid = |reason: String| CompileError::invalid_auth_rule(location.clone(), reason);
    let string_arg = |key: &str| -> CompileResult<Option<String>> {
        match fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| invalid(format!("rule {index}: '{key}' must be a string"))),
        }
    };

    let allow = string_arg("allow")?.ok_or_else(|| invalid(format!("rule {index} is missing 'allow'")))?;
    let owner_field = string_arg("ownerField")?;
    let identity_claim = string_arg("identityClaim")?;
    let group_claim = string_arg("groupClaim")?;
    let groups_field = string_arg("groupsField")?;
    let groups = match fields.get("groups") {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            v.as_string_list()
                .ok_or_else(|| invalid(format!("rule {index}: 'groups' must be a list of strings")))?,
        ),
    };

    if allow != "owner" && (owner_field.is_some() || identity_claim.is_some()) {
        return Err(invalid(format!(
            "rule {index}: ownerField and identityClaim only apply to owner rules"
        )));
    }
    if allow != "groups" && (groups.is_some() || groups_field.is_some() || group_claim.is_some()) {
        return Err(invalid(format!(
            "rule {index}: groups, groupsField and groupClaim only apply to groups rules"
        )));
    }

    let strategy = match allow.as_str() {
        "public" => Strategy::Public,
        "private" => Strategy::Private,
        "custom" => Strategy::Custom,
        "owner" => {
            let default_claim = if config.feature_flags.use_sub_username_for_default_identity_claim {
                SUB_USERNAME_CLAIM
            } else {
                USERNAME_CLAIM
            };
            Strategy::Owner {
                owner_field: owner_field.unwrap_or_else(|| DEFAULT_OWNER_FIELD.to_string()),
                identity_claim: identity_claim.unwrap_or_else(|| default_claim.to_string()),
            }
        }
        "groups" => {
            let source = match (groups, groups_field) {
                (Some(_), Some(_)) => {
                    return Err(invalid(format!(
                        "rule {index}: groups and groupsField are mutually exclusive"
                    )));
                }
                (Some(groups), None) if groups.is_empty() => {
                    return Err(invalid(format!("rule {index}: groups must not be empty")));
                }
                (Some(groups), None) => GroupSource::Static(groups),
                (None, Some(field)) => GroupSource::Dynamic(field),
                (None, None) => {
                    return Err(invalid(format!(
                        "rule {index}: groups rules need either groups or groupsField"
                    )));
                }
            };
            Strategy::Groups {
                source,
                group_claim: group_claim.unwrap_or_else(|| DEFAULT_GROUP_CLAIM.to_string()),
            }
        }
        other => return Err(invalid(format!("rule {index}: unknown strategy '{other}'"))),
    };

    let provider = match string_arg("provider")? {
        None => strategy.providers()[0],
        Some(name) => AuthProvider::from_name(&name)
            .ok_or_else(|| invalid(format!("rule {index}: unknown provider '{name}'")))?,
    };
    if !strategy.providers().contains(&provider) {
        return Err(invalid(format!(
            "rule {index}: '{}' cannot be enforced with provider '{provider}'",
            strategy.name()
        )));
    }
    if !config.provider_enabled(provider) {
        return Err(invalid(format!(
            "rule {index}: provider '{provider}' is not enabled for this API"
        )));
    }

    let operations = parse_operations(fields, index, location, diagnostics)?;
    Ok(AuthRule {
        strategy,
        provider,
        operations,
    })
}

fn parse_operations(
    fields: &indexmap::IndexMap<String, Value>,
    index: usize,
    location: &Location,
    diagnostics: &mut Diagnostics,
) -> CompileResult<BTreeSet<Operation>> {
    let invalid = |reason: String| CompileError::invalid_auth_rule(location.clone(), reason);
    let names = |key: &str| -> CompileResult<Option<Vec<String>>> {
        match fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_string_list()
                .map(Some)
                .ok_or_else(|| invalid(format!("rule {index}: '{key}' must be a list of operations"))),
        }
    };

    let operations = names("operations")?;
    let queries = names("queries")?;
    let mutations = names("mutations")?;

    if queries.is_some() || mutations.is_some() {
        if operations.is_some() {
            return Err(invalid(format!(
                "rule {index}: 'operations' cannot be combined with 'queries' or 'mutations'"
            )));
        }
        diagnostics.warn(
            "deprecated-argument",
            format!("rule {index}: 'queries' and 'mutations' are deprecated; use 'operations'"),
            Some(location.clone()),
        );
    }

    let requested: Option<Vec<String>> = match (operations, queries, mutations) {
        (Some(ops), _, _) => Some(ops),
        (None, None, None) => None,
        (None, q, m) => Some(q.into_iter().chain(m).flatten().collect()),
    };

    let Some(requested) = requested else {
        return Ok(Operation::ALL.into_iter().collect());
    };

    let mut seen = IndexSet::new();
    for name in requested {
        let op = Operation::from_name(&name)
            .ok_or_else(|| invalid(format!("rule {index}: unknown operation '{name}'")))?;
        seen.insert(op);
    }
    Ok(seen.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_core::FeatureFlags;
    use spire_schema::parse_fragment;

    fn rules_of(src: &str, config: &TransformConfig) -> (CompileResult<Vec<AuthRule>>, Diagnostics) {
        let doc = parse_fragment(src, 0).unwrap();
        let object = doc.objects().next().unwrap();
        let directive = object.directive("auth").unwrap();
        let mut diags = Diagnostics::new();
        let result = parse_auth_directive(directive, &Location::of_type(&object.name), config, &mut diags);
        (result, diags)
    }

    fn rules(src: &str) -> Vec<AuthRule> {
        rules_of(src, &TransformConfig::new()).0.unwrap()
    }

    #[test]
    fn test_public_defaults() {
        let parsed = rules("type T @auth(rules: [{allow: public}]) { id: ID }");
        assert_eq!(parsed, vec![AuthRule::new(Strategy::Public)]);
        assert_eq!(parsed[0].provider, AuthProvider::ApiKey);
        assert_eq!(parsed[0].roles()[0].name, "apiKey:public");
    }

    #[test]
    fn test_owner_defaults_follow_flag() {
        let parsed = rules("type T @auth(rules: [{allow: owner}]) { id: ID }");
        assert_eq!(parsed[0].roles()[0].name, "userPools:owner:owner:sub::username");

        let config = TransformConfig::new()
            .with_flags(FeatureFlags::default().with_sub_username_identity_claim(false));
        let (parsed, _) = rules_of("type T @auth(rules: [{allow: owner, ownerField: \"editor\"}]) { id: ID }", &config);
        assert_eq!(parsed.unwrap()[0].roles()[0].name, "userPools:owner:editor:username");
    }

    #[test]
    fn test_static_groups_expand_to_roles() {
        let parsed = rules(r#"type T @auth(rules: [{allow: groups, groups: ["Admin", "Dev"], operations: [read, list]}]) { id: ID }"#);
        let names: Vec<String> = parsed[0].roles().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["userPools:staticGroup:Admin", "userPools:staticGroup:Dev"]);
        assert_eq!(parsed[0].operations, [Operation::Read].into_iter().collect());
    }

    #[test]
    fn test_dynamic_groups() {
        let parsed = rules("type T @auth(rules: [{allow: groups, groupsField: \"editors\", provider: oidc}]) { id: ID }");
        assert_eq!(parsed[0].provider, AuthProvider::Oidc);
        assert!(parsed[0].roles()[0].is_record_scoped());
    }

    #[test]
    fn test_invalid_combinations() {
        let config = TransformConfig::new();
        for src in [
            "type T @auth(rules: [{allow: owner, provider: apiKey}]) { id: ID }",
            "type T @auth(rules: [{allow: public, provider: userPools}]) { id: ID }",
            "type T @auth(rules: [{allow: custom, provider: iam}]) { id: ID }",
            "type T @auth(rules: [{allow: groups}]) { id: ID }",
            "type T @auth(rules: [{allow: everyone}]) { id: ID }",
            "type T @auth(rules: [{allow: public, operations: [destroy]}]) { id: ID }",
            "type T @auth(rules: [{allow: public, ownerField: \"x\"}]) { id: ID }",
            "type T @auth(rules: [{allow: public, colour: red}]) { id: ID }",
        ] {
            let (result, _) = rules_of(src, &config);
            assert_eq!(result.unwrap_err().code(), "InvalidAuthRuleError", "{src}");
        }
    }

    #[test]
    fn test_disabled_provider() {
        let config = TransformConfig::new().with_auth_providers(vec![AuthProvider::UserPools]);
        let (result, _) = rules_of("type T @auth(rules: [{allow: public}]) { id: ID }", &config);
        assert!(matches!(result, Err(CompileError::InvalidAuthRule { .. })));
    }

    #[test]
    fn test_deprecated_queries_mutations() {
        let (result, diags) = rules_of(
            "type T @auth(rules: [{allow: private, queries: [get, list], mutations: [create]}]) { id: ID }",
            &TransformConfig::new(),
        );
        let parsed = result.unwrap();
        assert_eq!(
            parsed[0].operations,
            [Operation::Create, Operation::Read].into_iter().collect()
        );
        assert!(diags.contains_code("deprecated-argument"));
    }

    #[test]
    fn test_operation_aliases() {
        for alias in ["get", "list", "listen", "search", "sync"] {
            assert_eq!(Operation::from_name(alias), Some(Operation::Read));
        }
        assert_eq!(Operation::from_name("upsert"), None);
    }
}
