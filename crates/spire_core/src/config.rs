//! Transform configuration and feature toggles.
//!
//! Configuration is handed to the compiler already resolved; nothing here
//! touches the filesystem. Unrecognized toggle names are kept aside so the
//! orchestrator can log them, and otherwise have no effect.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity provider an authorization rule is evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthProvider {
    /// Static API key
    ApiKey,
    /// Signed IAM requests
    Iam,
    /// User pool tokens
    UserPools,
    /// Generic OIDC tokens
    Oidc,
    /// Custom authorizer function
    Function,
}

impl AuthProvider {
    /// Every provider, in declaration order
    pub const ALL: [AuthProvider; 5] = [
        Self::ApiKey,
        Self::Iam,
        Self::UserPools,
        Self::Oidc,
        Self::Function,
    ];

    /// Parse the schema spelling of a provider
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "apiKey" => Some(Self::ApiKey),
            "iam" => Some(Self::Iam),
            "userPools" => Some(Self::UserPools),
            "oidc" => Some(Self::Oidc),
            "function" => Some(Self::Function),
            _ => None,
        }
    }

    /// Schema spelling
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApiKey => "apiKey",
            Self::Iam => "iam",
            Self::UserPools => "userPools",
            Self::Oidc => "oidc",
            Self::Function => "function",
        }
    }

    /// Provider directive attached to generated types when several providers are in use
    #[must_use]
    pub fn directive_name(&self) -> &'static str {
        match self {
            Self::ApiKey => "aws_api_key",
            Self::Iam => "aws_iam",
            Self::UserPools => "aws_cognito_user_pools",
            Self::Oidc => "aws_oidc",
            Self::Function => "aws_lambda",
        }
    }

    /// Runtime auth type string checked by generated logic
    #[must_use]
    pub fn runtime_auth_type(&self) -> &'static str {
        match self {
            Self::ApiKey => "API Key Authorization",
            Self::Iam => "IAM Authorization",
            Self::UserPools => "User Pool Authorization",
            Self::Oidc => "Open ID Connect Authorization",
            Self::Function => "Lambda Authorization",
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn enabled() -> bool {
    true
}

fn default_list_limit() -> u32 {
    100
}

fn default_instance_count() -> u32 {
    1
}

/// Named boolean/numeric toggles altering specific transform behaviors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// `@index` registers a queryable global index
    #[serde(rename = "secondaryKeyAsGSI", default = "enabled")]
    pub secondary_key_as_gsi: bool,

    /// `@index` without `queryField` gets a generated query name
    #[serde(rename = "enableAutoIndexQueryNames", default)]
    pub enable_auto_index_query_names: bool,

    /// Default owner identity claim is `sub::username` instead of `username`
    #[serde(rename = "useSubUsernameForDefaultIdentityClaim", default = "enabled")]
    pub use_sub_username_for_default_identity_claim: bool,

    /// Owner field is populated on create even when a static group also grants create
    #[serde(rename = "populateOwnerFieldForStaticGroupAuth", default = "enabled")]
    pub populate_owner_field_for_static_group_auth: bool,

    /// Implicit relation keys include the related sort key fields
    #[serde(rename = "respectPrimaryKeyAttributesOnConnectionField", default = "enabled")]
    pub respect_primary_key_attributes_on_connection_field: bool,

    /// Default page size for list, relation and search resolvers
    #[serde(rename = "defaultListLimit", default = "default_list_limit")]
    pub default_list_limit: u32,

    /// Instance count of the shared search domain
    #[serde(rename = "searchableInstanceCount", default = "default_instance_count")]
    pub searchable_instance_count: u32,

    /// Toggles this compiler does not recognize
    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, serde_json::Value>,
}

impl FeatureFlags {
    /// Names of toggles that were supplied but are not recognized
    #[must_use]
    pub fn unrecognized_names(&self) -> Vec<&str> {
        self.unrecognized.keys().map(String::as_str).collect()
    }

    /// Set `secondaryKeyAsGSI`
    #[must_use]
    pub fn with_secondary_key_as_gsi(mut self, on: bool) -> Self {
        self.secondary_key_as_gsi = on;
        self
    }

    /// Set `enableAutoIndexQueryNames`
    #[must_use]
    pub fn with_auto_index_query_names(mut self, on: bool) -> Self {
        self.enable_auto_index_query_names = on;
        self
    }

    /// Set `useSubUsernameForDefaultIdentityClaim`
    #[must_use]
    pub fn with_sub_username_identity_claim(mut self, on: bool) -> Self {
        self.use_sub_username_for_default_identity_claim = on;
        self
    }

    /// Set `respectPrimaryKeyAttributesOnConnectionField`
    #[must_use]
    pub fn with_primary_key_attributes_on_connection(mut self, on: bool) -> Self {
        self.respect_primary_key_attributes_on_connection_field = on;
        self
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            secondary_key_as_gsi: true,
            enable_auto_index_query_names: false,
            use_sub_username_for_default_identity_claim: true,
            populate_owner_field_for_static_group_auth: true,
            respect_primary_key_attributes_on_connection_field: true,
            default_list_limit: default_list_limit(),
            searchable_instance_count: default_instance_count(),
            unrecognized: BTreeMap::new(),
        }
    }
}

fn default_api_name() -> String {
    "api".to_string()
}

/// Complete configuration for one compile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformConfig {
    /// Name of the generated API resource
    #[serde(default = "default_api_name")]
    pub api_name: String,

    /// Feature toggles
    #[serde(default)]
    pub feature_flags: FeatureFlags,

    /// Enabled identity providers; `None` enables every provider
    #[serde(default)]
    pub auth_providers: Option<Vec<AuthProvider>>,

    /// Resource id -> group overrides
    #[serde(default)]
    pub stack_mapping: IndexMap<String, String>,
}

impl TransformConfig {
    /// Create a configuration with every default
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration document
    ///
    /// # Errors
    ///
    /// Returns error if the JSON does not match the configuration shape
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Replace the feature flags
    #[must_use]
    pub fn with_flags(mut self, flags: FeatureFlags) -> Self {
        self.feature_flags = flags;
        self
    }

    /// Restrict the enabled identity providers
    #[must_use]
    pub fn with_auth_providers(mut self, providers: Vec<AuthProvider>) -> Self {
        self.auth_providers = Some(providers);
        self
    }

    /// Pin a resource to a named group
    #[must_use]
    pub fn with_stack_mapping(mut self, resource: impl Into<String>, group: impl Into<String>) -> Self {
        self.stack_mapping.insert(resource.into(), group.into());
        self
    }

    /// Check if a provider may be used by rules
    #[must_use]
    pub fn provider_enabled(&self, provider: AuthProvider) -> bool {
        self.auth_providers
            .as_ref()
            .map_or(true, |enabled| enabled.contains(&provider))
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            api_name: default_api_name(),
            feature_flags: FeatureFlags::default(),
            auth_providers: None,
            stack_mapping: IndexMap::new(),
        }
    }
}
