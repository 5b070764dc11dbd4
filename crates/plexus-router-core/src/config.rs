//! Routing configuration types (spec §3: `ProviderConfig`, `ModelConfig`).
//! Loading them from YAML is an ambient concern handled by `plexus-core`;
//! this crate only owns the shape and the resolution algorithm.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `api_base_url` is either a single URL or a map keyed by dialect, with
/// `default` as the fallback entry (spec §3, design note in spec §9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BaseUrl {
    Single(String),
    PerDialect(BTreeMap<String, String>),
}

impl BaseUrl {
    /// Resolve the URL to use for `api_type`, per spec §4.2's URL
    /// resolution rule: the map entry for the dialect, else `default`,
    /// else the first entry (and the caller should warn in that last case).
    pub fn resolve(&self, api_type: &str) -> Option<(String, bool)> {
        match self {
            BaseUrl::Single(url) => Some((url.clone(), false)),
            BaseUrl::PerDialect(map) => {
                if let Some(url) = map.get(api_type) {
                    return Some((url.clone(), false));
                }
                if let Some(url) = map.get("default") {
                    return Some((url.clone(), false));
                }
                map.values().next().map(|url| (url.clone(), true))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    ApiKey,
    Oauth,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub types: Vec<String>,
    pub api_base_url: Option<BaseUrl>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub oauth_provider: Option<String>,
    #[serde(default)]
    pub oauth_account_pool: Vec<String>,
    #[serde(default)]
    pub credential_kind: Option<CredentialKind>,
    #[serde(default)]
    pub force_transformer: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub extra_body: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTarget {
    pub provider: String,
    pub model: String,
}

/// Deserializes permissively: an unrecognized `selector` string in the
/// routing YAML parses into `Unknown` rather than failing config load, so
/// [`crate::router::RouterError::SelectorNotImplemented`] can report it as
/// a normal resolve-time error instead of a config-parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    Random,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub targets: Vec<ModelTarget>,
    #[serde(default)]
    pub additional_aliases: Vec<String>,
    #[serde(default)]
    pub access_via: Option<Vec<String>>,
    #[serde(default)]
    pub selector: Option<Selector>,
    #[serde(default)]
    pub pricing: Option<plexus_common::ModelPricing>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub providers: BTreeMap<String, ProviderConfig>,
    pub models: Vec<ModelConfig>,
}

impl ProviderConfig {
    /// A provider with an `oauth_provider` but no account pool is a config
    /// error caught at load time (SPEC_FULL §3.1 expansion), not at dispatch.
    pub fn validate(&self, name: &str) -> Result<(), String> {
        if self.oauth_provider.is_some() && self.oauth_account_pool.is_empty() {
            return Err(format!(
                "provider '{name}' sets oauth_provider but has an empty oauth_account_pool"
            ));
        }
        Ok(())
    }
}
