use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("missing required global config field: {0}")]
    MissingField(&'static str),
}

/// Final, merged process configuration.
///
/// Merge order: CLI flags > environment variables > config file, applied in
/// `GlobalConfigPatch::overlay` with CLI overlaid last so it always wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub host: String,
    pub port: u16,
    /// Stored as a hash, never plaintext.
    pub admin_key_hash: String,
    /// Directory holding the SQLite database and any other local state.
    pub data_dir: String,
    /// Whether debug/event logs should redact sensitive fields (api keys,
    /// oauth tokens, push-auth secrets) before they are emitted.
    pub event_redact_sensitive: bool,
}

/// A partially-specified overlay used while merging config sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub admin_key_hash: Option<String>,
    pub data_dir: Option<String>,
    pub event_redact_sensitive: Option<bool>,
}

impl GlobalConfigPatch {
    /// Overlay `other` onto `self`; any field `other` sets wins.
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.admin_key_hash.is_some() {
            self.admin_key_hash = other.admin_key_hash;
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if other.event_redact_sensitive.is_some() {
            self.event_redact_sensitive = other.event_redact_sensitive;
        }
    }

    pub fn into_config(self) -> Result<GlobalConfig, GlobalConfigError> {
        Ok(GlobalConfig {
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: self.port.unwrap_or(8787),
            admin_key_hash: self
                .admin_key_hash
                .ok_or(GlobalConfigError::MissingField("admin_key_hash"))?,
            data_dir: self.data_dir.unwrap_or_else(|| "./data".to_string()),
            event_redact_sensitive: self.event_redact_sensitive.unwrap_or(true),
        })
    }
}

impl From<GlobalConfig> for GlobalConfigPatch {
    fn from(value: GlobalConfig) -> Self {
        Self {
            host: Some(value.host),
            port: Some(value.port),
            admin_key_hash: Some(value.admin_key_hash),
            data_dir: Some(value.data_dir),
            event_redact_sensitive: Some(value.event_redact_sensitive),
        }
    }
}
