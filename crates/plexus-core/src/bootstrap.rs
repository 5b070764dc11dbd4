//! Startup: parse CLI/env, load the routing+key+A2A document, open
//! storage, and assemble an [`AppState`] — the same shape as the teacher's
//! `gproxy-core/src/bootstrap/mod.rs` (`CliArgs`, `bootstrap()`, the
//! sanitize/parse env helpers, `hash_admin_key`/`generate_admin_key`), but
//! merging a YAML document instead of a DB-persisted `GlobalConfig` row,
//! since this gateway's provider/model/key topology is config-as-code
//! (spec §3) rather than admin-API-managed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use plexus_a2a::encryption::EncryptionKeySource;
use plexus_a2a::{A2aRepository, A2aService, A2aServiceConfig, PushDeliveryConfig, PushDeliveryService};
use plexus_common::{GlobalConfig, GlobalConfigPatch};
use plexus_providers::{CooldownParserRegistry, CredentialPool, OAuthCredential, UpstreamClient, WreqUpstreamClient};
use plexus_router_core::{CooldownManager, RateLimitConfig, RoutingConfig};
use plexus_storage::{SeaOrmCooldownStore, UsageRepository};
use serde::Deserialize;

use crate::auth::{ApiKeyEntry, AuthTable};
use crate::state::AppState;

#[derive(Debug, Clone, Parser)]
#[command(name = "plexus", version, about = "Multi-tenant LLM routing gateway")]
pub struct CliArgs {
    #[arg(long, env = "PLEXUS_CONFIG")]
    pub config: Option<String>,
    #[arg(long, env = "PLEXUS_DSN")]
    pub dsn: Option<String>,
    #[arg(long, env = "PLEXUS_HOST")]
    pub host: Option<String>,
    #[arg(long, env = "PLEXUS_PORT")]
    pub port: Option<String>,
    /// `ADMIN_KEY` is the name spec §6.1 documents; `PLEXUS_ADMIN_KEY`
    /// remains the gateway-namespaced alias and wins if both are set.
    #[arg(long, env = "ADMIN_KEY")]
    pub admin_key_unprefixed: Option<String>,
    #[arg(long, env = "PLEXUS_ADMIN_KEY")]
    pub admin_key: Option<String>,
    #[arg(long, env = "DATA_DIR")]
    pub data_dir_unprefixed: Option<String>,
    #[arg(long, env = "PLEXUS_DATA_DIR")]
    pub data_dir: Option<String>,
    #[arg(long, env = "PLEXUS_EVENT_REDACT_SENSITIVE")]
    pub event_redact_sensitive: Option<String>,
    #[arg(long, env = "PROVIDER_COOLDOWN_MINUTES")]
    pub provider_cooldown_minutes: Option<String>,
    #[arg(long, env = "A2A_RATE_LIMIT_WINDOW_MS")]
    pub a2a_rate_limit_window_ms: Option<String>,
    #[arg(long, env = "A2A_RATE_LIMIT_MAX_REQUESTS")]
    pub a2a_rate_limit_max_requests: Option<String>,
    #[arg(long, env = "A2A_RATE_LIMIT_MAX_STREAM_REQUESTS")]
    pub a2a_rate_limit_max_stream_requests: Option<String>,
    #[arg(long, env = "A2A_RATE_LIMIT_MAX_BUCKETS")]
    pub a2a_rate_limit_max_buckets: Option<String>,
    #[arg(long, env = "A2A_RATE_LIMIT_ENABLED")]
    pub a2a_rate_limit_enabled: Option<String>,
    #[arg(long, env = "A2A_IDEMPOTENCY_RETENTION_HOURS")]
    pub a2a_idempotency_retention_hours: Option<String>,
    #[arg(long, env = "A2A_DB_TIMEOUT_MS")]
    pub a2a_db_timeout_ms: Option<String>,
    #[arg(long, env = "A2A_PUSH_AUTH_ENCRYPTION_KEY")]
    pub a2a_push_auth_encryption_key: Option<String>,
    #[arg(long, env = "A2A_PUSH_ALLOW_INSECURE_ENDPOINTS")]
    pub a2a_push_allow_insecure_endpoints: Option<String>,
    #[arg(long, env = "A2A_PUSH_MAX_QUEUE_DEPTH")]
    pub a2a_push_max_queue_depth: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiKeyFileEntry {
    secret: String,
    key_name: String,
    #[serde(default)]
    attribution: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct OAuthAccountFileEntry {
    account_id: String,
    access_token: String,
    /// Unix epoch milliseconds.
    expires_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RateLimitFileConfig {
    window_ms: Option<i64>,
    max_requests: Option<u32>,
    max_stream_requests: Option<u32>,
    max_buckets: Option<usize>,
    enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct A2aFileConfig {
    idempotency_retention_hours: Option<i64>,
    push_auth_encryption_key: Option<String>,
    #[serde(default)]
    push_allow_insecure_endpoints: bool,
    push_max_queue_depth: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    admin_key_hash: Option<String>,
    data_dir: Option<String>,
    event_redact_sensitive: Option<bool>,
    #[serde(default)]
    api_keys: Vec<ApiKeyFileEntry>,
    #[serde(default)]
    oauth_accounts: BTreeMap<String, Vec<OAuthAccountFileEntry>>,
    #[serde(default)]
    routing: RoutingConfig,
    #[serde(default)]
    rate_limit: RateLimitFileConfig,
    #[serde(default)]
    a2a: A2aFileConfig,
}

pub struct Bootstrap {
    pub state: Arc<AppState>,
    pub host: String,
    pub port: u16,
}

pub async fn bootstrap_from_env() -> anyhow::Result<Bootstrap> {
    bootstrap(CliArgs::parse()).await
}

pub async fn bootstrap(args: CliArgs) -> anyhow::Result<Bootstrap> {
    let config_path = sanitize_optional_env_value(args.config.clone())
        .unwrap_or_else(|| "./plexus.yaml".to_string());
    let file = load_file_config(&config_path)?;

    for (name, provider) in &file.routing.providers {
        provider
            .validate(name)
            .map_err(|message| anyhow::anyhow!(message))?;
    }

    let dsn = sanitize_dsn_value(args.dsn.clone());
    ensure_sqlite_parent_dir(&dsn)?;

    let host = sanitize_optional_env_value(args.host.clone());
    let port = parse_u16_env_value(args.port.clone(), "PLEXUS_PORT")?;
    let admin_key_plaintext = sanitize_optional_env_value(args.admin_key.clone())
        .or_else(|| sanitize_optional_env_value(args.admin_key_unprefixed.clone()));
    let data_dir = sanitize_optional_env_value(args.data_dir.clone())
        .or_else(|| sanitize_optional_env_value(args.data_dir_unprefixed.clone()));
    let event_redact_sensitive = parse_bool_env_value(
        args.event_redact_sensitive.clone(),
        "PLEXUS_EVENT_REDACT_SENSITIVE",
    )?;
    let provider_cooldown_ms = parse_u32_env_value(args.provider_cooldown_minutes.clone(), "PROVIDER_COOLDOWN_MINUTES")?
        .map(|minutes| minutes as i64 * 60 * 1000);
    let a2a_db_timeout_ms = parse_u32_env_value(args.a2a_db_timeout_ms.clone(), "A2A_DB_TIMEOUT_MS")?
        .map(|v| v as u64);
    let a2a_rate_limit_window_ms =
        parse_i64_env_value(args.a2a_rate_limit_window_ms.clone(), "A2A_RATE_LIMIT_WINDOW_MS")?;
    let a2a_rate_limit_max_requests =
        parse_u32_env_value(args.a2a_rate_limit_max_requests.clone(), "A2A_RATE_LIMIT_MAX_REQUESTS")?;
    let a2a_rate_limit_max_stream_requests = parse_u32_env_value(
        args.a2a_rate_limit_max_stream_requests.clone(),
        "A2A_RATE_LIMIT_MAX_STREAM_REQUESTS",
    )?;
    let a2a_rate_limit_max_buckets =
        parse_usize_env_value(args.a2a_rate_limit_max_buckets.clone(), "A2A_RATE_LIMIT_MAX_BUCKETS")?;
    let a2a_rate_limit_enabled =
        parse_bool_env_value(args.a2a_rate_limit_enabled.clone(), "A2A_RATE_LIMIT_ENABLED")?;
    let a2a_idempotency_retention_hours = parse_i64_env_value(
        args.a2a_idempotency_retention_hours.clone(),
        "A2A_IDEMPOTENCY_RETENTION_HOURS",
    )?;
    let a2a_push_auth_encryption_key = sanitize_optional_env_value(args.a2a_push_auth_encryption_key.clone());
    let a2a_push_allow_insecure_endpoints = parse_bool_env_value(
        args.a2a_push_allow_insecure_endpoints.clone(),
        "A2A_PUSH_ALLOW_INSECURE_ENDPOINTS",
    )?;
    let a2a_push_max_queue_depth =
        parse_usize_env_value(args.a2a_push_max_queue_depth.clone(), "A2A_PUSH_MAX_QUEUE_DEPTH")?;

    let mut merged = GlobalConfigPatch {
        host: file.host.clone(),
        port: file.port,
        admin_key_hash: file.admin_key_hash.clone(),
        data_dir: file.data_dir.clone(),
        event_redact_sensitive: file.event_redact_sensitive,
    };

    let mut admin_key_hash_override = admin_key_plaintext.as_deref().map(hash_admin_key);
    if admin_key_hash_override.is_none() && merged.admin_key_hash.is_none() {
        let generated = generate_admin_key();
        eprintln!("generated admin key: {generated}");
        admin_key_hash_override = Some(hash_admin_key(&generated));
    }

    let cli_patch = GlobalConfigPatch {
        host,
        port,
        admin_key_hash: admin_key_hash_override,
        data_dir,
        event_redact_sensitive,
    };
    merged.overlay(cli_patch);
    let global: GlobalConfig = merged.into_config().context("finalize merged global config")?;
    let admin_key_hash = global.admin_key_hash.clone();

    let db = plexus_storage::db::connect_and_sync(&dsn, a2a_db_timeout_ms)
        .await
        .context("connect storage")?;

    let auth_table = AuthTable::new(
        file.api_keys
            .iter()
            .map(|entry| {
                (
                    entry.secret.clone(),
                    ApiKeyEntry {
                        key_name: entry.key_name.clone(),
                        attribution: entry.attribution.clone(),
                    },
                )
            })
            .collect(),
    );

    let cooldown_store = SeaOrmCooldownStore::new(db.clone());
    let mut cooldowns = CooldownManager::new(cooldown_store);
    if let Some(ms) = provider_cooldown_ms {
        cooldowns = cooldowns.with_default_duration(ms);
    }
    cooldowns.load().await;

    let credential_pool = CredentialPool::new();
    for (provider, accounts) in &file.oauth_accounts {
        credential_pool.set_accounts(
            provider,
            accounts
                .iter()
                .map(|a| OAuthCredential {
                    account_id: a.account_id.clone(),
                    access_token: a.access_token.clone(),
                    expires_at: a.expires_at,
                })
                .collect(),
        );
    }

    let cooldown_parsers = CooldownParserRegistry::default();
    let client: Arc<dyn UpstreamClient> = Arc::new(WreqUpstreamClient::new().context("build upstream http client")?);
    let usage = UsageRepository::new(db.clone());

    let rate_limit = RateLimitConfig {
        window_ms: a2a_rate_limit_window_ms
            .or(file.rate_limit.window_ms)
            .unwrap_or(RateLimitConfig::default().window_ms),
        max_requests: a2a_rate_limit_max_requests
            .or(file.rate_limit.max_requests)
            .unwrap_or(RateLimitConfig::default().max_requests),
        max_stream_requests: a2a_rate_limit_max_stream_requests
            .or(file.rate_limit.max_stream_requests)
            .unwrap_or(RateLimitConfig::default().max_stream_requests),
        max_buckets: a2a_rate_limit_max_buckets
            .or(file.rate_limit.max_buckets)
            .unwrap_or(RateLimitConfig::default().max_buckets),
        enabled: a2a_rate_limit_enabled.or(file.rate_limit.enabled).unwrap_or(true),
    };
    let rate_limiter = plexus_router_core::RateLimiter::new(rate_limit);

    let push = PushDeliveryService::spawn(PushDeliveryConfig {
        allow_insecure_endpoints: a2a_push_allow_insecure_endpoints.unwrap_or(file.a2a.push_allow_insecure_endpoints),
        max_queue_depth: a2a_push_max_queue_depth
            .or(file.a2a.push_max_queue_depth)
            .unwrap_or(PushDeliveryConfig::default().max_queue_depth),
    });
    let encryption = EncryptionKeySource::resolve(
        a2a_push_auth_encryption_key
            .as_deref()
            .or(file.a2a.push_auth_encryption_key.as_deref()),
        admin_key_plaintext.as_deref(),
    );
    let a2a_config = A2aServiceConfig {
        idempotency_retention_hours: a2a_idempotency_retention_hours
            .or(file.a2a.idempotency_retention_hours)
            .unwrap_or(A2aServiceConfig::default().idempotency_retention_hours),
    };
    let a2a = A2aService::new(A2aRepository::new(db), Some(Arc::new(push)), encryption, a2a_config);

    let state = Arc::new(AppState::new(
        global,
        admin_key_hash,
        file.routing,
        auth_table,
        cooldowns,
        credential_pool,
        cooldown_parsers,
        client,
        usage,
        a2a,
        rate_limiter,
    ));

    Ok(Bootstrap {
        host: state.global.host.clone(),
        port: state.global.port,
        state,
    })
}

fn load_file_config(path: &str) -> anyhow::Result<FileConfig> {
    if !Path::new(path).exists() {
        return Ok(FileConfig::default());
    }
    let raw = std::fs::read_to_string(path).with_context(|| format!("read config file {path}"))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parse config file {path}"))
}

fn sanitize_optional_env_value(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("${") && trimmed.ends_with('}') {
        return None;
    }
    Some(trimmed)
}

fn sanitize_dsn_value(value: Option<String>) -> String {
    sanitize_optional_env_value(value).unwrap_or_else(default_dsn)
}

fn default_dsn() -> String {
    if let Some(data_dir) = sanitize_optional_env_value(std::env::var("PLEXUS_DATA_DIR").ok()) {
        let dir = data_dir.trim_end_matches('/');
        return format!("sqlite://{dir}/plexus.db?mode=rwc");
    }
    "sqlite://plexus.db?mode=rwc".to_string()
}

fn ensure_sqlite_parent_dir(dsn: &str) -> anyhow::Result<()> {
    let Some(db_path) = sqlite_file_path_from_dsn(dsn) else {
        return Ok(());
    };
    let Some(parent) = db_path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent)
        .with_context(|| format!("create sqlite parent dir {}", parent.display()))?;
    Ok(())
}

fn sqlite_file_path_from_dsn(dsn: &str) -> Option<PathBuf> {
    let rest = dsn.strip_prefix("sqlite:")?;
    let path_part = rest.split(['?', '#']).next()?.trim();
    if path_part.is_empty() {
        return None;
    }
    let mut normalized = path_part;
    if let Some(stripped) = normalized.strip_prefix("//") {
        normalized = stripped;
    }
    if normalized.to_ascii_lowercase() == ":memory:" {
        return None;
    }
    Some(PathBuf::from(normalized))
}

fn parse_u16_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<u16>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = raw
        .parse::<u16>()
        .with_context(|| format!("invalid {env_name} value: {raw}"))?;
    Ok(Some(parsed))
}

fn parse_u32_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<u32>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = raw
        .parse::<u32>()
        .with_context(|| format!("invalid {env_name} value: {raw}"))?;
    Ok(Some(parsed))
}

fn parse_usize_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<usize>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = raw
        .parse::<usize>()
        .with_context(|| format!("invalid {env_name} value: {raw}"))?;
    Ok(Some(parsed))
}

fn parse_i64_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<i64>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = raw
        .parse::<i64>()
        .with_context(|| format!("invalid {env_name} value: {raw}"))?;
    Ok(Some(parsed))
}

fn parse_bool_env_value(value: Option<String>, env_name: &str) -> anyhow::Result<Option<bool>> {
    let Some(raw) = sanitize_optional_env_value(value) else {
        return Ok(None);
    };
    let parsed = match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => return Err(anyhow::anyhow!("invalid {env_name} value: {raw}")),
    };
    Ok(Some(parsed))
}

fn hash_admin_key(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

fn generate_admin_key() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_dsn_resolves_relative_path() {
        let path = sqlite_file_path_from_dsn("sqlite://data/plexus.db?mode=rwc").unwrap();
        assert_eq!(path, PathBuf::from("data/plexus.db"));
    }

    #[test]
    fn sqlite_dsn_resolves_absolute_path() {
        let path = sqlite_file_path_from_dsn("sqlite:///var/lib/plexus/plexus.db").unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/plexus/plexus.db"));
    }

    #[test]
    fn sqlite_memory_dsn_is_ignored() {
        assert!(sqlite_file_path_from_dsn("sqlite::memory:").is_none());
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = load_file_config("/nonexistent/plexus.yaml").unwrap();
        assert!(config.routing.providers.is_empty());
    }
}
