//! Multi-tenant key auth at the HTTP boundary (spec §1 "Authentication",
//! SPEC_FULL §4.9). Keys and the admin secret are opaque bearer tokens this
//! gateway only compares, never mints; provisioning them is an external
//! collaborator's job the same way OAuth token refresh is for
//! `plexus-providers::credential_pool` — this module only extracts and
//! resolves what a request presented.

use std::collections::HashMap;

use http::HeaderMap;
use plexus_common::ErrorCode;

use crate::error::GatewayError;

/// One configured API key: the opaque secret maps to a `key_name` used for
/// rate-limit bucketing and usage attribution, plus an optional free-form
/// attribution string forwarded into `UsageRecord.key_attribution`.
#[derive(Debug, Clone)]
pub struct ApiKeyEntry {
    pub key_name: String,
    pub attribution: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AuthTable {
    by_secret: HashMap<String, ApiKeyEntry>,
}

impl AuthTable {
    pub fn new(entries: Vec<(String, ApiKeyEntry)>) -> Self {
        Self {
            by_secret: entries.into_iter().collect(),
        }
    }

    fn lookup(&self, secret: &str) -> Option<&ApiKeyEntry> {
        self.by_secret.get(secret)
    }
}

#[derive(Debug, Clone)]
pub enum Identity {
    Admin,
    Key {
        key_name: String,
        attribution: Option<String>,
    },
}

impl Identity {
    pub fn rate_limit_key(&self) -> &str {
        match self {
            Identity::Admin => "__admin__",
            Identity::Key { key_name, .. } => key_name,
        }
    }
}

/// `x-api-key`, then `Authorization: Bearer <token>` (case-insensitive
/// scheme), mirroring the teacher's `extract_api_key` (grounded in
/// `gproxy-core/src/auth.rs`). A trailing `:attribution` suffix on the raw
/// token (spec GLOSSARY "key attribution") is split off here so the table
/// lookup always happens on the bare secret.
pub fn extract_token(headers: &HeaderMap) -> Option<(String, Option<String>)> {
    let raw = header_value(headers, "x-api-key").or_else(|| {
        let auth = header_value(headers, "authorization")?;
        let auth = auth.trim();
        auth.strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .map(|token| token.trim().to_string())
    })?;
    match raw.split_once(':') {
        Some((secret, attribution)) if !attribution.is_empty() => {
            Some((secret.to_string(), Some(attribution.to_string())))
        }
        _ => Some((raw, None)),
    }
}

pub fn extract_admin_key(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "x-admin-key")
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Admin wins over a regular key when both headers are present, matching
/// `x-admin-key` being checked by a dedicated admin router in the teacher
/// (`gproxy-router/src/admin.rs`); here the two surfaces share one table so
/// the check is inline instead of a second middleware stack.
pub fn authenticate(
    table: &AuthTable,
    admin_key_hash: &str,
    headers: &HeaderMap,
) -> Result<Identity, GatewayError> {
    if let Some(admin_key) = extract_admin_key(headers) {
        if blake3::hash(admin_key.as_bytes()).to_hex().as_str() == admin_key_hash {
            return Ok(Identity::Admin);
        }
        return Err(GatewayError::new(ErrorCode::Forbidden, "invalid admin key"));
    }

    let (secret, attribution_from_token) =
        extract_token(headers).ok_or_else(|| GatewayError::new(ErrorCode::Unauthenticated, "missing api key"))?;
    let entry = table
        .lookup(&secret)
        .ok_or_else(|| GatewayError::new(ErrorCode::Forbidden, "invalid api key"))?;
    Ok(Identity::Key {
        key_name: entry.key_name.clone(),
        attribution: attribution_from_token.or_else(|| entry.attribution.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                http::HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn x_api_key_takes_precedence_over_bearer() {
        let h = headers(&[("x-api-key", "sk-1"), ("authorization", "Bearer sk-2")]);
        assert_eq!(extract_token(&h).unwrap().0, "sk-1");
    }

    #[test]
    fn bearer_token_attribution_suffix_is_split_off() {
        let h = headers(&[("authorization", "Bearer sk-1:alice")]);
        let (secret, attribution) = extract_token(&h).unwrap();
        assert_eq!(secret, "sk-1");
        assert_eq!(attribution.as_deref(), Some("alice"));
    }

    #[test]
    fn admin_key_header_resolves_to_admin_identity() {
        let hash = blake3::hash(b"admin-secret").to_hex().to_string();
        let table = AuthTable::default();
        let h = headers(&[("x-admin-key", "admin-secret")]);
        let identity = authenticate(&table, &hash, &h).unwrap();
        assert!(matches!(identity, Identity::Admin));
    }

    #[test]
    fn unknown_key_is_forbidden_not_unauthenticated() {
        let table = AuthTable::default();
        let h = headers(&[("x-api-key", "sk-unknown")]);
        let err = authenticate(&table, "irrelevant", &h).unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }
}
