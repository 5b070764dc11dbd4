//! OAuth account round-robin over a provider's configured pool, with
//! cooldown-aware skipping (spec §4.2 "OAuth account rotation").
//!
//! This gateway's OAuth surface is a pool of opaque bearer tokens with an
//! `expires_at`; acquiring/refreshing those tokens is an external
//! collaborator (spec §1) — this module only rotates and health-checks
//! whatever the collaborator has handed it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use plexus_router_core::{CooldownKey, CooldownManager, CooldownStore};

#[derive(Debug, Clone)]
pub struct OAuthCredential {
    pub account_id: String,
    pub access_token: String,
    /// Unix epoch milliseconds.
    pub expires_at: i64,
}

#[derive(thiserror::Error, Debug)]
pub enum CredentialPoolError {
    #[error("oauth token for account '{0}' expired")]
    Expired(String),
    #[error("all oauth accounts cooling for provider '{provider}': {details}")]
    AllAccountsCooling { provider: String, details: String },
}

struct ProviderPool {
    accounts: Vec<OAuthCredential>,
    next_index: AtomicUsize,
}

/// Five minutes, per spec §4.2: within this window of `expires_at` we warn
/// but still use the credential; at/after `expires_at` we refuse.
const EXPIRY_WARN_WINDOW_MS: i64 = 5 * 60 * 1000;

pub struct CredentialPool {
    providers: Mutex<HashMap<String, ProviderPool>>,
}

impl Default for CredentialPool {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialPool {
    pub fn new() -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_accounts(&self, provider: &str, accounts: Vec<OAuthCredential>) {
        let mut providers = self.providers.lock().unwrap();
        providers.insert(
            provider.to_string(),
            ProviderPool {
                accounts,
                next_index: AtomicUsize::new(0),
            },
        );
    }

    /// Advance the provider's round-robin index modulo pool size, skipping
    /// accounts currently cooling for `(provider, model, account)`. Returns
    /// `Err(AllAccountsCooling)` carrying every account id and its
    /// remaining cooldown seconds when the whole pool is unavailable.
    pub fn select<S: CooldownStore>(
        &self,
        provider: &str,
        model: &str,
        cooldowns: &CooldownManager<S>,
        now_ms: i64,
    ) -> Result<OAuthCredential, CredentialPoolError> {
        let providers = self.providers.lock().unwrap();
        let pool = providers
            .get(provider)
            .filter(|p| !p.accounts.is_empty())
            .ok_or_else(|| CredentialPoolError::AllAccountsCooling {
                provider: provider.to_string(),
                details: "no accounts configured".to_string(),
            })?;

        let len = pool.accounts.len();
        let mut remaining_by_account = Vec::with_capacity(len);
        for step in 0..len {
            let idx = (pool.next_index.fetch_add(1, Ordering::Relaxed) + step) % len;
            let account = &pool.accounts[idx];
            let key = CooldownKey::new(provider, model, Some(account.account_id.as_str()));
            if cooldowns.is_healthy(&key) {
                return Ok(account.clone());
            }
            remaining_by_account.push(format!(
                "{}({}s)",
                account.account_id,
                cooldowns.remaining_seconds(&key)
            ));
        }

        let _ = now_ms;
        Err(CredentialPoolError::AllAccountsCooling {
            provider: provider.to_string(),
            details: remaining_by_account.join(", "),
        })
    }

    pub fn check_expiry(credential: &OAuthCredential, now_ms: i64) -> Result<bool, CredentialPoolError> {
        if now_ms >= credential.expires_at {
            return Err(CredentialPoolError::Expired(credential.account_id.clone()));
        }
        Ok(now_ms >= credential.expires_at - EXPIRY_WARN_WINDOW_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_router_core::NullCooldownStore;

    fn pool_with(accounts: &[&str]) -> CredentialPool {
        let pool = CredentialPool::new();
        pool.set_accounts(
            "anthropic",
            accounts
                .iter()
                .map(|id| OAuthCredential {
                    account_id: id.to_string(),
                    access_token: format!("token({id})"),
                    expires_at: i64::MAX,
                })
                .collect(),
        );
        pool
    }

    #[tokio::test]
    async fn round_robin_visits_each_account_once_over_n_dispatches() {
        let pool = pool_with(&["u1", "u2", "u3"]);
        let cooldowns = CooldownManager::new(NullCooldownStore);
        let mut seen = Vec::new();
        for _ in 0..3 {
            let cred = pool.select("anthropic", "m", &cooldowns, 0).unwrap();
            seen.push(cred.account_id);
        }
        seen.sort();
        assert_eq!(seen, vec!["u1", "u2", "u3"]);
    }

    #[tokio::test]
    async fn skips_cooling_account_and_advances_to_next() {
        let pool = pool_with(&["u1", "u2", "u3"]);
        let cooldowns = CooldownManager::new(NullCooldownStore);
        cooldowns
            .mark_failure(CooldownKey::new("anthropic", "m", Some("u2")), Some(60_000))
            .await;

        let first = pool.select("anthropic", "m", &cooldowns, 0).unwrap();
        let second = pool.select("anthropic", "m", &cooldowns, 0).unwrap();
        assert_ne!(first.account_id, "u2");
        assert_ne!(second.account_id, "u2");
        assert_ne!(first.account_id, second.account_id);
    }

    #[tokio::test]
    async fn all_accounts_cooling_reports_every_account_and_remaining_time() {
        let pool = pool_with(&["u1", "u2"]);
        let cooldowns = CooldownManager::new(NullCooldownStore);
        cooldowns
            .mark_failure(CooldownKey::new("anthropic", "m", Some("u1")), Some(45_000))
            .await;
        cooldowns
            .mark_failure(CooldownKey::new("anthropic", "m", Some("u2")), Some(45_000))
            .await;

        let err = pool.select("anthropic", "m", &cooldowns, 0).unwrap_err();
        match err {
            CredentialPoolError::AllAccountsCooling { details, .. } => {
                assert!(details.contains("u1"));
                assert!(details.contains("u2"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
