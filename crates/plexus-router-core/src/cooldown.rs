//! Per-`(provider, model, account)` failure bookkeeping (spec §4.3).
//!
//! The in-memory table is the hot path; persistence is delegated to a
//! [`CooldownStore`] implementation (`plexus-storage` provides a SQL-backed
//! one) so the manager works the same in tests and in production.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

const DEFAULT_COOLDOWN_MS: i64 = 10 * 60 * 1000;

/// Composite key `provider:model:accountId`; an empty `account` means
/// provider/model-level cooldown (no OAuth account pool in play).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CooldownKey {
    pub provider: String,
    pub model: String,
    pub account: String,
}

impl CooldownKey {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, account: Option<&str>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            account: account.unwrap_or("").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CooldownRow {
    pub expiry_epoch_ms: i64,
}

/// Abstract durable backing store; `plexus-storage` implements this over
/// the `provider_cooldowns` table. Upserts must be atomic per key.
#[async_trait]
pub trait CooldownStore: Send + Sync {
    async fn upsert(&self, key: &CooldownKey, expiry_epoch_ms: i64);
    async fn delete(&self, key: &CooldownKey);
    /// All non-expired rows, loaded once at startup (spec §4.3, §5).
    async fn load_all(&self, now_epoch_ms: i64) -> Vec<(CooldownKey, CooldownRow)>;
}

/// A store that does nothing; used in tests and when no persistence layer
/// is wired up.
pub struct NullCooldownStore;

#[async_trait]
impl CooldownStore for NullCooldownStore {
    async fn upsert(&self, _key: &CooldownKey, _expiry_epoch_ms: i64) {}
    async fn delete(&self, _key: &CooldownKey) {}
    async fn load_all(&self, _now_epoch_ms: i64) -> Vec<(CooldownKey, CooldownRow)> {
        Vec::new()
    }
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub struct CooldownManager<S: CooldownStore = NullCooldownStore> {
    table: Mutex<HashMap<CooldownKey, CooldownRow>>,
    store: S,
    default_duration_ms: i64,
}

impl<S: CooldownStore> CooldownManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            store,
            default_duration_ms: DEFAULT_COOLDOWN_MS,
        }
    }

    pub fn with_default_duration(mut self, ms: i64) -> Self {
        self.default_duration_ms = ms;
        self
    }

    /// Load every non-expired row from the durable store at startup;
    /// expired rows are dropped eagerly by the store itself (spec §4.3).
    pub async fn load(&self) {
        let rows = self.store.load_all(now_epoch_ms()).await;
        let mut table = self.table.lock().unwrap();
        table.clear();
        table.extend(rows);
    }

    /// Upsert an `expiry = now + (duration_ms ?? default)` entry and
    /// persist it.
    pub async fn mark_failure(&self, key: CooldownKey, duration_ms: Option<i64>) {
        let expiry = now_epoch_ms() + duration_ms.unwrap_or(self.default_duration_ms);
        {
            let mut table = self.table.lock().unwrap();
            table.insert(key.clone(), CooldownRow { expiry_epoch_ms: expiry });
        }
        self.store.upsert(&key, expiry).await;
    }

    /// `true` when there is no entry, or the entry has expired (in which
    /// case it is dropped — lazy removal on access, per spec §4.3 and
    /// invariant 2 in spec §8).
    pub fn is_healthy(&self, key: &CooldownKey) -> bool {
        let mut table = self.table.lock().unwrap();
        match table.get(key) {
            None => true,
            Some(row) => {
                if now_epoch_ms() >= row.expiry_epoch_ms {
                    table.remove(key);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Remaining cooldown in whole seconds, rounded up; `0` if healthy.
    pub fn remaining_seconds(&self, key: &CooldownKey) -> i64 {
        let table = self.table.lock().unwrap();
        match table.get(key) {
            None => 0,
            Some(row) => {
                let remaining_ms = row.expiry_epoch_ms - now_epoch_ms();
                if remaining_ms <= 0 {
                    0
                } else {
                    (remaining_ms + 999) / 1000
                }
            }
        }
    }

    /// Clears every entry whose key is a prefix-match of
    /// `(provider, model?, account?)`.
    pub async fn clear(&self, provider: &str, model: Option<&str>, account: Option<&str>) {
        let mut to_delete = Vec::new();
        {
            let mut table = self.table.lock().unwrap();
            table.retain(|key, _| {
                let matches = key.provider == provider
                    && model.is_none_or(|m| key.model == m)
                    && account.is_none_or(|a| key.account == a);
                if matches {
                    to_delete.push(key.clone());
                }
                !matches
            });
        }
        for key in to_delete {
            self.store.delete(&key).await;
        }
    }

    /// Every entry currently on file, expired or not — the admin read
    /// surface's view into cooldown state (SPEC_FULL §4.9 `GET
    /// /admin/cooldowns`). Unlike `is_healthy`, this does not lazily evict
    /// expired rows so a snapshot never mutates state as a side effect.
    pub fn snapshot(&self) -> Vec<(CooldownKey, CooldownRow)> {
        let table = self.table.lock().unwrap();
        table.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    pub fn filter_healthy<'a, T>(
        &self,
        targets: &'a [T],
        key_for: impl Fn(&T) -> CooldownKey,
    ) -> Vec<&'a T> {
        targets
            .iter()
            .filter(|t| self.is_healthy(&key_for(t)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthy_by_default_and_unhealthy_after_mark() {
        let manager = CooldownManager::new(NullCooldownStore);
        let key = CooldownKey::new("anthropic", "claude-haiku", None);
        assert!(manager.is_healthy(&key));
        manager.mark_failure(key.clone(), Some(60_000)).await;
        assert!(!manager.is_healthy(&key));
        assert!(manager.remaining_seconds(&key) > 0);
    }

    #[tokio::test]
    async fn expired_entry_is_dropped_and_reports_healthy() {
        let manager = CooldownManager::new(NullCooldownStore);
        let key = CooldownKey::new("anthropic", "claude-haiku", Some("acct-1"));
        manager.mark_failure(key.clone(), Some(1)).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(manager.is_healthy(&key));
        assert_eq!(manager.remaining_seconds(&key), 0);
    }

    #[tokio::test]
    async fn clear_drops_every_key_matching_the_given_suffix() {
        let manager = CooldownManager::new(NullCooldownStore);
        let a = CooldownKey::new("anthropic", "haiku", Some("u1"));
        let b = CooldownKey::new("anthropic", "haiku", Some("u2"));
        let c = CooldownKey::new("openai", "gpt", Some("u1"));
        manager.mark_failure(a.clone(), Some(60_000)).await;
        manager.mark_failure(b.clone(), Some(60_000)).await;
        manager.mark_failure(c.clone(), Some(60_000)).await;

        manager.clear("anthropic", Some("haiku"), None).await;
        assert!(manager.is_healthy(&a));
        assert!(manager.is_healthy(&b));
        assert!(!manager.is_healthy(&c));
    }
}
