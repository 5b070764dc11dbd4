//! Alias/model resolution (spec §4.1).

use plexus_common::ErrorCode;
use plexus_protocol::ApiType;

use crate::config::{ModelConfig, ModelTarget, ProviderConfig, RoutingConfig, Selector};
use crate::cooldown::{CooldownKey, CooldownManager, CooldownStore};

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("provider disabled: {0}")]
    ProviderDisabled(String),
    #[error("selector not implemented: {0:?}")]
    SelectorNotImplemented(Selector),
    #[error("no healthy target for model: {0}")]
    NoHealthyTarget(String),
}

impl RouterError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RouterError::ModelNotFound(_) => ErrorCode::InvalidRequest,
            RouterError::ProviderDisabled(_) => ErrorCode::InvalidRequest,
            RouterError::SelectorNotImplemented(_) => ErrorCode::InvalidRequest,
            RouterError::NoHealthyTarget(_) => ErrorCode::InternalError,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub provider: String,
    pub model: String,
    pub provider_config: ProviderConfig,
    pub model_config: Option<ModelConfig>,
    pub canonical_model: String,
    pub incoming_alias: String,
}

pub struct Router<'a> {
    config: &'a RoutingConfig,
}

impl<'a> Router<'a> {
    pub fn new(config: &'a RoutingConfig) -> Self {
        Self { config }
    }

    /// Resolve `requested_model` per spec §4.1's algorithm. `account_for`
    /// lets the caller fold OAuth-account-scoped cooldowns into health
    /// filtering without this crate knowing about credential pools.
    pub fn resolve<S: CooldownStore>(
        &self,
        requested_model: &str,
        cooldowns: &CooldownManager<S>,
        account_for: impl Fn(&str) -> Option<String>,
    ) -> Result<ResolvedRoute, RouterError> {
        if let Some((provider, model)) = requested_model.split_once('/') {
            return self.resolve_direct(provider, model, requested_model);
        }

        let model_config = self
            .config
            .models
            .iter()
            .find(|m| m.id == requested_model || m.additional_aliases.iter().any(|a| a == requested_model))
            .ok_or_else(|| RouterError::ModelNotFound(requested_model.to_string()))?;

        let healthy: Vec<&ModelTarget> = cooldowns.filter_healthy(&model_config.targets, |t| {
            CooldownKey::new(&t.provider, &t.model, account_for(&t.provider).as_deref())
        });

        if healthy.is_empty() {
            return Err(RouterError::NoHealthyTarget(requested_model.to_string()));
        }

        let chosen = match model_config.selector {
            None => healthy[0],
            Some(Selector::Random) => {
                let idx = pseudo_random_index(requested_model, healthy.len());
                healthy[idx]
            }
            Some(selector @ Selector::Unknown) => {
                return Err(RouterError::SelectorNotImplemented(selector));
            }
        };

        let provider_config = self
            .config
            .providers
            .get(&chosen.provider)
            .cloned()
            .ok_or_else(|| RouterError::ModelNotFound(requested_model.to_string()))?;
        if !provider_config.enabled {
            return Err(RouterError::ProviderDisabled(chosen.provider.clone()));
        }

        Ok(ResolvedRoute {
            provider: chosen.provider.clone(),
            model: chosen.model.clone(),
            provider_config,
            model_config: Some(model_config.clone()),
            canonical_model: model_config.id.clone(),
            incoming_alias: requested_model.to_string(),
        })
    }

    fn resolve_direct(
        &self,
        provider: &str,
        model: &str,
        requested_model: &str,
    ) -> Result<ResolvedRoute, RouterError> {
        let provider_config = self
            .config
            .providers
            .get(provider)
            .cloned()
            .ok_or_else(|| RouterError::ModelNotFound(requested_model.to_string()))?;
        if !provider_config.enabled {
            return Err(RouterError::ProviderDisabled(provider.to_string()));
        }
        // Pricing lookup for a direct provider/model target is optional
        // (spec §4.1 step 1); we don't fail resolution when no `models`
        // entry describes it.
        let model_config = self
            .config
            .models
            .iter()
            .find(|m| m.targets.iter().any(|t| t.provider == provider && t.model == model))
            .cloned();

        Ok(ResolvedRoute {
            provider: provider.to_string(),
            model: model.to_string(),
            provider_config,
            canonical_model: model_config
                .as_ref()
                .map(|m| m.id.clone())
                .unwrap_or_else(|| format!("{provider}/{model}")),
            model_config,
            incoming_alias: requested_model.to_string(),
        })
    }
}

/// Deterministic but distribution-shaped "random" pick, seeded by the
/// requested alias so repeated calls with the same alias in a single test
/// run are reproducible; production callers that need true randomness
/// should inject a real RNG-backed `Selector::Random` strategy at the
/// dispatcher layer. Reserved selector names other than `random` fail at
/// resolution (spec §4.1).
fn pseudo_random_index(seed: &str, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let hash = seed.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    (hash as usize) % len
}

/// API type compatible with [`ApiType::parse_loose`]; re-exported here so
/// callers resolving a route can also pick a dialect without importing
/// `plexus-protocol` directly for that one call.
pub fn parse_api_type(value: &str) -> Option<ApiType> {
    ApiType::parse_loose(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_config() -> RoutingConfig {
        let mut providers = BTreeMap::new();
        providers.insert(
            "anthropic".to_string(),
            ProviderConfig {
                types: vec!["messages".to_string()],
                enabled: true,
                ..Default::default()
            },
        );
        providers.insert(
            "openai".to_string(),
            ProviderConfig {
                types: vec!["chat".to_string()],
                enabled: false,
                ..Default::default()
            },
        );
        RoutingConfig {
            providers,
            models: vec![ModelConfig {
                id: "claude-haiku".to_string(),
                targets: vec![ModelTarget {
                    provider: "anthropic".to_string(),
                    model: "claude-3-5-haiku".to_string(),
                }],
                additional_aliases: vec!["haiku".to_string()],
                ..Default::default()
            }],
        }
    }

    #[tokio::test]
    async fn resolves_by_alias() {
        let config = sample_config();
        let router = Router::new(&config);
        let cooldowns = CooldownManager::new(crate::cooldown::NullCooldownStore);
        let route = router.resolve("haiku", &cooldowns, |_| None).unwrap();
        assert_eq!(route.provider, "anthropic");
        assert_eq!(route.model, "claude-3-5-haiku");
        assert_eq!(route.canonical_model, "claude-haiku");
    }

    #[tokio::test]
    async fn direct_provider_model_syntax_bypasses_alias_table() {
        let config = sample_config();
        let router = Router::new(&config);
        let cooldowns = CooldownManager::new(crate::cooldown::NullCooldownStore);
        let route = router
            .resolve("anthropic/claude-3-opus", &cooldowns, |_| None)
            .unwrap();
        assert_eq!(route.provider, "anthropic");
        assert_eq!(route.model, "claude-3-opus");
    }

    #[tokio::test]
    async fn disabled_provider_direct_syntax_fails() {
        let config = sample_config();
        let router = Router::new(&config);
        let cooldowns = CooldownManager::new(crate::cooldown::NullCooldownStore);
        let err = router
            .resolve("openai/gpt-4o", &cooldowns, |_| None)
            .unwrap_err();
        assert!(matches!(err, RouterError::ProviderDisabled(_)));
    }

    #[tokio::test]
    async fn all_targets_cooling_fails_with_no_healthy_target() {
        let config = sample_config();
        let router = Router::new(&config);
        let cooldowns = CooldownManager::new(crate::cooldown::NullCooldownStore);
        cooldowns
            .mark_failure(
                CooldownKey::new("anthropic", "claude-3-5-haiku", None),
                Some(60_000),
            )
            .await;
        let err = router.resolve("haiku", &cooldowns, |_| None).unwrap_err();
        assert!(matches!(err, RouterError::NoHealthyTarget(_)));
    }
}
