use plexus_router_core::{
    CooldownKey, CooldownManager, ModelConfig, ModelTarget, NullCooldownStore, ProviderConfig,
    Router, RouterError, RoutingConfig,
};
use std::collections::BTreeMap;

fn two_target_config() -> RoutingConfig {
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
        "bedrock".to_string(),
        ProviderConfig {
            types: vec!["messages".to_string()],
            enabled: true,
            ..Default::default()
        },
    );
    RoutingConfig {
        providers,
        models: vec![ModelConfig {
            id: "claude-sonnet".to_string(),
            targets: vec![
                ModelTarget {
                    provider: "anthropic".to_string(),
                    model: "claude-3-7-sonnet".to_string(),
                },
                ModelTarget {
                    provider: "bedrock".to_string(),
                    model: "anthropic.claude-3-7-sonnet".to_string(),
                },
            ],
            additional_aliases: vec![],
            ..Default::default()
        }],
    }
}

#[tokio::test]
async fn falls_back_to_second_target_when_first_is_cooling() {
    let config = two_target_config();
    let cooldowns = CooldownManager::new(NullCooldownStore);
    cooldowns
        .mark_failure(
            CooldownKey::new("anthropic", "claude-3-7-sonnet", None),
            Some(60_000),
        )
        .await;

    let router = Router::new(&config);
    let route = router.resolve("claude-sonnet", &cooldowns, |_| None).unwrap();
    assert_eq!(route.provider, "bedrock");
}

#[tokio::test]
async fn every_target_cooling_reports_no_healthy_target() {
    let config = two_target_config();
    let cooldowns = CooldownManager::new(NullCooldownStore);
    cooldowns
        .mark_failure(
            CooldownKey::new("anthropic", "claude-3-7-sonnet", None),
            Some(60_000),
        )
        .await;
    cooldowns
        .mark_failure(
            CooldownKey::new("bedrock", "anthropic.claude-3-7-sonnet", None),
            Some(60_000),
        )
        .await;

    let router = Router::new(&config);
    let err = router.resolve("claude-sonnet", &cooldowns, |_| None).unwrap_err();
    assert!(matches!(err, RouterError::NoHealthyTarget(_)));
}

#[tokio::test]
async fn unknown_alias_is_model_not_found() {
    let config = two_target_config();
    let cooldowns = CooldownManager::new(NullCooldownStore);
    let router = Router::new(&config);
    let err = router.resolve("gpt-5", &cooldowns, |_| None).unwrap_err();
    assert!(matches!(err, RouterError::ModelNotFound(_)));
}
