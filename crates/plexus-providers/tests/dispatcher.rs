use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use plexus_protocol::ApiType;
use plexus_providers::credential_pool::OAuthCredential;
use plexus_providers::http_client::{UpstreamClient, UpstreamHttpRequest, UpstreamHttpResponse};
use plexus_providers::{CooldownParserRegistry, CredentialPool, DispatchError, DispatchOutcome, Dispatcher};
use plexus_router_core::{CooldownKey, CooldownManager, ModelConfig, NullCooldownStore, ProviderConfig, ResolvedRoute};
use plexus_transform::UnifiedRequest;
use serde_json::json;

struct ScriptedClient {
    status: u16,
    body: Vec<u8>,
    last_request: Mutex<Option<UpstreamHttpRequest>>,
}

impl ScriptedClient {
    fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: serde_json::to_vec(&body).unwrap(),
            last_request: Mutex::new(None),
        }
    }
}

#[async_trait]
impl UpstreamClient for ScriptedClient {
    async fn post(
        &self,
        request: UpstreamHttpRequest,
        _stream: bool,
    ) -> Result<UpstreamHttpResponse, std::io::Error> {
        *self.last_request.lock().unwrap() = Some(UpstreamHttpRequest {
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        });
        Ok(UpstreamHttpResponse {
            status: self.status,
            headers: BTreeMap::new(),
            body: self.body.clone(),
            body_stream: None,
        })
    }
}

fn openai_route() -> ResolvedRoute {
    ResolvedRoute {
        provider: "openai".to_string(),
        model: "gpt-4o-mini".to_string(),
        provider_config: ProviderConfig {
            types: vec!["chat".to_string()],
            api_base_url: Some(plexus_router_core::BaseUrl::Single(
                "https://api.openai.test".to_string(),
            )),
            api_key: Some("sk-test".to_string()),
            enabled: true,
            ..Default::default()
        },
        model_config: Some(ModelConfig {
            id: "gpt-mini".to_string(),
            ..Default::default()
        }),
        canonical_model: "gpt-mini".to_string(),
        incoming_alias: "gpt-mini".to_string(),
    }
}

fn unified_request(stream: bool) -> UnifiedRequest {
    UnifiedRequest {
        model: "gpt-mini".to_string(),
        incoming_api_type: ApiType::Chat,
        messages: vec![plexus_transform::UnifiedMessage {
            role: plexus_transform::Role::User,
            content: plexus_transform::MessageContent::Text("hello there".to_string()),
        }],
        tools: None,
        tool_choice: None,
        max_tokens: None,
        temperature: None,
        stream,
        metadata: BTreeMap::new(),
        original_body: None,
        request_id: "req-1".to_string(),
        thinking_budget: None,
    }
}

#[tokio::test]
async fn non_streaming_dispatch_transforms_response_and_attaches_plexus_meta() {
    let cooldowns = CooldownManager::new(NullCooldownStore);
    let credential_pool = CredentialPool::new();
    let parsers = CooldownParserRegistry::default();
    let client = ScriptedClient::new(
        200,
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hi back"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        }),
    );
    let dispatcher = Dispatcher {
        cooldowns: &cooldowns,
        credential_pool: &credential_pool,
        cooldown_parsers: &parsers,
        client: &client,
    };

    let outcome = dispatcher
        .dispatch(&openai_route(), unified_request(false), 0)
        .await
        .unwrap();

    match outcome {
        DispatchOutcome::Response(response) => {
            assert_eq!(response.content.as_deref(), Some("hi back"));
            let plexus = response.plexus.unwrap();
            assert_eq!(plexus.provider, "openai");
            assert_eq!(plexus.model, "gpt-4o-mini");
        }
        DispatchOutcome::Stream { .. } => panic!("expected a buffered response"),
    }

    let sent = client.last_request.lock().unwrap().take().unwrap();
    assert_eq!(sent.url, "https://api.openai.test/v1/chat/completions");
    assert_eq!(sent.headers.get("authorization").unwrap(), "Bearer sk-test");
}

#[tokio::test]
async fn failure_status_marks_cooldown_with_parsed_retry_delay() {
    let cooldowns = CooldownManager::new(NullCooldownStore);
    let credential_pool = CredentialPool::new();
    let parsers = CooldownParserRegistry::default();
    let mut route = openai_route();
    route.provider = "gemini".to_string();
    route.model = "gemini-2.5-flash".to_string();
    route.provider_config.types = vec!["gemini".to_string()];
    route.provider_config.api_base_url = Some(plexus_router_core::BaseUrl::Single(
        "https://generativelanguage.test".to_string(),
    ));

    let client = ScriptedClient::new(
        429,
        json!({
            "error": {
                "details": [{
                    "@type": "type.googleapis.com/google.rpc.RetryInfo",
                    "retryDelay": "30s"
                }]
            }
        }),
    );
    let dispatcher = Dispatcher {
        cooldowns: &cooldowns,
        credential_pool: &credential_pool,
        cooldown_parsers: &parsers,
        client: &client,
    };

    let mut request = unified_request(false);
    request.incoming_api_type = ApiType::Gemini;
    let err = dispatcher.dispatch(&route, request, 0).await.unwrap_err();
    assert!(matches!(err, DispatchError::UpstreamError { status: 429, .. }));

    let key = CooldownKey::new("gemini", "gemini-2.5-flash", None);
    assert!(!cooldowns.is_healthy(&key));
    let remaining = cooldowns.remaining_seconds(&key);
    assert!((25..=30).contains(&remaining), "remaining was {remaining}");
}

#[tokio::test]
async fn oauth_pool_all_cooling_is_surfaced_as_dispatch_error() {
    let cooldowns = CooldownManager::new(NullCooldownStore);
    let credential_pool = CredentialPool::new();
    credential_pool.set_accounts(
        "anthropic-oauth",
        vec![OAuthCredential {
            account_id: "acct-1".to_string(),
            access_token: "tok".to_string(),
            expires_at: i64::MAX,
        }],
    );
    cooldowns
        .mark_failure(
            CooldownKey::new("anthropic-oauth", "claude-sonnet", Some("acct-1")),
            Some(60_000),
        )
        .await;
    let parsers = CooldownParserRegistry::default();
    let client = ScriptedClient::new(200, json!({}));

    let mut route = openai_route();
    route.provider = "anthropic-oauth".to_string();
    route.model = "claude-sonnet".to_string();
    route.provider_config.oauth_provider = Some("anthropic-oauth".to_string());
    route.provider_config.oauth_account_pool = vec!["acct-1".to_string()];
    route.provider_config.api_key = None;

    let dispatcher = Dispatcher {
        cooldowns: &cooldowns,
        credential_pool: &credential_pool,
        cooldown_parsers: &parsers,
        client: &client,
    };

    let err = dispatcher
        .dispatch(&route, unified_request(false), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::AllAccountsCooling(_)));
}

#[tokio::test]
async fn pass_through_preserves_original_body_and_overrides_model() {
    let cooldowns = CooldownManager::new(NullCooldownStore);
    let credential_pool = CredentialPool::new();
    let parsers = CooldownParserRegistry::default();
    let client = ScriptedClient::new(
        200,
        json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
        }),
    );
    let dispatcher = Dispatcher {
        cooldowns: &cooldowns,
        credential_pool: &credential_pool,
        cooldown_parsers: &parsers,
        client: &client,
    };

    let mut request = unified_request(false);
    request.original_body = Some(json!({
        "model": "gpt-mini",
        "messages": [{"role": "user", "content": "hello there"}],
        "temperature": 0.4
    }));

    dispatcher
        .dispatch(&openai_route(), request, 0)
        .await
        .unwrap();

    let sent = client.last_request.lock().unwrap().take().unwrap();
    let sent_body: serde_json::Value = serde_json::from_slice(&sent.body).unwrap();
    assert_eq!(sent_body["model"], "gpt-4o-mini");
    assert_eq!(sent_body["temperature"], 0.4);
}
