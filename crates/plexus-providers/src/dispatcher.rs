//! Single end-to-end execution of one upstream call (spec §4.2).

use std::collections::BTreeMap;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use plexus_common::ErrorCode;
use plexus_protocol::ApiType;
use plexus_router_core::{CooldownKey, CooldownManager, CooldownStore, ResolvedRoute};
use plexus_transform::{transformer_for, PlexusMeta, Transformer, UnifiedRequest, UnifiedResponse};
use serde_json::Value;

use crate::cooldown_parsers::CooldownParserRegistry;
use crate::credential_pool::{CredentialPool, CredentialPoolError, OAuthCredential};
use crate::http_client::{UpstreamClient, UpstreamHttpRequest};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("oauth credential expired for account in provider '{0}'")]
    OAuthExpired(String),
    #[error(transparent)]
    AllAccountsCooling(#[from] CredentialPoolError),
    #[error("upstream returned {status}: {body}")]
    UpstreamError { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Transform(#[from] plexus_transform::TransformError),
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::OAuthExpired(_) | DispatchError::AllAccountsCooling(_) => {
                ErrorCode::InternalError
            }
            DispatchError::UpstreamError { .. } => ErrorCode::InternalError,
            DispatchError::Transport(_) => ErrorCode::InternalError,
            DispatchError::Transform(_) => ErrorCode::InvalidRequest,
        }
    }
}

pub enum DispatchOutcome {
    Response(UnifiedResponse),
    Stream {
        body: BoxStream<'static, Result<Bytes, std::io::Error>>,
        bypass_transformation: bool,
        plexus: PlexusMeta,
        /// The transformer whose dialect the raw stream is framed in —
        /// needed by the streaming engine to decode it regardless of
        /// which dialect the client asked for.
        upstream_api_type: ApiType,
    },
}

const DEFAULT_COOLDOWN_MS: i64 = 10 * 60 * 1000;
const OAUTH_EXPIRY_STATUS_CODES: [u16; 4] = [401, 403, 408, 429];

pub struct Dispatcher<'a, S: CooldownStore> {
    pub cooldowns: &'a CooldownManager<S>,
    pub credential_pool: &'a CredentialPool,
    pub cooldown_parsers: &'a CooldownParserRegistry,
    pub client: &'a dyn UpstreamClient,
}

/// Picks the dialect the upstream call will use: the model's
/// `access_via` list if set, else the provider's declared `type` list,
/// matching the incoming dialect case-insensitively and falling back to
/// the first entry (spec §4.2 "Dialect selection").
pub fn select_target_api_type(route: &ResolvedRoute, incoming: ApiType) -> Option<ApiType> {
    let candidates: Vec<String> = route
        .model_config
        .as_ref()
        .and_then(|m| m.access_via.clone())
        .unwrap_or_else(|| route.provider_config.types.clone());

    if candidates.is_empty() {
        return None;
    }
    for candidate in &candidates {
        if let Some(parsed) = ApiType::parse_loose(candidate) {
            if parsed == incoming {
                return Some(parsed);
            }
        }
    }
    ApiType::parse_loose(&candidates[0])
}

impl<'a, S: CooldownStore> Dispatcher<'a, S> {
    pub async fn dispatch(
        &self,
        route: &ResolvedRoute,
        mut unified: UnifiedRequest,
        now_ms: i64,
    ) -> Result<DispatchOutcome, DispatchError> {
        let target_api_type =
            select_target_api_type(route, unified.incoming_api_type).unwrap_or(ApiType::Chat);

        let transformer_api_type = route
            .provider_config
            .force_transformer
            .as_deref()
            .and_then(ApiType::parse_loose)
            .unwrap_or(target_api_type);
        let transformer = transformer_for(transformer_api_type);

        let mut selected_account: Option<OAuthCredential> = None;
        if let Some(_oauth_provider) = &route.provider_config.oauth_provider {
            let credential =
                self.credential_pool
                    .select(&route.provider, &route.model, self.cooldowns, now_ms)?;
            let warn_expiry = CredentialPool::check_expiry(&credential, now_ms)
                .map_err(|_| DispatchError::OAuthExpired(route.provider.clone()))?;
            if warn_expiry {
                tracing::warn!(
                    event = "oauth_credential_near_expiry",
                    provider = %route.provider,
                    account = %credential.account_id,
                );
            }
            unified.metadata.insert(
                "selected_oauth_account".to_string(),
                Value::String(credential.account_id.clone()),
            );
            selected_account = Some(credential);
        }

        let pass_through = unified.incoming_api_type == transformer_api_type
            && route.provider_config.force_transformer.is_none()
            && unified.original_body.is_some();

        let mut body = if pass_through {
            let mut original = unified.original_body.clone().unwrap();
            if let Value::Object(map) = &mut original {
                map.insert("model".to_string(), Value::String(route.model.clone()));
            }
            original
        } else {
            unified.strip_internal_metadata();
            transformer.transform_request(&unified)?
        };
        merge_extra_body(&mut body, &route.provider_config.extra_body);

        let (base_url, warn_fallback) = route
            .provider_config
            .api_base_url
            .as_ref()
            .and_then(|b| b.resolve(target_api_type.as_str()))
            .unwrap_or(("https://api.invalid".to_string(), true));
        if warn_fallback {
            tracing::warn!(
                event = "api_base_url_fallback_to_first_entry",
                provider = %route.provider,
            );
        }
        // Gemini's REST path interpolates the resolved upstream model
        // ahead of the action suffix (`/models/{model}:generateContent`);
        // the other two dialects have a fixed, model-less path. Streaming
        // calls additionally need `?alt=sse`, without which Gemini replies
        // with one JSON blob instead of SSE frames.
        let url = if target_api_type == ApiType::Gemini {
            let path = format!(
                "{}/models/{}{}",
                base_url.trim_end_matches('/'),
                route.model,
                transformer.endpoint(&unified)
            );
            if unified.stream {
                format!("{path}?alt=sse")
            } else {
                path
            }
        } else {
            format!(
                "{}{}",
                base_url.trim_end_matches('/'),
                transformer.endpoint(&unified)
            )
        };

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert(
            "accept".to_string(),
            if unified.stream {
                "text/event-stream".to_string()
            } else {
                "application/json".to_string()
            },
        );
        if let Some(credential) = &selected_account {
            headers.insert(
                "authorization".to_string(),
                format!("Bearer {}", credential.access_token),
            );
        } else if let Some(api_key) = &route.provider_config.api_key {
            match target_api_type {
                ApiType::Messages => {
                    headers.insert("x-api-key".to_string(), api_key.clone());
                    headers.insert("anthropic-version".to_string(), "2023-06-01".to_string());
                }
                ApiType::Gemini => {
                    headers.insert("x-goog-api-key".to_string(), api_key.clone());
                }
                ApiType::Chat => {
                    headers.insert("authorization".to_string(), format!("Bearer {api_key}"));
                }
            }
        }
        for (key, value) in &route.provider_config.headers {
            headers.insert(key.to_ascii_lowercase(), value.clone());
        }

        let body_bytes =
            serde_json::to_vec(&body).map_err(|e| DispatchError::Transport(e.to_string()))?;
        let request = UpstreamHttpRequest {
            url,
            headers,
            body: body_bytes,
        };

        let response = self
            .client
            .post(request, unified.stream)
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        if response.status >= 400 {
            let body_text = if unified.stream {
                String::new()
            } else {
                String::from_utf8_lossy(&response.body).to_string()
            };
            self.on_failure(route, &target_api_type, selected_account.as_ref(), response.status, &body_text)
                .await;
            return Err(DispatchError::UpstreamError {
                status: response.status,
                body: body_text,
            });
        }

        let plexus = PlexusMeta {
            provider: route.provider.clone(),
            model: route.model.clone(),
            api_type: target_api_type,
            canonical_model: route.canonical_model.clone(),
            provider_discount: route.provider_config.discount,
            pricing: route.model_config.as_ref().and_then(|m| m.pricing),
        };

        if unified.stream {
            let stream = response
                .body_stream
                .ok_or_else(|| DispatchError::Transport("missing stream body".to_string()))?;
            Ok(DispatchOutcome::Stream {
                body: stream,
                bypass_transformation: pass_through,
                plexus,
                upstream_api_type: transformer_api_type,
            })
        } else {
            let upstream_json: Value = serde_json::from_slice(&response.body)
                .map_err(|e| DispatchError::Transport(e.to_string()))?;
            let mut unified_response = transformer.transform_response(&upstream_json)?;
            unified_response.plexus = Some(plexus);
            Ok(DispatchOutcome::Response(unified_response))
        }
    }

    /// Failure classification (spec §4.2, §7): `5xx`, `401`, `403`, `408`,
    /// `429` all mark a cooldown; `429` consults the parser registry for a
    /// provider-specific duration first.
    async fn on_failure(
        &self,
        route: &ResolvedRoute,
        target_api_type: &ApiType,
        account: Option<&OAuthCredential>,
        status: u16,
        body: &str,
    ) {
        let should_cool = status >= 500 || OAUTH_EXPIRY_STATUS_CODES.contains(&status);
        if !should_cool {
            return;
        }
        let duration_ms = if status == 429 {
            self.cooldown_parsers
                .parse(target_api_type.as_str(), body)
                .unwrap_or(DEFAULT_COOLDOWN_MS)
        } else {
            DEFAULT_COOLDOWN_MS
        };
        let key = CooldownKey::new(
            &route.provider,
            &route.model,
            account.map(|a| a.account_id.as_str()),
        );
        self.cooldowns.mark_failure(key, Some(duration_ms)).await;
    }
}

fn merge_extra_body(body: &mut Value, extra: &serde_json::Map<String, Value>) {
    if extra.is_empty() {
        return;
    }
    if let Value::Object(map) = body {
        for (key, value) in extra {
            map.insert(key.clone(), value.clone());
        }
    }
}
