//! The three inference dialect surfaces (spec §4, SPEC_FULL §4.1): OpenAI
//! chat-completions, Anthropic messages, and Gemini generateContent, all
//! converging on the same resolve -> dispatch -> (stream | format) pipeline.

use std::sync::Arc;

use axum::extract::{Extension, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use plexus_protocol::ApiType;
use plexus_providers::{DispatchOutcome, Dispatcher};
use plexus_router_core::cooldown::now_epoch_ms;
use plexus_router_core::ResolvedRoute;
use plexus_storage::usage::response_status;
use plexus_transform::{transformer_for, PlexusMeta, UnifiedRequest, UnifiedUsage};
use serde_json::Value;
use time::OffsetDateTime;

use crate::auth::Identity;
use crate::error::GatewayError;
use crate::state::AppState;
use crate::streaming::{stream_inference_body, StreamUsageContext};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/messages", post(messages))
        .route("/v1beta/models/{model}:generateContent", post(gemini_generate))
        .route("/v1beta/models/{model}:streamGenerateContent", post(gemini_stream_generate))
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let routing = state.routing.load();
    let models: Vec<Value> = routing
        .models
        .iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "object": "model",
                "aliases": m.additional_aliases,
            })
        })
        .collect();
    Json(serde_json::json!({ "object": "list", "data": models }))
}

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<Value>,
) -> Result<Response, GatewayError> {
    let unified = transformer_for(ApiType::Chat).parse_request(&body)?;
    run_inference(state, identity, unified).await
}

async fn messages(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<Value>,
) -> Result<Response, GatewayError> {
    let unified = transformer_for(ApiType::Messages).parse_request(&body)?;
    run_inference(state, identity, unified).await
}

async fn gemini_generate(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(model): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, GatewayError> {
    let mut unified = transformer_for(ApiType::Gemini).parse_request(&body)?;
    unified.model = model;
    unified.stream = false;
    run_inference(state, identity, unified).await
}

async fn gemini_stream_generate(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(model): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, GatewayError> {
    let mut unified = transformer_for(ApiType::Gemini).parse_request(&body)?;
    unified.model = model;
    unified.stream = true;
    run_inference(state, identity, unified).await
}

async fn run_inference(
    state: Arc<AppState>,
    identity: Identity,
    mut unified: UnifiedRequest,
) -> Result<Response, GatewayError> {
    let client_api_type = unified.incoming_api_type;
    let trace_id = plexus_common::new_trace_id();
    unified.request_id = trace_id.clone();
    let requested_model = unified.model.clone();

    let key_name = identity.rate_limit_key().to_string();
    let key_attribution = match &identity {
        Identity::Key { attribution, .. } => attribution.clone(),
        Identity::Admin => None,
    };

    let route = {
        let routing = state.routing.load();
        let router = plexus_router_core::Router::new(&routing);
        router.resolve(&unified.model, &state.cooldowns, |_| None)
    };
    let route = match route {
        Ok(route) => route,
        Err(error) => {
            let gateway_error: GatewayError = error.into();
            record_error_usage(
                &state,
                trace_id,
                key_name,
                key_attribution,
                None,
                &requested_model,
                client_api_type.as_str(),
                &gateway_error,
            )
            .await;
            return Err(gateway_error);
        }
    };

    let dispatcher = Dispatcher {
        cooldowns: &state.cooldowns,
        credential_pool: &state.credential_pool,
        cooldown_parsers: &state.cooldown_parsers,
        client: state.client.as_ref(),
    };
    let outcome = match dispatcher.dispatch(&route, unified, now_epoch_ms()).await {
        Ok(outcome) => outcome,
        Err(error) => {
            let gateway_error: GatewayError = error.into();
            record_error_usage(
                &state,
                trace_id,
                key_name,
                key_attribution,
                Some(&route),
                &requested_model,
                client_api_type.as_str(),
                &gateway_error,
            )
            .await;
            return Err(gateway_error);
        }
    };

    match outcome {
        DispatchOutcome::Response(unified_response) => {
            let plexus = unified_response.plexus.clone();
            let usage = unified_response.usage.clone();
            let body = transformer_for(client_api_type).format_response(&unified_response)?;
            if let Some(plexus) = plexus {
                record_usage(
                    &state,
                    trace_id,
                    key_name,
                    key_attribution,
                    plexus,
                    usage,
                    false,
                    response_status::SUCCESS.to_string(),
                    None,
                )
                .await;
            }
            Ok(Json(body).into_response())
        }
        DispatchOutcome::Stream {
            body,
            bypass_transformation,
            plexus,
            upstream_api_type,
        } => {
            let usage_ctx = StreamUsageContext {
                usage: state.usage.clone(),
                trace_id,
                key_name,
                key_attribution,
                plexus,
            };
            let response_body =
                stream_inference_body(body, upstream_api_type, client_api_type, bypass_transformation, usage_ctx);
            Ok(([(CONTENT_TYPE, "text/event-stream")], response_body).into_response())
        }
    }
}

/// Writes the best-effort `UsageRecord` for a request that never reached
/// `DispatchOutcome::Response` (spec §7: usage is always written on
/// termination, even on error). Uses the resolved route's provider/model
/// when routing succeeded; falls back to the raw requested model string
/// when routing itself failed.
#[allow(clippy::too_many_arguments)]
async fn record_error_usage(
    state: &AppState,
    trace_id: String,
    key_name: String,
    key_attribution: Option<String>,
    route: Option<&ResolvedRoute>,
    requested_model: &str,
    api_type: &str,
    error: &GatewayError,
) {
    let (provider, model, canonical_model) = match route {
        Some(route) => (route.provider.clone(), route.model.clone(), route.canonical_model.clone()),
        None => ("unknown".to_string(), requested_model.to_string(), requested_model.to_string()),
    };
    let record = plexus_storage::UsageRecord {
        trace_id,
        at: OffsetDateTime::now_utc(),
        key_name,
        key_attribution,
        provider,
        model,
        canonical_model,
        api_type: api_type.to_string(),
        streaming: false,
        input_tokens: 0,
        output_tokens: 0,
        cached_tokens: None,
        reasoning_tokens: None,
        cost_micros: None,
        time_to_first_token_ms: None,
        response_status: response_status::http(error.code.status_code()),
        error_code: Some(error.code.as_str().to_string()),
    };
    if let Err(record_error) = state.usage.record(record).await {
        tracing::warn!(event = "usage_record_failed", %record_error);
    }
}

#[allow(clippy::too_many_arguments)]
async fn record_usage(
    state: &AppState,
    trace_id: String,
    key_name: String,
    key_attribution: Option<String>,
    plexus: PlexusMeta,
    usage: UnifiedUsage,
    streaming: bool,
    response_status: String,
    error_code: Option<String>,
) {
    let cost_micros = plexus.pricing.map(|pricing| {
        pricing.cost_micros(
            usage.input_tokens,
            usage.output_tokens,
            usage.cached_tokens.unwrap_or(0),
            usage.reasoning_tokens.unwrap_or(0),
        )
    });
    let record = plexus_storage::UsageRecord {
        trace_id,
        at: OffsetDateTime::now_utc(),
        key_name,
        key_attribution,
        provider: plexus.provider,
        model: plexus.model,
        canonical_model: plexus.canonical_model,
        api_type: plexus.api_type.as_str().to_string(),
        streaming,
        input_tokens: usage.input_tokens as i64,
        output_tokens: usage.output_tokens as i64,
        cached_tokens: usage.cached_tokens.map(|v| v as i64),
        reasoning_tokens: usage.reasoning_tokens.map(|v| v as i64),
        cost_micros,
        time_to_first_token_ms: None,
        response_status,
        error_code,
    };
    if let Err(error) = state.usage.record(record).await {
        tracing::warn!(event = "usage_record_failed", %error);
    }
}
