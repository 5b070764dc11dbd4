//! The A2A (agent-to-agent) task-orchestration surface (spec §4.7, §6
//! "A2A HTTP surface"): agent-card discovery, task submission with
//! idempotent replay, task lifecycle reads/cancellation, event-stream
//! subscription with replay, and push-notification-config management.
//! Event streaming reuses the channel-plus-heartbeat shape the teacher's
//! `gproxy-router/src/proxy.rs` uses for inference SSE, adapted here for
//! task events instead of model output.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Extension, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use plexus_a2a::{A2aPushConfig, A2aTask, A2aTaskEvent, PushAuthentication, Scope};
use plexus_common::ErrorCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::Identity;
use crate::error::GatewayError;
use crate::state::AppState;

const A2A_PROTOCOL_VERSIONS: &[&str] = &["0.3", "0.3.0"];
const MESSAGE_STREAM_IDLE_CLOSE: Duration = Duration::from_secs(5);
const CHANNEL_CAPACITY: usize = 32;

pub fn router() -> Router<Arc<AppState>> {
    let well_known = Router::new().route("/.well-known/agent-card.json", get(agent_card));

    let protected = Router::new()
        .route("/a2a/extendedAgentCard", get(extended_agent_card))
        .route("/a2a/message/send", post(message_send))
        .route("/a2a/message/stream", post(message_stream))
        .route("/a2a/tasks", get(list_tasks))
        .route("/a2a/tasks/{taskId}", get(get_task))
        .route("/a2a/tasks/{taskId}/cancel", post(cancel_task))
        .route("/a2a/tasks/{taskId}/subscribe", get(subscribe_task).post(subscribe_task))
        .route(
            "/a2a/tasks/{taskId}/pushNotificationConfigs",
            get(list_push_configs).post(upsert_push_config),
        )
        .route(
            "/a2a/tasks/{taskId}/pushNotificationConfigs/{configId}",
            get(get_push_config).delete(delete_push_config),
        )
        .route_layer(from_fn(require_a2a_version));

    well_known.merge(protected)
}

/// Every `/a2a/*` route requires a recognized protocol version header
/// (spec §6 "A2A HTTP surface ... require header `A2A-Version: 0.3` or
/// `0.3.0`"); `/.well-known/agent-card.json` is outside this router and
/// unaffected.
async fn require_a2a_version(req: Request, next: Next) -> Response {
    let version = req
        .headers()
        .get("a2a-version")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !A2A_PROTOCOL_VERSIONS.contains(&version) {
        return GatewayError::new(ErrorCode::InvalidRequest, "missing or unsupported A2A-Version header")
            .into_response();
    }
    next.run(req).await
}

fn scope_of(identity: &Identity) -> Scope {
    match identity {
        Identity::Admin => Scope::admin(),
        Identity::Key { key_name, attribution } => Scope::user(key_name.clone(), attribution.clone()),
    }
}

async fn agent_card() -> Json<Value> {
    Json(json!({
        "name": "plexus",
        "description": "Multi-tenant LLM routing gateway with A2A task orchestration",
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": "0.3.0",
        "capabilities": { "streaming": true, "pushNotifications": true },
        "defaultInputModes": ["text"],
        "defaultOutputModes": ["text"],
        "skills": [],
    }))
}

async fn extended_agent_card(State(state): State<Arc<AppState>>) -> Json<Value> {
    let routing = state.routing.load();
    Json(json!({
        "name": "plexus",
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": "0.3.0",
        "capabilities": { "streaming": true, "pushNotifications": true },
        "routedModels": routing.models.iter().map(|m| m.id.clone()).collect::<Vec<_>>(),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageSendRequest {
    agent_id: String,
    message: Value,
    #[serde(default)]
    context_id: Option<String>,
    #[serde(default)]
    metadata: Value,
    #[serde(default)]
    configuration: MessageSendConfiguration,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageSendConfiguration {
    idempotency_key: Option<String>,
}

async fn message_send(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<MessageSendRequest>,
) -> Result<Json<Value>, GatewayError> {
    let scope = scope_of(&identity);
    let task = state
        .a2a
        .submit_task(
            &scope,
            &request.agent_id,
            request.context_id,
            request.message,
            request.metadata,
            request.configuration.idempotency_key.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "task": task_json(&task) })))
}

async fn message_stream(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<MessageSendRequest>,
) -> Result<Response, GatewayError> {
    let scope = scope_of(&identity);
    let task = state
        .a2a
        .submit_task(
            &scope,
            &request.agent_id,
            request.context_id,
            request.message,
            request.metadata,
            request.configuration.idempotency_key.as_deref(),
        )
        .await?;
    Ok(sse_response(task_event_stream(
        state,
        task.id,
        0,
        Some(MESSAGE_STREAM_IDLE_CLOSE),
    )))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>, GatewayError> {
    let scope = scope_of(&identity);
    let tasks = state.a2a.list_tasks(&scope).await?;
    Ok(Json(json!({ "tasks": tasks.iter().map(task_json).collect::<Vec<_>>() })))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let scope = scope_of(&identity);
    let task = state.a2a.get_task(&scope, &task_id).await?;
    Ok(Json(json!({ "task": task_json(&task) })))
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let scope = scope_of(&identity);
    let task = state.a2a.cancel_task(&scope, &task_id).await?;
    Ok(Json(json!({ "task": task_json(&task) })))
}

#[derive(Debug, Default, Deserialize)]
struct SubscribeQuery {
    #[serde(rename = "afterSequence")]
    after_sequence: Option<i64>,
}

async fn subscribe_task(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(task_id): Path<String>,
    Query(query): Query<SubscribeQuery>,
    req: Request,
) -> Result<Response, GatewayError> {
    let scope = scope_of(&identity);
    // Confirms existence and ownership before opening the stream; the
    // task itself is not re-fetched by the stream loop.
    state.a2a.get_task(&scope, &task_id).await?;

    let last_event_id = req
        .headers()
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok());
    let after_sequence = last_event_id.or(query.after_sequence).unwrap_or(0);

    Ok(sse_response(task_event_stream(state, task_id, after_sequence, None)))
}

fn sse_response(body: Body) -> Response {
    ([(CONTENT_TYPE, "text/event-stream")], body).into_response()
}

/// Replays every stored event with `sequence > after_sequence`, then
/// forwards live events from the bus, skipping any whose sequence was
/// already replayed (spec §8 "SSE resumption: ... with no duplicates").
/// When `idle_close` is set, the stream ends once that much time passes
/// with no new event and the task is already in a terminal state (spec
/// §5 "SSE auto-close for `message/stream`").
fn task_event_stream(
    state: Arc<AppState>,
    task_id: String,
    after_sequence: i64,
    idle_close: Option<Duration>,
) -> Body {
    let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
    tokio::spawn(run_task_event_stream(state, task_id, after_sequence, idle_close, tx));
    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Body::from_stream(stream)
}

async fn run_task_event_stream(
    state: Arc<AppState>,
    task_id: String,
    after_sequence: i64,
    idle_close: Option<Duration>,
    tx: mpsc::Sender<Bytes>,
) {
    let mut receiver = state.a2a.subscribe(&task_id);
    let mut last_sent_sequence = after_sequence;

    let history = match state.a2a.list_events(&task_id, after_sequence, 1000).await {
        Ok(events) => events,
        Err(error) => {
            tracing::warn!(event = "a2a_event_replay_failed", task_id = %task_id, %error);
            Vec::new()
        }
    };
    for event in &history {
        if send_event(&tx, event).await.is_err() {
            return;
        }
        last_sent_sequence = last_sent_sequence.max(event.sequence);
    }

    loop {
        let next = match idle_close {
            Some(timeout) => tokio::time::timeout(timeout, receiver.recv()).await,
            None => Ok(receiver.recv().await),
        };
        match next {
            Ok(Ok(event)) => {
                if event.sequence <= last_sent_sequence {
                    continue;
                }
                if send_event(&tx, &event).await.is_err() {
                    return;
                }
                last_sent_sequence = event.sequence;
            }
            Ok(Err(tokio::sync::broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(tokio::sync::broadcast::error::RecvError::Closed)) => return,
            Err(_) => {
                // idle timeout elapsed; close only if the task has already
                // reached a terminal state, otherwise keep waiting.
                let terminal = matches!(
                    state.a2a.get_task(&Scope::admin(), &task_id).await,
                    Ok(task) if task.status_state.is_terminal()
                );
                if terminal {
                    return;
                }
            }
        }
    }
}

async fn send_event(tx: &mpsc::Sender<Bytes>, event: &A2aTaskEvent) -> Result<(), ()> {
    let data = event.payload.to_string();
    let frame = plexus_protocol::sse::render_event(Some(&event.event_type), &data, Some(event.sequence as u64));
    tx.send(Bytes::from(frame)).await.map_err(|_| ())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertPushConfigRequest {
    config_id: String,
    endpoint: String,
    #[serde(default)]
    authentication: Option<PushAuthentication>,
    #[serde(default)]
    metadata: Value,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

async fn upsert_push_config(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(task_id): Path<String>,
    Json(request): Json<UpsertPushConfigRequest>,
) -> Result<Json<Value>, GatewayError> {
    let scope = scope_of(&identity);
    state
        .a2a
        .upsert_push_config(
            &scope,
            &task_id,
            &request.config_id,
            &request.endpoint,
            request.authentication,
            request.metadata,
            request.enabled,
        )
        .await?;
    Ok(Json(json!({ "ok": true })))
}

async fn list_push_configs(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let scope = scope_of(&identity);
    let configs = state.a2a.list_push_configs(&scope, &task_id).await?;
    Ok(Json(json!({ "pushNotificationConfigs": configs.iter().map(push_config_json).collect::<Vec<_>>() })))
}

async fn get_push_config(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((task_id, config_id)): Path<(String, String)>,
) -> Result<Json<Value>, GatewayError> {
    let scope = scope_of(&identity);
    let configs = state.a2a.list_push_configs(&scope, &task_id).await?;
    let found = configs
        .into_iter()
        .find(|c| c.config_id == config_id)
        .ok_or_else(|| GatewayError::new(ErrorCode::TaskNotFound, "push notification config not found"))?;
    Ok(Json(push_config_json(&found)))
}

async fn delete_push_config(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((task_id, config_id)): Path<(String, String)>,
) -> Result<Json<Value>, GatewayError> {
    let scope = scope_of(&identity);
    state.a2a.delete_push_config(&scope, &task_id, &config_id).await?;
    Ok(Json(json!({ "ok": true })))
}

fn task_json(task: &A2aTask) -> Value {
    json!({
        "id": task.id,
        "contextId": task.context_id,
        "ownerKey": task.owner_key,
        "ownerAttribution": task.owner_attribution,
        "agentId": task.agent_id,
        "status": {
            "state": task.status_state.as_str(),
            "timestamp": task.status_timestamp.unix_timestamp(),
            "message": task.status_message,
        },
        "artifacts": task.artifacts,
        "metadata": task.metadata,
        "errorCode": task.error_code,
        "errorMessage": task.error_message,
        "submittedAt": task.submitted_at.unix_timestamp(),
        "startedAt": task.started_at.map(|t| t.unix_timestamp()),
        "completedAt": task.completed_at.map(|t| t.unix_timestamp()),
        "canceledAt": task.canceled_at.map(|t| t.unix_timestamp()),
        "createdAt": task.created_at.unix_timestamp(),
        "updatedAt": task.updated_at.unix_timestamp(),
    })
}

fn push_config_json(config: &A2aPushConfig) -> Value {
    json!({
        "taskId": config.task_id,
        "configId": config.config_id,
        "endpoint": config.endpoint,
        "authentication": config.authentication,
        "metadata": config.metadata,
        "enabled": config.enabled,
    })
}
