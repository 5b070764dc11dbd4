//! Minimal read-only admin surface (SPEC_FULL §4.9). Grounded in the
//! teacher's `gproxy-router/src/admin.rs` router-assembly shape, but this
//! gateway's provider/model topology is config-as-code (spec §3) rather
//! than admin-API-managed, so there is no provider/credential CRUD here —
//! only inspection of the two pieces of runtime state an operator actually
//! needs to see: cooldowns and usage. A cooldown can also be cleared,
//! mirroring `CooldownManager::clear` having an obvious operational use.

use std::sync::Arc;

use axum::extract::{Extension, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use plexus_common::ErrorCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Identity;
use crate::error::GatewayError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/cooldowns", get(list_cooldowns))
        .route("/admin/cooldowns/clear", post(clear_cooldown))
        .route("/admin/usage", get(usage_summary))
        .route("/admin/a2a/tasks", get(list_a2a_tasks))
}

fn require_admin(identity: &Identity) -> Result<(), GatewayError> {
    match identity {
        Identity::Admin => Ok(()),
        Identity::Key { .. } => Err(GatewayError::new(ErrorCode::Forbidden, "admin key required")),
    }
}

async fn list_cooldowns(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>, GatewayError> {
    require_admin(&identity)?;
    let rows: Vec<Value> = state
        .cooldowns
        .snapshot()
        .into_iter()
        .map(|(key, row)| {
            json!({
                "provider": key.provider,
                "model": key.model,
                "account": if key.account.is_empty() { None } else { Some(key.account) },
                "expiry_epoch_ms": row.expiry_epoch_ms,
            })
        })
        .collect();
    Ok(Json(json!({ "cooldowns": rows })))
}

#[derive(Debug, Deserialize)]
struct ClearCooldownRequest {
    provider: String,
    model: Option<String>,
    account: Option<String>,
}

async fn clear_cooldown(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<ClearCooldownRequest>,
) -> Result<Response, GatewayError> {
    require_admin(&identity)?;
    state
        .cooldowns
        .clear(&request.provider, request.model.as_deref(), request.account.as_deref())
        .await;
    Ok(Json(json!({ "ok": true })).into_response())
}

#[derive(Debug, Deserialize)]
struct UsageQuery {
    #[serde(default = "default_usage_limit")]
    limit: u64,
}

fn default_usage_limit() -> u64 {
    50
}

async fn usage_summary(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Value>, GatewayError> {
    require_admin(&identity)?;
    let aggregate = state
        .usage
        .aggregate(plexus_storage::UsageAggregateFilter::default())
        .await
        .map_err(|e| GatewayError::new(ErrorCode::InternalError, e.to_string()))?;
    let recent = state
        .usage
        .recent(query.limit)
        .await
        .map_err(|e| GatewayError::new(ErrorCode::InternalError, e.to_string()))?;
    Ok(Json(json!({
        "aggregate": {
            "matched_rows": aggregate.matched_rows,
            "input_tokens": aggregate.input_tokens,
            "output_tokens": aggregate.output_tokens,
            "total_cost_micros": aggregate.total_cost_micros,
        },
        "recent": recent.iter().map(|r| json!({
            "trace_id": r.trace_id,
            "key_name": r.key_name,
            "provider": r.provider,
            "model": r.model,
            "streaming": r.streaming,
            "input_tokens": r.input_tokens,
            "output_tokens": r.output_tokens,
            "response_status": r.response_status,
        })).collect::<Vec<_>>(),
    })))
}

async fn list_a2a_tasks(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Value>, GatewayError> {
    require_admin(&identity)?;
    let tasks = state.a2a.list_tasks(&plexus_a2a::Scope::admin()).await?;
    Ok(Json(json!({ "tasks": tasks.iter().map(task_summary).collect::<Vec<_>>() })))
}

fn task_summary(task: &plexus_a2a::A2aTask) -> Value {
    json!({
        "id": task.id,
        "owner_key": task.owner_key,
        "agent_id": task.agent_id,
        "status": format!("{:?}", task.status_state),
        "submitted_at": task.submitted_at,
        "updated_at": task.updated_at,
    })
}
