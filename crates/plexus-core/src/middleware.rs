//! Request-scoped middleware: key/admin auth, then per-route rate
//! limiting (spec §4.6, §4.9). Mirrors the teacher's
//! `middleware::from_fn_with_state`-wrapped `admin_auth` layer
//! (`gproxy-router/src/admin.rs`), generalized to cover every route
//! instead of just `/admin/*`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use plexus_common::ErrorCode;

use crate::auth::{self, Identity};
use crate::error::GatewayError;
use crate::state::AppState;

/// Paths a client must be able to reach with no credentials at all: the
/// A2A agent-card discovery document is, by design, public (spec §4.7
/// "agent-card.json is served with no auth").
const PUBLIC_PATHS: &[&str] = &["/.well-known/agent-card.json"];

pub async fn authenticate(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    let auth_table = state.auth.load();
    match auth::authenticate(&auth_table, &state.admin_key_hash, req.headers()) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

pub async fn rate_limit(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    let identity = req.extensions().get::<Identity>().cloned();
    let Some(identity) = identity else {
        // No identity means `authenticate` let this request through
        // unauthenticated (a public path); rate limiting doesn't apply.
        return next.run(req).await;
    };

    let path = req.uri().path().to_string();
    let decision = state.rate_limiter.check(identity.rate_limit_key(), &path);
    if !decision.allowed {
        let retry_after = decision.retry_after_seconds.unwrap_or(1);
        let err = GatewayError::new(ErrorCode::RateLimited, "rate limit exceeded");
        let mut response = err.into_response();
        if let Ok(value) = retry_after.to_string().parse::<http::HeaderValue>() {
            response.headers_mut().insert("retry-after", value);
        }
        return response;
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    if let Ok(value) = decision.limit.to_string().parse::<http::HeaderValue>() {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = decision.remaining.to_string().parse::<http::HeaderValue>() {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = decision.reset_at_ms.to_string().parse::<http::HeaderValue>() {
        headers.insert("x-ratelimit-reset", value);
    }
    response
}
