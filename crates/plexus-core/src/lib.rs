//! The HTTP composition layer (spec §2): wires routing, dispatch,
//! transforms, storage, and the A2A engine from the lower crates into one
//! axum `Router`, the same role the teacher's `gproxy-router` + `gproxy-core`
//! crates split between them — here kept as a single crate since the
//! surface is smaller (inference dialects + A2A + a minimal admin API, no
//! provider-management UI).

pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod streaming;

pub use bootstrap::{bootstrap, bootstrap_from_env, Bootstrap, CliArgs};
pub use state::AppState;

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::Router;

/// Builds the full router: inference dialects, A2A, and admin, each with
/// its own auth/rate-limit wrapping via [`middleware`].
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::inference::router())
        .merge(routes::a2a::router())
        .merge(routes::admin::router())
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit))
        .layer(from_fn_with_state(state.clone(), middleware::authenticate))
        .with_state(state)
}
