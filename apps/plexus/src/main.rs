//! The `plexus` binary: parses CLI/env config, boots storage and runtime
//! state, and serves the HTTP surface. Mirrors the teacher's slim
//! `apps/gproxy/src/main.rs` entry point — the composition work lives in
//! the library crate, not here.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let boot = plexus_core::bootstrap_from_env().await?;
    let app = plexus_core::build_router(boot.state);

    let bind = format!("{}:{}", boot.host, boot.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(event = "plexus_listening", addr = %bind);
    axum::serve(listener, app).await?;
    Ok(())
}
