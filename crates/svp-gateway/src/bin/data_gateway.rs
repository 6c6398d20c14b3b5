//! svp-data-gateway entry point.
//!
//! Thin by design: tracing, settings, connection manager, router, serve.

use std::sync::Arc;

use anyhow::Context;
use svp_config::{DocStoreSettings, GatewaySettings, KvSettings, RetryPolicy, TtlTable};
use svp_gateway::data::{build_router, DataState};
use svp_store::ConnectionManager;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience); production injects env
    // vars directly.
    let _ = dotenvy::from_filename(".env.local");

    svp_gateway::init_tracing();

    let doc_settings = DocStoreSettings::from_env()?;
    let manager = ConnectionManager::new(KvSettings::from_env(), doc_settings, TtlTable::from_env());

    // Apply migrations before accepting traffic.
    manager
        .doc(false)
        .await
        .context("initial document-store connection failed")?
        .migrate()
        .await
        .context("document-store migration failed")?;

    let state = Arc::new(DataState::new(
        manager,
        RetryPolicy::kv_from_env(),
        RetryPolicy::doc_from_env(),
    ));

    let app = build_router(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = GatewaySettings::from_env().data_bind;
    info!("svp-data-gateway listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
