//! svp-messaging-gateway entry point.
//!
//! Hosts the result-queue workers and serves the streaming surface.
//! Shutdown order: signal → stop workers → close broker connections
//! (inside the workers) → stop the HTTP server.

use std::sync::Arc;

use anyhow::Context;
use svp_config::{BrokerSettings, GatewaySettings, RetryPolicy, Topology, WorkerSettings};
use svp_gateway::messaging::{build_router, MessagingState, WorkerManager};
use svp_messaging::BrokerFactory;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    svp_gateway::init_tracing();

    let broker = BrokerSettings::from_env();
    let topology = Topology::from_env();
    let worker_settings = WorkerSettings::from_env();
    let factory = BrokerFactory::new(&broker, topology.clone());

    let manager = WorkerManager::new(
        &factory,
        RetryPolicy::broker_from_env(),
        worker_settings.prefetch_count,
        worker_settings.queue_capacity,
    );
    manager.start_workers();

    let state = Arc::new(MessagingState {
        manager,
        broker,
        topology,
    });

    let app = build_router(Arc::clone(&state)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = GatewaySettings::from_env().messaging_bind;
    info!("svp-messaging-gateway listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
        .await
        .context("server crashed")?;

    Ok(())
}

async fn shutdown_signal(state: Arc<MessagingState>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, stopping workers");
    state.manager.stop_workers();
}
