//! svp-worker entry point: consumes the request queues and runs the
//! schema and validation flows against the data gateway.

use svp_client::DataGatewayClient;
use svp_config::{ApiSettings, BrokerSettings, RetryPolicy, Topology, WorkerSettings};
use svp_messaging::BrokerFactory;
use svp_worker::DomainWorkerManager;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let broker = BrokerSettings::from_env();
    let topology = Topology::from_env();
    let factory = BrokerFactory::new(&broker, topology);
    let client = DataGatewayClient::new(ApiSettings::from_env().data_gateway_url);

    let manager = DomainWorkerManager::new(
        factory,
        RetryPolicy::broker_from_env(),
        WorkerSettings::from_env(),
        client,
    );
    manager.start_workers();
    info!("svp-worker running");

    wait_for_shutdown().await;
    info!("shutdown signal received, stopping workers");
    manager.stop_workers();

    // Give in-flight processors a moment to drain before exit.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
