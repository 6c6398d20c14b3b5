//! svp-api entry point.

use std::sync::Arc;

use anyhow::Context;
use svp_api::{build_router, ApiState};
use svp_client::DataGatewayClient;
use svp_config::{ApiSettings, BrokerSettings, Topology};
use svp_messaging::{BrokerFactory, Publisher};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    svp_api::init_tracing();

    let settings = ApiSettings::from_env();
    let factory = BrokerFactory::new(&BrokerSettings::from_env(), Topology::from_env());
    let state = Arc::new(ApiState::new(
        Publisher::new(factory),
        DataGatewayClient::new(settings.data_gateway_url.clone()),
        settings.auth_token.clone(),
    ));

    let app = build_router(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    info!("svp-api listening on http://{}", settings.bind);
    axum::serve(tokio::net::TcpListener::bind(settings.bind).await?, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
        .context("server crashed")?;

    Ok(())
}
