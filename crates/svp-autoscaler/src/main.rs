//! svp-autoscaler entry point.

use svp_autoscaler::monitor::Monitor;
use svp_config::AutoscalerSettings;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let docker = bollard::Docker::connect_with_local_defaults()?;
    let mut monitor = Monitor::new(docker, AutoscalerSettings::from_env());

    tokio::select! {
        _ = monitor.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("autoscaler stopped by user");
        }
    }
    Ok(())
}
