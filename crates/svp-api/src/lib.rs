//! HTTP edge: accepts spreadsheet uploads and schema uploads, queues them
//! through the publisher, and serves task status from the data gateway.

pub mod auth;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::ApiState;

/// Tracing bootstrap for the edge binary.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
