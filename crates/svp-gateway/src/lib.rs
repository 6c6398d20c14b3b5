//! The two RPC gateways.
//!
//! `data` fronts both stores with per-operation bounded retry; `messaging`
//! hosts the queue workers and streams their buffered messages to
//! subscribers. Both expose plain HTTP/JSON surfaces (streaming via SSE);
//! binaries stay thin and live under `src/bin/`.

pub mod data;
pub mod messaging;

/// Tracing bootstrap shared by both gateway binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
