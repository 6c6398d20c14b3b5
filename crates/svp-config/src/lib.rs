//! Flat-environment configuration for every SVP process.
//!
//! All processes consume `SVP_*` variables; each settings struct has a
//! `from_env()` that applies documented defaults so a bare development
//! environment boots against local containers. Nothing here reads files;
//! binaries call `dotenvy::from_filename(".env.local")` before these run.

pub mod retry;
pub mod topology;
pub mod ttl;

pub use retry::RetryPolicy;
pub use topology::{publisher_routing_key, result_routing_key, Topology};
pub use ttl::TtlTable;

use std::net::SocketAddr;

// ---------------------------------------------------------------------------
// Env helpers
// ---------------------------------------------------------------------------

pub(crate) fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Backing-store settings
// ---------------------------------------------------------------------------

/// Broker connection parameters (`SVP_BROKER_*`).
#[derive(Clone, Debug)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub virtual_host: String,
}

impl BrokerSettings {
    pub fn from_env() -> Self {
        Self {
            host: env_or("SVP_BROKER_HOST", "localhost"),
            port: env_parse("SVP_BROKER_PORT", 5672),
            username: env_or("SVP_BROKER_USER", "guest"),
            password: env_or("SVP_BROKER_PASSWORD", "guest"),
            virtual_host: env_or("SVP_BROKER_VHOST", "/"),
        }
    }

    pub fn amqp_uri(&self) -> String {
        // lapin expects the vhost percent-encoded; "/" is the default vhost.
        let vhost = if self.virtual_host == "/" {
            "%2f".to_string()
        } else {
            self.virtual_host.clone()
        };
        format!(
            "amqp://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, vhost
        )
    }
}

/// Hot-tier KV settings (`SVP_REDIS_*`).
#[derive(Clone, Debug)]
pub struct KvSettings {
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub password: Option<String>,
}

impl KvSettings {
    pub fn from_env() -> Self {
        Self {
            host: env_or("SVP_REDIS_HOST", "localhost"),
            port: env_parse("SVP_REDIS_PORT", 6379),
            db: env_parse("SVP_REDIS_DB", 0),
            password: std::env::var("SVP_REDIS_PASSWORD").ok(),
        }
    }

    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => {
                format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db)
            }
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

pub const ENV_DOC_URL: &str = "SVP_DATABASE_URL";

/// Durable document-tier settings.
#[derive(Clone, Debug)]
pub struct DocStoreSettings {
    pub url: String,
    pub max_connections: u32,
}

impl DocStoreSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        let url = std::env::var(ENV_DOC_URL)
            .map_err(|_| anyhow::anyhow!("missing env var {ENV_DOC_URL}"))?;
        Ok(Self {
            url,
            max_connections: env_parse("SVP_DATABASE_MAX_CONNECTIONS", 10),
        })
    }
}

// ---------------------------------------------------------------------------
// Process settings
// ---------------------------------------------------------------------------

/// Worker tuning (`SVP_WORKER_*`).
#[derive(Clone, Debug)]
pub struct WorkerSettings {
    /// Broker QoS prefetch for each consumer.
    pub prefetch_count: u16,
    /// Capacity of the in-process message queue (load-shedding bound).
    pub queue_capacity: usize,
    /// Validation chunk parallelism.
    pub max_validators: usize,
}

impl WorkerSettings {
    pub fn from_env() -> Self {
        Self {
            prefetch_count: env_parse("SVP_WORKER_PREFETCH_COUNT", 10),
            queue_capacity: env_parse("SVP_WORKER_QUEUE_CAPACITY", 1024),
            max_validators: env_parse("SVP_WORKER_MAX_VALIDATORS", 4),
        }
    }
}

fn bind_from_env(key: &str, default: &str) -> SocketAddr {
    env_or(key, default)
        .parse()
        .unwrap_or_else(|_| default.parse().expect("default bind address is valid"))
}

/// Listen addresses and peer URLs for the two gateways and the edge.
#[derive(Clone, Debug)]
pub struct GatewaySettings {
    pub data_bind: SocketAddr,
    pub messaging_bind: SocketAddr,
}

impl GatewaySettings {
    pub fn from_env() -> Self {
        Self {
            data_bind: bind_from_env("SVP_DATA_GATEWAY_ADDR", "127.0.0.1:50051"),
            messaging_bind: bind_from_env("SVP_MESSAGING_GATEWAY_ADDR", "127.0.0.1:50052"),
        }
    }
}

/// HTTP edge settings (`SVP_API_*`).
#[derive(Clone, Debug)]
pub struct ApiSettings {
    pub bind: SocketAddr,
    /// Static bearer token; requests without it get 403.
    pub auth_token: Option<String>,
    pub data_gateway_url: String,
}

impl ApiSettings {
    pub fn from_env() -> Self {
        Self {
            bind: bind_from_env("SVP_API_ADDR", "127.0.0.1:8000"),
            auth_token: std::env::var("SVP_API_AUTH_TOKEN").ok(),
            data_gateway_url: env_or("SVP_DATA_GATEWAY_URL", "http://127.0.0.1:50051"),
        }
    }
}

/// Autoscaler control-loop settings (`SVP_AUTOSCALER_*`).
#[derive(Clone, Debug)]
pub struct AutoscalerSettings {
    pub check_interval_secs: u64,
    pub cooldown_period_secs: u64,
    pub metric_window_secs: u64,
    pub prometheus_url: String,
    /// Only services in this Swarm stack are considered; empty = all.
    pub stack_name: String,
    pub default_min_replicas: u64,
    pub default_max_replicas: i64,
}

impl AutoscalerSettings {
    pub fn from_env() -> Self {
        Self {
            check_interval_secs: env_parse("SVP_AUTOSCALER_CHECK_INTERVAL", 30),
            cooldown_period_secs: env_parse("SVP_AUTOSCALER_COOLDOWN_PERIOD", 120),
            metric_window_secs: env_parse("SVP_AUTOSCALER_METRIC_WINDOW", 60),
            prometheus_url: env_or("SVP_PROMETHEUS_URL", "http://localhost:9090"),
            stack_name: env_or("SVP_AUTOSCALER_STACK", ""),
            default_min_replicas: env_parse("SVP_AUTOSCALER_DEFAULT_MIN", 1),
            default_max_replicas: env_parse("SVP_AUTOSCALER_DEFAULT_MAX", 3),
        }
    }
}
