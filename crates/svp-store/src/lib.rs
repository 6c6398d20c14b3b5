//! Dual-tier task and schema-document storage.
//!
//! The hot tier is Redis (task hashes with status-driven TTLs, import-name
//! sets); the durable tier is Postgres (JSONB documents). `tasks` glues the
//! two into the read-through repository, `manager` owns the per-process
//! connections with health-checked reconnection, and `retry` wraps every
//! gateway operation in a bounded transient-error retry.

pub mod doc;
pub mod error;
pub mod kv;
pub mod manager;
pub mod retry;
pub mod schemas;
pub mod tasks;

pub use doc::DocStore;
pub use error::StoreError;
pub use kv::KvClient;
pub use manager::ConnectionManager;
pub use retry::execute_with_retry;
pub use schemas::{SchemaCollection, SchemaService};
pub use tasks::{TaskDurableTier, TaskHotTier, TaskRepository};
