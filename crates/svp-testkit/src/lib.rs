//! Shared fixtures, in-memory fakes, and live-backend helpers for
//! scenario tests.
//!
//! The fakes in [`fakes`] implement the storage-tier traits so repository
//! and schema-service logic is tested unconditionally, with no backend.
//! Live-backend scenarios additionally run against real backends named by
//! `SVP_TEST_DATABASE_URL` / `SVP_TEST_REDIS_URL`; when the variables are
//! absent those helpers return `None` and the scenario skips itself. Keeps
//! `cargo test` green on machines without the compose stack while the same
//! tests run for real in CI.

pub mod fakes;

pub use fakes::{InMemoryDurableTier, InMemoryHotTier, InMemorySchemaCollection};

use chrono::Utc;
use serde_json::{json, Map, Value};
use svp_config::TtlTable;
use svp_schemas::{status, FileMetadata, SchemaEnvelope, TaskRecord, ValidationEnvelope};
use svp_store::{DocStore, KvClient};
use uuid::Uuid;

pub const ENV_TEST_DB_URL: &str = "SVP_TEST_DATABASE_URL";
pub const ENV_TEST_REDIS_URL: &str = "SVP_TEST_REDIS_URL";

/// Connect to the scenario Postgres and apply migrations, or `None` when
/// no test database is configured.
pub async fn test_doc_store() -> Option<DocStore> {
    let url = std::env::var(ENV_TEST_DB_URL).ok()?;
    let store = DocStore::connect(&url, 4)
        .await
        .expect("test database unreachable");
    store.migrate().await.expect("test migrations failed");
    Some(store)
}

/// Connect to the scenario Redis, or `None` when not configured.
pub async fn test_kv_client() -> Option<KvClient> {
    let url = std::env::var(ENV_TEST_REDIS_URL).ok()?;
    Some(
        KvClient::connect(&url, TtlTable::default())
            .await
            .expect("test redis unreachable"),
    )
}

/// Unique import name per scenario run so tests never collide.
pub fn unique_import_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// The S1 schema: `{name: string, age: integer, required: [name]}`.
pub fn sample_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "age": {"type": "integer"}
        },
        "required": ["name"]
    })
}

/// A strictly larger schema than [`sample_schema`] (adds a property).
pub fn bigger_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "age": {"type": "integer"},
            "email": {"type": "string"}
        },
        "required": ["name", "email"]
    })
}

pub fn accepted_record(task_id: &str, import_name: &str) -> TaskRecord {
    let mut data = Map::new();
    data.insert("task_id".into(), json!(task_id));
    data.insert("import_name".into(), json!(import_name));
    TaskRecord::new(status::ACCEPTED, 202, "submitted").with_data(data)
}

pub fn schema_envelope(import_name: &str, schema: Value, raw: bool) -> SchemaEnvelope {
    SchemaEnvelope {
        id: Uuid::new_v4().to_string(),
        task: "upload_schema".to_string(),
        import_name: import_name.to_string(),
        schema: Some(schema),
        raw,
        date: Utc::now().to_rfc3339(),
        extra: Map::new(),
    }
}

pub fn validation_envelope(import_name: &str, csv: &str) -> ValidationEnvelope {
    ValidationEnvelope {
        id: Uuid::new_v4().to_string(),
        task: "sample_validation".to_string(),
        import_name: import_name.to_string(),
        file_data: csv.bytes().map(|b| format!("{b:02x}")).collect(),
        metadata: FileMetadata {
            filename: "sample.csv".to_string(),
            content_type: "text/csv".to_string(),
            size: csv.len() as u64,
        },
        date: Utc::now().to_rfc3339(),
        extra: Map::new(),
    }
}
