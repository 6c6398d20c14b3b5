//! Request/response types for the data-gateway surface.
//!
//! These are the wire shapes of every task and schema-document operation;
//! the gateway deserializes them, the client crate serializes them, and the
//! store crate consumes them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::task::{TaskKind, TaskRecord};

// ---------------------------------------------------------------------------
// Task operations
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetTaskRequest {
    pub task_id: String,
    pub task: TaskKind,
    pub value: TaskRecord,
}

/// Single-field task mutation. When `field == "status"` the hot-tier TTL is
/// re-derived from the new value; `data` merges into the existing object
/// unless `reset_data` is set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    pub task_id: String,
    pub task: TaskKind,
    pub field: String,
    pub value: Value,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default)]
    pub reset_data: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateTaskResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetTaskResponse {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<TaskRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TasksByImportResponse {
    pub tasks: Vec<TaskRecord>,
}

// ---------------------------------------------------------------------------
// Schema documents
// ---------------------------------------------------------------------------

/// One archived release of a previously active schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaRelease {
    pub schema: Value,
    pub created_at: DateTime<Utc>,
}

/// The stored schema document: the current active schema plus the ordered
/// release history (newest at the end).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub import_name: String,
    pub active_schema: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub schemas_releases: Vec<SchemaRelease>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InsertSchemaRequest {
    pub import_name: String,
    pub active_schema: Value,
    pub created_at: DateTime<Utc>,
}

/// Outcome of an insert/update/delete against the schema collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaWriteStatus {
    Inserted,
    Updated,
    NoChange,
    Deleted,
    Reverted,
    Found,
    NotFound,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InsertSchemaResponse {
    pub status: SchemaWriteStatus,
    #[serde(default)]
    pub result: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FindSchemaResponse {
    pub status: SchemaWriteStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDocument>,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteSchemaResponse {
    pub success: bool,
    pub message: String,
    pub status: SchemaWriteStatus,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CountDocumentsResponse {
    /// `-1` when the count could not be taken.
    pub amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_write_status_uses_snake_case_wire_form() {
        assert_eq!(
            serde_json::to_value(SchemaWriteStatus::NoChange).unwrap(),
            json!("no_change")
        );
        assert_eq!(
            serde_json::from_value::<SchemaWriteStatus>(json!("reverted")).unwrap(),
            SchemaWriteStatus::Reverted
        );
    }

    #[test]
    fn update_request_defaults_are_additive() {
        let wire = json!({
            "task_id": "t-1",
            "task": "schemas",
            "field": "status",
            "value": "completed"
        });
        let request: UpdateTaskRequest = serde_json::from_value(wire).unwrap();
        assert!(request.message.is_empty());
        assert!(request.data.is_none());
        assert!(!request.reset_data);
    }
}
