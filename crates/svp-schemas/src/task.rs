//! Task identity and lifecycle records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// TaskKind
// ---------------------------------------------------------------------------

/// The two task families the pipeline tracks. `(task_id, kind)` is the
/// globally unique task identity; the kind also prefixes every KV key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Schemas,
    Validation,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Schemas => "schemas",
            TaskKind::Validation => "validation",
        }
    }

    /// KV hash key for a single task: `{kind}:task:{task_id}`.
    pub fn task_key(&self, task_id: &str) -> String {
        format!("{}:task:{}", self.as_str(), task_id)
    }

    /// KV set key grouping task ids by import name:
    /// `{kind}:import:{import_name}:tasks`.
    pub fn import_key(&self, import_name: &str) -> String {
        format!("{}:import:{}:tasks", self.as_str(), import_name)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "schemas" => Ok(TaskKind::Schemas),
            "validation" => Ok(TaskKind::Validation),
            other => Err(format!("unknown task kind: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Status taxonomy
// ---------------------------------------------------------------------------

/// The closed status set the TTL table keys on.
///
/// Statuses travel as plain strings (the hot tier stores them in hash
/// fields); these constants are the single place the full set is spelled
/// out. Anything outside this set falls back to the default TTL.
pub mod status {
    pub const ACCEPTED: &str = "accepted";
    pub const RECEIVED_SAMPLE_VALIDATION: &str = "received-sample-validation";
    pub const PROCESSING_FILE: &str = "processing-file";
    pub const VALIDATING_FILE: &str = "validating-file";
    pub const RECEIVED_SCHEMA_UPDATE: &str = "received-schema-update";
    pub const RECEIVED_REMOVING_SCHEMA: &str = "received-removing-schema";
    pub const CREATING_SCHEMA: &str = "creating-schema";
    pub const SCHEMA_CREATED: &str = "schema-created";
    pub const SAVING_SCHEMA: &str = "saving-schema";
    pub const REMOVING_SCHEMA: &str = "removing-schema";
    pub const SUCCESS: &str = "success";
    pub const WARNING: &str = "warning";
    pub const COMPLETED: &str = "completed";
    pub const PUBLISHED: &str = "published";
    pub const FAILED_PUBLISHING_RESULT: &str = "failed-publishing-result";
    pub const FAILED_CREATING_SCHEMA: &str = "failed-creating-schema";
    pub const FAILED_SAVING_SCHEMA: &str = "failed-saving-schema";
    pub const FAILED_REMOVING_SCHEMA: &str = "failed-removing-schema";
    pub const ERROR: &str = "error";

    /// In-flight statuses: short TTL.
    pub const PROCESSING: &[&str] = &[
        RECEIVED_SAMPLE_VALIDATION,
        PROCESSING_FILE,
        VALIDATING_FILE,
        RECEIVED_SCHEMA_UPDATE,
        RECEIVED_REMOVING_SCHEMA,
        CREATING_SCHEMA,
        SCHEMA_CREATED,
        SAVING_SCHEMA,
        REMOVING_SCHEMA,
        SUCCESS,
        WARNING,
    ];

    /// Failure statuses: retained longer for postmortems.
    pub const FAILED: &[&str] = &[
        ERROR,
        FAILED_PUBLISHING_RESULT,
        FAILED_CREATING_SCHEMA,
        FAILED_SAVING_SCHEMA,
        FAILED_REMOVING_SCHEMA,
    ];
}

// ---------------------------------------------------------------------------
// TaskRecord
// ---------------------------------------------------------------------------

/// The task record as returned to API clients and cached in both stores.
///
/// `data` is a free-form object merged field-wise on updates unless the
/// caller resets it. `code` is HTTP-aligned (202 accepted, 500 error, ...).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub status: String,
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl TaskRecord {
    pub fn new(status: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            code,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// The import name carried in `data`, or `"default"` when absent.
    pub fn import_name(&self) -> &str {
        self.data
            .get("import_name")
            .and_then(Value::as_str)
            .unwrap_or("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kv_keys_carry_kind_prefix() {
        assert_eq!(
            TaskKind::Schemas.task_key("abc"),
            "schemas:task:abc".to_string()
        );
        assert_eq!(
            TaskKind::Validation.import_key("u1"),
            "validation:import:u1:tasks".to_string()
        );
    }

    #[test]
    fn task_kind_round_trips_through_str() {
        for kind in [TaskKind::Schemas, TaskKind::Validation] {
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
        }
        assert!("ddl".parse::<TaskKind>().is_err());
    }

    #[test]
    fn import_name_defaults_when_missing() {
        let mut record = TaskRecord::new(status::ACCEPTED, 202, "ok");
        assert_eq!(record.import_name(), "default");

        record
            .data
            .insert("import_name".into(), json!("customers"));
        assert_eq!(record.import_name(), "customers");
    }
}
