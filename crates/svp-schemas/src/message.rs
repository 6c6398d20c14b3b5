//! Broker message envelopes and messaging-gateway parameter types.
//!
//! Envelopes are JSON on the wire. Workers reject anything that fails to
//! deserialize into these shapes (NACK without requeue).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// Upload metadata forwarded alongside a validation payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// Schema-update / schema-removal message published to `schemas.*`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaEnvelope {
    /// Task id assigned by the publisher.
    pub id: String,
    /// Operation: `upload_schema` or `remove_schema`.
    pub task: String,
    pub import_name: String,
    /// The schema body; absent for removals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// `true` when `schema` is a full draft-07 document rather than a
    /// property map to synthesize one from.
    #[serde(default)]
    pub raw: bool,
    /// ISO-8601 submission timestamp.
    pub date: String,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// File-validation message published to `validation.*`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationEnvelope {
    pub id: String,
    /// Operation: `sample_validation`.
    pub task: String,
    pub import_name: String,
    /// Raw file bytes, lowercase hex.
    pub file_data: String,
    pub metadata: FileMetadata,
    /// ISO-8601 submission timestamp.
    pub date: String,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Result messages (published to the `*.result.*` keys)
// ---------------------------------------------------------------------------

/// Outcome of a schema worker run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaTaskResult {
    pub task_id: String,
    pub status: String,
    pub import_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Store response or error description for the save/remove step.
    pub result: Value,
}

/// Outcome of a validation worker run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationTaskResult {
    pub task_id: String,
    pub status: String,
    pub import_name: String,
    /// Validation report (`is_valid`, counts, capped error list, summary).
    pub result: Value,
}

// ---------------------------------------------------------------------------
// Messaging parameters (gateway surface)
// ---------------------------------------------------------------------------

/// One durable queue bound to the exchange with a routing-key pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueBinding {
    pub queue: String,
    pub routing_key: String,
    pub durable: bool,
}

/// Broker connection + topology parameters served by the messaging gateway
/// so edge processes can publish without their own topology config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessagingParams {
    pub host: String,
    pub port: u16,
    pub virtual_host: String,
    pub username: String,
    pub exchange: String,
    pub queues: Vec<QueueBinding>,
}
