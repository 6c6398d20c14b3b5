//! Shared wire and domain types for the SVP pipeline.
//!
//! Everything that crosses a process boundary lives here: task records,
//! broker message envelopes, and the request/response types of the data
//! gateway surface. All types are plain serde structs; no I/O.

pub mod message;
pub mod store;
pub mod task;

pub use message::{
    FileMetadata, MessagingParams, QueueBinding, SchemaEnvelope, SchemaTaskResult,
    ValidationEnvelope, ValidationTaskResult,
};
pub use store::{
    CountDocumentsResponse, DeleteSchemaResponse, FindSchemaResponse, GetTaskResponse,
    InsertSchemaRequest, InsertSchemaResponse, SchemaDocument, SchemaRelease, SchemaWriteStatus,
    SetTaskRequest, TasksByImportResponse, UpdateTaskRequest, UpdateTaskResponse,
};
pub use task::{status, TaskKind, TaskRecord};
