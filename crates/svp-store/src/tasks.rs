//! Dual-store task repository: KV hot tier + document durable tier.
//!
//! Writes go to both tiers; a failure in either propagates as one error
//! with no rollback of a partial success; reads heal from whichever tier
//! survived. Reads are read-through: KV first, document store on a miss.
//!
//! The tiers sit behind traits so the repository logic runs unchanged
//! against the real Redis/Postgres clients and against the in-memory
//! stand-ins in `svp-testkit`.

use async_trait::async_trait;
use serde_json::{Map, Value};
use svp_schemas::{TaskKind, TaskRecord, UpdateTaskRequest};
use tracing::warn;

use crate::doc::DocStore;
use crate::error::StoreError;
use crate::kv::KvClient;

// ---------------------------------------------------------------------------
// Tier traits
// ---------------------------------------------------------------------------

/// Fast tier: task hashes with status-driven TTLs and import-name sets.
#[async_trait]
pub trait TaskHotTier: Send + Sync {
    async fn set_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        record: &TaskRecord,
    ) -> Result<(), StoreError>;

    #[allow(clippy::too_many_arguments)]
    async fn update_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        field: &str,
        value: &Value,
        message: &str,
        data: Option<&Map<String, Value>>,
        reset_data: bool,
    ) -> Result<(), StoreError>;

    async fn get_task(
        &self,
        task_id: &str,
        kind: TaskKind,
    ) -> Result<Option<TaskRecord>, StoreError>;

    async fn tasks_by_import(
        &self,
        import_name: &str,
        kind: TaskKind,
    ) -> Result<Vec<TaskRecord>, StoreError>;
}

/// Durable tier: one document per (`task_id`, `task_kind`).
#[async_trait]
pub trait TaskDurableTier: Send + Sync {
    async fn upsert_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        record: &TaskRecord,
    ) -> Result<(), StoreError>;

    async fn get_task(
        &self,
        task_id: &str,
        kind: TaskKind,
    ) -> Result<Option<TaskRecord>, StoreError>;

    async fn tasks_by_import(
        &self,
        import_name: &str,
        kind: TaskKind,
    ) -> Result<Vec<TaskRecord>, StoreError>;
}

#[async_trait]
impl TaskHotTier for KvClient {
    async fn set_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        record: &TaskRecord,
    ) -> Result<(), StoreError> {
        KvClient::set_task(self, task_id, kind, record).await
    }

    async fn update_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        field: &str,
        value: &Value,
        message: &str,
        data: Option<&Map<String, Value>>,
        reset_data: bool,
    ) -> Result<(), StoreError> {
        KvClient::update_task(self, task_id, kind, field, value, message, data, reset_data).await
    }

    async fn get_task(
        &self,
        task_id: &str,
        kind: TaskKind,
    ) -> Result<Option<TaskRecord>, StoreError> {
        KvClient::get_task(self, task_id, kind).await
    }

    async fn tasks_by_import(
        &self,
        import_name: &str,
        kind: TaskKind,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        KvClient::tasks_by_import(self, import_name, kind).await
    }
}

#[async_trait]
impl TaskDurableTier for DocStore {
    async fn upsert_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        record: &TaskRecord,
    ) -> Result<(), StoreError> {
        DocStore::upsert_task(self, task_id, kind, record).await
    }

    async fn get_task(
        &self,
        task_id: &str,
        kind: TaskKind,
    ) -> Result<Option<TaskRecord>, StoreError> {
        DocStore::get_task(self, task_id, kind).await
    }

    async fn tasks_by_import(
        &self,
        import_name: &str,
        kind: TaskKind,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        DocStore::tasks_by_import(self, import_name, kind).await
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

pub struct TaskRepository<'a, K: TaskHotTier, D: TaskDurableTier> {
    pub kv: &'a K,
    pub doc: &'a D,
}

impl<'a, K: TaskHotTier, D: TaskDurableTier> TaskRepository<'a, K, D> {
    pub fn new(kv: &'a K, doc: &'a D) -> Self {
        Self { kv, doc }
    }

    /// Write the record to both tiers. After this returns `Ok`, the task is
    /// visible in the KV hash (with its import-set entry and TTL) and in
    /// the document collection.
    pub async fn set(
        &self,
        task_id: &str,
        kind: TaskKind,
        record: &TaskRecord,
    ) -> Result<(), StoreError> {
        self.kv.set_task(task_id, kind, record).await?;
        self.doc.upsert_task(task_id, kind, record).await?;
        Ok(())
    }

    /// Single-field update applied to both tiers. The durable tier is
    /// updated by rewriting the whole record read through the repository.
    pub async fn update(&self, request: &UpdateTaskRequest) -> Result<(), StoreError> {
        self.kv
            .update_task(
                &request.task_id,
                request.task,
                &request.field,
                &request.value,
                &request.message,
                request.data.as_ref(),
                request.reset_data,
            )
            .await?;

        // Rebuild the durable record from the freshest copy available.
        let mut record = self
            .get(&request.task_id, request.task)
            .await?
            .unwrap_or_else(|| TaskRecord::new("", 0, ""));
        apply_update(&mut record, request);
        self.doc
            .upsert_task(&request.task_id, request.task, &record)
            .await?;
        Ok(())
    }

    /// Read-through get: KV first, document store on a miss. A failing hot
    /// tier degrades to the durable tier instead of failing the read.
    pub async fn get(
        &self,
        task_id: &str,
        kind: TaskKind,
    ) -> Result<Option<TaskRecord>, StoreError> {
        match self.kv.get_task(task_id, kind).await {
            Ok(Some(record)) => return Ok(Some(record)),
            Ok(None) => {}
            Err(err) => warn!(%task_id, %err, "hot-tier read failed, falling back"),
        }
        self.doc.get_task(task_id, kind).await
    }

    /// Import-name lookup: KV set membership first; when that yields
    /// nothing, the document collection.
    pub async fn get_by_import(
        &self,
        import_name: &str,
        kind: TaskKind,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        match self.kv.tasks_by_import(import_name, kind).await {
            Ok(tasks) if !tasks.is_empty() => return Ok(tasks),
            Ok(_) => {}
            Err(err) => warn!(%import_name, %err, "hot-tier lookup failed, falling back"),
        }
        self.doc.tasks_by_import(import_name, kind).await
    }
}

/// Apply one [`UpdateTaskRequest`] to an in-memory record, mirroring the
/// hot-tier hash mutation.
pub fn apply_update(record: &mut TaskRecord, request: &UpdateTaskRequest) {
    match request.field.as_str() {
        "status" => {
            if let Some(status) = request.value.as_str() {
                record.status = status.to_string();
            }
        }
        "code" => {
            if let Some(code) = request.value.as_u64() {
                record.code = code as u16;
            }
        }
        "message" => {
            if let Some(message) = request.value.as_str() {
                record.message = message.to_string();
            }
        }
        other => {
            record.data.insert(other.to_string(), request.value.clone());
        }
    }

    if !request.message.is_empty() {
        record.message = request.message.clone();
    }

    if let Some(patch) = &request.data {
        if request.reset_data {
            record.data = Map::new();
        }
        for (key, value) in patch {
            record.data.insert(key.clone(), value.clone());
        }
    }
}
