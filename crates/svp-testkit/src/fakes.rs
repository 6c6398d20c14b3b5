//! In-memory stand-ins for the two storage tiers and the schema
//! collection.
//!
//! They implement the same traits the real Redis/Postgres clients do, so
//! repository and service logic (read-through healing, the release
//! protocol) is exercised without any backend. The hot-tier fake can be
//! taken offline to simulate an outage and supports evicting single
//! hashes to simulate TTL expiry.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use svp_schemas::{SchemaDocument, SchemaRelease, TaskKind, TaskRecord, UpdateTaskRequest};
use svp_store::schemas::SchemaCollection;
use svp_store::tasks::{apply_update, TaskDurableTier, TaskHotTier};
use svp_store::StoreError;

fn offline_error() -> StoreError {
    let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "fake tier offline");
    StoreError::Kv(io.into())
}

// ---------------------------------------------------------------------------
// Hot tier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryHotTier {
    tasks: Mutex<HashMap<(TaskKind, String), TaskRecord>>,
    imports: Mutex<HashMap<(TaskKind, String), BTreeSet<String>>>,
    offline: AtomicBool,
}

impl InMemoryHotTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All subsequent operations fail with a transient connection error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Drop one task hash, as a TTL expiry would. The import set keeps the
    /// id, matching Redis where the set and the hash expire independently.
    pub fn evict(&self, task_id: &str, kind: TaskKind) {
        self.tasks
            .lock()
            .unwrap()
            .remove(&(kind, task_id.to_string()));
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(offline_error());
        }
        Ok(())
    }
}

#[async_trait]
impl TaskHotTier for InMemoryHotTier {
    async fn set_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        record: &TaskRecord,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        self.imports
            .lock()
            .unwrap()
            .entry((kind, record.import_name().to_string()))
            .or_default()
            .insert(task_id.to_string());
        self.tasks
            .lock()
            .unwrap()
            .insert((kind, task_id.to_string()), record.clone());
        Ok(())
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
        self.check_online()?;
        let request = UpdateTaskRequest {
            task_id: task_id.to_string(),
            task: kind,
            field: field.to_string(),
            value: value.clone(),
            message: message.to_string(),
            data: data.cloned(),
            reset_data,
        };
        let mut tasks = self.tasks.lock().unwrap();
        let record = tasks
            .entry((kind, task_id.to_string()))
            .or_insert_with(|| TaskRecord::new("", 0, ""));
        apply_update(record, &request);
        Ok(())
    }

    async fn get_task(
        &self,
        task_id: &str,
        kind: TaskKind,
    ) -> Result<Option<TaskRecord>, StoreError> {
        self.check_online()?;
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .get(&(kind, task_id.to_string()))
            .cloned())
    }

    async fn tasks_by_import(
        &self,
        import_name: &str,
        kind: TaskKind,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        self.check_online()?;
        let ids = self
            .imports
            .lock()
            .unwrap()
            .get(&(kind, import_name.to_string()))
            .cloned()
            .unwrap_or_default();

        let tasks = self.tasks.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| tasks.get(&(kind, id.clone())).cloned())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Durable tier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryDurableTier {
    /// Keyed by (kind, task_id); `BTreeMap` keeps lookup output stable.
    tasks: Mutex<BTreeMap<(TaskKind, String), (String, TaskRecord)>>,
}

impl InMemoryDurableTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the document outright (for healing-from-hot-tier scenarios).
    pub fn remove(&self, task_id: &str, kind: TaskKind) {
        self.tasks
            .lock()
            .unwrap()
            .remove(&(kind, task_id.to_string()));
    }
}

#[async_trait]
impl TaskDurableTier for InMemoryDurableTier {
    async fn upsert_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        record: &TaskRecord,
    ) -> Result<(), StoreError> {
        self.tasks.lock().unwrap().insert(
            (kind, task_id.to_string()),
            (record.import_name().to_string(), record.clone()),
        );
        Ok(())
    }

    async fn get_task(
        &self,
        task_id: &str,
        kind: TaskKind,
    ) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .get(&(kind, task_id.to_string()))
            .map(|(_, record)| record.clone()))
    }

    async fn tasks_by_import(
        &self,
        import_name: &str,
        kind: TaskKind,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|((task_kind, _), (import, _))| {
                *task_kind == kind && import.as_str() == import_name
            })
            .map(|(_, (_, record))| record.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Schema collection
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemorySchemaCollection {
    documents: Mutex<HashMap<String, SchemaDocument>>,
}

impl InMemorySchemaCollection {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchemaCollection for InMemorySchemaCollection {
    async fn find(&self, import_name: &str) -> Result<Option<SchemaDocument>, StoreError> {
        Ok(self.documents.lock().unwrap().get(import_name).cloned())
    }

    async fn insert(&self, document: &SchemaDocument) -> Result<(), StoreError> {
        self.documents
            .lock()
            .unwrap()
            .insert(document.import_name.clone(), document.clone());
        Ok(())
    }

    async fn replace_active(
        &self,
        import_name: &str,
        active_schema: &Value,
        created_at: DateTime<Utc>,
        release: &SchemaRelease,
    ) -> Result<u64, StoreError> {
        let mut documents = self.documents.lock().unwrap();
        let Some(document) = documents.get_mut(import_name) else {
            return Ok(0);
        };
        document.active_schema = active_schema.clone();
        document.created_at = created_at;
        document.schemas_releases.push(release.clone());
        Ok(1)
    }

    async fn revert_to(
        &self,
        import_name: &str,
        release: &SchemaRelease,
    ) -> Result<u64, StoreError> {
        let mut documents = self.documents.lock().unwrap();
        let Some(document) = documents.get_mut(import_name) else {
            return Ok(0);
        };
        document.active_schema = release.schema.clone();
        document.created_at = release.created_at;
        document.schemas_releases.pop();
        Ok(1)
    }

    async fn delete(&self, import_name: &str) -> Result<u64, StoreError> {
        Ok(self
            .documents
            .lock()
            .unwrap()
            .remove(import_name)
            .map(|_| 1)
            .unwrap_or(0))
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.documents.lock().unwrap().len() as i64)
    }
}
