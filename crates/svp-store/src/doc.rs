//! Durable-tier document store on Postgres JSONB.
//!
//! Two collections: `schema_documents` (one row per import name, active
//! schema plus ordered release history) and `task_documents` (one row per
//! (`task_id`, `task_kind`)). This module owns the SQL primitives; the
//! schema write protocol itself lives in [`crate::schemas::SchemaService`]
//! and is delegated to from the public methods here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use svp_schemas::{
    CountDocumentsResponse, DeleteSchemaResponse, FindSchemaResponse, InsertSchemaRequest,
    InsertSchemaResponse, SchemaDocument, SchemaRelease, TaskKind, TaskRecord,
};

use crate::error::StoreError;
use crate::schemas::{SchemaCollection, SchemaService};

#[derive(Clone)]
pub struct DocStore {
    pool: PgPool,
}

impl DocStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run embedded migrations (idempotent).
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Doc(sqlx::Error::Migrate(Box::new(err))))?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<bool, StoreError> {
        let row: (i32,) = sqlx::query_as("select 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }

    pub async fn is_healthy(&self) -> bool {
        self.ping().await.unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Schema documents (protocol delegated to SchemaService)
    // ------------------------------------------------------------------

    pub async fn count_all_documents(&self) -> Result<CountDocumentsResponse, StoreError> {
        SchemaService::new(self).count_all_documents().await
    }

    pub async fn find_jsonschema(
        &self,
        import_name: &str,
    ) -> Result<FindSchemaResponse, StoreError> {
        SchemaService::new(self).find_jsonschema(import_name).await
    }

    pub async fn insert_one_schema(
        &self,
        request: &InsertSchemaRequest,
    ) -> Result<InsertSchemaResponse, StoreError> {
        SchemaService::new(self).insert_one_schema(request).await
    }

    pub async fn update_one_jsonschema(
        &self,
        request: &InsertSchemaRequest,
    ) -> Result<InsertSchemaResponse, StoreError> {
        SchemaService::new(self).update_one_jsonschema(request).await
    }

    pub async fn delete_one_jsonschema(
        &self,
        import_name: &str,
    ) -> Result<DeleteSchemaResponse, StoreError> {
        SchemaService::new(self)
            .delete_one_jsonschema(import_name)
            .await
    }

    pub async fn delete_import_name(
        &self,
        import_name: &str,
    ) -> Result<DeleteSchemaResponse, StoreError> {
        SchemaService::new(self).delete_import_name(import_name).await
    }

    // ------------------------------------------------------------------
    // Task documents
    // ------------------------------------------------------------------

    pub async fn upsert_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        record: &TaskRecord,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            "insert into task_documents \
             (task_id, task_kind, import_name, record, upload_date, update_date) \
             values ($1, $2, $3, $4, $5, $5) \
             on conflict (task_id, task_kind) \
             do update set record = excluded.record, \
                           import_name = excluded.import_name, \
                           update_date = excluded.update_date",
        )
        .bind(task_id)
        .bind(kind.as_str())
        .bind(record.import_name())
        .bind(serde_json::to_value(record).map_err(|err| StoreError::Decode(err.to_string()))?)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_task(
        &self,
        task_id: &str,
        kind: TaskKind,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query(
            "select record from task_documents where task_id = $1 and task_kind = $2",
        )
        .bind(task_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let record: Value = row.try_get("record")?;
            serde_json::from_value(record)
                .map_err(|err| StoreError::Decode(format!("task document: {err}")))
        })
        .transpose()
    }

    /// All task records filed under an import name. Malformed documents
    /// are skipped, not fatal.
    pub async fn tasks_by_import(
        &self,
        import_name: &str,
        kind: TaskKind,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let rows = sqlx::query(
            "select record from task_documents \
             where import_name = $1 and task_kind = $2 \
             order by upload_date",
        )
        .bind(import_name)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let record: Value = row.try_get("record")?;
            match serde_json::from_value(record) {
                Ok(record) => tasks.push(record),
                Err(err) => {
                    tracing::warn!(%import_name, %err, "skipping malformed task document")
                }
            }
        }
        Ok(tasks)
    }
}

// ---------------------------------------------------------------------------
// SchemaCollection primitives
// ---------------------------------------------------------------------------

#[async_trait]
impl SchemaCollection for DocStore {
    async fn find(&self, import_name: &str) -> Result<Option<SchemaDocument>, StoreError> {
        let row = sqlx::query(
            "select import_name, active_schema, created_at, schemas_releases \
             from schema_documents where import_name = $1",
        )
        .bind(import_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| document_from_row(&row)).transpose()
    }

    async fn insert(&self, document: &SchemaDocument) -> Result<(), StoreError> {
        sqlx::query(
            "insert into schema_documents \
             (import_name, active_schema, created_at, schemas_releases) \
             values ($1, $2, $3, $4)",
        )
        .bind(&document.import_name)
        .bind(&document.active_schema)
        .bind(document.created_at)
        .bind(
            serde_json::to_value(&document.schemas_releases)
                .map_err(|err| StoreError::Decode(err.to_string()))?,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_active(
        &self,
        import_name: &str,
        active_schema: &Value,
        created_at: DateTime<Utc>,
        release: &SchemaRelease,
    ) -> Result<u64, StoreError> {
        let modified = sqlx::query(
            "update schema_documents \
             set active_schema = $2, created_at = $3, \
                 schemas_releases = schemas_releases || $4::jsonb \
             where import_name = $1",
        )
        .bind(import_name)
        .bind(active_schema)
        .bind(created_at)
        .bind(serde_json::to_value(release).map_err(|err| StoreError::Decode(err.to_string()))?)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(modified)
    }

    async fn revert_to(
        &self,
        import_name: &str,
        release: &SchemaRelease,
    ) -> Result<u64, StoreError> {
        let modified = sqlx::query(
            "update schema_documents \
             set active_schema = $2, created_at = $3, \
                 schemas_releases = schemas_releases - (jsonb_array_length(schemas_releases) - 1)::int \
             where import_name = $1",
        )
        .bind(import_name)
        .bind(&release.schema)
        .bind(release.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(modified)
    }

    async fn delete(&self, import_name: &str) -> Result<u64, StoreError> {
        let deleted = sqlx::query("delete from schema_documents where import_name = $1")
            .bind(import_name)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let amount = sqlx::query_scalar::<_, i64>("select count(*) from schema_documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(amount)
    }
}

fn document_from_row(row: &sqlx::postgres::PgRow) -> Result<SchemaDocument, StoreError> {
    let import_name: String = row.try_get("import_name")?;
    let active_schema: Value = row.try_get("active_schema")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let releases: Value = row.try_get("schemas_releases")?;
    let schemas_releases = serde_json::from_value(releases)
        .map_err(|err| StoreError::Decode(format!("schemas_releases: {err}")))?;

    Ok(SchemaDocument {
        import_name,
        active_schema,
        created_at,
        schemas_releases,
    })
}
