//! Schema-document service: the insert / no-change / update-with-release /
//! revert-on-delete protocol, independent of the backing collection.
//!
//! `SchemaCollection` is the primitive storage surface (find, insert,
//! replace-and-archive, revert, delete, count); the decision flow lives
//! here so it runs identically over Postgres and over the in-memory
//! collection in `svp-testkit`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use svp_schemas::{
    CountDocumentsResponse, DeleteSchemaResponse, FindSchemaResponse, InsertSchemaRequest,
    InsertSchemaResponse, SchemaDocument, SchemaRelease, SchemaWriteStatus,
};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Collection trait
// ---------------------------------------------------------------------------

/// Primitive operations over the schema-document collection.
#[async_trait]
pub trait SchemaCollection: Send + Sync {
    async fn find(&self, import_name: &str) -> Result<Option<SchemaDocument>, StoreError>;

    async fn insert(&self, document: &SchemaDocument) -> Result<(), StoreError>;

    /// Replace the active schema, push `release` onto the history. Returns
    /// the number of modified documents.
    async fn replace_active(
        &self,
        import_name: &str,
        active_schema: &Value,
        created_at: DateTime<Utc>,
        release: &SchemaRelease,
    ) -> Result<u64, StoreError>;

    /// Make `release` the active schema again and drop it from the end of
    /// the history. Returns the number of modified documents.
    async fn revert_to(
        &self,
        import_name: &str,
        release: &SchemaRelease,
    ) -> Result<u64, StoreError>;

    /// Remove the whole document. Returns the number of deleted documents.
    async fn delete(&self, import_name: &str) -> Result<u64, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct SchemaService<'a, C: SchemaCollection> {
    collection: &'a C,
}

impl<'a, C: SchemaCollection> SchemaService<'a, C> {
    pub fn new(collection: &'a C) -> Self {
        Self { collection }
    }

    pub async fn find_jsonschema(
        &self,
        import_name: &str,
    ) -> Result<FindSchemaResponse, StoreError> {
        let Some(document) = self.collection.find(import_name).await? else {
            return Ok(FindSchemaResponse {
                status: SchemaWriteStatus::NotFound,
                schema: None,
                extra: Map::new(),
            });
        };
        Ok(FindSchemaResponse {
            status: SchemaWriteStatus::Found,
            schema: Some(document),
            extra: Map::new(),
        })
    }

    /// Insert a new schema document. When one already exists, either report
    /// `no_change` (identical active schema) or push the old active onto
    /// the release history and replace it.
    pub async fn insert_one_schema(
        &self,
        request: &InsertSchemaRequest,
    ) -> Result<InsertSchemaResponse, StoreError> {
        let Some(current) = self.collection.find(&request.import_name).await? else {
            self.collection
                .insert(&SchemaDocument {
                    import_name: request.import_name.clone(),
                    active_schema: request.active_schema.clone(),
                    created_at: request.created_at,
                    schemas_releases: Vec::new(),
                })
                .await?;

            let mut result = Map::new();
            result.insert("acknowledged".into(), json!(true));
            result.insert("inserted_id".into(), json!(request.import_name));
            return Ok(InsertSchemaResponse {
                status: SchemaWriteStatus::Inserted,
                result,
            });
        };

        if current.active_schema == request.active_schema {
            let mut result = Map::new();
            result.insert(
                "message".into(),
                json!("Schema is identical to the existing one."),
            );
            return Ok(InsertSchemaResponse {
                status: SchemaWriteStatus::NoChange,
                result,
            });
        }

        let release = SchemaRelease {
            schema: current.active_schema,
            created_at: current.created_at,
        };
        let modified = self
            .collection
            .replace_active(
                &request.import_name,
                &request.active_schema,
                request.created_at,
                &release,
            )
            .await?;

        let mut result = Map::new();
        result.insert("message".into(), json!("Schema successfully updated"));
        result.insert("modified_count".into(), json!(modified));
        Ok(InsertSchemaResponse {
            status: SchemaWriteStatus::Updated,
            result,
        })
    }

    /// Replace the active schema of an existing document. Unlike
    /// [`SchemaService::insert_one_schema`] this never creates a document:
    /// a missing import name is an error.
    pub async fn update_one_jsonschema(
        &self,
        request: &InsertSchemaRequest,
    ) -> Result<InsertSchemaResponse, StoreError> {
        if self.collection.find(&request.import_name).await?.is_none() {
            let mut result = Map::new();
            result.insert(
                "message".into(),
                json!(format!(
                    "Schema with import_name '{}' not found",
                    request.import_name
                )),
            );
            return Ok(InsertSchemaResponse {
                status: SchemaWriteStatus::Error,
                result,
            });
        }
        self.insert_one_schema(request).await
    }

    /// Delete with history: a document with releases reverts to the newest
    /// release instead of disappearing; only a document with an empty
    /// history is removed.
    pub async fn delete_one_jsonschema(
        &self,
        import_name: &str,
    ) -> Result<DeleteSchemaResponse, StoreError> {
        let Some(document) = self.collection.find(import_name).await? else {
            return Ok(DeleteSchemaResponse {
                success: false,
                message: format!("Schema with import_name '{import_name}' not found"),
                status: SchemaWriteStatus::NotFound,
                extra: Map::new(),
            });
        };

        if document.schemas_releases.is_empty() {
            let deleted = self.collection.delete(import_name).await?;
            let mut extra = Map::new();
            extra.insert("deleted_count".into(), json!(deleted));
            return Ok(DeleteSchemaResponse {
                success: true,
                message: format!("Schema with import_name '{import_name}' deleted"),
                status: SchemaWriteStatus::Deleted,
                extra,
            });
        }

        let last = document
            .schemas_releases
            .last()
            .expect("history checked non-empty");
        let modified = self.collection.revert_to(import_name, last).await?;

        let mut extra = Map::new();
        extra.insert("modified_count".into(), json!(modified));
        Ok(DeleteSchemaResponse {
            success: true,
            message: format!(
                "Schema with import_name '{import_name}' reverted to previous release"
            ),
            status: SchemaWriteStatus::Reverted,
            extra,
        })
    }

    /// Unconditional removal of the whole document, history included.
    pub async fn delete_import_name(
        &self,
        import_name: &str,
    ) -> Result<DeleteSchemaResponse, StoreError> {
        let deleted = self.collection.delete(import_name).await?;
        if deleted == 0 {
            return Ok(DeleteSchemaResponse {
                success: false,
                message: format!("No schemas found with import_name '{import_name}'"),
                status: SchemaWriteStatus::Error,
                extra: Map::new(),
            });
        }

        let mut extra = Map::new();
        extra.insert("deleted_count".into(), json!(deleted));
        Ok(DeleteSchemaResponse {
            success: true,
            message: format!("All schemas with import_name '{import_name}' deleted"),
            status: SchemaWriteStatus::Deleted,
            extra,
        })
    }

    pub async fn count_all_documents(&self) -> Result<CountDocumentsResponse, StoreError> {
        let amount = self.collection.count().await?;
        Ok(CountDocumentsResponse { amount })
    }
}
