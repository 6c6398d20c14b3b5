//! Edge routes: validation uploads, schema uploads/removals, task status.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::error;

use svp_client::ClientError;
use svp_schemas::{status, FileMetadata, SetTaskRequest, TaskKind, TaskRecord};

use crate::auth::require_token;
use crate::state::ApiState;

type AppState = State<Arc<ApiState>>;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    /// Broker publish failures surface as 503: the queueing tier is down.
    fn broker_unavailable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, detail)
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/validation/upload/:import_name", post(validation_upload))
        .route("/validation/status", get(validation_status))
        .route("/schemas/upload/:import_name", post(schemas_upload))
        .route("/schemas/status", get(schemas_status))
        .route("/schemas/remove/:import_name", delete(schemas_remove))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_token,
        ))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "service": "svp-api", "status": "ok" }))
}

fn accepted_record(task_id: &str, import_name: &str, message: &str) -> TaskRecord {
    let mut data = Map::new();
    data.insert("task_id".into(), json!(task_id));
    data.insert("import_name".into(), json!(import_name));
    TaskRecord::new(status::ACCEPTED, 202, message).with_data(data)
}

/// Persist the freshly accepted task; a failure here is logged but does
/// not fail the upload; the message is already queued.
async fn record_accepted(state: &ApiState, task_id: &str, kind: TaskKind, record: &TaskRecord) {
    let request = SetTaskRequest {
        task_id: task_id.to_string(),
        task: kind,
        value: record.clone(),
    };
    if let Err(err) = state.client.set_task_id(&request).await {
        error!(%task_id, %err, "failed to persist accepted task");
    }
}

// ---------------------------------------------------------------------------
// Validation routes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct UploadQuery {
    #[serde(default)]
    new: bool,
}

async fn validation_upload(
    State(state): AppState,
    Path(import_name): Path<String>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    if import_name.is_empty() {
        return Err(ApiError::bad_request("import_name must be provided."));
    }

    // Unless the caller asks for a fresh task, an existing batch for this
    // import name short-circuits the upload.
    if !query.new {
        let cached = state
            .client
            .get_tasks_by_import_name(&import_name, TaskKind::Validation)
            .await?;
        if !cached.tasks.is_empty() {
            return Ok(Json(cached.tasks).into_response());
        }
    }

    let field = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(format!("invalid multipart body: {err}")))?
        .ok_or_else(|| ApiError::bad_request("a spreadsheet file part is required"))?;

    let filename = field.file_name().unwrap_or("upload").to_string();
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|err| ApiError::bad_request(format!("failed to read upload: {err}")))?;

    let metadata = FileMetadata {
        filename,
        content_type,
        size: bytes.len() as u64,
    };

    let task_id = state
        .publisher
        .lock()
        .await
        .publish_validation_request(&bytes, &import_name, metadata, Map::new())
        .await
        .map_err(|err| ApiError::broker_unavailable(err.to_string()))?;

    let record = accepted_record(
        &task_id,
        &import_name,
        "Validation request submitted successfully",
    );
    record_accepted(&state, &task_id, TaskKind::Validation, &record).await;

    Ok((StatusCode::ACCEPTED, Json(record)).into_response())
}

#[derive(Deserialize)]
struct StatusQuery {
    #[serde(default)]
    task_id: String,
    #[serde(default)]
    import_name: String,
}

async fn task_status(
    state: &ApiState,
    kind: TaskKind,
    query: StatusQuery,
) -> Result<Response, ApiError> {
    if query.task_id.is_empty() && query.import_name.is_empty() {
        return Err(ApiError::bad_request(
            "Either `task_id` or `import_name` must be provided.",
        ));
    }

    if !query.import_name.is_empty() {
        let response = state
            .client
            .get_tasks_by_import_name(&query.import_name, kind)
            .await?;
        return Ok(Json(response.tasks).into_response());
    }

    let response = state.client.get_task_id(&query.task_id, kind).await?;
    if !response.found {
        return Err(ApiError::not_found(format!(
            "Task with ID {} not found.",
            query.task_id
        )));
    }
    Ok(Json(response.value).into_response())
}

async fn validation_status(
    State(state): AppState,
    Query(query): Query<StatusQuery>,
) -> Result<Response, ApiError> {
    task_status(&state, TaskKind::Validation, query).await
}

// ---------------------------------------------------------------------------
// Schema routes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SchemaUploadQuery {
    #[serde(default)]
    raw: bool,
    #[serde(default)]
    new: bool,
}

async fn schemas_upload(
    State(state): AppState,
    Path(import_name): Path<String>,
    Query(query): Query<SchemaUploadQuery>,
    Json(schema): Json<Value>,
) -> Result<Response, ApiError> {
    if import_name.is_empty() {
        return Err(ApiError::bad_request("import_name must be provided."));
    }

    if !query.new {
        let cached = state
            .client
            .get_tasks_by_import_name(&import_name, TaskKind::Schemas)
            .await?;
        if !cached.tasks.is_empty() {
            return Ok(Json(cached.tasks).into_response());
        }
    }

    let task_id = state
        .publisher
        .lock()
        .await
        .publish_schema_update(
            "upload_schema",
            Some(schema),
            &import_name,
            query.raw,
            Map::new(),
        )
        .await
        .map_err(|err| ApiError::broker_unavailable(err.to_string()))?;

    let record = accepted_record(
        &task_id,
        &import_name,
        "Schema upload request submitted successfully",
    );
    record_accepted(&state, &task_id, TaskKind::Schemas, &record).await;

    Ok((StatusCode::ACCEPTED, Json(record)).into_response())
}

async fn schemas_status(
    State(state): AppState,
    Query(query): Query<StatusQuery>,
) -> Result<Response, ApiError> {
    task_status(&state, TaskKind::Schemas, query).await
}

async fn schemas_remove(
    State(state): AppState,
    Path(import_name): Path<String>,
) -> Result<Response, ApiError> {
    if import_name.is_empty() {
        return Err(ApiError::bad_request("import_name must be provided."));
    }

    let task_id = state
        .publisher
        .lock()
        .await
        .publish_schema_update("remove_schema", None, &import_name, false, Map::new())
        .await
        .map_err(|err| ApiError::broker_unavailable(err.to_string()))?;

    let record = accepted_record(
        &task_id,
        &import_name,
        "Schema removal request submitted successfully",
    );
    record_accepted(&state, &task_id, TaskKind::Schemas, &record).await;

    Ok((StatusCode::ACCEPTED, Json(record)).into_response())
}
