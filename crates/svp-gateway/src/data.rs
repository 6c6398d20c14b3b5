//! Data gateway: retrying HTTP surface over the KV and document stores.
//!
//! Every handler runs its store operation through `execute_with_retry`;
//! the first attempt uses cached connections, retries force a reconnect.
//! Transient errors that survive the whole budget surface as 503 so the
//! edge can translate them for its callers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use svp_config::RetryPolicy;
use svp_schemas::{
    GetTaskResponse, InsertSchemaRequest, SetTaskRequest, TaskKind, TasksByImportResponse,
    UpdateTaskRequest, UpdateTaskResponse,
};
use svp_store::{execute_with_retry, ConnectionManager, StoreError, TaskRepository};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

pub struct DataState {
    pub manager: ConnectionManager,
    pub kv_policy: RetryPolicy,
    pub doc_policy: RetryPolicy,
    /// Budget for operations touching both stores: max() of the two.
    pub tasks_policy: RetryPolicy,
}

impl DataState {
    pub fn new(manager: ConnectionManager, kv_policy: RetryPolicy, doc_policy: RetryPolicy) -> Self {
        let tasks_policy = RetryPolicy::merged(&kv_policy, &doc_policy);
        Self {
            manager,
            kv_policy,
            doc_policy,
            tasks_policy,
        }
    }
}

type AppState = State<Arc<DataState>>;

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

struct GatewayError(StoreError);

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            err if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
            err if err.is_not_found() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!(error = %self.0, "store operation failed");
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError(err)
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: Arc<DataState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        // Tasks (dual-store)
        .route("/v1/tasks/set", post(set_task))
        .route("/v1/tasks/update", post(update_task))
        .route("/v1/tasks/get", get(get_task))
        .route("/v1/tasks/by-import", get(tasks_by_import))
        // Schema documents
        .route("/v1/schemas/ping", get(doc_ping))
        .route("/v1/schemas/insert", post(insert_schema))
        .route("/v1/schemas/update", post(update_schema))
        .route("/v1/schemas/find", get(find_schema))
        .route("/v1/schemas/count", get(count_schemas))
        .route("/v1/schemas/:import_name", delete(delete_schema))
        .route("/v1/schemas/:import_name/all", delete(delete_import_name))
        // KV passthrough
        .route("/v1/kv/ping", get(kv_ping))
        .route("/v1/kv/keys", post(kv_keys))
        .route("/v1/kv/set", post(kv_set))
        .route("/v1/kv/get", get(kv_get))
        .route("/v1/kv/delete", post(kv_delete))
        .route("/v1/kv/cache", get(kv_cache).delete(kv_clear_cache))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "service": "svp-data-gateway", "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Task handlers
// ---------------------------------------------------------------------------

async fn set_task(
    State(state): AppState,
    Json(request): Json<SetTaskRequest>,
) -> Result<Json<UpdateTaskResponse>, GatewayError> {
    execute_with_retry(&state.tasks_policy, "set_task_id", |force| {
        let state = Arc::clone(&state);
        let request = request.clone();
        async move {
            let kv = state.manager.kv(force).await?;
            let doc = state.manager.doc(force).await?;
            TaskRepository::new(&kv, &doc)
                .set(&request.task_id, request.task, &request.value)
                .await
        }
    })
    .await?;

    Ok(Json(UpdateTaskResponse {
        success: true,
        message: "Task set successfully in both stores".to_string(),
    }))
}

async fn update_task(
    State(state): AppState,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Json<UpdateTaskResponse>, GatewayError> {
    execute_with_retry(&state.tasks_policy, "update_task_id", |force| {
        let state = Arc::clone(&state);
        let request = request.clone();
        async move {
            let kv = state.manager.kv(force).await?;
            let doc = state.manager.doc(force).await?;
            TaskRepository::new(&kv, &doc).update(&request).await
        }
    })
    .await?;

    Ok(Json(UpdateTaskResponse {
        success: true,
        message: "Task updated successfully in both stores".to_string(),
    }))
}

#[derive(Deserialize)]
struct TaskIdQuery {
    task_id: String,
    task: TaskKind,
}

async fn get_task(
    State(state): AppState,
    Query(query): Query<TaskIdQuery>,
) -> Result<Json<GetTaskResponse>, GatewayError> {
    let value = execute_with_retry(&state.tasks_policy, "get_task_id", |force| {
        let state = Arc::clone(&state);
        let task_id = query.task_id.clone();
        async move {
            let kv = state.manager.kv(force).await?;
            let doc = state.manager.doc(force).await?;
            TaskRepository::new(&kv, &doc).get(&task_id, query.task).await
        }
    })
    .await?;

    Ok(Json(GetTaskResponse {
        found: value.is_some(),
        value,
    }))
}

#[derive(Deserialize)]
struct ImportQuery {
    import_name: String,
    task: TaskKind,
}

async fn tasks_by_import(
    State(state): AppState,
    Query(query): Query<ImportQuery>,
) -> Result<Json<TasksByImportResponse>, GatewayError> {
    let tasks = execute_with_retry(&state.tasks_policy, "get_tasks_by_import_name", |force| {
        let state = Arc::clone(&state);
        let import_name = query.import_name.clone();
        async move {
            let kv = state.manager.kv(force).await?;
            let doc = state.manager.doc(force).await?;
            TaskRepository::new(&kv, &doc)
                .get_by_import(&import_name, query.task)
                .await
        }
    })
    .await?;

    Ok(Json(TasksByImportResponse { tasks }))
}

// ---------------------------------------------------------------------------
// Schema-document handlers
// ---------------------------------------------------------------------------

async fn doc_ping(State(state): AppState) -> Result<Json<Value>, GatewayError> {
    let ok = execute_with_retry(&state.doc_policy, "doc_ping", |force| {
        let state = Arc::clone(&state);
        async move { state.manager.doc(force).await?.ping().await }
    })
    .await?;
    Ok(Json(json!({ "ok": ok })))
}

async fn insert_schema(
    State(state): AppState,
    Json(request): Json<InsertSchemaRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let response = execute_with_retry(&state.doc_policy, "insert_one_schema", |force| {
        let state = Arc::clone(&state);
        let request = request.clone();
        async move {
            state
                .manager
                .doc(force)
                .await?
                .insert_one_schema(&request)
                .await
        }
    })
    .await?;
    Ok(Json(response))
}

async fn update_schema(
    State(state): AppState,
    Json(request): Json<InsertSchemaRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let response = execute_with_retry(&state.doc_policy, "update_one_jsonschema", |force| {
        let state = Arc::clone(&state);
        let request = request.clone();
        async move {
            state
                .manager
                .doc(force)
                .await?
                .update_one_jsonschema(&request)
                .await
        }
    })
    .await?;
    Ok(Json(response))
}

#[derive(Deserialize)]
struct FindQuery {
    import_name: String,
}

async fn find_schema(
    State(state): AppState,
    Query(query): Query<FindQuery>,
) -> Result<impl IntoResponse, GatewayError> {
    let response = execute_with_retry(&state.doc_policy, "find_jsonschema", |force| {
        let state = Arc::clone(&state);
        let import_name = query.import_name.clone();
        async move {
            state
                .manager
                .doc(force)
                .await?
                .find_jsonschema(&import_name)
                .await
        }
    })
    .await?;
    Ok(Json(response))
}

async fn count_schemas(State(state): AppState) -> Result<impl IntoResponse, GatewayError> {
    let response = execute_with_retry(&state.doc_policy, "count_all_documents", |force| {
        let state = Arc::clone(&state);
        async move { state.manager.doc(force).await?.count_all_documents().await }
    })
    .await?;
    Ok(Json(response))
}

async fn delete_schema(
    State(state): AppState,
    Path(import_name): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let response = execute_with_retry(&state.doc_policy, "delete_one_jsonschema", |force| {
        let state = Arc::clone(&state);
        let import_name = import_name.clone();
        async move {
            state
                .manager
                .doc(force)
                .await?
                .delete_one_jsonschema(&import_name)
                .await
        }
    })
    .await?;
    Ok(Json(response))
}

async fn delete_import_name(
    State(state): AppState,
    Path(import_name): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let response = execute_with_retry(&state.doc_policy, "delete_import_name", |force| {
        let state = Arc::clone(&state);
        let import_name = import_name.clone();
        async move {
            state
                .manager
                .doc(force)
                .await?
                .delete_import_name(&import_name)
                .await
        }
    })
    .await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// KV handlers
// ---------------------------------------------------------------------------

async fn kv_ping(State(state): AppState) -> Result<Json<Value>, GatewayError> {
    let ok = execute_with_retry(&state.kv_policy, "kv_ping", |force| {
        let state = Arc::clone(&state);
        async move { state.manager.kv(force).await?.ping().await }
    })
    .await?;
    Ok(Json(json!({ "ok": ok })))
}

#[derive(Clone, Deserialize)]
struct KeysRequest {
    pattern: String,
}

async fn kv_keys(
    State(state): AppState,
    Json(request): Json<KeysRequest>,
) -> Result<Json<Value>, GatewayError> {
    let keys = execute_with_retry(&state.kv_policy, "kv_keys", |force| {
        let state = Arc::clone(&state);
        let pattern = request.pattern.clone();
        async move { state.manager.kv(force).await?.keys(&pattern).await }
    })
    .await?;
    Ok(Json(json!({ "keys": keys })))
}

#[derive(Clone, Deserialize)]
struct KvSetRequest {
    key: String,
    value: String,
    #[serde(default)]
    ttl_secs: Option<u64>,
}

async fn kv_set(
    State(state): AppState,
    Json(request): Json<KvSetRequest>,
) -> Result<Json<Value>, GatewayError> {
    execute_with_retry(&state.kv_policy, "kv_set", |force| {
        let state = Arc::clone(&state);
        let request = request.clone();
        async move {
            state
                .manager
                .kv(force)
                .await?
                .set(&request.key, &request.value, request.ttl_secs)
                .await
        }
    })
    .await?;
    Ok(Json(json!({ "success": true })))
}

async fn kv_get(
    State(state): AppState,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, GatewayError> {
    let key = query.get("key").cloned().unwrap_or_default();
    let value = execute_with_retry(&state.kv_policy, "kv_get", |force| {
        let state = Arc::clone(&state);
        let key = key.clone();
        async move { state.manager.kv(force).await?.get(&key).await }
    })
    .await?;
    Ok(Json(json!({ "value": value })))
}

#[derive(Clone, Deserialize)]
struct KvDeleteRequest {
    keys: Vec<String>,
}

async fn kv_delete(
    State(state): AppState,
    Json(request): Json<KvDeleteRequest>,
) -> Result<Json<Value>, GatewayError> {
    let deleted = execute_with_retry(&state.kv_policy, "kv_delete", |force| {
        let state = Arc::clone(&state);
        let keys = request.keys.clone();
        async move { state.manager.kv(force).await?.delete(&keys).await }
    })
    .await?;
    Ok(Json(json!({ "deleted": deleted })))
}

async fn kv_cache(State(state): AppState) -> Result<Json<Value>, GatewayError> {
    let cache = execute_with_retry(&state.kv_policy, "kv_get_cache", |force| {
        let state = Arc::clone(&state);
        async move { state.manager.kv(force).await?.get_cache().await }
    })
    .await?;
    Ok(Json(Value::Object(cache)))
}

async fn kv_clear_cache(State(state): AppState) -> Result<Json<Value>, GatewayError> {
    let cleared = execute_with_retry(&state.kv_policy, "kv_clear_cache", |force| {
        let state = Arc::clone(&state);
        async move { state.manager.kv(force).await?.clear_cache().await }
    })
    .await?;
    Ok(Json(json!({ "cleared": cleared })))
}
