//! HTTP client for the data gateway.
//!
//! The edge and the workers never talk to the stores directly; every task
//! and schema-document operation goes through the gateway via this client.
//! Gateway failures map onto the fixed status table the edge returns to
//! its callers (unreachable gateway → 503, missing entity → 404, ...).

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use svp_schemas::{
    CountDocumentsResponse, DeleteSchemaResponse, FindSchemaResponse, GetTaskResponse,
    InsertSchemaRequest, InsertSchemaResponse, SetTaskRequest, TaskKind, TasksByImportResponse,
    UpdateTaskRequest, UpdateTaskResponse,
};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ClientError {
    /// The gateway could not be reached (connect, timeout, body transfer).
    Transport(reqwest::Error),
    /// The gateway answered with a non-success status.
    Status { code: u16, message: String },
}

impl ClientError {
    /// HTTP status the edge should surface for this failure, per the fixed
    /// translation table: transport failures mean the gateway (and so the
    /// stores behind it) are unavailable.
    pub fn http_status(&self) -> u16 {
        match self {
            ClientError::Transport(err) if err.is_timeout() => 504,
            ClientError::Transport(_) => 503,
            ClientError::Status { code, .. } => match code {
                400 | 401 | 403 | 404 | 409 | 503 | 504 => *code,
                _ => 500,
            },
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(err) => write!(f, "gateway unreachable: {err}"),
            ClientError::Status { code, message } => {
                write!(f, "gateway returned {code}: {message}")
            }
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err)
    }
}

// ---------------------------------------------------------------------------
// DataGatewayClient
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DataGatewayClient {
    base_url: String,
    http: reqwest::Client,
}

impl DataGatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                code: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await?;
        Self::decode(response).await
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    pub async fn set_task_id(
        &self,
        request: &SetTaskRequest,
    ) -> Result<UpdateTaskResponse, ClientError> {
        self.post("/v1/tasks/set", request).await
    }

    pub async fn update_task_id(
        &self,
        request: &UpdateTaskRequest,
    ) -> Result<UpdateTaskResponse, ClientError> {
        self.post("/v1/tasks/update", request).await
    }

    pub async fn get_task_id(
        &self,
        task_id: &str,
        kind: TaskKind,
    ) -> Result<GetTaskResponse, ClientError> {
        self.get(
            "/v1/tasks/get",
            &[("task_id", task_id), ("task", kind.as_str())],
        )
        .await
    }

    pub async fn get_tasks_by_import_name(
        &self,
        import_name: &str,
        kind: TaskKind,
    ) -> Result<TasksByImportResponse, ClientError> {
        self.get(
            "/v1/tasks/by-import",
            &[("import_name", import_name), ("task", kind.as_str())],
        )
        .await
    }

    // ------------------------------------------------------------------
    // Schema documents
    // ------------------------------------------------------------------

    pub async fn insert_one_schema(
        &self,
        request: &InsertSchemaRequest,
    ) -> Result<InsertSchemaResponse, ClientError> {
        self.post("/v1/schemas/insert", request).await
    }

    pub async fn update_one_jsonschema(
        &self,
        request: &InsertSchemaRequest,
    ) -> Result<InsertSchemaResponse, ClientError> {
        self.post("/v1/schemas/update", request).await
    }

    pub async fn find_jsonschema(
        &self,
        import_name: &str,
    ) -> Result<FindSchemaResponse, ClientError> {
        self.get("/v1/schemas/find", &[("import_name", import_name)])
            .await
    }

    pub async fn count_all_documents(&self) -> Result<CountDocumentsResponse, ClientError> {
        self.get("/v1/schemas/count", &[]).await
    }

    pub async fn delete_one_jsonschema(
        &self,
        import_name: &str,
    ) -> Result<DeleteSchemaResponse, ClientError> {
        let response = self
            .http
            .delete(format!("{}/v1/schemas/{import_name}", self.base_url))
            .send()
            .await?;
        Self::decode(response).await
    }

    pub async fn delete_import_name(
        &self,
        import_name: &str,
    ) -> Result<DeleteSchemaResponse, ClientError> {
        let response = self
            .http
            .delete(format!("{}/v1/schemas/{import_name}/all", self.base_url))
            .send()
            .await?;
        Self::decode(response).await
    }

    // ------------------------------------------------------------------
    // KV passthrough
    // ------------------------------------------------------------------

    pub async fn kv_ping(&self) -> Result<Value, ClientError> {
        self.get("/v1/kv/ping", &[]).await
    }

    pub async fn doc_ping(&self) -> Result<Value, ClientError> {
        self.get("/v1/schemas/ping", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_statuses_pass_through_and_unknowns_collapse_to_500() {
        let not_found = ClientError::Status {
            code: 404,
            message: String::new(),
        };
        assert_eq!(not_found.http_status(), 404);

        let teapot = ClientError::Status {
            code: 418,
            message: String::new(),
        };
        assert_eq!(teapot.http_status(), 500);
    }
}
