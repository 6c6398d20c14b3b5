//! Validation task lifecycle: decode, check against the active schema,
//! report.

use serde_json::{json, Map, Value};
use svp_client::DataGatewayClient;
use svp_schemas::{status, TaskKind, ValidationEnvelope, ValidationTaskResult};
use tracing::{error, info};

use crate::file::decode_rows;
use crate::schema_flow::update_task_status;
use crate::validate::{validate_rows, ValidationError};

fn date_data(upload_date: Option<&str>) -> Map<String, Value> {
    let mut data = Map::new();
    if let Some(upload_date) = upload_date {
        data.insert("upload_date".into(), json!(upload_date));
    }
    data.insert(
        "update_date".into(),
        json!(chrono::Utc::now().to_rfc3339()),
    );
    data
}

fn failed(task_id: &str, import_name: &str, message: String) -> ValidationTaskResult {
    ValidationTaskResult {
        task_id: task_id.to_string(),
        status: status::ERROR.to_string(),
        import_name: import_name.to_string(),
        result: json!({ "error": message }),
    }
}

/// Handle one validation envelope end to end and return the result to
/// publish. Domain failures (no schema, unsupported format, column
/// mismatch) land the task in `error`; they are never retried.
pub async fn process_validation_message(
    client: &DataGatewayClient,
    message: &ValidationEnvelope,
    n_workers: usize,
) -> ValidationTaskResult {
    let kind = TaskKind::Validation;
    let task_id = &message.id;
    let import_name = &message.import_name;

    info!(%task_id, %import_name, "processing validation request");
    update_task_status(
        client,
        task_id,
        kind,
        status::RECEIVED_SAMPLE_VALIDATION,
        "",
        Some(date_data(Some(&message.date))),
        false,
    )
    .await;

    // Active schema first: without one there is nothing to validate against.
    let schema = match client.find_jsonschema(import_name).await {
        Ok(response) => response.schema.map(|document| document.active_schema),
        Err(err) => {
            error!(%task_id, %err, "schema lookup failed");
            let result = failed(task_id, import_name, err.to_string());
            record_failure(client, task_id, &result).await;
            return result;
        }
    };
    let Some(schema) = schema else {
        let result = failed(
            task_id,
            import_name,
            format!("No active schema found for import name: {import_name}"),
        );
        record_failure(client, task_id, &result).await;
        return result;
    };

    update_task_status(
        client,
        task_id,
        kind,
        status::PROCESSING_FILE,
        "",
        Some(date_data(None)),
        false,
    )
    .await;

    let bytes = match hex::decode(&message.file_data) {
        Ok(bytes) => bytes,
        Err(err) => {
            let result = failed(task_id, import_name, format!("file_data is not hex: {err}"));
            record_failure(client, task_id, &result).await;
            return result;
        }
    };
    let rows = match decode_rows(&bytes, &message.metadata) {
        Ok(rows) => rows,
        Err(err) => {
            let result = failed(task_id, import_name, err.to_string());
            record_failure(client, task_id, &result).await;
            return result;
        }
    };

    update_task_status(
        client,
        task_id,
        kind,
        status::VALIDATING_FILE,
        "",
        Some(date_data(None)),
        false,
    )
    .await;

    let report = match validate_rows(rows, &schema, n_workers).await {
        Ok(report) => report,
        Err(err @ ValidationError::ColumnsMismatch { .. }) => {
            let result = failed(task_id, import_name, err.to_string());
            record_failure(client, task_id, &result).await;
            return result;
        }
        Err(err) => {
            let result = failed(task_id, import_name, err.to_string());
            record_failure(client, task_id, &result).await;
            return result;
        }
    };

    let summary_status = report.summary_status();
    let mut data = date_data(None);
    data.insert(
        "results".into(),
        report.to_value(&message.metadata, import_name),
    );
    update_task_status(
        client,
        task_id,
        kind,
        summary_status,
        &report.summary_text(),
        Some(data),
        false,
    )
    .await;

    ValidationTaskResult {
        task_id: task_id.clone(),
        status: summary_status.to_string(),
        import_name: import_name.clone(),
        result: report.to_value(&message.metadata, import_name),
    }
}

async fn record_failure(
    client: &DataGatewayClient,
    task_id: &str,
    result: &ValidationTaskResult,
) {
    let mut data = date_data(None);
    data.insert("results".into(), result.result.clone());
    update_task_status(
        client,
        task_id,
        TaskKind::Validation,
        status::ERROR,
        "Validation failed",
        Some(data),
        false,
    )
    .await;
}
