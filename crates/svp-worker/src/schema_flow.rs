//! Schema task lifecycle: create, save, remove.
//!
//! Each operation walks the task through its status ladder via the data
//! gateway. Status-update failures are logged and tolerated; the task
//! record is observability, not the source of truth for the operation.

use chrono::Utc;
use serde_json::{json, Map, Value};
use svp_client::DataGatewayClient;
use svp_schemas::{
    status, InsertSchemaRequest, SchemaEnvelope, SchemaTaskResult, SchemaWriteStatus, TaskKind,
    UpdateTaskRequest,
};
use tracing::{error, info};

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

/// Fire-and-tolerate status update against the gateway.
pub async fn update_task_status(
    client: &DataGatewayClient,
    task_id: &str,
    kind: TaskKind,
    new_status: &str,
    message: &str,
    data: Option<Map<String, Value>>,
    reset_data: bool,
) {
    let request = UpdateTaskRequest {
        task_id: task_id.to_string(),
        task: kind,
        field: "status".to_string(),
        value: Value::String(new_status.to_string()),
        message: message.to_string(),
        data,
        reset_data,
    };
    if let Err(err) = client.update_task_id(&request).await {
        error!(%task_id, status = new_status, %err, "task status update failed");
    }
}

fn date_data(upload_date: Option<&str>) -> Map<String, Value> {
    let mut data = Map::new();
    if let Some(upload_date) = upload_date {
        data.insert("upload_date".into(), json!(upload_date));
    }
    data.insert("update_date".into(), json!(now_iso()));
    data
}

// ---------------------------------------------------------------------------
// Schema creation
// ---------------------------------------------------------------------------

/// Build the schema to store. Non-raw payloads are property maps that get
/// wrapped into a strict object schema; raw payloads must already be a
/// valid draft-07 document.
pub fn create_schema(raw: bool, body: &Value) -> Result<Value, String> {
    if !raw {
        let properties = body.clone();
        let required: Vec<String> = properties
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        return Ok(json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        }));
    }

    // Compilation doubles as the schema-validity check.
    jsonschema::validator_for(body).map_err(|err| err.to_string())?;
    Ok(body.clone())
}

/// Normalize a schema for storage: fold the `$schema` marker into a plain
/// field and flatten property specs into `{type, extra}` form.
pub fn normalize_for_storage(schema: &Value) -> Value {
    let mut schema = schema.clone();
    let Some(object) = schema.as_object_mut() else {
        return schema;
    };

    let marker = object
        .remove("$schema")
        .unwrap_or_else(|| json!("http://json-schema.org/draft-07/schema#"));
    object.insert("schema".into(), marker);

    if let Some(properties) = object.get_mut("properties").and_then(Value::as_object_mut) {
        for spec in properties.values_mut() {
            let Some(fields) = spec.as_object() else {
                continue;
            };
            let type_value = fields.get("type").cloned().unwrap_or(Value::Null);
            let extra: Map<String, Value> = fields
                .iter()
                .filter(|(key, _)| key.as_str() != "type")
                .map(|(key, value)| {
                    let raw = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (key.clone(), Value::String(raw))
                })
                .collect();
            *spec = json!({ "type": type_value, "extra": extra });
        }
    }
    schema
}

// ---------------------------------------------------------------------------
// Message processing
// ---------------------------------------------------------------------------

/// Handle one schema envelope end to end and return the result to publish.
pub async fn process_schema_message(
    client: &DataGatewayClient,
    message: &SchemaEnvelope,
) -> SchemaTaskResult {
    let kind = TaskKind::Schemas;
    match message.task.as_str() {
        "upload_schema" => {
            info!(task_id = %message.id, "processing schema update");
            update_task_status(
                client,
                &message.id,
                kind,
                status::RECEIVED_SCHEMA_UPDATE,
                "",
                Some(date_data(Some(&message.date))),
                false,
            )
            .await;
            upload_schema(client, message).await
        }
        "remove_schema" => {
            info!(task_id = %message.id, "removing schema");
            update_task_status(
                client,
                &message.id,
                kind,
                status::RECEIVED_REMOVING_SCHEMA,
                "",
                Some(date_data(Some(&message.date))),
                false,
            )
            .await;
            remove_schema(client, message).await
        }
        other => {
            error!(task_id = %message.id, task = other, "unknown schema task");
            SchemaTaskResult {
                task_id: message.id.clone(),
                status: status::ERROR.to_string(),
                import_name: message.import_name.clone(),
                schema: None,
                result: json!({ "message": format!("unknown schema task: {other}") }),
            }
        }
    }
}

async fn upload_schema(
    client: &DataGatewayClient,
    message: &SchemaEnvelope,
) -> SchemaTaskResult {
    let kind = TaskKind::Schemas;
    let task_id = &message.id;
    let import_name = &message.import_name;

    update_task_status(
        client,
        task_id,
        kind,
        status::CREATING_SCHEMA,
        &format!("Creating schema for import: {import_name}"),
        Some(date_data(None)),
        false,
    )
    .await;

    let body = message.schema.clone().unwrap_or(Value::Null);
    let schema = match create_schema(message.raw, &body) {
        Ok(schema) => schema,
        Err(err) => {
            error!(%task_id, %err, "schema creation failed");
            update_task_status(
                client,
                task_id,
                kind,
                status::FAILED_CREATING_SCHEMA,
                &err,
                Some(date_data(None)),
                false,
            )
            .await;
            return SchemaTaskResult {
                task_id: task_id.clone(),
                status: status::FAILED_CREATING_SCHEMA.to_string(),
                import_name: import_name.clone(),
                schema: None,
                result: json!({ "message": err }),
            };
        }
    };

    update_task_status(
        client,
        task_id,
        kind,
        status::SCHEMA_CREATED,
        &format!("Schema created for import: {import_name}"),
        Some(date_data(None)),
        false,
    )
    .await;

    update_task_status(
        client,
        task_id,
        kind,
        status::SAVING_SCHEMA,
        "",
        Some(date_data(None)),
        false,
    )
    .await;

    let stored = normalize_for_storage(&schema);
    let request = InsertSchemaRequest {
        import_name: import_name.clone(),
        active_schema: stored,
        created_at: Utc::now(),
    };

    let (task_status, result) = match client.insert_one_schema(&request).await {
        Ok(response) => {
            let result = serde_json::to_value(&response).unwrap_or(Value::Null);
            match response.status {
                SchemaWriteStatus::Error => (status::FAILED_SAVING_SCHEMA, result),
                _ => (status::COMPLETED, result),
            }
        }
        Err(err) => (
            status::FAILED_SAVING_SCHEMA,
            json!({ "message": err.to_string() }),
        ),
    };

    let mut data = date_data(None);
    data.insert("results".into(), result.clone());
    update_task_status(
        client,
        task_id,
        kind,
        task_status,
        "Schema processed and uploaded to the database.",
        Some(data),
        false,
    )
    .await;

    SchemaTaskResult {
        task_id: task_id.clone(),
        status: task_status.to_string(),
        import_name: import_name.clone(),
        schema: Some(schema),
        result,
    }
}

async fn remove_schema(
    client: &DataGatewayClient,
    message: &SchemaEnvelope,
) -> SchemaTaskResult {
    let kind = TaskKind::Schemas;
    let task_id = &message.id;
    let import_name = &message.import_name;

    update_task_status(
        client,
        task_id,
        kind,
        status::REMOVING_SCHEMA,
        &format!("Removing schema for import: {import_name}"),
        Some(date_data(None)),
        false,
    )
    .await;

    let (task_status, result) = match client.delete_one_jsonschema(import_name).await {
        Ok(response) => {
            let result = serde_json::to_value(&response).unwrap_or(Value::Null);
            if response.success {
                (status::COMPLETED, result)
            } else {
                (status::FAILED_REMOVING_SCHEMA, result)
            }
        }
        Err(err) => (
            status::FAILED_REMOVING_SCHEMA,
            json!({ "message": err.to_string() }),
        ),
    };

    let mut data = date_data(None);
    data.insert("results".into(), result.clone());
    update_task_status(
        client,
        task_id,
        kind,
        task_status,
        "Schema removal completed.",
        Some(data),
        false,
    )
    .await;

    SchemaTaskResult {
        task_id: task_id.clone(),
        status: task_status.to_string(),
        import_name: import_name.clone(),
        schema: None,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_raw_body_becomes_a_strict_object_schema() {
        let body = json!({
            "name": {"type": "string"},
            "age": {"type": "integer"}
        });
        let schema = create_schema(false, &body).unwrap();

        assert_eq!(schema["type"], json!("object"));
        assert_eq!(schema["additionalProperties"], json!(false));
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("name")));
        assert!(required.contains(&json!("age")));
    }

    #[test]
    fn raw_body_must_be_a_valid_draft7_schema() {
        assert!(create_schema(true, &json!({"type": "object"})).is_ok());
        assert!(create_schema(true, &json!({"type": "not-a-type"})).is_err());
    }

    #[test]
    fn storage_normalization_flattens_property_specs() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "age": {"type": "integer", "minimum": 0}
            }
        });
        let stored = normalize_for_storage(&schema);

        assert!(stored.get("$schema").is_none());
        assert_eq!(
            stored["schema"],
            json!("http://json-schema.org/draft-07/schema#")
        );
        assert_eq!(stored["properties"]["age"]["type"], json!("integer"));
        assert_eq!(stored["properties"]["age"]["extra"]["minimum"], json!("0"));
    }
}
