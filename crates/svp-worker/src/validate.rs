//! Schema-driven row validation.
//!
//! Rows are coerced toward the schema's property types first (CSV delivers
//! everything as strings), then validated in parallel chunks against the
//! compiled draft-07 validator.
//!
//! Item accounting quirk, kept on purpose: `total_items` counts
//! `rows × columns` cells while validation is per row, so the
//! valid/invalid arithmetic skews for partially invalid files. Downstream
//! consumers read these numbers as-is.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use svp_schemas::FileMetadata;

/// Cap on the error list carried in a validation report.
const MAX_REPORTED_ERRORS: usize = 50;

/// Outcome of validating one uploaded file against its active schema.
#[derive(Clone, Debug)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub total_items: usize,
    pub valid_items: usize,
    pub invalid_items: usize,
    pub errors: Vec<String>,
    pub message: Option<String>,
}

impl ValidationReport {
    fn empty_file() -> Self {
        Self {
            is_valid: true,
            total_items: 0,
            valid_items: 0,
            invalid_items: 0,
            errors: Vec::new(),
            message: Some("File is empty but valid".to_string()),
        }
    }

    /// Summary status: `success` when everything passed, `warning` when
    /// some rows failed. Hard failures never reach a report.
    pub fn summary_status(&self) -> &'static str {
        if self.is_valid {
            "success"
        } else {
            "warning"
        }
    }

    pub fn summary_text(&self) -> String {
        if self.is_valid {
            format!("All {} items passed validation", self.total_items)
        } else {
            format!(
                "{} out of {} items failed validation",
                self.invalid_items, self.total_items
            )
        }
    }

    /// Wire form carried inside the result message and the task record.
    pub fn to_value(&self, metadata: &FileMetadata, import_name: &str) -> Value {
        json!({
            "is_valid": self.is_valid,
            "total_items": self.total_items,
            "valid_items": self.valid_items,
            "invalid_items": self.invalid_items,
            "errors": self.errors,
            "message": self.message,
            "file_name": metadata.filename,
            "file_size": metadata.size,
            "content_type": metadata.content_type,
            "import_name": import_name,
            "validated_at": Utc::now().to_rfc3339(),
        })
    }
}

#[derive(Debug)]
pub enum ValidationError {
    /// The schema body itself does not compile.
    BadSchema(String),
    /// File columns differ from the schema's property set.
    ColumnsMismatch { file: Vec<String>, schema: Vec<String> },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::BadSchema(message) => write!(f, "invalid schema: {message}"),
            ValidationError::ColumnsMismatch { file, schema } => write!(
                f,
                "Columns do not match schema properties. File columns: {file:?}. \
                 Schema properties: {schema:?}."
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate `rows` against `schema` with up to `n_workers` parallel chunks.
pub async fn validate_rows(
    rows: Vec<Map<String, Value>>,
    schema: &Value,
    n_workers: usize,
) -> Result<ValidationReport, ValidationError> {
    if rows.is_empty() {
        return Ok(ValidationReport::empty_file());
    }

    check_columns(&rows, schema)?;

    let rows: Vec<Map<String, Value>> = rows
        .into_iter()
        .map(|row| coerce_row(row, schema))
        .collect();

    let validator = Arc::new(
        jsonschema::validator_for(schema)
            .map_err(|err| ValidationError::BadSchema(err.to_string()))?,
    );

    let columns = rows[0].len().max(1);
    let row_count = rows.len();
    let chunk_size = (row_count / n_workers.max(1)).max(1);

    let mut handles = Vec::new();
    for (index, chunk) in rows.chunks(chunk_size).enumerate() {
        let validator = Arc::clone(&validator);
        let chunk: Vec<Map<String, Value>> = chunk.to_vec();
        let offset = index * chunk_size;
        handles.push(tokio::task::spawn_blocking(move || {
            let mut errors = Vec::new();
            for (i, row) in chunk.iter().enumerate() {
                let instance = Value::Object(row.clone());
                // One error per row: the first failure is what the report
                // carries, matching the per-row valid/invalid arithmetic.
                if let Some(error) = validator.iter_errors(&instance).next() {
                    errors.push(format!("Item {}: {}", offset + i, error));
                }
            }
            (chunk.len(), errors)
        }));
    }

    let mut all_errors = Vec::new();
    let mut valid_items = 0;
    for handle in handles {
        let (chunk_rows, errors) = handle.await.expect("validation chunk panicked");
        if errors.is_empty() {
            valid_items += chunk_rows;
        } else {
            valid_items += chunk_rows.saturating_sub(errors.len());
            all_errors.extend(errors);
        }
    }

    // Cell-based total with row-based valid counts; see module docs.
    let total_items = row_count * columns;
    let invalid_items = total_items - valid_items;

    all_errors.truncate(MAX_REPORTED_ERRORS);
    Ok(ValidationReport {
        is_valid: all_errors.is_empty(),
        total_items,
        valid_items,
        invalid_items,
        errors: all_errors,
        message: None,
    })
}

fn check_columns(
    rows: &[Map<String, Value>],
    schema: &Value,
) -> Result<(), ValidationError> {
    let schema_properties: Vec<String> = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| properties.keys().cloned().collect())
        .unwrap_or_default();

    let mut file_columns: Vec<String> = rows[0].keys().cloned().collect();
    let mut expected = schema_properties.clone();
    file_columns.sort();
    expected.sort();

    if file_columns != expected {
        return Err(ValidationError::ColumnsMismatch {
            file: file_columns,
            schema: expected,
        });
    }
    Ok(())
}

/// Best-effort coercion of string cells toward the schema's declared
/// property types. Values that do not convert are left alone and fail
/// validation with a precise error instead.
fn coerce_row(row: Map<String, Value>, schema: &Value) -> Map<String, Value> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return row;
    };

    row.into_iter()
        .map(|(key, value)| {
            let target = properties
                .get(&key)
                .and_then(|spec| spec.get("type"))
                .and_then(Value::as_str);
            let coerced = match (target, &value) {
                (Some("boolean"), Value::String(raw)) => match raw.to_lowercase().as_str() {
                    "true" | "1" | "yes" | "y" => Value::Bool(true),
                    "false" | "0" | "no" | "n" => Value::Bool(false),
                    _ => value,
                },
                // Spreadsheet tools round-trip integers as "36.0"; parse
                // through f64 and truncate, like int(float(..)).
                (Some("integer"), Value::String(raw)) => raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|parsed| parsed.is_finite())
                    .map(|parsed| Value::from(parsed.trunc() as i64))
                    .unwrap_or(value),
                (Some("number"), Value::String(raw)) => raw
                    .trim()
                    .parse::<f64>()
                    .map(Value::from)
                    .unwrap_or(value),
                (Some("string"), Value::Number(n)) => Value::String(n.to_string()),
                _ => value,
            };
            (key, coerced)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "integer"}
            },
            "required": ["name"]
        })
    }

    fn row(name: &str, age: &str) -> Map<String, Value> {
        let mut row = Map::new();
        row.insert("name".into(), json!(name));
        row.insert("age".into(), json!(age));
        row
    }

    #[tokio::test]
    async fn csv_strings_coerce_and_pass() {
        let report = validate_rows(vec![row("Ada", "36")], &schema(), 4)
            .await
            .unwrap();
        assert!(report.is_valid);
        assert_eq!(report.summary_status(), "success");
        // 1 row × 2 columns.
        assert_eq!(report.total_items, 2);
    }

    #[tokio::test]
    async fn decimal_formatted_integers_coerce_and_pass() {
        // Spreadsheet exports commonly render 36 as "36.0".
        let report = validate_rows(vec![row("Ada", "36.0")], &schema(), 4)
            .await
            .unwrap();
        assert!(report.is_valid, "{:?}", report.errors);
    }

    #[tokio::test]
    async fn bad_rows_produce_warning_with_indexed_errors() {
        let rows = vec![row("Ada", "36"), row("Lin", "not-a-number")];
        let report = validate_rows(rows, &schema(), 4).await.unwrap();
        assert!(!report.is_valid);
        assert_eq!(report.summary_status(), "warning");
        assert!(report.errors.iter().any(|e| e.starts_with("Item 1:")));
    }

    #[tokio::test]
    async fn column_mismatch_is_a_domain_error() {
        let mut odd = Map::new();
        odd.insert("name".into(), json!("Ada"));
        odd.insert("height".into(), json!("170"));

        let result = validate_rows(vec![odd], &schema(), 4).await;
        assert!(matches!(
            result,
            Err(ValidationError::ColumnsMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn empty_file_is_valid() {
        let report = validate_rows(Vec::new(), &schema(), 4).await.unwrap();
        assert!(report.is_valid);
        assert_eq!(report.total_items, 0);
        assert_eq!(report.message.as_deref(), Some("File is empty but valid"));
    }
}
