//! Uploaded-file decoding.
//!
//! Supported formats: CSV (decoded through headers into string-valued
//! rows) and JSON arrays of objects. Anything else is an unsupported
//! format, which is a domain error, not a retryable one.

use std::fmt;

use serde_json::{Map, Value};
use svp_schemas::FileMetadata;

#[derive(Debug)]
pub enum FileError {
    UnsupportedFormat(String),
    Malformed(String),
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::UnsupportedFormat(name) => {
                write!(f, "Unsupported file format: {name}")
            }
            FileError::Malformed(message) => write!(f, "Could not parse file: {message}"),
        }
    }
}

impl std::error::Error for FileError {}

/// Decode raw upload bytes into rows keyed by column name.
pub fn decode_rows(bytes: &[u8], metadata: &FileMetadata) -> Result<Vec<Map<String, Value>>, FileError> {
    let filename = metadata.filename.to_lowercase();
    let content_type = metadata.content_type.to_lowercase();

    if content_type.contains("csv") || filename.ends_with(".csv") {
        return decode_csv(bytes);
    }
    if content_type.contains("json") || filename.ends_with(".json") {
        return decode_json(bytes);
    }
    Err(FileError::UnsupportedFormat(metadata.filename.clone()))
}

fn decode_csv(bytes: &[u8]) -> Result<Vec<Map<String, Value>>, FileError> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|err| FileError::Malformed(err.to_string()))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| FileError::Malformed(err.to_string()))?;
        let mut row = Map::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), Value::String(field.to_string()));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn decode_json(bytes: &[u8]) -> Result<Vec<Map<String, Value>>, FileError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|err| FileError::Malformed(err.to_string()))?;
    let Value::Array(items) = value else {
        return Err(FileError::Malformed(
            "expected a top-level JSON array of objects".to_string(),
        ));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            other => Err(FileError::Malformed(format!(
                "expected an object row, got {other}"
            ))),
        })
        .collect()
}
