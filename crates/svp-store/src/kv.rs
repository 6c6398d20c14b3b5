//! Hot-tier Redis client.
//!
//! Task records are stored as hashes (`{kind}:task:{id}`) with the `data`
//! object JSON-encoded in a single field and `code` stringified; task ids
//! are grouped per import name in a set. Both keys expire at the TTL the
//! current status maps to.

use std::collections::HashMap;

use redis::AsyncCommands;
use serde_json::{Map, Value};
use svp_config::TtlTable;
use svp_schemas::{TaskKind, TaskRecord};
use tracing::warn;

use crate::error::StoreError;

#[derive(Clone)]
pub struct KvClient {
    conn: redis::aio::MultiplexedConnection,
    ttl: TtlTable,
}

impl KvClient {
    pub async fn connect(url: &str, ttl: TtlTable) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(StoreError::Kv)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn, ttl })
    }

    pub fn ttl_table(&self) -> &TtlTable {
        &self.ttl
    }

    // =================== General purpose ===================

    pub async fn ping(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(reply == "PONG")
    }

    pub async fn is_healthy(&self) -> bool {
        self.ping().await.unwrap_or(false)
    }

    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.keys(pattern).await?)
    }

    /// Plain string set; `ttl_secs = None` or `0` falls back to the default
    /// table TTL so nothing in the hot tier lives forever.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let ttl = match ttl_secs {
            Some(secs) if secs > 0 => secs,
            _ => self.ttl.default_secs,
        };
        conn.set_ex::<_, _, ()>(key, value, ttl).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    pub async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        Ok(conn.del(keys).await?)
    }

    // ================= Task records =================

    pub async fn set_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        record: &TaskRecord,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let task_key = kind.task_key(task_id);
        let import_key = kind.import_key(record.import_name());

        let fields: Vec<(&str, String)> = vec![
            ("status", record.status.clone()),
            ("code", record.code.to_string()),
            ("message", record.message.clone()),
            ("data", Value::Object(record.data.clone()).to_string()),
        ];
        conn.hset_multiple::<_, _, _, ()>(&task_key, &fields).await?;
        conn.sadd::<_, _, ()>(&import_key, task_id).await?;

        let ttl = self.ttl.ttl_for(&record.status) as i64;
        conn.expire::<_, ()>(&task_key, ttl).await?;
        conn.expire::<_, ()>(&import_key, ttl).await?;
        Ok(())
    }

    pub async fn update_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        field: &str,
        value: &Value,
        message: &str,
        data: Option<&Map<String, Value>>,
        reset_data: bool,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let task_key = kind.task_key(task_id);

        // Scalar fields land as plain strings, objects as JSON.
        let raw = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        conn.hset::<_, _, _, ()>(&task_key, field, &raw).await?;

        if !message.is_empty() {
            conn.hset::<_, _, _, ()>(&task_key, "message", message).await?;
        }

        if let Some(patch) = data {
            let mut merged = if reset_data {
                Map::new()
            } else {
                self.get_task(task_id, kind)
                    .await?
                    .map(|record| record.data)
                    .unwrap_or_default()
            };
            for (key, value) in patch {
                merged.insert(key.clone(), value.clone());
            }
            conn.hset::<_, _, _, ()>(&task_key, "data", Value::Object(merged).to_string())
                .await?;
        }

        if field == "status" {
            let status = value.as_str().unwrap_or_default();
            conn.expire::<_, ()>(&task_key, self.ttl.ttl_for(status) as i64)
                .await?;
        }
        Ok(())
    }

    pub async fn get_task(
        &self,
        task_id: &str,
        kind: TaskKind,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let hash: HashMap<String, String> = conn.hgetall(kind.task_key(task_id)).await?;
        if hash.is_empty() {
            return Ok(None);
        }
        Ok(Some(reshape_task_hash(hash)?))
    }

    /// Set-membership lookup: every task id filed under the import name,
    /// decoded. Ids whose hash already expired are skipped.
    pub async fn tasks_by_import(
        &self,
        import_name: &str,
        kind: TaskKind,
    ) -> Result<Vec<TaskRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(kind.import_key(import_name)).await?;

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            let hash: HashMap<String, String> = conn.hgetall(kind.task_key(&id)).await?;
            if hash.is_empty() {
                continue;
            }
            match reshape_task_hash(hash) {
                Ok(record) => tasks.push(record),
                Err(err) => warn!(task_id = %id, %err, "skipping malformed task hash"),
            }
        }
        Ok(tasks)
    }

    // =================== Manage all cache ===================

    /// Typed dump of every key. Expensive on big instances; diagnostics
    /// surface only.
    pub async fn get_cache(&self) -> Result<Map<String, Value>, StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys("*").await?;

        let mut cache = Map::new();
        for key in keys {
            let key_type: String = redis::cmd("TYPE")
                .arg(&key)
                .query_async(&mut conn)
                .await?;
            let value = match key_type.as_str() {
                "string" => {
                    let raw: Option<String> = conn.get(&key).await?;
                    match raw {
                        Some(raw) => {
                            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
                        }
                        None => Value::Null,
                    }
                }
                "hash" => {
                    let hash: HashMap<String, String> = conn.hgetall(&key).await?;
                    let mut object = Map::new();
                    for (field, raw) in hash {
                        let parsed = if field == "data" {
                            serde_json::from_str(&raw).unwrap_or(Value::String(raw))
                        } else {
                            Value::String(raw)
                        };
                        object.insert(field, parsed);
                    }
                    Value::Object(object)
                }
                "set" => {
                    let members: Vec<String> = conn.smembers(&key).await?;
                    Value::Array(members.into_iter().map(Value::String).collect())
                }
                "list" => {
                    let items: Vec<String> = conn.lrange(&key, 0, -1).await?;
                    Value::Array(items.into_iter().map(Value::String).collect())
                }
                other => Value::String(format!("Unsupported type: {other}")),
            };
            cache.insert(key, value);
        }
        Ok(cache)
    }

    pub async fn clear_cache(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("FLUSHDB").query_async::<_, ()>(&mut conn).await?;
        Ok(true)
    }
}

/// Rebuild a [`TaskRecord`] from its hash fields: `code` parses back to an
/// integer, `data` from its JSON encoding.
fn reshape_task_hash(hash: HashMap<String, String>) -> Result<TaskRecord, StoreError> {
    let status = hash
        .get("status")
        .cloned()
        .ok_or_else(|| StoreError::Decode("task hash missing status".into()))?;
    let code = hash
        .get("code")
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| StoreError::Decode("task hash has non-numeric code".into()))?;
    let message = hash.get("message").cloned().unwrap_or_default();
    let data = match hash.get("data") {
        Some(raw) => serde_json::from_str::<Value>(raw)
            .ok()
            .and_then(|value| value.as_object().cloned())
            .ok_or_else(|| StoreError::Decode("task hash data is not a JSON object".into()))?,
        None => Map::new(),
    };

    Ok(TaskRecord {
        status,
        code,
        message,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hash(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reshape_decodes_code_and_data() {
        let record = reshape_task_hash(hash(&[
            ("status", "accepted"),
            ("code", "202"),
            ("message", "ok"),
            ("data", r#"{"import_name":"u1"}"#),
        ]))
        .unwrap();

        assert_eq!(record.code, 202);
        assert_eq!(record.data.get("import_name"), Some(&json!("u1")));
    }

    #[test]
    fn reshape_rejects_non_numeric_code() {
        let result = reshape_task_hash(hash(&[("status", "accepted"), ("code", "lots")]));
        assert!(matches!(result, Err(StoreError::Decode(_))));
    }

    #[test]
    fn reshape_tolerates_missing_data_field() {
        let record =
            reshape_task_hash(hash(&[("status", "error"), ("code", "500")])).unwrap();
        assert!(record.data.is_empty());
        assert!(record.message.is_empty());
    }
}
