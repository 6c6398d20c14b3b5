//! Task publisher: assigns ids and publishes persistent messages.

use chrono::Utc;
use lapin::options::BasicPublishOptions;
use lapin::types::ShortString;
use lapin::{BasicProperties, Channel, Connection};
use serde::Serialize;
use serde_json::{Map, Value};
use svp_config::{publisher_routing_key, result_routing_key};
use svp_schemas::{FileMetadata, SchemaEnvelope, TaskKind, ValidationEnvelope};
use tracing::info;
use uuid::Uuid;

use crate::factory::BrokerFactory;
use crate::worker::WorkerError;

/// Publishes validation requests and schema updates to the topic exchange.
/// Owns one connection + channel; lost channels are reopened lazily on the
/// next publish.
pub struct Publisher {
    factory: BrokerFactory,
    connection: Option<Connection>,
    channel: Option<Channel>,
}

impl Publisher {
    pub fn new(factory: BrokerFactory) -> Self {
        Self {
            factory,
            connection: None,
            channel: None,
        }
    }

    async fn channel(&mut self) -> Result<&Channel, WorkerError> {
        let stale = !matches!(&self.channel, Some(channel) if channel.status().connected());
        if stale {
            let (connection, channel) = self.factory.connect_with_channel().await?;
            self.connection = Some(connection);
            self.channel = Some(channel);
        }
        Ok(self.channel.as_ref().expect("channel opened above"))
    }

    /// Publish a file-validation request. Returns the assigned task id.
    pub async fn publish_validation_request(
        &mut self,
        file_data: &[u8],
        import_name: &str,
        metadata: FileMetadata,
        extra: Map<String, Value>,
    ) -> Result<String, WorkerError> {
        let task_id = Uuid::new_v4().to_string();
        let envelope = ValidationEnvelope {
            id: task_id.clone(),
            task: "sample_validation".to_string(),
            import_name: import_name.to_string(),
            file_data: hex::encode(file_data),
            metadata,
            date: Utc::now().to_rfc3339(),
            extra,
        };

        self.publish(
            publisher_routing_key(TaskKind::Validation),
            &task_id,
            &serde_json::to_vec(&envelope)
                .map_err(|err| WorkerError::Fatal(format!("envelope encoding: {err}")))?,
        )
        .await?;
        Ok(task_id)
    }

    /// Publish a schema upload (`task = "upload_schema"`) or removal
    /// (`task = "remove_schema"`, no body). Returns the assigned task id.
    pub async fn publish_schema_update(
        &mut self,
        task: &str,
        schema: Option<Value>,
        import_name: &str,
        raw: bool,
        extra: Map<String, Value>,
    ) -> Result<String, WorkerError> {
        let task_id = Uuid::new_v4().to_string();
        let envelope = SchemaEnvelope {
            id: task_id.clone(),
            task: task.to_string(),
            import_name: import_name.to_string(),
            schema,
            raw,
            date: Utc::now().to_rfc3339(),
            extra,
        };

        self.publish(
            publisher_routing_key(TaskKind::Schemas),
            &task_id,
            &serde_json::to_vec(&envelope)
                .map_err(|err| WorkerError::Fatal(format!("envelope encoding: {err}")))?,
        )
        .await?;
        Ok(task_id)
    }

    /// Publish a finished task's result to its `*.result.*` routing key.
    pub async fn publish_result<T: Serialize>(
        &mut self,
        kind: TaskKind,
        task_id: &str,
        result: &T,
    ) -> Result<(), WorkerError> {
        self.publish(
            result_routing_key(kind),
            task_id,
            &serde_json::to_vec(result)
                .map_err(|err| WorkerError::Fatal(format!("result encoding: {err}")))?,
        )
        .await
    }

    async fn publish(
        &mut self,
        routing_key: &str,
        task_id: &str,
        body: &[u8],
    ) -> Result<(), WorkerError> {
        let exchange = self.factory.topology().exchange.clone();
        let properties = BasicProperties::default()
            .with_message_id(ShortString::from(task_id.to_string()))
            .with_timestamp(Utc::now().timestamp() as u64)
            // 2 = persistent: survive a broker restart together with the
            // durable queue it lands in.
            .with_delivery_mode(2);

        let channel = self.channel().await?;
        channel
            .basic_publish(
                &exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await?
            .await?;

        info!(%task_id, %routing_key, "message published");
        Ok(())
    }
}
