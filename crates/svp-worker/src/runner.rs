//! Domain worker manager: hosts the two request-queue consumers and their
//! processor loops.
//!
//! Each queue gets a consume task (broker → in-process queue) and a
//! processor task (in-process queue → domain flow → result publish). A
//! consume task that exhausts its retry budget exits the process non-zero
//! so the orchestrator restarts it with clean state.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use svp_client::DataGatewayClient;
use svp_config::{RetryPolicy, WorkerSettings};
use svp_messaging::{BrokerFactory, Envelope, Publisher, QueueWorker, StreamEvent};
use svp_schemas::{status, SchemaEnvelope, TaskKind, ValidationEnvelope};
use tracing::{error, info};

use crate::schema_flow::{process_schema_message, update_task_status};
use crate::validation_flow::process_validation_message;

const PROCESS_POLL: Duration = Duration::from_secs(1);

/// Statuses whose results are worth publishing downstream.
fn is_publishable(task_status: &str) -> bool {
    matches!(
        task_status,
        status::COMPLETED | status::SUCCESS | status::WARNING
    )
}

pub struct DomainWorkerManager {
    pub schemas: Arc<QueueWorker<SchemaEnvelope>>,
    pub validations: Arc<QueueWorker<ValidationEnvelope>>,
    factory: BrokerFactory,
    client: DataGatewayClient,
    settings: WorkerSettings,
}

impl DomainWorkerManager {
    pub fn new(
        factory: BrokerFactory,
        policy: RetryPolicy,
        settings: WorkerSettings,
        client: DataGatewayClient,
    ) -> Self {
        let topology = factory.topology();
        let schemas = QueueWorker::new(
            "schemas",
            topology.queue_schemas.queue.clone(),
            factory.clone(),
            policy,
            settings.prefetch_count,
            settings.queue_capacity,
        );
        let validations = QueueWorker::new(
            "validations",
            topology.queue_validations.queue.clone(),
            factory.clone(),
            policy,
            settings.prefetch_count,
            settings.queue_capacity,
        );
        Self {
            schemas,
            validations,
            factory,
            client,
            settings,
        }
    }

    /// Spawn consume + processor tasks for both queues.
    pub fn start_workers(&self) {
        spawn_consumer(Arc::clone(&self.schemas));
        spawn_consumer(Arc::clone(&self.validations));

        let schemas = Arc::clone(&self.schemas);
        let client = self.client.clone();
        let factory = self.factory.clone();
        tokio::spawn(async move {
            let mut publisher = Publisher::new(factory);
            loop {
                match schemas.next_event(PROCESS_POLL).await {
                    StreamEvent::Message(message) => {
                        let result = process_schema_message(&client, &message).await;
                        publish_result(
                            &mut publisher,
                            &client,
                            TaskKind::Schemas,
                            &result.task_id,
                            &result.status,
                            &result,
                        )
                        .await;
                    }
                    StreamEvent::Idle => continue,
                    StreamEvent::Stopped => break,
                }
            }
            info!("schema processor stopped");
        });

        let validations = Arc::clone(&self.validations);
        let client = self.client.clone();
        let factory = self.factory.clone();
        let n_workers = self.settings.max_validators;
        tokio::spawn(async move {
            let mut publisher = Publisher::new(factory);
            loop {
                match validations.next_event(PROCESS_POLL).await {
                    StreamEvent::Message(message) => {
                        let result =
                            process_validation_message(&client, &message, n_workers).await;
                        publish_result(
                            &mut publisher,
                            &client,
                            TaskKind::Validation,
                            &result.task_id,
                            &result.status,
                            &result,
                        )
                        .await;
                    }
                    StreamEvent::Idle => continue,
                    StreamEvent::Stopped => break,
                }
            }
            info!("validation processor stopped");
        });

        info!("domain workers started");
    }

    pub fn stop_workers(&self) {
        self.schemas.stop_consuming();
        self.validations.stop_consuming();
        info!("domain workers stopped");
    }
}

fn spawn_consumer<T: Envelope>(worker: Arc<QueueWorker<T>>) {
    tokio::spawn(async move {
        if let Err(err) = worker.start_consuming().await {
            error!(worker = worker.name(), %err, "worker failed, exiting for restart");
            std::process::exit(1);
        }
    });
}

/// Publish a finished task's result, or mark why it could not be
/// published. Tasks that ended in a failure status stay unpublished; a
/// publish failure on a good result flips the task to
/// `failed-publishing-result`, keeping the original upload date.
async fn publish_result<T: serde::Serialize>(
    publisher: &mut Publisher,
    client: &DataGatewayClient,
    kind: TaskKind,
    task_id: &str,
    task_status: &str,
    result: &T,
) {
    if !is_publishable(task_status) {
        mark_unpublished(client, kind, task_id, "task did not complete").await;
        return;
    }

    match publisher.publish_result(kind, task_id, result).await {
        Ok(()) => {
            update_task_status(
                client,
                task_id,
                kind,
                status::PUBLISHED,
                "Task result published",
                Some(update_date_data()),
                false,
            )
            .await;
            info!(%task_id, "task result published");
        }
        Err(err) => {
            error!(%task_id, %err, "failed to publish task result");
            mark_unpublished(client, kind, task_id, "Failed to publish task result").await;
        }
    }
}

fn update_date_data() -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(
        "update_date".into(),
        json!(chrono::Utc::now().to_rfc3339()),
    );
    data
}

async fn mark_unpublished(
    client: &DataGatewayClient,
    kind: TaskKind,
    task_id: &str,
    reason: &str,
) {
    // Preserve the original upload date across the data reset.
    let upload_date = client
        .get_task_id(task_id, kind)
        .await
        .ok()
        .and_then(|response| response.value)
        .and_then(|record| {
            record
                .data
                .get("upload_date")
                .and_then(Value::as_str)
                .map(str::to_string)
        });

    let mut data = update_date_data();
    data.insert("error".into(), json!(reason));
    if let Some(upload_date) = upload_date {
        data.insert("upload_date".into(), json!(upload_date));
    }

    update_task_status(
        client,
        task_id,
        kind,
        status::FAILED_PUBLISHING_RESULT,
        reason,
        Some(data),
        true,
    )
    .await;
}
