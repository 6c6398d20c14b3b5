//! Messaging gateway: hosts the result-queue workers and streams their
//! buffered messages to subscribers over SSE.
//!
//! The gateway's workers consume the two `*-results` queues (the request
//! queues belong to the domain workers); every streaming subscriber drains
//! the same in-process queue, so a message reaches at most one subscriber.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{error, info};

use svp_config::{publisher_routing_key, result_routing_key, BrokerSettings, Topology};
use svp_messaging::{BrokerFactory, Envelope, QueueWorker, StreamEvent};
use svp_schemas::{SchemaTaskResult, TaskKind, ValidationTaskResult};

/// Poll interval for the in-process queues while a subscriber is attached.
const STREAM_POLL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// WorkerManager
// ---------------------------------------------------------------------------

/// Spawns each hosted worker on its own task and tracks readiness. Workers
/// keep running across any number of streaming subscribers.
pub struct WorkerManager {
    pub schemas: Arc<QueueWorker<SchemaTaskResult>>,
    pub validations: Arc<QueueWorker<ValidationTaskResult>>,
    ready_tx: watch::Sender<bool>,
}

impl WorkerManager {
    pub fn new(
        factory: &BrokerFactory,
        policy: svp_config::RetryPolicy,
        prefetch_count: u16,
        queue_capacity: usize,
    ) -> Self {
        let topology = factory.topology();
        let schemas = QueueWorker::new(
            "schemas-results",
            topology.queue_schemas_results.queue.clone(),
            factory.clone(),
            policy,
            prefetch_count,
            queue_capacity,
        );
        let validations = QueueWorker::new(
            "validations-results",
            topology.queue_validations_results.queue.clone(),
            factory.clone(),
            policy,
            prefetch_count,
            queue_capacity,
        );
        let (ready_tx, _) = watch::channel(false);
        Self {
            schemas,
            validations,
            ready_tx,
        }
    }

    /// Spawn both consume loops. A worker that exhausts its retry budget
    /// takes the whole process down so the orchestrator restarts it.
    pub fn start_workers(&self) {
        spawn_worker(Arc::clone(&self.schemas));
        spawn_worker(Arc::clone(&self.validations));
        let _ = self.ready_tx.send(true);
        info!("messaging workers started");
    }

    pub fn stop_workers(&self) {
        self.schemas.stop_consuming();
        self.validations.stop_consuming();
        info!("messaging workers stopped");
    }

    async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

fn spawn_worker<T: Envelope>(worker: Arc<QueueWorker<T>>) {
    tokio::spawn(async move {
        if let Err(err) = worker.start_consuming().await {
            error!(worker = worker.name(), %err, "worker failed, exiting for restart");
            std::process::exit(1);
        }
    });
}

// ---------------------------------------------------------------------------
// State + router
// ---------------------------------------------------------------------------

pub struct MessagingState {
    pub manager: WorkerManager,
    pub broker: BrokerSettings,
    pub topology: Topology,
}

type AppState = State<Arc<MessagingState>>;

pub fn build_router(state: Arc<MessagingState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/messaging/params", get(messaging_params))
        .route("/v1/routing-keys/schemas", get(routing_key_schemas))
        .route("/v1/routing-keys/validations", get(routing_key_validations))
        .route("/v1/stream/schemas", get(stream_schemas))
        .route("/v1/stream/validations", get(stream_validations))
        .with_state(state)
}

async fn health(State(state): AppState) -> Json<Value> {
    Json(json!({
        "service": "svp-messaging-gateway",
        "status": "ok",
        "schemas_queue_depth": state.manager.schemas.queue_size(),
        "validations_queue_depth": state.manager.validations.queue_size(),
    }))
}

async fn messaging_params(State(state): AppState) -> Json<svp_schemas::MessagingParams> {
    Json(state.topology.messaging_params(&state.broker))
}

#[derive(Deserialize)]
struct RoutingKeyQuery {
    #[serde(default)]
    results: bool,
}

async fn routing_key_schemas(Query(query): Query<RoutingKeyQuery>) -> Json<Value> {
    let key = if query.results {
        result_routing_key(TaskKind::Schemas)
    } else {
        publisher_routing_key(TaskKind::Schemas)
    };
    Json(json!({ "routing_key": key }))
}

async fn routing_key_validations(Query(query): Query<RoutingKeyQuery>) -> Json<Value> {
    let key = if query.results {
        result_routing_key(TaskKind::Validation)
    } else {
        publisher_routing_key(TaskKind::Validation)
    };
    Json(json!({ "routing_key": key }))
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

fn message_stream<T>(
    worker: Arc<QueueWorker<T>>,
) -> impl Stream<Item = Result<Event, Infallible>>
where
    T: Envelope + serde::Serialize,
{
    futures_util::stream::unfold(worker, |worker| async move {
        loop {
            match worker.next_event(STREAM_POLL).await {
                StreamEvent::Message(message) => match Event::default().json_data(&message) {
                    Ok(event) => return Some((Ok(event), worker)),
                    Err(err) => {
                        error!(%err, "dropping unencodable message from stream");
                        continue;
                    }
                },
                // SSE keep-alive comments handle liveness; just poll again.
                StreamEvent::Idle => continue,
                StreamEvent::Stopped => return None,
            }
        }
    })
}

async fn stream_schemas(
    State(state): AppState,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    state.manager.wait_ready().await;
    Sse::new(message_stream(Arc::clone(&state.manager.schemas)))
        .keep_alive(KeepAlive::default())
}

async fn stream_validations(
    State(state): AppState,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    state.manager.wait_ready().await;
    Sse::new(message_stream(Arc::clone(&state.manager.validations)))
        .keep_alive(KeepAlive::default())
}
