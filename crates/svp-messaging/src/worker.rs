//! Generic consume/buffer worker with stability-window retry.
//!
//! `QueueWorker` owns a broker connection, consumes one queue, and pushes
//! every well-formed message into a bounded in-process queue that one or
//! more local consumers drain through [`QueueWorker::next_event`]. The
//! consume loop survives broker flaps with exponential backoff, but a
//! connection that stayed up past the stability threshold does not count a
//! later drop against the retry budget. Exhausting the budget is fatal by
//! design: the process exits non-zero and the orchestrator restarts it with
//! clean state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
};
use lapin::types::FieldTable;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use svp_config::RetryPolicy;

use crate::factory::BrokerFactory;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A broker message the worker knows how to parse and identify.
pub trait Envelope: DeserializeOwned + Send + 'static {
    fn id(&self) -> &str;
}

impl Envelope for svp_schemas::SchemaEnvelope {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Envelope for svp_schemas::ValidationEnvelope {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Envelope for svp_schemas::SchemaTaskResult {
    fn id(&self) -> &str {
        &self.task_id
    }
}

impl Envelope for svp_schemas::ValidationTaskResult {
    fn id(&self) -> &str {
        &self.task_id
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum WorkerError {
    /// Broker transport failure; retried within the stability-window budget.
    Broker(lapin::Error),
    /// Anything else; fails fast.
    Fatal(String),
}

impl WorkerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, WorkerError::Broker(_))
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::Broker(err) => write!(f, "broker error: {err}"),
            WorkerError::Fatal(message) => write!(f, "worker error: {message}"),
        }
    }
}

impl std::error::Error for WorkerError {}

impl From<lapin::Error> for WorkerError {
    fn from(err: lapin::Error) -> Self {
        WorkerError::Broker(err)
    }
}

/// Why one consume session ended, and when it got as far as subscribing.
pub struct SessionFailure {
    pub error: WorkerError,
    /// Set when the session was consuming when it died; the retry loop
    /// measures connection stability from this point.
    pub subscribed_at: Option<Instant>,
}

// ---------------------------------------------------------------------------
// Retry loop
// ---------------------------------------------------------------------------

/// Drive `session` until it stops cleanly or the retry budget runs out.
///
/// A session that fails after being up for at least
/// `policy.stability_threshold` resets the attempt counter and delay: a
/// long-lived worker is not punished for an occasional broker restart. A
/// session that flaps within the window burns an attempt each time and
/// sleeps `delay * backoff^n` between tries. Non-transient failures and an
/// exhausted budget return `Err`; the caller is expected to exit non-zero.
pub async fn run_with_retry<F, Fut>(
    name: &str,
    policy: &RetryPolicy,
    mut session: F,
) -> Result<(), WorkerError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), SessionFailure>>,
{
    let mut attempts: u32 = 0;
    let mut current_delay = policy.retry_delay;

    while attempts < policy.max_retries {
        let attempt_start = Instant::now();
        match session().await {
            Ok(()) => {
                info!(worker = name, "worker stopped consuming");
                return Ok(());
            }
            Err(failure) if failure.error.is_transient() => {
                let since = failure.subscribed_at.unwrap_or(attempt_start);
                let elapsed = since.elapsed();
                if elapsed >= policy.stability_threshold {
                    info!(
                        worker = name,
                        stable_secs = elapsed.as_secs_f64(),
                        "connection was stable, resetting retry counter"
                    );
                    attempts = 0;
                    current_delay = policy.retry_delay;
                }

                if attempts + 1 < policy.max_retries {
                    warn!(
                        worker = name,
                        attempt = attempts + 1,
                        max_retries = policy.max_retries,
                        delay_secs = current_delay.as_secs_f64(),
                        error = %failure.error,
                        "broker connection lost, retrying"
                    );
                    tokio::time::sleep(current_delay).await;
                    current_delay = current_delay.mul_f64(policy.backoff);
                    attempts += 1;
                } else {
                    error!(
                        worker = name,
                        max_retries = policy.max_retries,
                        error = %failure.error,
                        "broker unreachable after exhausting retries, exiting \
                         so the orchestrator restarts this worker"
                    );
                    return Err(failure.error);
                }
            }
            Err(failure) => {
                error!(worker = name, error = %failure.error, "worker failed");
                return Err(failure.error);
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// StreamEvent
// ---------------------------------------------------------------------------

/// One step of the in-process message stream.
#[derive(Debug, PartialEq)]
pub enum StreamEvent<T> {
    Message(T),
    /// Nothing arrived within the poll timeout; liveness sentinel.
    Idle,
    /// The worker stopped; the stream is finished.
    Stopped,
}

// ---------------------------------------------------------------------------
// QueueWorker
// ---------------------------------------------------------------------------

pub struct QueueWorker<T> {
    name: &'static str,
    queue: String,
    factory: BrokerFactory,
    policy: RetryPolicy,
    prefetch_count: u16,
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    depth: AtomicUsize,
    consuming: AtomicBool,
    stop_tx: watch::Sender<bool>,
}

impl<T: Envelope> QueueWorker<T> {
    pub fn new(
        name: &'static str,
        queue: String,
        factory: BrokerFactory,
        policy: RetryPolicy,
        prefetch_count: u16,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (stop_tx, _) = watch::channel(false);
        Arc::new(Self {
            name,
            queue,
            factory,
            policy,
            prefetch_count,
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
            consuming: AtomicBool::new(false),
            stop_tx,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_consuming(&self) -> bool {
        self.consuming.load(Ordering::SeqCst)
    }

    pub fn has_messages(&self) -> bool {
        self.queue_size() > 0
    }

    pub fn queue_size(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Consume until stopped. Returns `Err` when the worker should take the
    /// whole process down (retry budget exhausted or non-broker failure).
    pub async fn start_consuming(self: &Arc<Self>) -> Result<(), WorkerError> {
        self.consuming.store(true, Ordering::SeqCst);
        let _ = self.stop_tx.send(false);
        let worker = Arc::clone(self);
        let result = run_with_retry(self.name, &self.policy, move || {
            let worker = Arc::clone(&worker);
            async move { worker.consume_session().await }
        })
        .await;
        self.stop_consuming();
        result
    }

    /// One broker session: connect, declare, subscribe, pump deliveries
    /// into the in-process queue until the broker drops or stop is set.
    async fn consume_session(self: &Arc<Self>) -> Result<(), SessionFailure> {
        let fail = |error: lapin::Error| SessionFailure {
            error: error.into(),
            subscribed_at: None,
        };

        let (connection, channel) = self.factory.connect_with_channel().await.map_err(fail)?;
        channel
            .basic_qos(self.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(fail)?;
        let mut consumer = channel
            .basic_consume(
                &self.queue,
                self.name,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(fail)?;

        info!(worker = self.name, queue = %self.queue, "worker started, waiting for messages");
        let subscribed_at = Instant::now();
        let mut stop_rx = self.stop_tx.subscribe();

        loop {
            tokio::select! {
                delivery = consumer.next() => match delivery {
                    Some(Ok(delivery)) => self.process_message(delivery).await.map_err(
                        |error| SessionFailure { error, subscribed_at: Some(subscribed_at) },
                    )?,
                    Some(Err(error)) => {
                        return Err(SessionFailure {
                            error: error.into(),
                            subscribed_at: Some(subscribed_at),
                        })
                    }
                    None => {
                        return Err(SessionFailure {
                            error: WorkerError::Broker(lapin::Error::InvalidConnectionState(
                                lapin::ConnectionState::Closed,
                            )),
                            subscribed_at: Some(subscribed_at),
                        })
                    }
                },
                _ = wait_for_stop(&mut stop_rx) => {
                    let _ = channel.close(200, "worker stopping").await;
                    let _ = connection.close(200, "worker stopping").await;
                    return Ok(());
                }
            }
        }
    }

    /// Buffer one parsed message for the in-process consumers.
    async fn push(&self, message: T) -> Result<(), ()> {
        self.tx.send(message).await.map_err(|_| ())?;
        self.depth.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Parse, buffer, ack. A body that fails to parse into the envelope is
    /// rejected without requeue so a poison message cannot loop forever.
    async fn process_message(&self, delivery: Delivery) -> Result<(), WorkerError> {
        match serde_json::from_slice::<T>(&delivery.data) {
            Ok(message) => {
                let id = message.id().to_string();
                if self.push(message).await.is_err() {
                    // Queue closed: the worker is shutting down.
                    let _ = delivery.nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await;
                    return Ok(());
                }
                delivery.ack(BasicAckOptions::default()).await?;
                debug!(worker = self.name, task_id = %id, "message buffered");
            }
            Err(err) => {
                warn!(worker = self.name, %err, "discarding malformed message");
                delivery
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await?;
            }
        }
        Ok(())
    }

    /// Next stream event for one consumer. Consumers sharing the worker
    /// share the queue: each message is delivered to at most one of them.
    /// Wakes immediately when the worker stops, even while the queue is
    /// empty.
    pub async fn next_event(&self, timeout: Duration) -> StreamEvent<T> {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow() && !self.has_messages() {
            return StreamEvent::Stopped;
        }

        let mut rx = self.rx.lock().await;
        tokio::select! {
            message = rx.recv() => match message {
                Some(message) => {
                    self.depth.fetch_sub(1, Ordering::SeqCst);
                    StreamEvent::Message(message)
                }
                None => StreamEvent::Stopped,
            },
            _ = wait_for_stop(&mut stop_rx) => StreamEvent::Stopped,
            _ = tokio::time::sleep(timeout) => StreamEvent::Idle,
        }
    }

    /// Idempotent stop: flips the stop signal; the consume session closes
    /// its channel and connection on its way out.
    pub fn stop_consuming(&self) {
        if !self.consuming.swap(false, Ordering::SeqCst) && *self.stop_tx.borrow() {
            return;
        }
        let _ = self.stop_tx.send(true);
    }
}

/// Resolve once the stop flag is actually `true` (a flag reset to `false`
/// is not a stop).
async fn wait_for_stop(stop_rx: &mut watch::Receiver<bool>) {
    loop {
        if *stop_rx.borrow_and_update() {
            return;
        }
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use svp_config::{BrokerSettings, Topology};
    use svp_schemas::SchemaEnvelope;

    fn policy(max_retries: u32, delay_secs: f64, threshold_secs: f64) -> RetryPolicy {
        RetryPolicy::new(max_retries, delay_secs, 2.0, threshold_secs)
    }

    fn test_worker(capacity: usize) -> Arc<QueueWorker<SchemaEnvelope>> {
        let broker = BrokerSettings {
            host: "localhost".into(),
            port: 5672,
            username: "guest".into(),
            password: "guest".into(),
            virtual_host: "/".into(),
        };
        let factory = BrokerFactory::new(&broker, Topology::from_env());
        QueueWorker::new(
            "schemas",
            "svp.schemas.queue".into(),
            factory,
            policy(3, 0.1, 60.0),
            10,
            capacity,
        )
    }

    fn envelope(id: &str) -> SchemaEnvelope {
        SchemaEnvelope {
            id: id.to_string(),
            task: "upload_schema".into(),
            import_name: "u1".into(),
            schema: None,
            raw: false,
            date: "2026-01-01T00:00:00Z".into(),
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn buffered_messages_stream_in_order() {
        let worker = test_worker(8);
        worker.push(envelope("a")).await.unwrap();
        worker.push(envelope("b")).await.unwrap();
        assert_eq!(worker.queue_size(), 2);
        assert!(worker.has_messages());

        match worker.next_event(Duration::from_millis(10)).await {
            StreamEvent::Message(message) => assert_eq!(message.id, "a"),
            other => panic!("unexpected event: {other:?}"),
        }
        match worker.next_event(Duration::from_millis(10)).await {
            StreamEvent::Message(message) => assert_eq!(message.id, "b"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(worker.queue_size(), 0);
    }

    #[tokio::test]
    async fn empty_queue_times_out_with_idle_sentinel() {
        let worker = test_worker(8);
        assert_eq!(
            worker.next_event(Duration::from_millis(5)).await,
            StreamEvent::Idle
        );
    }

    #[tokio::test]
    async fn stop_wakes_a_blocked_stream_immediately() {
        let worker = test_worker(8);
        let consumer = Arc::clone(&worker);
        let handle = tokio::spawn(async move {
            consumer.next_event(Duration::from_secs(3600)).await
        });

        // Give the consumer time to block on the empty queue.
        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.stop_consuming();

        let event = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stream must wake on stop")
            .unwrap();
        assert_eq!(event, StreamEvent::Stopped);
    }

    #[tokio::test]
    async fn consumers_share_the_queue_with_at_most_one_delivery() {
        let worker = test_worker(8);
        worker.push(envelope("only")).await.unwrap();

        let first = worker.next_event(Duration::from_millis(10)).await;
        let second = worker.next_event(Duration::from_millis(10)).await;

        assert!(matches!(first, StreamEvent::Message(_)));
        assert_eq!(second, StreamEvent::Idle);
    }

    fn transient_failure(subscribed_at: Option<Instant>) -> SessionFailure {
        SessionFailure {
            error: WorkerError::Broker(lapin::Error::InvalidConnectionState(
                lapin::ConnectionState::Error,
            )),
            subscribed_at,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_connection_exhausts_budget_and_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = run_with_retry("test", &policy(5, 2.0, 60.0), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                // Dies instantly, well inside the stability window.
                Err(transient_failure(Some(Instant::now())))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn stable_connection_resets_the_retry_counter() {
        // Every session stays up past the threshold before dropping. The
        // loop must keep retrying forever; we stop it after 20 sessions by
        // returning a clean stop.
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = run_with_retry("test", &policy(3, 2.0, 60.0), move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 20 {
                    return Ok(());
                }
                let subscribed = Instant::now();
                tokio::time::sleep(Duration::from_secs(120)).await;
                Err(transient_failure(Some(subscribed)))
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 21);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delay_doubles_within_a_window() {
        // Sessions die instantly; observe sleeps of 2s, 4s between the
        // three attempts allowed by max_retries = 3.
        let started = Instant::now();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = run_with_retry("test", &policy(3, 2.0, 60.0), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(transient_failure(None))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 2s after the first failure + 4s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_failure_does_not_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = run_with_retry("test", &policy(5, 2.0, 60.0), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SessionFailure {
                    error: WorkerError::Fatal("unexpected".into()),
                    subscribed_at: None,
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
