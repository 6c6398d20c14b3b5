//! Broker plumbing: connection factory, worker framework, publisher.
//!
//! Each worker owns its broker connection outright (one task per
//! connection, never shared) and hands parsed messages to in-process
//! consumers through a bounded queue. The publisher stamps task ids and
//! publishes persistent messages to the topic exchange.

pub mod factory;
pub mod publisher;
pub mod worker;

pub use factory::BrokerFactory;
pub use publisher::Publisher;
pub use worker::{run_with_retry, Envelope, QueueWorker, SessionFailure, StreamEvent, WorkerError};
