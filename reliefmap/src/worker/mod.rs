//! Queue workers.
//!
//! A [`WorkerLoop`] owns one broker connection and feeds its deliveries to
//! one [`JobPipeline`](crate::pipeline::JobPipeline), strictly one message at
//! a time. Connection loss is retried forever with capped exponential
//! backoff; job failures are never retried and surface only through the job
//! store.
//!
//! Brokers are reached through [`BrokerConnector`]: [`AmqpConnector`] for
//! RabbitMQ, [`MemoryBroker`] in tests.

mod amqp;
mod backoff;
mod broker;
mod error;
mod memory;
mod runner;

pub use amqp::AmqpConnector;
pub use backoff::{ReconnectBackoff, DEFAULT_RECONNECT_BASE_SECS, DEFAULT_RECONNECT_MAX_SECS};
pub use broker::{Acknowledge, BrokerConnector, Delivery, MessageStream};
pub use error::TransportError;
pub use memory::MemoryBroker;
pub use runner::{WorkerLoop, WorkerSettings, WorkerState};
