//! Error types for broker transport.

use thiserror::Error;

/// Broker connection failures. The worker loop retries all of them.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to broker: {0}")]
    Connect(String),

    /// Queue declaration, QoS or consume setup failed.
    #[error("failed to set up channel: {0}")]
    Channel(String),

    #[error("delivery stream failed: {0}")]
    Consume(String),

    #[error("failed to settle delivery: {0}")]
    Acknowledge(String),
}
