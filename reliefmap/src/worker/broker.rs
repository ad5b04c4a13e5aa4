//! The message broker seam.

use crate::BoxFuture;

use super::error::TransportError;

/// Settles one delivery with the broker.
pub trait Acknowledge: Send + Sync {
    /// Acknowledges successful processing.
    fn ack(&self) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Rejects the delivery without requeueing it.
    fn reject(&self) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// One message taken from a queue.
pub struct Delivery {
    payload: Vec<u8>,
    redelivered: bool,
    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(payload: Vec<u8>, redelivered: bool, acker: Box<dyn Acknowledge>) -> Self {
        Self {
            payload,
            redelivered,
            acker,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether the broker delivered this message before.
    pub fn redelivered(&self) -> bool {
        self.redelivered
    }

    pub async fn ack(self) -> Result<(), TransportError> {
        self.acker.ack().await
    }

    pub async fn reject(self) -> Result<(), TransportError> {
        self.acker.reject().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("bytes", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

/// Deliveries from one open connection.
pub trait MessageStream: Send {
    /// Waits for the next delivery.
    ///
    /// `None` means the connection is gone and the caller should reconnect.
    fn next(&mut self) -> BoxFuture<'_, Option<Result<Delivery, TransportError>>>;

    /// Closes the connection.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// Opens consuming connections to a queue.
pub trait BrokerConnector: Send + Sync {
    /// Connects, declares `queue` durable and starts consuming with at most
    /// `prefetch` unacknowledged deliveries.
    fn connect<'a>(
        &'a self,
        queue: &'a str,
        prefetch: u16,
    ) -> BoxFuture<'a, Result<Box<dyn MessageStream>, TransportError>>;
}
