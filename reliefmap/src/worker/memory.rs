//! In-process broker for tests and local runs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use crate::BoxFuture;

use super::broker::{Acknowledge, BrokerConnector, Delivery, MessageStream};
use super::error::TransportError;

#[derive(Default)]
struct Shared {
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    acked: Mutex<Vec<Vec<u8>>>,
    rejected: Mutex<Vec<Vec<u8>>>,
    prefetches: Mutex<Vec<u16>>,
    notify: Notify,
    /// Bumped to drop every open stream.
    generation: AtomicU64,
    failing_connects: AtomicUsize,
    connects: AtomicUsize,
}

/// Queues held in memory.
///
/// Messages are delivered once; acknowledged and rejected payloads are
/// recorded for inspection. Connection failures and drops can be injected.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        self.shared
            .queues
            .lock()
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.into());
        self.shared.notify.notify_waiters();
    }

    /// Publishes `message` as JSON.
    pub fn publish_json<T: Serialize>(&self, queue: &str, message: &T) -> serde_json::Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.publish(queue, payload);
        Ok(())
    }

    /// Messages not yet delivered.
    pub fn pending(&self, queue: &str) -> usize {
        self.shared.queues.lock().get(queue).map_or(0, VecDeque::len)
    }

    pub fn acked(&self) -> Vec<Vec<u8>> {
        self.shared.acked.lock().clone()
    }

    pub fn rejected(&self) -> Vec<Vec<u8>> {
        self.shared.rejected.lock().clone()
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.shared.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Successful and failed connection attempts so far.
    pub fn connect_attempts(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    /// Prefetch counts requested by each successful connection.
    pub fn prefetches(&self) -> Vec<u16> {
        self.shared.prefetches.lock().clone()
    }

    /// Ends every open stream, as a dropped connection would.
    pub fn disconnect_all(&self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
    }

    fn try_connect(&self, queue: &str, prefetch: u16) -> Result<Box<dyn MessageStream>, TransportError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self.shared.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.shared.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        self.shared.prefetches.lock().push(prefetch);
        let stream: Box<dyn MessageStream> = Box::new(MemoryStream {
            shared: self.shared.clone(),
            queue: queue.to_string(),
            generation: self.shared.generation.load(Ordering::SeqCst),
        });
        Ok(stream)
    }
}

impl BrokerConnector for MemoryBroker {
    fn connect<'a>(
        &'a self,
        queue: &'a str,
        prefetch: u16,
    ) -> BoxFuture<'a, Result<Box<dyn MessageStream>, TransportError>> {
        let result = self.try_connect(queue, prefetch);
        Box::pin(async move { result })
    }
}

struct MemoryStream {
    shared: Arc<Shared>,
    queue: String,
    generation: u64,
}

impl MemoryStream {
    fn is_stale(&self) -> bool {
        self.shared.generation.load(Ordering::SeqCst) != self.generation
    }

    fn pop(&self) -> Option<Vec<u8>> {
        self.shared
            .queues
            .lock()
            .get_mut(&self.queue)
            .and_then(VecDeque::pop_front)
    }
}

impl MessageStream for MemoryStream {
    fn next(&mut self) -> BoxFuture<'_, Option<Result<Delivery, TransportError>>> {
        Box::pin(async move {
            loop {
                let notified = self.shared.notify.notified();
                if self.is_stale() {
                    return None;
                }
                if let Some(payload) = self.pop() {
                    let acker = MemoryAcker {
                        shared: self.shared.clone(),
                        payload: payload.clone(),
                    };
                    return Some(Ok(Delivery::new(payload, false, Box::new(acker))));
                }
                notified.await;
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }
}

struct MemoryAcker {
    shared: Arc<Shared>,
    payload: Vec<u8>,
}

impl Acknowledge for MemoryAcker {
    fn ack(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        self.shared.acked.lock().push(self.payload.clone());
        Box::pin(async { Ok(()) })
    }

    fn reject(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        self.shared.rejected.lock().push(self.payload.clone());
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_publish_and_consume() {
        let broker = MemoryBroker::new();
        broker.publish("q", b"one".to_vec());
        let mut stream = broker.connect("q", 4).await.unwrap();

        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.payload(), b"one");
        delivery.ack().await.unwrap();

        assert_eq!(broker.acked(), vec![b"one".to_vec()]);
        assert_eq!(broker.pending("q"), 0);
        assert_eq!(broker.prefetches(), vec![4]);
    }

    #[tokio::test]
    async fn test_waiting_consumer_is_woken() {
        let broker = MemoryBroker::new();
        let mut stream = broker.connect("q", 1).await.unwrap();
        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish("q", b"late".to_vec());
        });
        let delivery = stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.payload(), b"late");
        delivery.reject().await.unwrap();
        assert_eq!(broker.rejected(), vec![b"late".to_vec()]);
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream() {
        let broker = MemoryBroker::new();
        let mut stream = broker.connect("q", 1).await.unwrap();
        broker.disconnect_all();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_injected_connect_failures() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(2);
        assert!(broker.connect("q", 1).await.is_err());
        assert!(broker.connect("q", 1).await.is_err());
        assert!(broker.connect("q", 1).await.is_ok());
        assert_eq!(broker.connect_attempts(), 3);
    }
}
