//! The queue consumption loop.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::pipeline::{ErrorKind, JobPipeline};
use crate::task::TaskDescriptor;
use crate::telemetry::{WorkerMetrics, WorkerSnapshot};

use super::backoff::{ReconnectBackoff, DEFAULT_RECONNECT_BASE_SECS, DEFAULT_RECONNECT_MAX_SECS};
use super::broker::{BrokerConnector, Delivery, MessageStream};

/// Observable life-cycle state of a [`WorkerLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Not connected, or waiting to reconnect.
    Disconnected,
    /// Connected and taking deliveries.
    Consuming,
    /// Stop requested; closing the connection.
    Draining,
    /// Finished. Terminal.
    Stopped,
}

/// Queue and connection settings for one loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerSettings {
    pub queue: String,
    /// Requested prefetch; the pipeline may lower it.
    pub prefetch: u16,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
}

impl WorkerSettings {
    pub fn new(queue: impl Into<String>, prefetch: u16) -> Self {
        Self {
            queue: queue.into(),
            prefetch,
            reconnect_base: Duration::from_secs(DEFAULT_RECONNECT_BASE_SECS),
            reconnect_max: Duration::from_secs(DEFAULT_RECONNECT_MAX_SECS),
        }
    }
}

/// Consumes one queue with one pipeline, one message at a time.
///
/// ```text
/// Disconnected ──connect ok──► Consuming ──stream lost──► Disconnected
///      │   ▲                       │
///      │   └──backoff (5s..60s)    │ shutdown
///      │                           ▼
///      └────────shutdown──────► Draining ──► Stopped
/// ```
///
/// `shutdown` is observed between messages only; an in-flight job always
/// finishes. `abort` is handed to the pipeline so long engine waits can be
/// abandoned on a hard stop.
pub struct WorkerLoop<P: JobPipeline> {
    pipeline: Arc<P>,
    connector: Arc<dyn BrokerConnector>,
    settings: WorkerSettings,
    shutdown: CancellationToken,
    abort: CancellationToken,
    metrics: Arc<WorkerMetrics>,
    state: watch::Sender<WorkerState>,
}

impl<P: JobPipeline> WorkerLoop<P> {
    pub fn new(
        pipeline: Arc<P>,
        connector: Arc<dyn BrokerConnector>,
        settings: WorkerSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Disconnected);
        Self {
            pipeline,
            connector,
            settings,
            shutdown,
            abort: CancellationToken::new(),
            metrics: Arc::new(WorkerMetrics::new()),
            state,
        }
    }

    /// Uses `abort` as the hard-stop token passed to the pipeline.
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        self.metrics.clone()
    }

    /// Subscribes to state changes.
    pub fn state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Prefetch actually requested from the broker.
    pub fn effective_prefetch(&self) -> u16 {
        let requested = self.settings.prefetch.max(1);
        match self.pipeline.max_prefetch() {
            Some(cap) => requested.min(cap.max(1)),
            None => requested,
        }
    }

    /// Runs until `shutdown` is cancelled; returns the final counters.
    pub async fn run(self) -> WorkerSnapshot {
        let name = self.pipeline.name();
        let queue = self.settings.queue.clone();
        let prefetch = self.effective_prefetch();
        let mut backoff = ReconnectBackoff::new(self.settings.reconnect_base, self.settings.reconnect_max);
        let mut connected_before = false;
        info!(pipeline = name, queue = %queue, prefetch, "Worker starting");

        while !self.shutdown.is_cancelled() {
            self.set_state(WorkerState::Disconnected);

            let connected = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                result = self.connector.connect(&queue, prefetch) => result,
            };

            let mut stream = match connected {
                Ok(stream) => stream,
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        pipeline = name,
                        error = %e,
                        attempt = backoff.failures(),
                        retry_in_secs = delay.as_secs(),
                        "Broker connection failed"
                    );
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
            };

            backoff.reset();
            if connected_before {
                self.metrics.reconnected();
            }
            connected_before = true;
            self.set_state(WorkerState::Consuming);
            info!(pipeline = name, queue = %queue, "Waiting for tasks");

            self.consume(stream.as_mut()).await;

            if self.shutdown.is_cancelled() {
                self.set_state(WorkerState::Draining);
            }
            stream.close().await;
        }

        self.set_state(WorkerState::Draining);
        let snapshot = self.metrics.snapshot();
        self.set_state(WorkerState::Stopped);
        info!(pipeline = name, stats = %snapshot, "Worker stopped");
        snapshot
    }

    /// Handles deliveries until the stream ends or shutdown is requested.
    async fn consume(&self, stream: &mut dyn MessageStream) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                next = stream.next() => next,
            };
            match next {
                Some(Ok(delivery)) => self.handle(delivery).await,
                Some(Err(e)) => {
                    warn!(pipeline = self.pipeline.name(), error = %e, "Delivery stream failed, reconnecting");
                    return;
                }
                None => {
                    warn!(pipeline = self.pipeline.name(), "Broker connection closed, reconnecting");
                    return;
                }
            }
        }
    }

    /// Processes one delivery and settles it.
    ///
    /// Success is acknowledged; every failure marks the job failed and
    /// rejects the delivery without requeue.
    async fn handle(&self, delivery: Delivery) {
        self.metrics.message_received();

        let task: P::Task = match serde_json::from_slice(delivery.payload()) {
            Ok(task) => task,
            Err(e) => {
                error!(pipeline = self.pipeline.name(), error = %e, "Undecodable task message");
                if let Some(job_id) = job_id_hint(delivery.payload()) {
                    let message = format!("invalid task message: {}", e);
                    self.pipeline.mark_failed(&job_id, &message).await;
                }
                self.metrics.job_failed(ErrorKind::Validation);
                self.reject(delivery).await;
                return;
            }
        };

        let job_id = task.job_id().to_string();
        info!(
            pipeline = self.pipeline.name(),
            job_id = %job_id,
            redelivered = delivery.redelivered(),
            "Received task"
        );

        let outcome = AssertUnwindSafe(self.pipeline.process(&task, &self.abort))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(outcome)) => {
                self.metrics.job_completed(outcome.dimensions);
                self.metrics.bytes_uploaded(outcome.bytes_uploaded);
                if let Err(e) = delivery.ack().await {
                    warn!(job_id = %job_id, error = %e, "Failed to acknowledge delivery");
                } else {
                    info!(job_id = %job_id, "Task acknowledged");
                }
            }
            Ok(Err(e)) => {
                self.metrics.job_failed(e.kind());
                self.reject(delivery).await;
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(job_id = %job_id, reason = %reason, "Pipeline panicked");
                let message = format!("unexpected error: {}", reason);
                self.pipeline.mark_failed(&job_id, &message).await;
                self.metrics.job_failed(ErrorKind::Unexpected);
                self.reject(delivery).await;
            }
        }
    }

    async fn reject(&self, delivery: Delivery) {
        self.metrics.message_rejected();
        if let Err(e) = delivery.reject().await {
            warn!(pipeline = self.pipeline.name(), error = %e, "Failed to reject delivery");
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }
}

/// Job id of a message that failed to decode, if one can be found.
fn job_id_hint(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    ["batch_job_id", "job_id"]
        .iter()
        .filter_map(|field| value.get(*field).and_then(serde_json::Value::as_str))
        .find(|id| !id.trim().is_empty())
        .map(str::to_string)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
