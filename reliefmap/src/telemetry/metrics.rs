//! Atomic counters for one worker loop.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use crate::pipeline::ErrorKind;

use super::snapshot::{FailureCounts, WorkerSnapshot};

/// Counters shared between a worker loop and its pipeline.
#[derive(Debug)]
pub struct WorkerMetrics {
    started: Instant,
    messages_received: AtomicU64,
    messages_rejected: AtomicU64,
    jobs_completed: AtomicU64,
    failed_transport: AtomicU64,
    failed_validation: AtomicU64,
    failed_engine: AtomicU64,
    failed_render: AtomicU64,
    failed_unexpected: AtomicU64,
    bytes_uploaded: AtomicU64,
    reconnects: AtomicU64,
    last_width: AtomicU32,
    last_height: AtomicU32,
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            messages_received: AtomicU64::new(0),
            messages_rejected: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            failed_transport: AtomicU64::new(0),
            failed_validation: AtomicU64::new(0),
            failed_engine: AtomicU64::new(0),
            failed_render: AtomicU64::new(0),
            failed_unexpected: AtomicU64::new(0),
            bytes_uploaded: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            last_width: AtomicU32::new(0),
            last_height: AtomicU32::new(0),
        }
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// A delivery was rejected without requeue.
    pub fn message_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self, dimensions: Option<(u32, u32)>) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        if let Some((width, height)) = dimensions {
            self.last_width.store(width, Ordering::Relaxed);
            self.last_height.store(height, Ordering::Relaxed);
        }
    }

    pub fn job_failed(&self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::Transport => &self.failed_transport,
            ErrorKind::Validation => &self.failed_validation,
            ErrorKind::Engine => &self.failed_engine,
            ErrorKind::Render => &self.failed_render,
            ErrorKind::Unexpected => &self.failed_unexpected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_uploaded(&self, bytes: u64) {
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn reconnected(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        let width = self.last_width.load(Ordering::Relaxed);
        let height = self.last_height.load(Ordering::Relaxed);
        WorkerSnapshot {
            uptime: self.started.elapsed(),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: FailureCounts {
                transport: self.failed_transport.load(Ordering::Relaxed),
                validation: self.failed_validation.load(Ordering::Relaxed),
                engine: self.failed_engine.load(Ordering::Relaxed),
                render: self.failed_render.load(Ordering::Relaxed),
                unexpected: self.failed_unexpected.load(Ordering::Relaxed),
            },
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            last_dimensions: (width > 0 && height > 0).then_some((width, height)),
        }
    }
}
