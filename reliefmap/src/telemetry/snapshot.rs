//! Point-in-time copy of worker counters.

use std::fmt;
use std::time::Duration;

/// Failed jobs by error kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FailureCounts {
    pub transport: u64,
    pub validation: u64,
    pub engine: u64,
    pub render: u64,
    pub unexpected: u64,
}

impl FailureCounts {
    pub fn total(&self) -> u64 {
        self.transport + self.validation + self.engine + self.render + self.unexpected
    }
}

/// Snapshot of [`WorkerMetrics`](super::WorkerMetrics).
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerSnapshot {
    pub uptime: Duration,
    pub messages_received: u64,
    pub messages_rejected: u64,
    pub jobs_completed: u64,
    pub jobs_failed: FailureCounts,
    pub bytes_uploaded: u64,
    pub reconnects: u64,
    /// Dimensions of the most recent rendered heightmap.
    pub last_dimensions: Option<(u32, u32)>,
}

impl WorkerSnapshot {
    /// Completed share of finished jobs, if any finished.
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.jobs_completed + self.jobs_failed.total();
        (finished > 0).then(|| self.jobs_completed as f64 / finished as f64)
    }
}

impl fmt::Display for WorkerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} received, {} completed, {} failed (transport {}, validation {}, engine {}, render {}, unexpected {}), {:.1} MB uploaded, {} reconnects in {}s",
            self.messages_received,
            self.jobs_completed,
            self.jobs_failed.total(),
            self.jobs_failed.transport,
            self.jobs_failed.validation,
            self.jobs_failed.engine,
            self.jobs_failed.render,
            self.jobs_failed.unexpected,
            self.bytes_uploaded as f64 / 1_000_000.0,
            self.reconnects,
            self.uptime.as_secs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let mut snap = WorkerSnapshot {
            uptime: Duration::ZERO,
            messages_received: 4,
            messages_rejected: 1,
            jobs_completed: 3,
            jobs_failed: FailureCounts {
                render: 1,
                ..Default::default()
            },
            bytes_uploaded: 0,
            reconnects: 0,
            last_dimensions: None,
        };
        assert_eq!(snap.success_rate(), Some(0.75));

        snap.jobs_completed = 0;
        snap.jobs_failed = FailureCounts::default();
        assert_eq!(snap.success_rate(), None);
    }
}
