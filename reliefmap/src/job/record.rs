//! Job record and status model.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Life-cycle state of a job.
///
/// Transitions are monotonic: `queued → processing → {completed | failed}`.
/// Once terminal, a status never changes again through a status-only write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Column value stored in the job tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a stored column value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the status is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a status-only write from `self` to `next` is permitted.
    ///
    /// Rewriting the current status is allowed so that redelivered messages
    /// stay idempotent.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Queued => true,
            Self::Processing => next.is_terminal(),
            Self::Completed | Self::Failed => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome data written when a job completes.
///
/// The heightmap fields are optional because an orthophoto-only batch
/// produces no heightmap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JobResult {
    pub result_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub processing_time: Duration,
    pub orthophoto_url: Option<String>,
}

/// Persisted view of one job.
#[derive(Clone, Debug, PartialEq)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub orthophoto_url: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub processing_time: Option<Duration>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Creates a freshly queued record.
    pub fn queued(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            result_url: None,
            orthophoto_url: None,
            width: None,
            height: None,
            processing_time: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
