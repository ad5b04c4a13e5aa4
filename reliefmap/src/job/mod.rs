//! Persisted job records.
//!
//! The job record is the only channel through which outcomes reach the
//! upstream platform. This module defines the record, the status transition
//! guard and the [`JobStateStore`] seam with two implementations:
//!
//! - [`MemoryJobStore`]: in-process map, used by tests and offline runs
//! - [`PgJobStore`]: PostgreSQL tables shared with the upload API

mod error;
mod memory;
mod postgres;
mod record;
mod store;

pub use error::JobStoreError;
pub use memory::MemoryJobStore;
pub use postgres::{lazy_pool, JobTable, PgJobStore};
pub use record::{JobRecord, JobResult, JobStatus};
pub use store::{JobStateStore, StatusWrite};
