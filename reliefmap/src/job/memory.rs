//! In-process job store.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use crate::BoxFuture;

use super::error::JobStoreError;
use super::record::{JobRecord, JobResult, JobStatus};
use super::store::{JobStateStore, StatusWrite};

/// Job store backed by a map.
///
/// Writes to an unknown id create a queued record first.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    records: RwLock<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a queued record.
    pub fn insert_queued(&self, job_id: &str) {
        self.records
            .write()
            .insert(job_id.to_string(), JobRecord::queued(job_id));
    }

    /// Returns a copy of the record.
    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.records.read().get(job_id).cloned()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn apply_status(&self, job_id: &str, status: JobStatus, error: Option<&str>) -> StatusWrite {
        let mut records = self.records.write();
        let record = records
            .entry(job_id.to_string())
            .or_insert_with(|| JobRecord::queued(job_id));

        if !record.status.can_transition_to(status) {
            return StatusWrite::Rejected;
        }
        record.status = status;
        if let Some(message) = error {
            record.error_message = Some(message.to_string());
        }
        record.updated_at = Utc::now();
        StatusWrite::Applied
    }

    fn apply_result(&self, job_id: &str, result: &JobResult) -> StatusWrite {
        let mut records = self.records.write();
        let record = records
            .entry(job_id.to_string())
            .or_insert_with(|| JobRecord::queued(job_id));

        if record.status == JobStatus::Failed {
            return StatusWrite::Rejected;
        }
        record.status = JobStatus::Completed;
        record.result_url = result.result_url.clone();
        record.orthophoto_url = result.orthophoto_url.clone();
        record.width = result.width;
        record.height = result.height;
        record.processing_time = Some(result.processing_time);
        record.error_message = None;
        record.updated_at = Utc::now();
        StatusWrite::Applied
    }
}

impl JobStateStore for MemoryJobStore {
    fn set_status<'a>(
        &'a self,
        job_id: &'a str,
        status: JobStatus,
        error: Option<&'a str>,
    ) -> BoxFuture<'a, Result<StatusWrite, JobStoreError>> {
        Box::pin(async move { Ok(self.apply_status(job_id, status, error)) })
    }

    fn set_result<'a>(
        &'a self,
        job_id: &'a str,
        result: &'a JobResult,
    ) -> BoxFuture<'a, Result<StatusWrite, JobStoreError>> {
        Box::pin(async move { Ok(self.apply_result(job_id, result)) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn result() -> JobResult {
        JobResult {
            result_url: Some("http://minio:9000/out/heightmaps/j_heightmap.png".into()),
            width: Some(640),
            height: Some(480),
            processing_time: Duration::from_millis(1500),
            orthophoto_url: None,
        }
    }

    #[tokio::test]
    async fn test_completed_job_is_not_reverted() {
        let store = MemoryJobStore::new();
        store.insert_queued("j");

        store.set_status("j", JobStatus::Processing, None).await.unwrap();
        store.set_result("j", &result()).await.unwrap();

        let write = store
            .set_status("j", JobStatus::Processing, None)
            .await
            .unwrap();
        assert_eq!(write, StatusWrite::Rejected);
        assert_eq!(store.get("j").unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_failed_job_keeps_error_and_rejects_result() {
        let store = MemoryJobStore::new();
        store
            .set_status("j", JobStatus::Failed, Some("boom"))
            .await
            .unwrap();

        let write = store.set_result("j", &result()).await.unwrap();
        assert_eq!(write, StatusWrite::Rejected);

        let record = store.get("j").unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("boom"));
        assert!(record.result_url.is_none());
    }

    #[tokio::test]
    async fn test_result_write_is_idempotent() {
        let store = MemoryJobStore::new();
        store.set_result("j", &result()).await.unwrap();
        let again = store.set_result("j", &result()).await.unwrap();
        assert_eq!(again, StatusWrite::Applied);

        let record = store.get("j").unwrap();
        assert_eq!(record.width, Some(640));
        assert_eq!(record.processing_time, Some(Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn test_unknown_job_is_created_on_write() {
        let store = MemoryJobStore::new();
        assert!(store.is_empty());
        store
            .set_status("new", JobStatus::Processing, None)
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }
}
