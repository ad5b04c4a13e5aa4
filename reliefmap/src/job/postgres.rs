//! PostgreSQL-backed job store.
//!
//! The tables are owned by the upload API; this store only updates rows it
//! is told about. Every statement stamps `updated_at`.

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, warn};

use crate::BoxFuture;

use super::error::JobStoreError;
use super::record::{JobResult, JobStatus};
use super::store::{JobStateStore, StatusWrite};

const ALL_STATUSES: [JobStatus; 4] = [
    JobStatus::Queued,
    JobStatus::Processing,
    JobStatus::Completed,
    JobStatus::Failed,
];

/// Connections held by a worker's pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Builds a pool that connects on first use.
///
/// Workers start consuming before the database is reachable; a bad URL is
/// still rejected here.
pub fn lazy_pool(url: &str) -> Result<PgPool, JobStoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .connect_lazy(url)?;
    Ok(pool)
}

/// Which job table a store writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobTable {
    /// Single-image jobs.
    Heightmap,
    /// Batch jobs, which also carry an orthophoto URL.
    BatchHeightmap,
}

impl JobTable {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Heightmap => "heightmap_jobs",
            Self::BatchHeightmap => "batch_heightmap_jobs",
        }
    }

    fn has_orthophoto(&self) -> bool {
        matches!(self, Self::BatchHeightmap)
    }
}

/// Job store writing to one of the job tables.
pub struct PgJobStore {
    pool: PgPool,
    table: JobTable,
    status_sql: String,
    result_sql: String,
}

impl PgJobStore {
    pub fn new(pool: PgPool, table: JobTable) -> Self {
        let name = table.name();

        // $1 status, $2 error message, $3 job id, $4 statuses allowed to move to $1
        let status_sql = format!(
            "UPDATE {name} \
             SET status = $1, error_message = COALESCE($2, error_message), \
                 updated_at = CURRENT_TIMESTAMP \
             WHERE id::text = $3 AND status::text = ANY($4)"
        );

        let result_sql = if table.has_orthophoto() {
            format!(
                "UPDATE {name} \
                 SET status = 'completed', result_url = $1, width = $2, height = $3, \
                     processing_time = $4, orthophoto_url = $5, error_message = NULL, \
                     updated_at = CURRENT_TIMESTAMP \
                 WHERE id::text = $6 AND status::text <> 'failed'"
            )
        } else {
            format!(
                "UPDATE {name} \
                 SET status = 'completed', result_url = $1, width = $2, height = $3, \
                     processing_time = $4, error_message = NULL, \
                     updated_at = CURRENT_TIMESTAMP \
                 WHERE id::text = $5 AND status::text <> 'failed'"
            )
        };

        Self {
            pool,
            table,
            status_sql,
            result_sql,
        }
    }

    pub fn table(&self) -> JobTable {
        self.table
    }

    async fn write_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<StatusWrite, JobStoreError> {
        let allowed_from: Vec<String> = ALL_STATUSES
            .iter()
            .filter(|from| from.can_transition_to(status))
            .map(|from| from.as_str().to_string())
            .collect();

        let outcome = sqlx::query(&self.status_sql)
            .bind(status.as_str())
            .bind(error)
            .bind(job_id)
            .bind(allowed_from)
            .execute(&self.pool)
            .await?;

        if outcome.rows_affected() == 0 {
            warn!(
                job_id = %job_id,
                table = self.table.name(),
                status = %status,
                "Status write rejected (job missing or already terminal)"
            );
            return Ok(StatusWrite::Rejected);
        }

        debug!(job_id = %job_id, status = %status, "Updated job status");
        Ok(StatusWrite::Applied)
    }

    async fn write_result(
        &self,
        job_id: &str,
        result: &JobResult,
    ) -> Result<StatusWrite, JobStoreError> {
        let mut query = sqlx::query(&self.result_sql)
            .bind(result.result_url.as_deref())
            .bind(result.width.map(|w| w as i32))
            .bind(result.height.map(|h| h as i32))
            .bind(result.processing_time.as_secs_f64());
        if self.table.has_orthophoto() {
            query = query.bind(result.orthophoto_url.as_deref());
        }
        let outcome = query.bind(job_id).execute(&self.pool).await?;

        if outcome.rows_affected() == 0 {
            warn!(
                job_id = %job_id,
                table = self.table.name(),
                "Result write rejected (job missing or already failed)"
            );
            return Ok(StatusWrite::Rejected);
        }

        debug!(job_id = %job_id, "Stored job result");
        Ok(StatusWrite::Applied)
    }
}

impl JobStateStore for PgJobStore {
    fn set_status<'a>(
        &'a self,
        job_id: &'a str,
        status: JobStatus,
        error: Option<&'a str>,
    ) -> BoxFuture<'a, Result<StatusWrite, JobStoreError>> {
        Box::pin(self.write_status(job_id, status, error))
    }

    fn set_result<'a>(
        &'a self,
        job_id: &'a str,
        result: &'a JobResult,
    ) -> BoxFuture<'a, Result<StatusWrite, JobStoreError>> {
        Box::pin(self.write_result(job_id, result))
    }
}
