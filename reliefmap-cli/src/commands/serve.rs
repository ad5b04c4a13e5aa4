//! Worker commands - consume task queues until interrupted.
//!
//! The first Ctrl+C stops taking new messages and lets in-flight jobs
//! finish; a second one aborts engine waits as well.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reliefmap::config::ServiceConfig;
use reliefmap::depth::RemoteDepthEstimator;
use reliefmap::engine::{EngineClient, ReqwestTransport};
use reliefmap::job::{lazy_pool, JobTable, PgJobStore};
use reliefmap::logging::{init_logging, DEFAULT_LOG_FILE};
use reliefmap::pipeline::{BatchPipeline, SinglePipeline};
use reliefmap::storage::{AssetStoreFactory, S3StoreFactory};
use reliefmap::telemetry::WorkerSnapshot;
use reliefmap::worker::{AmqpConnector, BrokerConnector, WorkerLoop};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::load_config;
use crate::error::CliError;

/// Which queues to consume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerMode {
    Both,
    Single,
    Batch,
}

impl WorkerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerMode::Both => "both",
            WorkerMode::Single => "single",
            WorkerMode::Batch => "batch",
        }
    }

    fn runs_single(&self) -> bool {
        matches!(self, WorkerMode::Both | WorkerMode::Single)
    }

    fn runs_batch(&self) -> bool {
        matches!(self, WorkerMode::Both | WorkerMode::Batch)
    }
}

/// Run the worker command.
pub fn run(config_path: Option<PathBuf>, mode: WorkerMode) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    config.validate_for_workers()?;

    let _logging = init_logging(&config.logging.directory, DEFAULT_LOG_FILE, &config.logging.level)
        .map_err(CliError::Logging)?;

    info!(
        version = reliefmap::VERSION,
        mode = mode.as_str(),
        queue = %config.broker.queue,
        engine = %config.engine.url,
        "Reliefmap starting"
    );

    let shutdown = CancellationToken::new();
    let abort = CancellationToken::new();
    install_signal_handler(shutdown.clone(), abort.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(format!("Failed to start runtime: {}", e)))?;

    let snapshots = runtime.block_on(serve(&config, mode, shutdown, abort))?;

    for (pipeline, snapshot) in &snapshots {
        info!(
            pipeline = *pipeline,
            received = snapshot.messages_received,
            completed = snapshot.jobs_completed,
            failed = snapshot.jobs_failed.total(),
            "Worker stopped"
        );
        println!("[{}] {}", pipeline, snapshot);
    }
    Ok(())
}

/// First signal cancels `shutdown`, any later one cancels `abort`.
fn install_signal_handler(shutdown: CancellationToken, abort: CancellationToken) -> Result<(), CliError> {
    let presses = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if presses.fetch_add(1, Ordering::SeqCst) == 0 {
            eprintln!();
            eprintln!("Shutting down after in-flight jobs (Ctrl+C again to abort)...");
            shutdown.cancel();
        } else {
            eprintln!("Aborting in-flight jobs...");
            abort.cancel();
        }
    })
    .map_err(|e| CliError::Runtime(format!("Failed to set signal handler: {}", e)))
}

async fn serve(
    config: &ServiceConfig,
    mode: WorkerMode,
    shutdown: CancellationToken,
    abort: CancellationToken,
) -> Result<Vec<(&'static str, WorkerSnapshot)>, CliError> {
    let pool = lazy_pool(&config.database.url)
        .map_err(|e| CliError::Setup(format!("database: {}", e)))?;
    let stores: Arc<dyn AssetStoreFactory> = Arc::new(S3StoreFactory::with_timeout(
        Duration::from_secs(config.storage.request_timeout_secs),
    ));
    let connector: Arc<dyn BrokerConnector> = Arc::new(AmqpConnector::new(&config.broker.url));
    let settings = config.pipeline_settings();

    let mut workers: Vec<(&'static str, JoinHandle<WorkerSnapshot>)> = Vec::new();

    if mode.runs_single() {
        let depth = RemoteDepthEstimator::with_timeout(
            &config.depth.url,
            Duration::from_secs(config.depth.timeout_secs),
        )
        .map_err(|e| CliError::Setup(format!("depth estimator: {}", e)))?;
        let pipeline = SinglePipeline::new(
            stores.clone(),
            Arc::new(PgJobStore::new(pool.clone(), JobTable::Heightmap)),
            Arc::new(depth),
            settings.clone(),
        );
        let worker = WorkerLoop::new(
            Arc::new(pipeline),
            connector.clone(),
            config.broker.single_worker(),
            shutdown.clone(),
        )
        .with_abort(abort.clone());
        workers.push(("single", tokio::spawn(worker.run())));
    }

    if mode.runs_batch() {
        let transport = ReqwestTransport::with_timeout(
            &config.engine.url,
            Duration::from_secs(config.engine.request_timeout_secs),
        )
        .map_err(|e| CliError::Setup(format!("engine: {}", e)))?;
        let engine = EngineClient::with_policy(Arc::new(transport), config.engine.poll_policy());
        let pipeline = BatchPipeline::new(
            stores.clone(),
            Arc::new(PgJobStore::new(pool.clone(), JobTable::BatchHeightmap)),
            Arc::new(engine),
            settings,
        );
        let worker = WorkerLoop::new(
            Arc::new(pipeline),
            connector.clone(),
            config.broker.batch_worker(),
            shutdown.clone(),
        )
        .with_abort(abort.clone());
        workers.push(("batch", tokio::spawn(worker.run())));
    }

    let mut snapshots = Vec::with_capacity(workers.len());
    for (pipeline, handle) in workers {
        match handle.await {
            Ok(snapshot) => snapshots.push((pipeline, snapshot)),
            Err(e) => error!(pipeline, error = %e, "Worker task ended abnormally"),
        }
    }
    pool.close().await;
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selects_queues() {
        assert!(WorkerMode::Both.runs_single() && WorkerMode::Both.runs_batch());
        assert!(WorkerMode::Single.runs_single() && !WorkerMode::Single.runs_batch());
        assert!(!WorkerMode::Batch.runs_single() && WorkerMode::Batch.runs_batch());
    }
}
