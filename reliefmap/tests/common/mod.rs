//! Shared fixtures for the end-to-end tests.
//!
//! Everything runs in-process: the broker, object store and job store are
//! the in-memory implementations, the engine is a scripted transport and
//! depth estimation is a deterministic ramp.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tokio_util::sync::CancellationToken;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use reliefmap::dem::GDAL_NODATA_TAG;
use reliefmap::depth::{DepthError, DepthEstimator, DepthMap};
use reliefmap::engine::{EngineError, EngineTransport};
use reliefmap::job::MemoryJobStore;
use reliefmap::pipeline::{JobPipeline, PipelineSettings};
use reliefmap::storage::{MemoryAssetStore, MemoryStoreFactory};
use reliefmap::telemetry::WorkerSnapshot;
use reliefmap::worker::{MemoryBroker, WorkerLoop, WorkerSettings};
use reliefmap::BoxFuture;

// ============================================================================
// Constants
// ============================================================================

pub const ENDPOINT: &str = "minio:9000";
pub const OUTPUT_BUCKET: &str = "uav-models";
pub const INPUT_BUCKET: &str = "uav-data";
pub const SINGLE_QUEUE: &str = "heightmap.tasks";
pub const BATCH_QUEUE: &str = "heightmap.tasks_batch";

// ============================================================================
// Payloads
// ============================================================================

/// A flat-colored RGB image encoded as `format`.
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 96])
    });
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// A single-band float GeoTIFF with a GDAL no-data tag.
pub fn dem_tiff(width: u32, height: u32, values: &[f32]) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut out).unwrap();
        let mut image = encoder
            .new_image::<colortype::Gray32Float>(width, height)
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::from_u16_exhaustive(GDAL_NODATA_TAG), "-9999")
            .unwrap();
        image.write_data(values).unwrap();
    }
    out.into_inner()
}

/// Elevations rising linearly from `low` to `high` across the raster.
pub fn dem_ramp(width: u32, height: u32, low: f32, high: f32) -> Vec<f32> {
    let cells = (width * height) as usize;
    (0..cells)
        .map(|i| low + (high - low) * i as f32 / (cells - 1) as f32)
        .collect()
}

/// A zip archive holding `entries`.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn credentials() -> Value {
    json!({
        "minio_endpoint": ENDPOINT,
        "minio_access_key": "minioadmin",
        "minio_secret_key": "minioadmin",
    })
}

pub fn single_message(job_id: &str, image_url: &str) -> Value {
    let mut message = credentials();
    message["job_id"] = json!(job_id);
    message["image_url"] = json!(image_url);
    message["output_bucket"] = json!(OUTPUT_BUCKET);
    message
}

pub fn batch_message(job_id: &str, image_urls: &[String], generation_mode: &str) -> Value {
    let mut message = credentials();
    message["batch_job_id"] = json!(job_id);
    message["image_urls"] = json!(image_urls);
    message["output_bucket"] = json!(OUTPUT_BUCKET);
    message["merge_method"] = json!("medium");
    message["generation_mode"] = json!(generation_mode);
    message
}

// ============================================================================
// Collaborators
// ============================================================================

/// Depth estimator returning a diagonal ramp the size of the input.
pub struct RampDepth;

impl DepthEstimator for RampDepth {
    fn name(&self) -> &str {
        "ramp"
    }

    fn estimate<'a>(&'a self, image: &'a RgbImage) -> BoxFuture<'a, Result<DepthMap, DepthError>> {
        let (w, h) = image.dimensions();
        let values = (0..w * h).map(|i| ((i % w) + (i / w)) as f32).collect();
        Box::pin(async move { DepthMap::new(w, h, values) })
    }
}

/// Engine transport replaying a script.
pub struct ScriptedEngine {
    create_response: Value,
    infos: Mutex<VecDeque<Value>>,
    archive: Vec<u8>,
    pub create_calls: AtomicUsize,
    pub info_calls: AtomicUsize,
    pub submitted: Mutex<Vec<PathBuf>>,
}

impl ScriptedEngine {
    /// Accepts the task, reports it running once, then completed.
    pub fn completing(archive: Vec<u8>) -> Self {
        Self {
            create_response: json!({"uuid": "4b3c2a10-task"}),
            infos: Mutex::new(VecDeque::from([
                json!({"status": {"code": 20}, "progress": 42.0}),
                json!({"status": {"code": 40}, "progress": 100.0}),
            ])),
            archive,
            create_calls: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Answers task creation without a task id.
    pub fn rejecting() -> Self {
        Self {
            create_response: json!({"error": "Not enough images"}),
            ..Self::completing(Vec::new())
        }
    }
}

impl EngineTransport for ScriptedEngine {
    fn create_task<'a>(
        &'a self,
        images: &'a [PathBuf],
        _options_json: &'a str,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().extend(images.iter().cloned());
        let response = self.create_response.clone();
        Box::pin(async move { Ok(response) })
    }

    fn task_info<'a>(&'a self, _task_id: &'a str) -> BoxFuture<'a, Result<Value, EngineError>> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        let info = self
            .infos
            .lock()
            .pop_front()
            .unwrap_or_else(|| json!({"status": {"code": 40}, "progress": 100.0}));
        Box::pin(async move { Ok(info) })
    }

    fn download<'a>(
        &'a self,
        _task_id: &'a str,
        _asset: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            tokio::fs::write(dest, &self.archive)
                .await
                .map_err(|e| EngineError::io(dest, e))
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

/// In-memory deployment shared by one test.
pub struct Harness {
    pub store: Arc<MemoryAssetStore>,
    pub factory: Arc<MemoryStoreFactory>,
    pub jobs: Arc<MemoryJobStore>,
    pub broker: MemoryBroker,
    pub scratch: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryAssetStore::new(ENDPOINT));
        Self {
            factory: Arc::new(MemoryStoreFactory::new(store.clone())),
            store,
            jobs: Arc::new(MemoryJobStore::new()),
            broker: MemoryBroker::new(),
            scratch: TempDir::new().unwrap(),
        }
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            scratch_root: self.scratch.path().to_path_buf(),
            ..Default::default()
        }
    }

    /// Whether every per-job scratch directory has been removed.
    pub fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
    }

    /// Runs a worker on `queue` until `expected` messages were settled.
    pub async fn drain<P: JobPipeline>(
        &self,
        pipeline: P,
        queue: &str,
        expected: usize,
    ) -> WorkerSnapshot {
        let shutdown = CancellationToken::new();
        let worker = WorkerLoop::new(
            Arc::new(pipeline),
            Arc::new(self.broker.clone()),
            WorkerSettings::new(queue, 1),
            shutdown.clone(),
        );
        let handle = tokio::spawn(worker.run());

        let settled = async {
            while self.broker.acked().len() + self.broker.rejected().len() < expected {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(120), settled)
            .await
            .expect("worker did not settle the queue in time");

        shutdown.cancel();
        handle.await.unwrap()
    }
}
