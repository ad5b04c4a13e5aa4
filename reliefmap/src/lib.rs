//! Reliefmap - shaded-relief heightmaps from aerial imagery
//!
//! This library provides the job-processing engine behind the heightmap
//! service: queue consumption with reconnect/backoff, the photogrammetry
//! engine protocol, and the raster-to-visualization pipeline.
//!
//! # Modes
//!
//! - **Single image**: one photo → depth estimator → height field → relief render
//! - **Batch**: many photos → photogrammetry engine → DEM → relief render
//!   (optionally an orthophoto as well)
//!
//! # Architecture
//!
//! ```text
//! Broker ──► WorkerLoop ──► JobPipeline ──► AssetStore (download)
//!                               │
//!                               ├──► DepthEstimator | EngineClient
//!                               ├──► relief::render
//!                               ├──► AssetStore (upload)
//!                               └──► JobStateStore (status/result)
//! ```

pub mod config;
pub mod dem;
pub mod depth;
pub mod engine;
pub mod imagery;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod relief;
pub mod storage;
pub mod task;
pub mod telemetry;
pub mod worker;

use std::future::Future;
use std::pin::Pin;

/// Library version, taken from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Boxed future type for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
