//! Photogrammetry engine client.
//!
//! Submits image sets to a NodeODM-compatible engine, polls the task to a
//! terminal state and extracts the DEM and orthophoto from the combined
//! results archive.

mod archive;
mod client;
mod error;
mod options;
mod transport;

pub use archive::{AssetPattern, ResultArchive};
#[cfg(test)]
pub(crate) use archive::tests::write_zip;
pub use client::{
    EngineClient, PollPolicy, TaskInfo, TaskState, ALL_ASSETS, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_POLL_TIMEOUT_SECS, STATUS_CANCELED, STATUS_COMPLETED, STATUS_FAILED,
};
pub use error::EngineError;
pub use options::{build_options, options_json, EngineOption, QualityPreset};
pub use transport::{EngineTransport, ReqwestTransport, DEFAULT_REQUEST_TIMEOUT_SECS};
