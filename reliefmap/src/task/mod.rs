//! Task descriptors delivered through the work queues.
//!
//! A task is the immutable contract for one unit of work. Two shapes exist:
//!
//! - [`SingleTask`]: one source image, rendered via depth estimation
//! - [`BatchTask`]: many source images, merged by the photogrammetry engine
//!
//! Both carry the object-store credentials to use for this job
//! ([`StoreCredentials`]) so that a single worker can serve several tenants.

mod descriptor;
mod error;
mod location;

pub use descriptor::{
    BatchTask, GenerationMode, SingleTask, StoreCredentials, TaskDescriptor, MAX_BATCH_IMAGES,
    MIN_BATCH_IMAGES,
};
pub use error::TaskError;
pub use location::{resolve_location, SourceLocation, DEFAULT_KNOWN_BUCKETS};
