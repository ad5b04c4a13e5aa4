//! Object storage.
//!
//! [`AssetStore`] is the seam every pipeline reads inputs from and writes
//! results to. Stores are created per message by an [`AssetStoreFactory`]
//! from the credentials embedded in the task, so one worker can serve
//! several stores.
//!
//! # Implementations
//!
//! - [`S3AssetStore`]: S3-compatible API (MinIO) through the AWS SDK
//! - [`MemoryAssetStore`]: in-process objects with failure injection

mod error;
mod memory;
mod s3;
mod store;

pub use error::StorageError;
pub use memory::{MemoryAssetStore, MemoryStoreFactory, StoredObject};
pub use s3::{S3AssetStore, S3StoreFactory};
pub use store::{content_type_for, object_url, AssetStore, AssetStoreFactory};
