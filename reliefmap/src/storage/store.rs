//! The asset store seam and helpers shared by implementations.

use std::path::Path;
use std::sync::Arc;

use crate::task::StoreCredentials;
use crate::BoxFuture;

use super::error::StorageError;

/// Object storage operations used by the pipelines.
///
/// # Dyn Compatibility
///
/// Methods return [`BoxFuture`] so that factories can hand out
/// `Arc<dyn AssetStore>`.
pub trait AssetStore: Send + Sync {
    /// Downloads `bucket/key` to `dest`, replacing any existing file.
    fn download<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Uploads `src` as `bucket/key` and returns the stored key.
    ///
    /// The content type is inferred from the key's extension and the object
    /// is marked for inline display.
    fn upload<'a>(
        &'a self,
        src: &'a Path,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>>;

    /// Deletes `bucket/key`.
    fn delete<'a>(&'a self, bucket: &'a str, key: &'a str)
        -> BoxFuture<'a, Result<(), StorageError>>;

    /// URL clients use to fetch `bucket/key`.
    ///
    /// `public_host` overrides the store endpoint when set.
    fn generate_url(&self, bucket: &str, key: &str, public_host: Option<&str>) -> String;
}

/// Creates stores from the credentials carried by a task.
pub trait AssetStoreFactory: Send + Sync {
    fn connect(&self, credentials: &StoreCredentials) -> Result<Arc<dyn AssetStore>, StorageError>;
}

/// Builds a path-style object URL.
///
/// `public_host` wins over `endpoint`; a host without scheme gets `http://`.
pub fn object_url(endpoint: &str, public_host: Option<&str>, bucket: &str, key: &str) -> String {
    let host = public_host
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(endpoint)
        .trim_end_matches('/');

    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}/{}/{}", host, bucket, key)
    } else {
        format!("http://{}/{}/{}", host, bucket, key)
    }
}

/// MIME type for an object key, by extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}
