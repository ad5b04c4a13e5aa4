//! Source location parsing.
//!
//! Upstream publishes source images as store URLs of several shapes:
//!
//! ```text
//! http://minio:9000/uav-data/uploads/2024/a.jpg      path-style URL
//! https://cdn.example.com/uav-data/uploads/a.jpg     public host
//! uploads/a.jpg                                      bare key
//! ```
//!
//! The bucket is found by locating a known bucket name among the path
//! segments; everything after it is the object key. When no known bucket
//! appears, the object is assumed to live in the task's output bucket under
//! its trailing filename.

use super::error::TaskError;

/// Bucket names upstream stores source images in.
pub const DEFAULT_KNOWN_BUCKETS: &[&str] = &["uav-data", "uav-models"];

/// A resolved bucket/object pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub bucket: String,
    pub key: String,
}

impl SourceLocation {
    /// Trailing file name of the object key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Resolves a source URL into a bucket and object key.
///
/// # Arguments
///
/// * `url` - Source location as published in the task
/// * `known_buckets` - Bucket names to look for among the path segments
/// * `fallback_bucket` - Bucket used when no known name appears
pub fn resolve_location<S: AsRef<str>>(
    url: &str,
    known_buckets: &[S],
    fallback_bucket: &str,
) -> Result<SourceLocation, TaskError> {
    let invalid = |reason: &str| TaskError::InvalidLocation {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let without_query = url.split(['?', '#']).next().unwrap_or_default().trim();
    let path = match without_query.split_once("://") {
        // Drop the authority component
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or_default(),
        None => without_query,
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(invalid("no object path"));
    }

    let found = segments.iter().position(|segment| {
        known_buckets
            .iter()
            .any(|bucket| bucket.as_ref() == *segment)
    });

    match found {
        Some(idx) => {
            let key = segments[idx + 1..].join("/");
            if key.is_empty() {
                return Err(invalid("bucket without object key"));
            }
            Ok(SourceLocation {
                bucket: segments[idx].to_string(),
                key,
            })
        }
        None => {
            if fallback_bucket.trim().is_empty() {
                return Err(invalid("no known bucket and no fallback bucket"));
            }
            let name = segments[segments.len() - 1];
            Ok(SourceLocation {
                bucket: fallback_bucket.to_string(),
                key: name.to_string(),
            })
        }
    }
}
