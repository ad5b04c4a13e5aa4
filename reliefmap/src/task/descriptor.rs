//! Task descriptor types as published by the upstream orchestrator.

use serde::{Deserialize, Deserializer, Serialize};

use super::error::TaskError;

/// Minimum number of images the engine needs to reconstruct a surface.
pub const MIN_BATCH_IMAGES: usize = 3;

/// Upper bound on images accepted in one batch.
pub const MAX_BATCH_IMAGES: usize = 1000;

/// Object-store credentials embedded in every task message.
///
/// Credentials travel with the task rather than living in process
/// configuration, so each job may address a different store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCredentials {
    /// Store host, optionally with port (`minio:9000`).
    #[serde(rename = "minio_endpoint")]
    pub endpoint: String,

    #[serde(rename = "minio_access_key")]
    pub access_key: String,

    #[serde(rename = "minio_secret_key")]
    pub secret_key: String,

    #[serde(rename = "minio_use_ssl", default)]
    pub use_ssl: bool,

    /// Host used when building result URLs for clients outside the cluster.
    #[serde(rename = "minio_public_url", default)]
    pub public_url: Option<String>,
}

impl StoreCredentials {
    /// Public host for result URLs, ignoring an empty override.
    pub fn public_host(&self) -> Option<&str> {
        self.public_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn validate(&self) -> Result<(), TaskError> {
        if self.endpoint.trim().is_empty() {
            return Err(TaskError::MissingField("minio_endpoint"));
        }
        if self.access_key.is_empty() {
            return Err(TaskError::MissingField("minio_access_key"));
        }
        if self.secret_key.is_empty() {
            return Err(TaskError::MissingField("minio_secret_key"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SecretRedacted<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.0.access_key, self.0.endpoint)
    }
}

/// Debug view of credentials that never prints the secret key.
pub(crate) struct SecretRedacted<'a>(pub &'a StoreCredentials);

/// Which products a batch job should generate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Relief-shaded heightmap only.
    #[default]
    Heightmap,
    /// Orthophoto only.
    Orthophoto,
    /// Heightmap and orthophoto.
    Both,
}

impl GenerationMode {
    /// Whether the heightmap product is requested.
    pub fn wants_heightmap(&self) -> bool {
        matches!(self, Self::Heightmap | Self::Both)
    }

    /// Whether the orthophoto product is requested.
    pub fn wants_orthophoto(&self) -> bool {
        matches!(self, Self::Orthophoto | Self::Both)
    }

    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heightmap => "heightmap",
            Self::Orthophoto => "orthophoto",
            Self::Both => "both",
        }
    }
}

/// Accepts an absent, null or empty `generation_mode` as the default.
fn lenient_generation_mode<'de, D>(deserializer: D) -> Result<GenerationMode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(GenerationMode::default()),
        Some("heightmap") => Ok(GenerationMode::Heightmap),
        Some("orthophoto") => Ok(GenerationMode::Orthophoto),
        Some("both") => Ok(GenerationMode::Both),
        Some(other) => Err(serde::de::Error::unknown_variant(
            other,
            &["heightmap", "orthophoto", "both"],
        )),
    }
}

fn default_merge_method() -> String {
    "average".to_string()
}

/// Accepts an absent, null or empty `merge_method` as the default.
fn lenient_merge_method<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default_merge_method))
}

/// Common view over task shapes used by the worker loop.
pub trait TaskDescriptor {
    /// Identifier of the job record this task updates.
    fn job_id(&self) -> &str;

    /// Credentials for the object store holding inputs and outputs.
    fn credentials(&self) -> &StoreCredentials;

    /// Bucket results are written to.
    fn output_bucket(&self) -> &str;

    /// Checks required fields and bounds.
    fn validate(&self) -> Result<(), TaskError>;
}

/// Single-image task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SingleTask {
    pub job_id: String,
    pub image_url: String,
    pub output_bucket: String,
    #[serde(flatten)]
    pub store: StoreCredentials,
}

impl TaskDescriptor for SingleTask {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn credentials(&self) -> &StoreCredentials {
        &self.store
    }

    fn output_bucket(&self) -> &str {
        &self.output_bucket
    }

    fn validate(&self) -> Result<(), TaskError> {
        if self.job_id.trim().is_empty() {
            return Err(TaskError::MissingField("job_id"));
        }
        if self.image_url.trim().is_empty() {
            return Err(TaskError::MissingField("image_url"));
        }
        if self.output_bucket.trim().is_empty() {
            return Err(TaskError::MissingField("output_bucket"));
        }
        self.store.validate()
    }
}

/// Multi-image task processed by the photogrammetry engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchTask {
    pub batch_job_id: String,
    pub image_urls: Vec<String>,
    pub output_bucket: String,
    #[serde(flatten)]
    pub store: StoreCredentials,

    /// Trade reconstruction quality for speed.
    #[serde(default)]
    pub fast_mode: bool,

    /// Selects the engine quality preset (`max`, `medium`, anything else).
    #[serde(default = "default_merge_method", deserialize_with = "lenient_merge_method")]
    pub merge_method: String,

    #[serde(default, deserialize_with = "lenient_generation_mode")]
    pub generation_mode: GenerationMode,
}

impl TaskDescriptor for BatchTask {
    fn job_id(&self) -> &str {
        &self.batch_job_id
    }

    fn credentials(&self) -> &StoreCredentials {
        &self.store
    }

    fn output_bucket(&self) -> &str {
        &self.output_bucket
    }

    fn validate(&self) -> Result<(), TaskError> {
        if self.batch_job_id.trim().is_empty() {
            return Err(TaskError::MissingField("batch_job_id"));
        }
        if self.output_bucket.trim().is_empty() {
            return Err(TaskError::MissingField("output_bucket"));
        }
        let count = self.image_urls.len();
        if !(MIN_BATCH_IMAGES..=MAX_BATCH_IMAGES).contains(&count) {
            return Err(TaskError::ImageCount {
                count,
                min: MIN_BATCH_IMAGES,
                max: MAX_BATCH_IMAGES,
            });
        }
        if self.image_urls.iter().any(|u| u.trim().is_empty()) {
            return Err(TaskError::MissingField("image_urls"));
        }
        self.store.validate()
    }
}
