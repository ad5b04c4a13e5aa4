//! S3-compatible object store.
//!
//! Requests go through the AWS SDK with path-style addressing
//! (`{scheme}://{endpoint}/{bucket}/{key}`), which is what MinIO serves by
//! default. Each task brings its own endpoint and keys, so every
//! [`S3AssetStore`] owns a client built from static credentials rather than
//! the ambient AWS config chain.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::task::StoreCredentials;
use crate::BoxFuture;

use super::error::StorageError;
use super::store::{content_type_for, object_url, AssetStore, AssetStoreFactory};

/// Region used for signing; MinIO accepts it regardless of deployment.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default per-operation timeout.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Provider name reported by the SDK for per-task keys.
const CREDENTIALS_PROVIDER: &str = "task-credentials";

/// Object store speaking the S3 API.
pub struct S3AssetStore {
    client: Client,
    /// `host[:port]` without scheme.
    host: String,
}

impl S3AssetStore {
    /// Creates a store for the given credentials.
    pub fn new(credentials: &StoreCredentials, timeout: Duration) -> Result<Self, StorageError> {
        let scheme = if credentials.use_ssl { "https" } else { "http" };
        let host = normalize_host(&credentials.endpoint, scheme)?;

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(DEFAULT_REGION))
            .credentials_provider(Credentials::new(
                credentials.access_key.clone(),
                credentials.secret_key.clone(),
                None,
                None,
                CREDENTIALS_PROVIDER,
            ))
            .endpoint_url(format!("{}://{}", scheme, host))
            .force_path_style(true)
            .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build())
            .build();

        Ok(Self {
            client: Client::from_conf(config),
            host,
        })
    }

    async fn download_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "download", bucket, key))?;

        let mut body = output.body;
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| StorageError::io(dest, e))?;
        let mut written: u64 = 0;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| StorageError::Http(DisplayErrorContext(&e).to_string()))?
        {
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::io(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| StorageError::io(dest, e))?;

        debug!(bucket = %bucket, key = %key, bytes = written, "Downloaded object");
        Ok(())
    }

    async fn upload_object(&self, src: &Path, bucket: &str, key: &str) -> Result<String, StorageError> {
        let bytes = tokio::fs::read(src)
            .await
            .map_err(|e| StorageError::io(src, e))?;
        let size = bytes.len();
        let content_type = content_type_for(key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .content_disposition("inline")
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "upload", bucket, key))?;

        info!(
            bucket = %bucket,
            key = %key,
            bytes = size,
            content_type = content_type,
            "Uploaded object"
        );
        Ok(key.to_string())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        // S3 answers 204 for deletes, including of missing keys
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "delete", bucket, key))?;
        debug!(bucket = %bucket, key = %key, "Deleted object");
        Ok(())
    }
}

impl AssetStore for S3AssetStore {
    fn download<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(self.download_object(bucket, key, dest))
    }

    fn upload<'a>(
        &'a self,
        src: &'a Path,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(self.upload_object(src, bucket, key))
    }

    fn delete<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(self.delete_object(bucket, key))
    }

    fn generate_url(&self, bucket: &str, key: &str, public_host: Option<&str>) -> String {
        object_url(&self.host, public_host, bucket, key)
    }
}

/// Maps an SDK failure onto [`StorageError`] by HTTP status.
fn map_sdk_error<E>(err: SdkError<E>, operation: &'static str, bucket: &str, key: &str) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    classify(status, operation, bucket, key, DisplayErrorContext(&err).to_string())
}

fn classify(
    status: Option<u16>,
    operation: &'static str,
    bucket: &str,
    key: &str,
    message: String,
) -> StorageError {
    match status {
        Some(404) if operation == "download" => StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        Some(status) if !(200..300).contains(&status) => StorageError::Status {
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
            status,
        },
        _ => StorageError::Http(message),
    }
}

/// Strips any scheme, path and default port from an endpoint.
fn normalize_host(endpoint: &str, scheme: &str) -> Result<String, StorageError> {
    let trimmed = endpoint.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme.split('/').next().unwrap_or_default();

    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(StorageError::InvalidEndpoint(endpoint.to_string()));
    }

    let default_port = if scheme == "https" { ":443" } else { ":80" };
    Ok(host.strip_suffix(default_port).unwrap_or(host).to_string())
}

/// Factory producing one [`S3AssetStore`] per set of task credentials.
#[derive(Clone, Debug)]
pub struct S3StoreFactory {
    timeout: Duration,
}

impl S3StoreFactory {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for S3StoreFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetStoreFactory for S3StoreFactory {
    fn connect(&self, credentials: &StoreCredentials) -> Result<Arc<dyn AssetStore>, StorageError> {
        let store: Arc<dyn AssetStore> = Arc::new(S3AssetStore::new(credentials, self.timeout)?);
        Ok(store)
    }
}
