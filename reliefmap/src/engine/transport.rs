//! HTTP transport for the engine protocol.
//!
//! The client state machine only sees raw JSON documents and file
//! downloads, so tests can script the engine without a server.
//!
//! ```text
//! POST /task/new                      multipart images + options -> {"uuid": ...}
//! GET  /task/{uuid}/info              -> {"status": {"code": ..}, "progress": ..}
//! GET  /task/{uuid}/download/{asset}  -> binary stream
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::BoxFuture;

use super::error::EngineError;

/// Default per-request timeout for info and submission calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Archive downloads may take much longer than other calls.
const DOWNLOAD_TIMEOUT_SECS: u64 = 3600;

/// Raw engine operations.
pub trait EngineTransport: Send + Sync {
    /// Creates a task from images and a JSON options list.
    fn create_task<'a>(
        &'a self,
        images: &'a [PathBuf],
        options_json: &'a str,
    ) -> BoxFuture<'a, Result<Value, EngineError>>;

    /// Fetches the task's info document.
    fn task_info<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, Result<Value, EngineError>>;

    /// Streams a task asset to `dest`.
    fn download<'a>(
        &'a self,
        task_id: &'a str,
        asset: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<(), EngineError>>;
}

/// Transport over the engine's REST API.
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, request_timeout: Duration) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| EngineError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_task(&self, images: &[PathBuf], options_json: &str) -> Result<Value, EngineError> {
        let mut form = Form::new().text("options", options_json.to_string());
        for path in images {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| EngineError::io(path, e))?;
            let len = file
                .metadata()
                .await
                .map_err(|e| EngineError::io(path, e))?
                .len();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image.jpg".to_string());
            let part = Part::stream_with_length(Body::from(file), len)
                .file_name(name)
                .mime_str("image/jpeg")
                .map_err(|e| EngineError::Submission(e.to_string()))?;
            form = form.part("images", part);
        }

        let url = format!("{}/task/new", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout.max(Duration::from_secs(300)))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Submission(format!("HTTP {} - {}", status.as_u16(), body)));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::Submission(format!("invalid response body: {}", e)))
    }

    async fn get_info(&self, task_id: &str) -> Result<Value, EngineError> {
        let url = format!("{}/task/{}/info", self.base_url, task_id);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EngineError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::Protocol(e.to_string()))
    }

    async fn get_asset(&self, task_id: &str, asset: &str, dest: &Path) -> Result<(), EngineError> {
        let url = format!("{}/task/{}/download/{}", self.base_url, task_id, asset);
        let mut response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(EngineError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| EngineError::io(dest, e))?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)
                .await
                .map_err(|e| EngineError::io(dest, e))?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| EngineError::io(dest, e))?;

        debug!(task_id = %task_id, asset = %asset, bytes = written, "Downloaded engine asset");
        Ok(())
    }
}

impl EngineTransport for ReqwestTransport {
    fn create_task<'a>(
        &'a self,
        images: &'a [PathBuf],
        options_json: &'a str,
    ) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(self.post_task(images, options_json))
    }

    fn task_info<'a>(&'a self, task_id: &'a str) -> BoxFuture<'a, Result<Value, EngineError>> {
        Box::pin(self.get_info(task_id))
    }

    fn download<'a>(
        &'a self,
        task_id: &'a str,
        asset: &'a str,
        dest: &'a Path,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(self.get_asset(task_id, asset, dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_trimmed() {
        let transport = ReqwestTransport::new("http://nodeodm:3000/").unwrap();
        assert_eq!(transport.base_url(), "http://nodeodm:3000");
    }

    #[tokio::test]
    async fn test_missing_image_fails_submission_before_request() {
        let transport = ReqwestTransport::new("http://127.0.0.1:9").unwrap();
        let images = vec![PathBuf::from("/nonexistent/a.jpg")];
        let err = transport.create_task(&images, "[]").await.unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
