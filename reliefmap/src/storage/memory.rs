//! In-process object store.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::task::StoreCredentials;
use crate::BoxFuture;

use super::error::StorageError;
use super::store::{content_type_for, object_url, AssetStore, AssetStoreFactory};

type ObjectId = (String, String);

/// A stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_type: &'static str,
}

/// Object store backed by a map, with failure injection for tests.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    endpoint: String,
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
    failing_downloads: RwLock<HashSet<ObjectId>>,
    failing_uploads: RwLock<HashSet<ObjectId>>,
    deleted: RwLock<Vec<ObjectId>>,
}

impl MemoryAssetStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Stores an object directly.
    pub fn put(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.objects.write().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.into(),
                content_type: content_type_for(key),
            },
        );
    }

    /// Returns a stored object.
    pub fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.get(bucket, key).is_some()
    }

    /// Makes every download of `bucket/key` fail.
    pub fn fail_download(&self, bucket: &str, key: &str) {
        self.failing_downloads
            .write()
            .insert((bucket.to_string(), key.to_string()));
    }

    /// Makes every upload to `bucket/key` fail.
    pub fn fail_upload(&self, bucket: &str, key: &str) {
        self.failing_uploads
            .write()
            .insert((bucket.to_string(), key.to_string()));
    }

    /// Objects deleted so far, in order.
    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.read().clone()
    }

    fn injected_failure(
        set: &RwLock<HashSet<ObjectId>>,
        operation: &'static str,
        bucket: &str,
        key: &str,
    ) -> Result<(), StorageError> {
        if set.read().contains(&(bucket.to_string(), key.to_string())) {
            return Err(StorageError::Status {
                operation,
                bucket: bucket.to_string(),
                key: key.to_string(),
                status: 503,
            });
        }
        Ok(())
    }

    async fn download_object(&self, bucket: &str, key: &str, dest: &Path) -> Result<(), StorageError> {
        Self::injected_failure(&self.failing_downloads, "download", bucket, key)?;
        let object = self.get(bucket, key).ok_or_else(|| StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        tokio::fs::write(dest, &object.data)
            .await
            .map_err(|e| StorageError::io(dest, e))
    }

    async fn upload_object(&self, src: &Path, bucket: &str, key: &str) -> Result<String, StorageError> {
        Self::injected_failure(&self.failing_uploads, "upload", bucket, key)?;
        let data = tokio::fs::read(src)
            .await
            .map_err(|e| StorageError::io(src, e))?;
        self.put(bucket, key, data);
        Ok(key.to_string())
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let id = (bucket.to_string(), key.to_string());
        self.objects.write().remove(&id);
        self.deleted.write().push(id);
        Ok(())
    }
}

impl AssetStore for MemoryAssetStore {
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
        Box::pin(async move { self.delete_object(bucket, key) })
    }

    fn generate_url(&self, bucket: &str, key: &str, public_host: Option<&str>) -> String {
        object_url(&self.endpoint, public_host, bucket, key)
    }
}

/// Factory that hands out one shared [`MemoryAssetStore`].
///
/// Records the credentials it was asked to connect with.
#[derive(Debug)]
pub struct MemoryStoreFactory {
    store: Arc<MemoryAssetStore>,
    connections: RwLock<Vec<StoreCredentials>>,
}

impl MemoryStoreFactory {
    pub fn new(store: Arc<MemoryAssetStore>) -> Self {
        Self {
            store,
            connections: RwLock::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<MemoryAssetStore> {
        &self.store
    }

    /// Credentials passed to [`connect`](AssetStoreFactory::connect) so far.
    pub fn connections(&self) -> Vec<StoreCredentials> {
        self.connections.read().clone()
    }
}

impl AssetStoreFactory for MemoryStoreFactory {
    fn connect(&self, credentials: &StoreCredentials) -> Result<Arc<dyn AssetStore>, StorageError> {
        self.connections.write().push(credentials.clone());
        let store: Arc<dyn AssetStore> = self.store.clone();
        Ok(store)
    }
}
