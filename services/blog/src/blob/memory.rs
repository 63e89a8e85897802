//! In-process blob store

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use super::{BlobError, BlobResult, BlobStore, check_path};
use crate::models::ImageUpload;

/// Blob store keeping uploads in memory
#[derive(Debug)]
pub struct MemoryBlobStore {
    base_url: String,
    objects: RwLock<HashMap<String, ImageUpload>>,
    max_bytes: usize,
}

impl MemoryBlobStore {
    /// Store whose URLs start with `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
            max_bytes: 10 * 1024 * 1024,
        }
    }

    /// Reject uploads larger than `max_bytes`
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// The object stored at `path`
    pub async fn get(&self, path: &str) -> Option<ImageUpload> {
        self.objects.read().await.get(path).cloned()
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, file: &ImageUpload, path: &str) -> BlobResult<String> {
        check_path(path)?;
        if file.bytes.len() > self.max_bytes {
            return Err(BlobError::Upload(format!(
                "{} bytes exceeds the {} byte limit",
                file.bytes.len(),
                self.max_bytes
            )));
        }

        info!("Storing blob: {}", path);
        self.objects
            .write()
            .await
            .insert(path.to_string(), file.clone());

        Ok(format!("{}/{}", self.base_url, path))
    }
}
