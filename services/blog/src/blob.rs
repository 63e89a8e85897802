//! Blob store adapter for header images

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ImageUpload;

pub mod memory;
pub mod s3;

pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

/// Custom error type for blob uploads
#[derive(Error, Debug)]
pub enum BlobError {
    /// The object path is empty or escapes its prefix
    #[error("Invalid object path: {0}")]
    InvalidPath(String),

    /// The upload itself failed
    #[error("Upload failed: {0}")]
    Upload(String),
}

/// Type alias for blob results
pub type BlobResult<T> = Result<T, BlobError>;

/// Content-addressed upload service
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `file` at `path` and return its public URL
    async fn upload(&self, file: &ImageUpload, path: &str) -> BlobResult<String>;
}

/// Reject empty, absolute or parent-relative object paths
pub(crate) fn check_path(path: &str) -> BlobResult<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|segment| segment.is_empty() || segment == "..")
    {
        return Err(BlobError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_path() {
        assert!(check_path("posts/u1/a.png").is_ok());
        assert!(check_path("").is_err());
        assert!(check_path("/posts/a.png").is_err());
        assert!(check_path("posts/../a.png").is_err());
        assert!(check_path("posts//a.png").is_err());
    }
}
