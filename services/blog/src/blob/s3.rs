//! S3-backed blob store

use async_trait::async_trait;
use aws_sdk_s3::{Client, primitives::ByteStream};
use tracing::{error, info};

use super::{BlobError, BlobResult, BlobStore, check_path};
use crate::models::ImageUpload;

/// Blob store uploading to an S3 bucket
#[derive(Clone)]
pub struct S3BlobStore {
    s3_client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3BlobStore {
    /// Store uploading into `bucket`, serving objects under `public_base_url`
    pub fn new(s3_client: Client, bucket: String, public_base_url: String) -> Self {
        Self {
            s3_client,
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, file: &ImageUpload, path: &str) -> BlobResult<String> {
        check_path(path)?;
        info!("Uploading image to S3: {}/{}", self.bucket, path);

        self.s3_client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(file.bytes.clone()))
            .content_type(&file.content_type)
            .send()
            .await
            .map_err(|e| {
                error!("Error uploading image: {}", e);
                BlobError::Upload(e.to_string())
            })?;

        Ok(format!("{}/{}", self.public_base_url, path))
    }
}
