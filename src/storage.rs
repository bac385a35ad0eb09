use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use tokio::sync::RwLock;

/// Blob storage for attachment contents. Keys are attachment ids; the
/// descriptive metadata (filename, content type, size) lives in the
/// document store.
#[async_trait]
pub trait FileStore: Send + Sync + 'static {
    async fn put_file(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    async fn get_file(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete_file(&self, key: &str) -> Result<()>;
}

pub struct S3FileStore {
    client: S3Client,
    bucket: String,
}

impl S3FileStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl FileStore for S3FileStore {
    async fn put_file(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .context("failed to upload file to S3")?;

        Ok(())
    }

    async fn get_file(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to download file from S3")?;

        let bytes = response
            .body
            .collect()
            .await
            .context("failed to read file stream")?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to delete file from S3")?;
        Ok(())
    }
}

/// Keeps file contents in process memory. Backs the memory store backend
/// and the test harness.
#[derive(Default)]
pub struct MemoryFileStore {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn put_file(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.files.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_file(&self, key: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no stored file for key {key}"))
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.files.write().await.remove(key);
        Ok(())
    }
}
