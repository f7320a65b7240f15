use crate::{GateError, Result};
use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::Path;
use std::sync::Arc;

/// Looks up the byte size of a job's input file.
#[async_trait]
pub trait BlobSizeProvider: Send + Sync {
    /// Fails with `NotFound` when the object does not exist.
    async fn file_size(&self, key: &str) -> Result<u64>;
}

/// Size lookups through a HEAD request on any `object_store` backend.
#[derive(Clone)]
pub struct ObjectStoreBlobSizes {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBlobSizes {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// S3 bucket, credentials and region taken from the `AWS_*` environment.
    pub fn s3(bucket: &str) -> Result<Self> {
        let bucket = bucket.trim();
        if bucket.is_empty() {
            return Err(GateError::Config("s3 bucket cannot be empty".to_string()));
        }

        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| GateError::Config(format!("failed to build s3 client: {}", e)))?;

        Ok(Self::new(Arc::new(store)))
    }

    /// A local directory standing in for the bucket.
    pub fn local(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| GateError::Config(format!("invalid blob root {:?}: {}", root, e)))?;

        Ok(Self::new(Arc::new(store)))
    }
}

#[async_trait]
impl BlobSizeProvider for ObjectStoreBlobSizes {
    async fn file_size(&self, key: &str) -> Result<u64> {
        let location = ObjectPath::parse(key.trim_start_matches('/')).map_err(|e| {
            GateError::MalformedRequest(format!("invalid input file key '{}': {}", key, e))
        })?;

        let meta = self.store.head(&location).await?;
        Ok(meta.size as u64)
    }
}
