//! Object storage backing the shipped partition writer
//! Uses Apache Arrow object_store crate

mod writer;

pub use writer::{ObjectStoreWriter, ObjectStoreWriterFactory};

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{ObjectStore, path::Path as StoragePath};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StorageConfig, StorageProvider};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Metadata returned after upload
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self { store, bucket }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            bucket: "laozi-local".to_string(),
        }
    }

    /// Build the backend described by the `[storage]` config section
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.provider {
            StorageProvider::Memory => Ok(Self::in_memory()),
            StorageProvider::Local => {
                let root = config.root.as_ref().ok_or_else(|| {
                    StorageError::InvalidConfig("local provider requires root".to_string())
                })?;
                std::fs::create_dir_all(root)?;
                let store = LocalFileSystem::new_with_prefix(root)?;
                Ok(Self::new(Arc::new(store), config.bucket.clone()))
            }
            StorageProvider::S3 => {
                let mut builder = AmazonS3Builder::new().with_bucket_name(&config.bucket);

                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }
                if let Some(access_key) = &config.access_key {
                    builder = builder.with_access_key_id(access_key);
                }
                if let Some(secret_key) = &config.secret_key {
                    builder = builder.with_secret_access_key(secret_key);
                }

                let store = builder.build()?;
                Ok(Self::new(Arc::new(store), config.bucket.clone()))
            }
        }
    }

    /// Upload bytes to storage, replacing any existing object
    pub async fn upload(&self, key: &str, data: Bytes) -> Result<UploadMetadata> {
        let path = StoragePath::from(key);
        let size = data.len();

        let put_result = self.store.put(&path, data.into()).await?;

        tracing::info!(key, size, "Uploaded to storage");

        Ok(UploadMetadata {
            key: key.to_string(),
            etag: put_result.e_tag.clone(),
            size,
        })
    }

    /// Download from storage
    pub async fn download(&self, key: &str) -> Result<Bytes> {
        let path = StoragePath::from(key);

        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let bytes = result.bytes().await?;

        tracing::info!(key, size = bytes.len(), "Downloaded from storage");

        Ok(bytes)
    }

    /// Download an object, treating a missing one as `None`
    pub async fn download_if_exists(&self, key: &str) -> Result<Option<Bytes>> {
        match self.download(key).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);

        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
