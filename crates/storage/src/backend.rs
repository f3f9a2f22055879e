use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use tracing::info;

use skytrack_core::config::AwsConfig;
use skytrack_core::Config;

use crate::error::StorageError;

/// Where artifacts are written, wrapping an `object_store` implementation.
#[derive(Debug)]
pub enum StorageBackend {
    S3 {
        store: Arc<dyn ObjectStore>,
        bucket: String,
    },
    Local {
        store: Arc<dyn ObjectStore>,
        root: PathBuf,
    },
    Memory {
        store: Arc<dyn ObjectStore>,
    },
}

impl StorageBackend {
    /// S3 when a bucket is configured, otherwise the local data directory.
    pub fn from_config(config: &Config) -> Result<Self, StorageError> {
        if config.aws.s3_bucket.is_some() {
            Self::s3(&config.aws)
        } else {
            Self::local(&config.storage.data_dir)
        }
    }

    pub fn s3(aws: &AwsConfig) -> Result<Self, StorageError> {
        let bucket = aws
            .s3_bucket
            .as_deref()
            .ok_or_else(|| StorageError::NotConfigured("S3_BUCKET not set".into()))?;

        let mut builder = AmazonS3Builder::new().with_region(&aws.region);

        if let Some(ref key) = aws.access_key_id {
            builder = builder.with_access_key_id(key);
        }
        if let Some(ref secret) = aws.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }
        if let Some(ref token) = aws.session_token {
            builder = builder.with_token(token);
        }

        match aws.endpoint_url.as_deref().filter(|e| !e.is_empty()) {
            Some(endpoint) => {
                // object_store requires an absolute URL
                let endpoint_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                    endpoint.to_string()
                } else {
                    format!("https://{endpoint}")
                };
                builder = builder
                    .with_bucket_name(bucket)
                    .with_endpoint(&endpoint_url)
                    .with_allow_http(endpoint_url.starts_with("http://"))
                    .with_virtual_hosted_style_request(false);
            }
            None => {
                builder = builder.with_url(format!("s3://{bucket}"));
            }
        }

        let store = builder.build()?;
        info!(bucket, region = %aws.region, "Storage: S3 backend");

        Ok(StorageBackend::S3 {
            store: Arc::new(store),
            bucket: bucket.to_string(),
        })
    }

    /// Local filesystem rooted at `root`, created if missing.
    pub fn local(root: &FsPath) -> Result<Self, StorageError> {
        std::fs::create_dir_all(root)?;
        let canonical = std::fs::canonicalize(root)?;
        let store = LocalFileSystem::new_with_prefix(&canonical)?;
        info!(root = %canonical.display(), "Storage: local backend");
        Ok(StorageBackend::Local {
            store: Arc::new(store),
            root: canonical,
        })
    }

    pub fn memory() -> Self {
        StorageBackend::Memory {
            store: Arc::new(InMemory::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        match self {
            StorageBackend::S3 { store, .. }
            | StorageBackend::Local { store, .. }
            | StorageBackend::Memory { store } => store.clone(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StorageBackend::S3 { .. } => "s3",
            StorageBackend::Local { .. } => "local",
            StorageBackend::Memory { .. } => "memory",
        }
    }

    /// Fully qualified location of `key`, as recorded in the run ledger.
    pub fn location(&self, key: &Path) -> String {
        match self {
            StorageBackend::S3 { bucket, .. } => format!("s3://{bucket}/{key}"),
            StorageBackend::Local { root, .. } => {
                let path = root.join(key.as_ref());
                url::Url::from_file_path(&path)
                    .map(String::from)
                    .unwrap_or_else(|_| format!("file://{}", path.display()))
            }
            StorageBackend::Memory { .. } => format!("memory:///{key}"),
        }
    }
}
