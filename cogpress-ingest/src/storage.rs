//! Blob store access for source rasters and published artifacts
//!
//! A [`BlobLocation`] is either an S3 bucket (with optional key prefix) or a
//! local directory; both sides of the pipeline are configured with one. Reads
//! of source rasters stay streamed: GDAL tools are handed a `/vsis3/` virtual
//! path for S3 inputs rather than a downloaded copy. Writes go through the
//! `object_store` backend, whose overwrite semantics make re-publishing the
//! same key idempotent.

use async_trait::async_trait;
use cogpress_common::{Error, Result};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Parsed input or output location
#[derive(Debug, Clone, PartialEq)]
pub enum BlobLocation {
    S3 {
        bucket: String,
        prefix: Option<String>,
    },
    Local {
        dir: PathBuf,
    },
}

impl BlobLocation {
    /// Parse a location spec. `s3://bucket[/prefix]` selects S3; anything
    /// else is treated as a local directory path.
    pub fn parse(spec: &str) -> Self {
        let Some(rest) = spec.strip_prefix("s3://") else {
            return BlobLocation::Local {
                dir: PathBuf::from(spec),
            };
        };
        match rest.split_once('/') {
            Some((bucket, prefix)) if !prefix.trim_matches('/').is_empty() => BlobLocation::S3 {
                bucket: bucket.to_string(),
                prefix: Some(prefix.trim_matches('/').to_string()),
            },
            Some((bucket, _)) => BlobLocation::S3 {
                bucket: bucket.to_string(),
                prefix: None,
            },
            None => BlobLocation::S3 {
                bucket: rest.to_string(),
                prefix: None,
            },
        }
    }

    /// Path handed to GDAL tools for streamed reads of an object.
    pub fn gdal_read_path(&self, key: &str) -> String {
        match self {
            BlobLocation::S3 { bucket, prefix } => match prefix {
                Some(prefix) => format!("/vsis3/{}/{}/{}", bucket, prefix, key),
                None => format!("/vsis3/{}/{}", bucket, key),
            },
            BlobLocation::Local { dir } => dir.join(key).display().to_string(),
        }
    }

    /// Human-readable location of an object under this location.
    pub fn public_url(&self, key: &str) -> String {
        match self {
            BlobLocation::S3 { bucket, prefix } => match prefix {
                Some(prefix) => format!("s3://{}/{}/{}", bucket, prefix, key),
                None => format!("s3://{}/{}", bucket, key),
            },
            BlobLocation::Local { dir } => dir.join(key).display().to_string(),
        }
    }

    fn object_path(&self, key: &str) -> Result<ObjectPath> {
        let full = match self {
            BlobLocation::S3 {
                prefix: Some(prefix),
                ..
            } => format!("{}/{}", prefix, key),
            _ => key.to_string(),
        };
        ObjectPath::parse(full).map_err(|e| Error::Storage(e.to_string()))
    }
}

/// Readable source side of a blob location
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Path handed to GDAL tools for streamed reads of the source.
    fn gdal_read_path(&self, key: &str) -> String;

    /// Copy the source object's bytes to a local file.
    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<()>;
}

/// Writable publish side of a blob location
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Upload a local file under the given key. Overwrites any prior object.
    async fn put(&self, local: &Path, key: &str) -> Result<()>;

    /// Human-readable location of a published key.
    fn public_url(&self, key: &str) -> String;
}

/// A blob location bound to its `object_store` backend
pub struct BlobStore {
    location: BlobLocation,
    store: Arc<dyn ObjectStore>,
}

impl BlobStore {
    /// Bind a location to a backend. Local directories are created if
    /// missing; S3 credentials come from the environment, as with any AWS
    /// SDK client.
    pub fn open(location: BlobLocation) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = match &location {
            BlobLocation::S3 { bucket, .. } => Arc::new(
                AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .build()
                    .map_err(|e| Error::Storage(e.to_string()))?,
            ),
            BlobLocation::Local { dir } => {
                std::fs::create_dir_all(dir)?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(dir)
                        .map_err(|e| Error::Storage(e.to_string()))?,
                )
            }
        };
        Ok(Self { location, store })
    }
}

#[async_trait]
impl SourceStore for BlobStore {
    fn gdal_read_path(&self, key: &str) -> String {
        self.location.gdal_read_path(key)
    }

    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<()> {
        let path = self.location.object_path(key)?;
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| Error::Storage(format!("get {}: {}", path, e)))?;
        let bytes = result
            .bytes()
            .await
            .map_err(|e| Error::Storage(format!("read {}: {}", path, e)))?;
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactSink for BlobStore {
    async fn put(&self, local: &Path, key: &str) -> Result<()> {
        let path = self.location.object_path(key)?;
        let bytes = tokio::fs::read(local).await?;
        let size = bytes.len();
        self.store
            .put(&path, PutPayload::from(bytes))
            .await
            .map_err(|e| Error::Storage(format!("put {}: {}", path, e)))?;
        info!(key, size, location = %self.location.public_url(key), "Uploaded artifact");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        self.location.public_url(key)
    }
}
