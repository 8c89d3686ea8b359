//! Object storage for listing images.

use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage refused write to {0}")]
    Refused(String),

    #[error("upload timed out after {0:?}")]
    Timeout(Duration),

    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("invalid object key {0:?}")]
    InvalidKey(String),

    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Path under which the server exposes stored uploads.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Write-only object store; returns a URL the stored object can be fetched from.
#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError>;
}

/// Key for the `index`-th image uploaded by `user_id` at `timestamp_ms`.
pub fn object_key(user_id: &str, timestamp_ms: i64, index: usize) -> String {
    format!("items/{user_id}/{timestamp_ms}_{index}")
}

/// Stores objects under a directory that the server also exposes at `public_prefix`.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
    public_prefix: String,
    max_bytes: usize,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str, max_bytes: usize) -> Self {
        LocalFileStorage {
            root: root.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_owned(),
            max_bytes,
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let clean = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if bytes.len() > self.max_bytes {
            return Err(StorageError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        let path = self.resolve(key)?;
        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, bytes).await
        };
        match write.await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(StorageError::Refused(key.to_owned()));
            }
            Err(e) => return Err(StorageError::Io(e)),
        }
        log::info!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(format!("{}/{}", self.public_prefix, key))
    }
}

/// Upload with a wall-clock limit. A refused write falls back to `placeholder`
/// so the listing can still be created; every other failure propagates.
pub async fn upload_image(
    storage: &dyn FileStorage,
    key: &str,
    bytes: &[u8],
    limit: Duration,
    placeholder: &str,
) -> Result<String, StorageError> {
    match tokio::time::timeout(limit, storage.put(key, bytes)).await {
        Err(_) => Err(StorageError::Timeout(limit)),
        Ok(Err(StorageError::Refused(key))) => {
            log::warn!("Storage refused {}, using placeholder image", key);
            Ok(placeholder.to_owned())
        }
        Ok(result) => result,
    }
}
