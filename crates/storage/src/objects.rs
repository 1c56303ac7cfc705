//! Object storage backends for uploaded gameplay files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::traits::ObjectStore;

/// Reject keys that are empty, absolute, or could escape the bucket.
fn validate_key(key: &str) -> Result<(), StorageError> {
    let escapes = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "..");
    if escapes {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn join_url(base: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), bucket, key)
}

/// Stores objects as files under `<root>/<bucket>/<key>`.
pub struct FsObjectStore {
    root: PathBuf,
    bucket: String,
    public_base_url: String,
}

impl FsObjectStore {
    pub fn new(
        root: impl Into<PathBuf>,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        FsObjectStore {
            root: root.into(),
            bucket: bucket.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    fn object_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .fold(self.bucket_dir(), |path, segment| path.join(segment))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::ObjectExists {
                    key: key.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&bytes).await?;
        file.sync_all().await?;

        tracing::debug!(
            bucket = %self.bucket,
            key,
            content_type,
            size = bytes.len(),
            "stored object"
        );
        Ok(())
    }

    async fn public_url(&self, key: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        if !exists(&self.object_path(key)).await {
            return Err(StorageError::ObjectNotFound {
                key: key.to_string(),
            });
        }
        Ok(join_url(&self.public_base_url, &self.bucket, key))
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

/// Keeps objects in memory. Used by tests and one-shot commands.
pub struct MemoryObjectStore {
    bucket: String,
    public_base_url: String,
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        MemoryObjectStore {
            bucket: bucket.into(),
            public_base_url: public_base_url.into(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Stored bytes and content type for `key`.
    pub async fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut objects = self.objects.lock().await;
        if objects.contains_key(key) {
            return Err(StorageError::ObjectExists {
                key: key.to_string(),
            });
        }
        objects.insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn public_url(&self, key: &str) -> Result<String, StorageError> {
        validate_key(key)?;
        if !self.objects.lock().await.contains_key(key) {
            return Err(StorageError::ObjectNotFound {
                key: key.to_string(),
            });
        }
        Ok(join_url(&self.public_base_url, &self.bucket, key))
    }
}
