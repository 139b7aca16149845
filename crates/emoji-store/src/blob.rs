//! Blob storage for generated images.
//!
//! Objects are written once under a deterministic path and never overwritten. Each
//! backend turns a stored path into a public URL the feed can link to.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use emoji_core::UserId;

use crate::error::{Result, StoreError};

/// Relative object path inside a blob store, e.g. `user_1/1700000000000-1a2b3c4d.png`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Path for an artifact image: `{creator}/{unix_millis}-{sha256(prompt)[..8]}.png`.
    #[must_use]
    pub fn for_artifact(creator: &UserId, submitted_at: DateTime<Utc>, prompt: &str) -> Self {
        let digest = hex::encode(Sha256::digest(prompt.as_bytes()));
        Self(format!(
            "{}/{}-{}.png",
            creator,
            submitted_at.timestamp_millis(),
            &digest[..8]
        ))
    }

    /// The path as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Publicly reachable URL of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUrl(String);

impl PublicUrl {
    /// Wrap a URL string.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// The URL as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PublicUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn public_url(base: &str, path: &ObjectPath) -> PublicUrl {
    PublicUrl(format!("{}/{}", base.trim_end_matches('/'), path))
}

/// Write-once object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `path` and return its public URL.
    ///
    /// # Errors
    ///
    /// - `StoreError::AlreadyExists` if an object is already stored at `path`.
    /// - `StoreError::Io` if the write fails.
    async fn put(&self, path: &ObjectPath, bytes: Vec<u8>, content_type: &str) -> Result<PublicUrl>;
}

/// Blob store writing to a local directory served over HTTP at `public_base_url`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Directory objects are written to.
    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &ObjectPath, bytes: Vec<u8>, content_type: &str) -> Result<PublicUrl> {
        let target = self.root.join(path.as_str());
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&bytes).await?;
        file.flush().await?;

        tracing::debug!(path = %path, size = bytes.len(), content_type, "Blob stored");
        Ok(public_url(&self.public_base_url, path))
    }
}

/// In-memory blob store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    public_base_url: String,
    objects: Mutex<HashMap<ObjectPath, (String, Vec<u8>)>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            objects: Mutex::default(),
        }
    }

    /// Stored bytes and content type for `path`.
    #[must_use]
    pub fn get(&self, path: &ObjectPath) -> Option<(String, Vec<u8>)> {
        self.objects.lock().get(path).cloned()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &ObjectPath, bytes: Vec<u8>, content_type: &str) -> Result<PublicUrl> {
        let mut objects = self.objects.lock();
        if objects.contains_key(path) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        objects.insert(path.clone(), (content_type.to_string(), bytes));
        Ok(public_url(&self.public_base_url, path))
    }
}
