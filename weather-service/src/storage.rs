//! Durable key-value text storage scoped to one origin.
//!
//! Stands in for the browser's per-origin storage: values are opaque strings,
//! read once at startup and rewritten opportunistically.

use async_trait::async_trait;
use common::errors::AppError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

pub const CACHE_STORAGE_KEY: &str = "weather_cache";
pub const RATE_LIMIT_STORAGE_KEY: &str = "weather_rate_limit";

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn write(&self, key: &str, value: &str) -> Result<(), AppError>;
}

/// One directory per origin, one file per key.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub async fn for_origin(root: impl AsRef<Path>, origin: &str) -> Result<Self, AppError> {
        let dir = root.as_ref().join(sanitize_origin(origin));
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_origin(key)))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn read(&self, key: &str) -> Result<Option<String>, AppError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), AppError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(key, bytes = value.len(), "Persisted to durable storage");
        Ok(())
    }
}

/// Volatile store for tests and for running without a storage directory.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// `https://app.example.com:8443` -> `https_app.example.com_8443`
fn sanitize_origin(origin: &str) -> String {
    let cleaned: String = origin
        .replace("://", "_")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "default".to_string()
    } else {
        cleaned
    }
}
