use chrono::{DateTime, Utc};
use common::models::{CoordinateKey, WeatherSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::storage::{CACHE_STORAGE_KEY, DurableStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CoordinateKey,
    pub data: WeatherSnapshot,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh_at(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.stored_at < ttl
    }
}

/// Weather results keyed by rounded coordinate, mirrored to durable storage.
///
/// Entries are never swept while running; an entry whose age has reached the
/// TTL is simply reported as absent.
pub struct WeatherCache {
    entries: Arc<RwLock<HashMap<CoordinateKey, CacheEntry>>>,
    ttl: chrono::Duration,
    store: Arc<dyn DurableStore>,
    persist_lock: Arc<Mutex<()>>,
}

impl WeatherCache {
    /// Empty cache that mirrors into `store` but does not read from it.
    pub fn with_ttl(store: Arc<dyn DurableStore>, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: to_chrono(ttl),
            store,
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Restore entries from durable storage, discarding the ones already past TTL.
    pub async fn load(store: Arc<dyn DurableStore>, ttl: Duration) -> Self {
        let cache = Self::with_ttl(store, ttl);

        let raw = match cache.store.read(CACHE_STORAGE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return cache,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted weather cache, starting empty");
                return cache;
            }
        };

        let persisted: HashMap<CoordinateKey, CacheEntry> = match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Persisted weather cache is corrupt, starting empty");
                return cache;
            }
        };

        let now = Utc::now();
        let total = persisted.len();
        let fresh: HashMap<_, _> = persisted
            .into_iter()
            .filter(|(_, entry)| entry.is_fresh_at(now, cache.ttl))
            .collect();

        info!(
            restored = fresh.len(),
            expired = total - fresh.len(),
            "Loaded weather cache from durable storage"
        );
        *cache.entries.write().await = fresh;
        cache
    }

    pub async fn get(&self, key: &CoordinateKey) -> Option<WeatherSnapshot> {
        self.get_at(key, Utc::now()).await
    }

    /// Lookup as of `now`; absent once `now - stored_at >= ttl`.
    pub async fn get_at(&self, key: &CoordinateKey, now: DateTime<Utc>) -> Option<WeatherSnapshot> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh_at(now, self.ttl))
            .map(|entry| entry.data.clone())
    }

    /// Insert and mirror to durable storage in the background.
    pub async fn set(&self, key: CoordinateKey, data: WeatherSnapshot) {
        {
            let mut entries = self.entries.write().await;
            entries.insert(
                key.clone(),
                CacheEntry {
                    key,
                    data,
                    stored_at: Utc::now(),
                },
            );
        }

        let writer = self.persister();
        tokio::spawn(async move {
            writer.persist().await;
        });
    }

    /// Write the full mapping to durable storage now. Failures are logged, never returned.
    pub async fn persist(&self) {
        self.persister().persist().await;
    }

    /// Raw map size, expired entries included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn fresh_len(&self) -> usize {
        self.fresh_len_at(Utc::now()).await
    }

    /// Entries `get_at(.., now)` would still return.
    pub async fn fresh_len_at(&self, now: DateTime<Utc>) -> usize {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|entry| entry.is_fresh_at(now, self.ttl))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn persister(&self) -> Persister {
        Persister {
            entries: self.entries.clone(),
            store: self.store.clone(),
            lock: self.persist_lock.clone(),
        }
    }
}

/// Handle moved into the background write task.
struct Persister {
    entries: Arc<RwLock<HashMap<CoordinateKey, CacheEntry>>>,
    store: Arc<dyn DurableStore>,
    lock: Arc<Mutex<()>>,
}

impl Persister {
    async fn persist(self) {
        // Serialize under the lock so the newest mapping is always the last one written
        let _guard = self.lock.lock().await;

        let serialized = {
            let entries = self.entries.read().await;
            serde_json::to_string(&*entries)
        };

        let serialized = match serialized {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Failed to serialize weather cache");
                return;
            }
        };

        match self.store.write(CACHE_STORAGE_KEY, &serialized).await {
            Ok(()) => debug!(bytes = serialized.len(), "Weather cache persisted"),
            Err(e) => warn!(error = %e, "Failed to persist weather cache, keeping in-memory copy"),
        }
    }
}

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
