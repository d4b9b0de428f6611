use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::cache::to_chrono;
use crate::storage::{DurableStore, RATE_LIMIT_STORAGE_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitState {
    pub is_limited: bool,
    pub until: DateTime<Utc>,
}

impl RateLimitState {
    fn clear() -> Self {
        Self {
            is_limited: false,
            until: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_limited && now < self.until
    }
}

/// Process-wide record that the upstream said "too many requests".
///
/// There is no retry schedule: once set, every fetch short-circuits until the
/// fixed cool-down has elapsed.
pub struct RateLimitCoordinator {
    state: Arc<RwLock<RateLimitState>>,
    cooldown: chrono::Duration,
    store: Arc<dyn DurableStore>,
    persist_lock: Arc<Mutex<()>>,
}

impl RateLimitCoordinator {
    pub fn new(store: Arc<dyn DurableStore>, cooldown: Duration) -> Self {
        Self {
            state: Arc::new(RwLock::new(RateLimitState::clear())),
            cooldown: to_chrono(cooldown),
            store,
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Restore a cool-down that was active when the process last stopped.
    pub async fn load(store: Arc<dyn DurableStore>, cooldown: Duration) -> Self {
        let coordinator = Self::new(store, cooldown);

        let restored = match coordinator.store.read(RATE_LIMIT_STORAGE_KEY).await {
            Ok(Some(raw)) => match serde_json::from_str::<RateLimitState>(&raw) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(error = %e, "Persisted rate-limit state is corrupt, ignoring");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted rate-limit state");
                None
            }
        };

        if let Some(state) = restored
            && state.active_at(Utc::now())
        {
            info!(until = %state.until, "Restored active upstream cool-down");
            *coordinator.state.write().await = state;
        }

        coordinator
    }

    pub async fn is_limited(&self) -> bool {
        self.is_limited_at(Utc::now()).await
    }

    /// Clears the flag once `now >= until`.
    pub async fn is_limited_at(&self, now: DateTime<Utc>) -> bool {
        {
            let state = self.state.read().await;
            if !state.is_limited {
                return false;
            }
            if state.active_at(now) {
                return true;
            }
        }

        let mut state = self.state.write().await;
        // Another caller may have re-armed the flag between the two locks
        if state.active_at(now) {
            return true;
        }
        if state.is_limited {
            info!("Upstream cool-down expired");
            *state = RateLimitState::clear();
            drop(state);
            self.persist_in_background();
        }
        false
    }

    pub async fn set_limited(&self) {
        let until = Utc::now() + self.cooldown;
        {
            let mut state = self.state.write().await;
            *state = RateLimitState {
                is_limited: true,
                until,
            };
        }
        warn!(%until, "Upstream rate limit hit, suspending fetches");
        self.persist_in_background();
    }

    pub async fn status(&self) -> RateLimitState {
        *self.state.read().await
    }

    /// Write the current state to durable storage now. Failures are logged only.
    pub async fn persist(&self) {
        persist_state(&self.state, &self.store, &self.persist_lock).await;
    }

    fn persist_in_background(&self) {
        let state = self.state.clone();
        let store = self.store.clone();
        let lock = self.persist_lock.clone();
        tokio::spawn(async move {
            persist_state(&state, &store, &lock).await;
        });
    }
}

/// Serializes under `lock` and re-reads the state, so the newest value is the last one written.
async fn persist_state(
    state: &RwLock<RateLimitState>,
    store: &Arc<dyn DurableStore>,
    lock: &Mutex<()>,
) {
    let _guard = lock.lock().await;
    let snapshot = *state.read().await;
    let serialized = match serde_json::to_string(&snapshot) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to serialize rate-limit state");
            return;
        }
    };
    if let Err(e) = store.write(RATE_LIMIT_STORAGE_KEY, &serialized).await {
        warn!(error = %e, "Failed to persist rate-limit state");
    }
}
