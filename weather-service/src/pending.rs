use chrono::{DateTime, Utc};
use common::models::CoordinateKey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::to_chrono;

#[derive(Debug, Clone)]
pub struct PendingMarker {
    pub key: CoordinateKey,
    pub started_at: DateTime<Utc>,
}

/// Keys with an upstream fetch in flight, so concurrent callers can wait
/// for the owner instead of issuing their own request.
pub struct PendingTracker {
    markers: Mutex<HashMap<CoordinateKey, PendingMarker>>,
    abandon_after: chrono::Duration,
}

impl PendingTracker {
    pub fn new(abandon_after: Duration) -> Self {
        Self {
            markers: Mutex::new(HashMap::new()),
            abandon_after: to_chrono(abandon_after),
        }
    }

    pub async fn is_pending(&self, key: &CoordinateKey) -> bool {
        let now = Utc::now();
        let markers = self.markers.lock().await;
        markers
            .get(key)
            .is_some_and(|marker| now - marker.started_at < self.abandon_after)
    }

    /// Unconditionally take ownership of `key`.
    pub async fn mark_pending(&self, key: &CoordinateKey) {
        let mut markers = self.markers.lock().await;
        markers.insert(
            key.clone(),
            PendingMarker {
                key: key.clone(),
                started_at: Utc::now(),
            },
        );
    }

    /// Mark `key` pending unless a live marker already exists; returns whether
    /// the caller became the owner.
    pub async fn try_mark_pending(&self, key: &CoordinateKey) -> bool {
        let now = Utc::now();
        let mut markers = self.markers.lock().await;
        if let Some(existing) = markers.get(key)
            && now - existing.started_at < self.abandon_after
        {
            return false;
        }
        markers.insert(
            key.clone(),
            PendingMarker {
                key: key.clone(),
                started_at: now,
            },
        );
        true
    }

    pub async fn clear_pending(&self, key: &CoordinateKey) {
        self.markers.lock().await.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.markers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.markers.lock().await.is_empty()
    }

    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// Drop markers whose owner has held them for at least the abandonment timeout.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut markers = self.markers.lock().await;
        let before = markers.len();
        markers.retain(|_, marker| now - marker.started_at < self.abandon_after);
        let removed = before - markers.len();
        if removed > 0 {
            warn!(removed, "Purged abandoned pending markers");
        }
        removed
    }

    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    _ = cancellation_token.cancelled() => {
                        debug!("Pending marker sweeper stopped");
                        break;
                    }
                }
            }
        })
    }
}
