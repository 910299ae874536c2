//! Write-pressure debouncing for editor-layout snapshots.
//!
//! A burst of updates for one (user, project) key collapses into a single
//! write of the latest snapshot once the debounce window closes. Each
//! pending entry carries a generation counter; a timer that wakes up and
//! finds its generation superseded does nothing, so a cancel+reschedule can
//! never race a firing timer into a double write.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::error::StoreError;
use crate::gateway::events::SessionEvent;
use crate::store::KeyValueStore;

use super::SessionSnapshot;

/// Rolling expiration for persisted snapshots (7 days).
pub const SESSION_TTL_SECS: u64 = 7 * 24 * 3600;

/// Debounce window for coalescing snapshot writes.
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Storage key for a (user, project) snapshot.
pub fn session_key(user_id: &str, project_id: &str) -> String {
    format!("ide_session:{user_id}:{project_id}")
}

struct PendingSave {
    snapshot: SessionSnapshot,
    generation: u64,
}

pub struct SessionPersister {
    kv: Arc<dyn KeyValueStore>,
    debounce: Duration,
    pending: DashMap<(String, String), PendingSave>,
}

impl SessionPersister {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_debounce(kv, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(kv: Arc<dyn KeyValueStore>, debounce: Duration) -> Self {
        Self {
            kv,
            debounce,
            pending: DashMap::new(),
        }
    }

    /// Record `snapshot` as the pending value for (user, project) and restart
    /// the debounce timer for that key. When the timer fires the snapshot is
    /// written with a rolling TTL and `session:saved` is emitted on `reply`.
    /// Write failures are reported on `reply` as `session:error`.
    pub fn schedule_save(
        self: &Arc<Self>,
        user_id: &str,
        project_id: &str,
        snapshot: SessionSnapshot,
        reply: mpsc::UnboundedSender<SessionEvent>,
    ) {
        let key = (user_id.to_string(), project_id.to_string());

        let generation = {
            let mut entry = self.pending.entry(key.clone()).or_insert(PendingSave {
                snapshot: snapshot.clone(),
                generation: 0,
            });
            entry.generation += 1;
            entry.snapshot = snapshot;
            entry.generation
        };

        let persister = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(persister.debounce).await;
            persister.flush_if_current(key, generation, reply).await;
        });
    }

    async fn flush_if_current(
        &self,
        key: (String, String),
        generation: u64,
        reply: mpsc::UnboundedSender<SessionEvent>,
    ) {
        // Claim the pending entry only if no newer schedule superseded this
        // timer. remove_if evaluates the predicate under the shard lock, so
        // the claim is atomic with respect to rescheduling.
        let Some((_, pending)) = self
            .pending
            .remove_if(&key, |_, p| p.generation == generation)
        else {
            return;
        };

        let (user_id, project_id) = key;
        let store_key = session_key(&user_id, &project_id);
        let value = match serde_json::to_string(&pending.snapshot) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(?e, %store_key, "snapshot serialization failed");
                let _ = reply.send(SessionEvent::SessionError {
                    message: "Failed to save session".to_string(),
                });
                return;
            }
        };

        match self.kv.set_ex(&store_key, &value, SESSION_TTL_SECS).await {
            Ok(()) => {
                tracing::debug!(%user_id, %project_id, "session snapshot saved");
                let _ = reply.send(SessionEvent::Saved { project_id });
            }
            Err(e) => {
                tracing::error!(%e, %user_id, %project_id, "session save failed");
                let _ = reply.send(SessionEvent::SessionError {
                    message: "Failed to save session".to_string(),
                });
            }
        }
    }

    /// Read the current snapshot, refreshing its TTL on a hit. Store errors
    /// degrade to "no session" so a transient outage never blocks the user.
    pub async fn get_session(&self, user_id: &str, project_id: &str) -> Option<SessionSnapshot> {
        let key = session_key(user_id, project_id);

        let raw = match self.kv.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(%e, %key, "session read failed; treating as absent");
                return None;
            }
        };

        let snapshot: SessionSnapshot = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(?e, %key, "corrupt session snapshot; treating as absent");
                return None;
            }
        };

        // Reading a session keeps it alive.
        if let Err(e) = self.kv.expire(&key, SESSION_TTL_SECS).await {
            tracing::warn!(%e, %key, "session TTL refresh failed");
        }

        Some(snapshot)
    }

    /// Refresh the TTL without reading. A missing key and a store outage are
    /// both no-ops.
    pub async fn extend_session(&self, user_id: &str, project_id: &str) {
        let key = session_key(user_id, project_id);
        match self.kv.expire(&key, SESSION_TTL_SECS).await {
            Ok(existed) => {
                if !existed {
                    tracing::debug!(%key, "extend on absent session ignored");
                }
            }
            Err(e) => {
                tracing::warn!(%e, %key, "session extend failed");
            }
        }
    }

    /// Remove the snapshot outright. Store errors propagate to the caller.
    pub async fn delete_session(&self, user_id: &str, project_id: &str) -> Result<(), StoreError> {
        self.kv.del(&session_key(user_id, project_id)).await
    }
}
