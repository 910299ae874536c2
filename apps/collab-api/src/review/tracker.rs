//! Per-connection tracking of in-flight review jobs with cooperative
//! cancellation.
//!
//! Each (connection, request id) pair owns one slot holding an active flag.
//! Cancellation flips the flag and delivers the terminal `review:cancelled`
//! event; the in-flight worker rechecks the flag immediately before and
//! after the external call and, finding it dead, drops its result without
//! delivering anything — exactly one terminal event per request that reached
//! Running. The external call itself is never aborted; its compute cost is
//! paid, only delivery is suppressed.

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::gateway::events::ReviewEvent;
use crate::store::KeyValueStore;

use super::{ReviewEngine, ReviewInput};

/// TTL for best-effort persisted results (24 hours).
const RESULT_TTL_SECS: u64 = 24 * 3600;

/// Progress checkpoints emitted before the external call.
const STAGES: [(&str, &str, u8); 3] = [
    ("queued", "Review queued", 5),
    ("analyzing", "Analyzing code structure", 25),
    ("generating", "Generating review", 60),
];

type SlotKey = (String, String);

pub struct ReviewTracker {
    active: DashMap<SlotKey, bool>,
}

impl ReviewTracker {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
        }
    }

    /// Create the active slot for a job. Must run synchronously in the
    /// handler that accepts the request, before the worker is spawned, so a
    /// cancel arriving ahead of the worker's first poll still finds the
    /// slot. A duplicate request id from the same connection resets it.
    pub fn accept(&self, conn_id: &str, request_id: &str) {
        self.active
            .insert((conn_id.to_string(), request_id.to_string()), true);
    }

    /// Run one accepted job to its terminal event.
    pub async fn run(
        &self,
        conn_id: &str,
        request_id: &str,
        input: ReviewInput,
        engine: &dyn ReviewEngine,
        kv: &dyn KeyValueStore,
        tx: &mpsc::UnboundedSender<ReviewEvent>,
    ) {
        let key = (conn_id.to_string(), request_id.to_string());
        // Take over the slot created by `accept`; a cancel that already
        // flipped it must stay flipped.
        self.active.entry(key.clone()).or_insert(true);

        for (stage, message, progress) in STAGES {
            let _ = tx.send(ReviewEvent::Progress {
                request_id: request_id.to_string(),
                stage: stage.to_string(),
                message: message.to_string(),
                progress,
            });
        }

        // The flag may already be dead if a cancel arrived between accept
        // and here; the cancel path delivered the terminal event.
        if !self.is_active(&key) {
            self.active.remove(&key);
            return;
        }

        let result = engine.review(&input).await;

        // Recheck after the await: a cancel or disconnect may have flipped
        // the flag while the call was in flight. The result is discarded.
        if !self.is_active(&key) {
            self.active.remove(&key);
            tracing::debug!(%conn_id, %request_id, "review result discarded after cancellation");
            return;
        }
        self.active.remove(&key);

        match result {
            Ok(result) => {
                let _ = tx.send(ReviewEvent::Progress {
                    request_id: request_id.to_string(),
                    stage: "formatting".to_string(),
                    message: "Formatting results".to_string(),
                    progress: 90,
                });
                let _ = tx.send(ReviewEvent::Completed {
                    request_id: request_id.to_string(),
                    result: result.clone(),
                    progress: 100,
                });

                // Best-effort persistence; failure cannot alter the
                // already-delivered completion.
                let result_key = format!("review_result:{}:{}", input.project_id, request_id);
                if let Err(e) = kv.set_ex(&result_key, &result, RESULT_TTL_SECS).await {
                    tracing::warn!(%e, %result_key, "failed to persist review result");
                }
            }
            Err(e) => {
                tracing::error!(%e, %conn_id, %request_id, "review failed");
                let _ = tx.send(ReviewEvent::ReviewError {
                    request_id: request_id.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// Flip a slot's active flag off. Returns whether an active slot existed
    /// — the caller emits `review:cancelled` exactly when it did.
    pub fn cancel(&self, conn_id: &str, request_id: &str) -> bool {
        let key = (conn_id.to_string(), request_id.to_string());
        match self.active.get_mut(&key) {
            Some(mut flag) if *flag => {
                *flag = false;
                true
            }
            _ => false,
        }
    }

    /// Deactivate every slot owned by a disconnecting connection. In-flight
    /// workers discover the dead flag at their next check and deliver
    /// nothing.
    pub fn disconnect_cleanup(&self, conn_id: &str) {
        for mut entry in self.active.iter_mut() {
            if entry.key().0 == conn_id {
                *entry.value_mut() = false;
            }
        }
    }

    fn is_active(&self, key: &SlotKey) -> bool {
        self.active.get(key).map(|flag| *flag).unwrap_or(false)
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.active.len()
    }
}

impl Default for ReviewTracker {
    fn default() -> Self {
        Self::new()
    }
}
