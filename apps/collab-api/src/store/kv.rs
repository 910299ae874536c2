use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreError;

/// Abstraction over the TTL-backed key-value store used for session
/// snapshots and review results.
///
/// Backed by Redis in production and an in-memory map in tests.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn del(&self, key: &str) -> Result<(), StoreError>;
    /// Reset the TTL of an existing key. Returns whether the key existed.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for Phase 1 / tests)
// ---------------------------------------------------------------------------

struct Entry {
    value: String,
    expires_at: Instant,
}

pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        self.data.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut data = self.data.lock();
        match data.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                // Lazy eviction of expired entries.
                data.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, StoreError> {
        let mut data = self.data.lock();
        match data.get_mut(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                entry.expires_at = Instant::now() + Duration::from_secs(ttl_secs);
                Ok(true)
            }
            Some(_) => {
                data.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backdate(store: &MemoryStore, key: &str) {
        let mut data = store.data.lock();
        let entry = data.get_mut(key).unwrap();
        entry.expires_at = Instant::now() - Duration::from_secs(1);
    }

    #[tokio::test]
    async fn set_get_del_round_trip() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.del("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 60).await.unwrap();
        backdate(&store, "k");
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expire_refreshes_live_entry() {
        let store = MemoryStore::new();
        store.set_ex("k", "v", 60).await.unwrap();
        backdate(&store, "k");

        // Expired — expire() reports absence.
        assert!(!store.expire("k", 60).await.unwrap());

        store.set_ex("k", "v", 60).await.unwrap();
        assert!(store.expire("k", 120).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn expire_on_missing_key_is_false() {
        let store = MemoryStore::new();
        assert!(!store.expire("nope", 60).await.unwrap());
    }
}
