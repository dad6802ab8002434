use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::ApiError;

/// Abstraction over a key-value store used for session tokens and gateway
/// tickets.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError>;
    async fn get(&self, key: &str) -> Result<Option<String>, ApiError>;
    async fn del(&self, key: &str) -> Result<(), ApiError>;
    /// Atomically read and delete a key (single-use tokens).
    async fn take(&self, key: &str) -> Result<Option<String>, ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

struct Slot {
    value: String,
    expires_at: Instant,
}

/// Process-local store honouring TTLs. Expired keys are dropped lazily on
/// access and by `purge_expired`.
pub struct MemoryKv {
    data: Mutex<HashMap<String, Slot>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut data = self.data.lock();
        let before = data.len();
        data.retain(|_, slot| slot.expires_at > now);
        before - data.len()
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), ApiError> {
        let slot = Slot {
            value: value.to_string(),
            expires_at: Instant::now() + Duration::from_secs(ttl_secs),
        };
        self.data.lock().insert(key.to_string(), slot);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ApiError> {
        let mut data = self.data.lock();
        match data.get(key) {
            Some(slot) if slot.expires_at > Instant::now() => Ok(Some(slot.value.clone())),
            Some(_) => {
                data.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<(), ApiError> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, ApiError> {
        let slot = self.data.lock().remove(key);
        Ok(slot
            .filter(|s| s.expires_at > Instant::now())
            .map(|s| s.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn take_is_single_use() {
        let kv = MemoryKv::new();
        kv.set_ex("k", "v", 30).await.unwrap();
        assert_eq!(kv.take("k").await.unwrap().as_deref(), Some("v"));
        assert!(kv.take("k").await.unwrap().is_none());
        assert!(kv.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_ttl_expires_immediately() {
        let kv = MemoryKv::new();
        kv.set_ex("k", "v", 0).await.unwrap();
        assert!(kv.get("k").await.unwrap().is_none());
        assert!(kv.take("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_drops_only_expired_keys() {
        let kv = MemoryKv::new();
        kv.set_ex("old", "v", 0).await.unwrap();
        kv.set_ex("fresh", "v", 60).await.unwrap();
        assert_eq!(kv.purge_expired(), 1);
        assert_eq!(kv.get("fresh").await.unwrap().as_deref(), Some("v"));
    }
}
