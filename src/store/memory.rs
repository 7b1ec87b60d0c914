use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct StoredEntry {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, StoredEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process rendezvous store, backed by `moka`. Correct only when the
/// service runs as a single process - see module docs.
pub struct MemoryStore {
    cache: Cache<String, StoredEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl super::RendezvousStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> crate::error::Result<()> {
        self.cache
            .insert(
                key.to_string(),
                StoredEntry {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn get(&self, key: &str) -> crate::error::Result<Option<String>> {
        Ok(self.cache.get(key).await.map(|e| e.value))
    }

    async fn exists(&self, key: &str) -> crate::error::Result<bool> {
        Ok(self.cache.get(key).await.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RendezvousStore;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        store.put("call_abc", "apns", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("call_abc").await.unwrap(), Some("apns".to_string()));
        assert!(store.exists("call_abc").await.unwrap());
    }

    #[tokio::test]
    async fn missing_key_is_absent() {
        let store = MemoryStore::new();
        assert_eq!(store.get("call_missing").await.unwrap(), None);
        assert!(!store.exists("call_missing").await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_is_read_your_writes() {
        let store = MemoryStore::new();
        store.put("call_x", "apns", Duration::from_secs(60)).await.unwrap();
        store.put("call_x", "True", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("call_x").await.unwrap(), Some("True".to_string()));
    }

    #[tokio::test]
    async fn entry_expires_after_ttl() {
        let store = MemoryStore::new();
        store
            .put("call_short", "apns", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        // moka expires lazily; force a sync pass.
        store.cache.run_pending_tasks().await;
        assert_eq!(store.get("call_short").await.unwrap(), None);
    }
}
