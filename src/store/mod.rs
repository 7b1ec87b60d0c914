//! The Rendezvous Store: a process-shared, TTL'd key-value map keyed by
//! `call_<call_id>`, holding a small string per in-flight call.
//!
//! A single local in-process map (`MemoryStore`) is only correct for a
//! single-process deployment; any horizontally scaled deployment needs the
//! `RedisStore` binding instead. Both implement the same trait so the
//! Coordinator and Response Intake never know which one is backing them.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use std::time::Duration;

/// Key prefix for rendezvous entries: `call_<call_id>`.
pub fn rendezvous_key(call_id: &str) -> String {
    format!("call_{call_id}")
}

#[async_trait]
pub trait RendezvousStore: Send + Sync {
    /// Overwrite or create `key`, atomic at the key level.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> crate::error::Result<()>;

    /// `None` if the key is absent.
    async fn get(&self, key: &str) -> crate::error::Result<Option<String>>;

    async fn exists(&self, key: &str) -> crate::error::Result<bool>;
}
