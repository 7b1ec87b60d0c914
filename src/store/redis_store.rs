use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;

/// Cluster-capable rendezvous store backed by a remote cache supporting
/// atomic `SET key value EX ttl`, `GET key`, `EXISTS key`. Used when the
/// middleware is horizontally scaled across multiple processes.
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(server_list: &[String]) -> anyhow::Result<Self> {
        let host = server_list
            .first()
            .ok_or_else(|| anyhow::anyhow!("REDIS_SERVER_LIST is empty"))?;
        let client = redis::Client::open(format!("redis://{host}"))?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl super::RendezvousStore for RedisStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> crate::error::Result<()> {
        let mut conn = self.conn.clone();
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| crate::error::Error::UpstreamUnavailable(e.to_string()))
    }

    async fn get(&self, key: &str) -> crate::error::Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| crate::error::Error::UpstreamUnavailable(e.to_string()))
    }

    async fn exists(&self, key: &str) -> crate::error::Result<bool> {
        let mut conn = self.conn.clone();
        conn.exists(key)
            .await
            .map_err(|e| crate::error::Error::UpstreamUnavailable(e.to_string()))
    }
}
