use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{cmd, Client, ErrorKind, RedisError};
use tokio::sync::RwLock;

/// Shared Redis handle. The same connection backs the question cache, the
/// grading locks and the event queues, so a lost connection degrades all
/// three at once rather than silently serving stale state.
#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    manager: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, manager: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        let mut guard = self.manager.write().await;
        *guard = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        let mut guard = self.manager.write().await;
        *guard = None;
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let manager = { self.manager.read().await.clone() };
        let Some(mut manager) = manager else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut manager).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    async fn manager(&self) -> Result<ConnectionManager, RedisError> {
        let manager = { self.manager.read().await.clone() };
        manager.ok_or_else(|| {
            RedisError::from((ErrorKind::IoError, "redis connection not established"))
        })
    }

    pub(crate) async fn get(&self, key: &str) -> Result<Option<String>, RedisError> {
        let mut manager = self.manager().await?;
        cmd("GET").arg(key).query_async(&mut manager).await
    }

    pub(crate) async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), RedisError> {
        let mut manager = self.manager().await?;
        cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut manager)
            .await
    }

    pub(crate) async fn delete(&self, key: &str) -> Result<(), RedisError> {
        let mut manager = self.manager().await?;
        cmd("DEL").arg(key).query_async(&mut manager).await
    }

    /// Single acquisition attempt: `SET key token NX PX lease`. The lease
    /// bounds how long a crashed holder can keep the lock.
    pub(crate) async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<bool, RedisError> {
        let mut manager = self.manager().await?;
        let reply: Option<String> = cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis().max(1) as u64)
            .query_async(&mut manager)
            .await?;
        Ok(reply.is_some())
    }

    /// Release only if the stored token still matches; a lock that already
    /// expired and was re-acquired by another holder must not be deleted.
    pub(crate) async fn release(&self, key: &str, token: &str) -> Result<bool, RedisError> {
        let mut manager = self.manager().await?;
        let script = redis::Script::new(
            r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            end
            return 0
        "#,
        );

        let deleted: i64 = script.key(key).arg(token).invoke_async(&mut manager).await?;
        Ok(deleted > 0)
    }

    pub(crate) async fn queue_push(&self, key: &str, value: &str) -> Result<(), RedisError> {
        let mut manager = self.manager().await?;
        cmd("RPUSH").arg(key).arg(value).query_async::<_, i64>(&mut manager).await?;
        Ok(())
    }

    pub(crate) async fn queue_pop(&self, key: &str) -> Result<Option<String>, RedisError> {
        let mut manager = self.manager().await?;
        cmd("LPOP").arg(key).query_async(&mut manager).await
    }
}
