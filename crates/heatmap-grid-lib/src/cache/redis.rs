//! Redis adapter for the remote cache tier

use super::RemoteCache;
use crate::CacheError;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tokio::sync::Mutex;

/// [`RemoteCache`] backed by a Redis server
///
/// A single multiplexed connection is shared by all callers. It is opened lazily on first
/// use and dropped after any error, so the next call reconnects.
pub struct RedisCache {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisCache {
    /// Create a cache for the given `redis://` URL
    ///
    /// Only the URL is validated here; no connection is made until the first request.
    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn reset(&self) {
        *self.connection.lock().await = None;
    }

    async fn unavailable(&self, err: redis::RedisError) -> CacheError {
        self.reset().await;
        CacheError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl RemoteCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.unavailable(e).await),
        }
    }

    async fn set_ex(&self, key: &str, ttl: Duration, value: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        // SETEX only takes whole seconds and rejects zero
        let seconds = ttl.as_secs().max(1);
        match conn.set_ex::<_, _, ()>(key, value, seconds).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.unavailable(e).await),
        }
    }
}
