use super::{CacheError, CacheResult};
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;

/// Redis cache store with a shared multiplexed connection
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: Arc<Mutex<Option<MultiplexedConnection>>>,
    key_prefix: String,
}

impl RedisStore {
    /// Create new Redis store. No connection is made until first use.
    pub fn new(redis_url: &str, key_prefix: String) -> CacheResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Connection(format!("Redis client error: {e}")))?;

        Ok(Self {
            client,
            connection: Arc::new(Mutex::new(None)),
            key_prefix,
        })
    }

    /// Get a connection, creating one on first use.
    /// Multiplexed connections are cheap to clone and safe to share.
    async fn get_connection(&self) -> CacheResult<MultiplexedConnection> {
        let mut guard = self.connection.lock().await;

        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| CacheError::Connection(format!("Connection failed: {e}")))?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the shared connection so the next call reconnects
    async fn reset_connection(&self) {
        *self.connection.lock().await = None;
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn on_error(&self, err: redis::RedisError) -> CacheError {
        if err.is_connection_dropped() || err.is_io_error() {
            self.reset_connection().await;
            CacheError::Connection(err.to_string())
        } else {
            CacheError::Cache(err.to_string())
        }
    }

    pub async fn health_check(&self) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    pub async fn set(&self, key: &str, data: String, ttl: Duration) -> CacheResult<()> {
        let key = self.prefixed_key(key);
        let mut conn = self.get_connection().await?;

        // EX 0 is rejected by Redis, round sub-second TTLs up
        match conn
            .set_ex::<_, _, ()>(&key, data, ttl.as_secs().max(1))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    /// GETDEL: read and delete in one atomic server-side command
    pub async fn take(&self, key: &str) -> CacheResult<Option<String>> {
        let key = self.prefixed_key(key);
        let mut conn = self.get_connection().await?;
        match conn.get_del::<_, Option<String>>(&key).await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.on_error(e).await),
        }
    }
}
