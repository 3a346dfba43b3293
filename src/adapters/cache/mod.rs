pub mod hot_state;
pub mod leader_lease;
pub mod rate_limit;

pub use hot_state::HotStateStore;
pub use leader_lease::LeaderLease;
pub use rate_limit::RateLimiter;

use crate::error::{AppError, Result};

/// Thin wrapper around a Redis connection manager, mirroring the teacher's
/// `RedisClient` shape minus the pub/sub half — nothing here needs a
/// broadcast fan-out, only request/response commands and Lua scripts.
#[derive(Debug, Clone)]
pub struct CacheClient {
    conn: redis::aio::ConnectionManager,
}

impl CacheClient {
    /// # Errors
    /// Returns an error if the Redis connection cannot be established.
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    #[must_use]
    pub fn connection(&self) -> redis::aio::ConnectionManager {
        self.conn.clone()
    }

    /// # Errors
    /// Returns `AppError::Cache` if the ping fails.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection();
        redis::cmd("PING").query_async::<String>(&mut conn).await.map_err(AppError::Cache)?;
        Ok(())
    }
}
