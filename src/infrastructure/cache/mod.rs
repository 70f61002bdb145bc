//! Cache Module
//!
//! Redis connection management and key naming.

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

/// Creates a Redis connection manager with automatic reconnection.
#[instrument(skip(url))]
pub async fn create_redis_client(url: &str) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(url)?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}

/// Round-trip a PING, used by the readiness probe
pub async fn ping(conn: &ConnectionManager) -> Result<(), redis::RedisError> {
    let mut conn = conn.clone();
    let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}

/// Cache key prefixes.
pub mod keys {
    /// Prefix for token records (e.g., "token:user_id:hmac")
    pub const TOKEN: &str = "token:";

    /// Generates a token record key
    #[inline]
    pub fn token(user_id: impl std::fmt::Display, hmac: &str) -> String {
        format!("{}{}:{}", TOKEN, user_id, hmac)
    }
}
