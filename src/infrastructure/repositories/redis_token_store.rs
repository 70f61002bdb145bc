//! Redis Token Store
//!
//! Token records as JSON strings under `token:{user_id}:{hmac}`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::domain::{TokenRecord, TokenStore};
use crate::infrastructure::cache::keys;
use crate::shared::error::AppError;

/// Redis token store implementation
#[derive(Clone)]
pub struct RedisTokenStore {
    redis: ConnectionManager,
}

impl RedisTokenStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn put(&self, record: &TokenRecord) -> Result<(), AppError> {
        let key = keys::token(record.user_id, &record.hmac);
        let value = serde_json::to_string(record)?;

        let mut conn = self.redis.clone();
        conn.set::<_, _, ()>(&key, value).await?;

        Ok(())
    }

    async fn get(&self, user_id: i64, hmac: &str) -> Result<Option<TokenRecord>, AppError> {
        let key = keys::token(user_id, hmac);

        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(&key).await?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, user_id: i64, hmac: &str) -> Result<bool, AppError> {
        let key = keys::token(user_id, hmac);

        let mut conn = self.redis.clone();
        let deleted: i64 = conn.del(&key).await?;

        Ok(deleted > 0)
    }
}
