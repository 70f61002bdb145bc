//! User Store Implementation
//!
//! PostgreSQL implementation of the UserStore trait. The `password` column
//! holds the raw signing secret tokens are derived from.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::UserStore;
use crate::shared::error::AppError;

/// PostgreSQL user store implementation.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create a new PgUserStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_secret(&self, user_id: i64) -> Result<Option<Vec<u8>>, AppError> {
        let secret = sqlx::query_scalar::<_, Vec<u8>>(
            r#"
            SELECT password
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(secret)
    }

    async fn get_channel_ids(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        let channel_ids = sqlx::query_scalar::<_, Vec<i64>>(
            r#"
            SELECT channel_ids
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(channel_ids.unwrap_or_default())
    }
}
