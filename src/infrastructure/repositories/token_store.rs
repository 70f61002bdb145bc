//! Token Store Implementation
//!
//! PostgreSQL implementation of the TokenStore trait, backed by the
//! `tokens` table keyed by `(user_id, hmac_component)`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{TokenRecord, TokenStore};
use crate::shared::error::AppError;

/// Database row representation matching the tokens table schema.
#[derive(Debug, sqlx::FromRow)]
struct TokenRow {
    user_id: i64,
    hmac_component: String,
    app_id: i64,
    create_offset: i32,
    scope: Vec<String>,
}

impl TokenRow {
    /// Convert database row to domain TokenRecord.
    fn into_record(self) -> TokenRecord {
        TokenRecord {
            user_id: self.user_id,
            hmac: self.hmac_component,
            app_id: self.app_id,
            // Stored as a signed INT, offsets use the full unsigned range
            create_offset: self.create_offset as u32,
            scope: self.scope.into_iter().collect::<BTreeSet<_>>(),
        }
    }
}

/// PostgreSQL token store implementation.
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    /// Create a new PgTokenStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn put(&self, record: &TokenRecord) -> Result<(), AppError> {
        let scope: Vec<String> = record.scope.iter().cloned().collect();

        sqlx::query(
            r#"
            INSERT INTO tokens (user_id, hmac_component, app_id, create_offset, scope)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, hmac_component)
            DO UPDATE SET app_id = EXCLUDED.app_id,
                          create_offset = EXCLUDED.create_offset,
                          scope = EXCLUDED.scope
            "#,
        )
        .bind(record.user_id)
        .bind(&record.hmac)
        .bind(record.app_id)
        .bind(record.create_offset as i32)
        .bind(scope)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, user_id: i64, hmac: &str) -> Result<Option<TokenRecord>, AppError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT user_id, hmac_component, app_id, create_offset, scope
            FROM tokens
            WHERE user_id = $1 AND hmac_component = $2
            "#,
        )
        .bind(user_id)
        .bind(hmac)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_record()))
    }

    async fn delete(&self, user_id: i64, hmac: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM tokens
            WHERE user_id = $1 AND hmac_component = $2
            "#,
        )
        .bind(user_id)
        .bind(hmac)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
