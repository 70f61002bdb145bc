//! In-Memory Stores
//!
//! DashMap-backed implementations of the store traits, used when
//! `storage.backend = "memory"` and by tests.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::{TokenRecord, TokenStore, UserStore};
use crate::shared::error::AppError;

#[derive(Debug, Clone)]
struct UserEntry {
    secret: Vec<u8>,
    channel_ids: Vec<i64>,
}

/// In-memory user store
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: DashMap<i64, UserEntry>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub fn insert_user(&self, user_id: i64, secret: impl Into<Vec<u8>>, channel_ids: Vec<i64>) {
        self.users.insert(
            user_id,
            UserEntry {
                secret: secret.into(),
                channel_ids,
            },
        );
    }

    /// Rotate a user's secret. Returns false if the user does not exist.
    pub fn set_secret(&self, user_id: i64, secret: impl Into<Vec<u8>>) -> bool {
        match self.users.get_mut(&user_id) {
            Some(mut entry) => {
                entry.secret = secret.into();
                true
            }
            None => false,
        }
    }

    /// Replace a user's channel list. Returns false if the user does not exist.
    pub fn set_channels(&self, user_id: i64, channel_ids: Vec<i64>) -> bool {
        match self.users.get_mut(&user_id) {
            Some(mut entry) => {
                entry.channel_ids = channel_ids;
                true
            }
            None => false,
        }
    }

    pub fn remove_user(&self, user_id: i64) -> bool {
        self.users.remove(&user_id).is_some()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_secret(&self, user_id: i64) -> Result<Option<Vec<u8>>, AppError> {
        Ok(self.users.get(&user_id).map(|entry| entry.secret.clone()))
    }

    async fn get_channel_ids(&self, user_id: i64) -> Result<Vec<i64>, AppError> {
        Ok(self
            .users
            .get(&user_id)
            .map(|entry| entry.channel_ids.clone())
            .unwrap_or_default())
    }
}

/// In-memory token record store
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    records: DashMap<(i64, String), TokenRecord>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn put(&self, record: &TokenRecord) -> Result<(), AppError> {
        self.records
            .insert((record.user_id, record.hmac.clone()), record.clone());
        Ok(())
    }

    async fn get(&self, user_id: i64, hmac: &str) -> Result<Option<TokenRecord>, AppError> {
        Ok(self
            .records
            .get(&(user_id, hmac.to_string()))
            .map(|record| record.clone()))
    }

    async fn delete(&self, user_id: i64, hmac: &str) -> Result<bool, AppError> {
        Ok(self.records.remove(&(user_id, hmac.to_string())).is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn record(user_id: i64, hmac: &str) -> TokenRecord {
        TokenRecord {
            user_id,
            hmac: hmac.into(),
            app_id: 0,
            scope: BTreeSet::new(),
            create_offset: 1,
        }
    }

    #[tokio::test]
    async fn test_user_store_lookups() {
        let store = InMemoryUserStore::new();
        store.insert_user(1, b"secret".as_slice(), vec![10, 20]);

        assert_eq!(store.get_secret(1).await.unwrap(), Some(b"secret".to_vec()));
        assert_eq!(store.get_channel_ids(1).await.unwrap(), vec![10, 20]);
        assert_eq!(store.get_secret(2).await.unwrap(), None);
        assert!(store.get_channel_ids(2).await.unwrap().is_empty());

        assert!(store.set_channels(1, vec![30]));
        assert!(!store.set_secret(2, b"x".as_slice()));
        assert_eq!(store.get_channel_ids(1).await.unwrap(), vec![30]);
    }

    #[tokio::test]
    async fn test_token_store_put_get_delete() {
        let store = InMemoryTokenStore::new();
        store.put(&record(1, "abc")).await.unwrap();
        store.put(&record(1, "def")).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(1, "abc").await.unwrap(), Some(record(1, "abc")));
        assert_eq!(store.get(2, "abc").await.unwrap(), None);

        assert!(store.delete(1, "abc").await.unwrap());
        assert!(!store.delete(1, "abc").await.unwrap());
        assert_eq!(store.len(), 1);
    }
}
