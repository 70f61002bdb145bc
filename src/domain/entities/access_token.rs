//! Bearer access token entity and token record store contract.
//!
//! Text form: `b64url(user_id) "." b64url(offset bytes) "." b64url(hmac)` where
//! the signature segment carries no padding. Encoding and verification live in
//! [`TokenService`](crate::application::services::TokenService).

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Application and scope a token was granted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub app_id: i64,
    pub scope: BTreeSet<String>,
}

/// Persisted token record, keyed by `(user_id, hmac)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: i64,
    /// Signature segment exactly as it appears in the token text
    pub hmac: String,
    pub app_id: i64,
    pub scope: BTreeSet<String>,
    pub create_offset: u32,
}

impl TokenRecord {
    pub fn grant(&self) -> TokenGrant {
        TokenGrant {
            app_id: self.app_id,
            scope: self.scope.clone(),
        }
    }
}

/// A parsed or freshly issued bearer token.
pub struct AccessToken {
    user_id: i64,
    create_offset: u32,
    segments: [String; 3],
    signature: Vec<u8>,
    grant: OnceCell<TokenGrant>,
}

impl AccessToken {
    pub(crate) fn new(
        user_id: i64,
        create_offset: u32,
        segments: [String; 3],
        signature: Vec<u8>,
    ) -> Self {
        Self {
            user_id,
            create_offset,
            segments,
            signature,
            grant: OnceCell::new(),
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Seconds between the token epoch and issuance.
    pub fn create_offset(&self) -> u32 {
        self.create_offset
    }

    /// Signature segment as transmitted.
    pub fn hmac(&self) -> &str {
        &self.segments[2]
    }

    pub(crate) fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Grant cached from issuance or from the last existence check.
    pub fn grant(&self) -> Option<&TokenGrant> {
        self.grant.get()
    }

    pub(crate) fn cache_grant(&self, grant: TokenGrant) -> &TokenGrant {
        self.grant.get_or_init(|| grant)
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the signature
        f.debug_struct("AccessToken")
            .field("user_id", &self.user_id)
            .field("create_offset", &self.create_offset)
            .field("grant", &self.grant.get())
            .finish_non_exhaustive()
    }
}

/// Persistence for issued token records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Store a record, replacing any record with the same key.
    async fn put(&self, record: &TokenRecord) -> Result<(), AppError>;

    /// Find the record for `(user_id, hmac)`.
    async fn get(&self, user_id: i64, hmac: &str) -> Result<Option<TokenRecord>, AppError>;

    /// Delete the record for `(user_id, hmac)`. Returns whether it existed.
    async fn delete(&self, user_id: i64, hmac: &str) -> Result<bool, AppError>;
}
