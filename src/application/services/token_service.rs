//! Token Service
//!
//! Issues, parses, verifies and revokes bearer access tokens.
//!
//! A token is three URL-safe base64 segments joined by `.`:
//!
//! 1. the decimal user id
//! 2. the issuance offset (seconds since the token epoch) as minimal big-endian bytes
//! 3. HMAC-SHA1 over `"{user_id}.{offset}"` keyed by the user's secret, unpadded
//!
//! Verification is stateful: a correct signature is not enough, the token's
//! record must also still exist in the [`TokenStore`]. Deleting the record
//! revokes the token. Rotating a user's secret invalidates every token the
//! user holds.

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::domain::{AccessToken, TokenGrant, TokenRecord, TokenStore, UserStore};
use crate::shared::error::AppError;

type HmacSha1 = Hmac<Sha1>;

/// URL-safe alphabet accepting input with or without padding
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Default token epoch (2019-01-01T00:00:00Z), in seconds
pub const DEFAULT_TOKEN_EPOCH: i64 = 1_546_300_800;

/// Token errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token rejected")]
    Rejected,

    #[error("User {0} does not exist")]
    UserNotFound(i64),

    #[error("Token is not registered")]
    NotRegistered,

    #[error("Current time does not fit a token offset")]
    OffsetOutOfRange,

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Store(e) => e,
            TokenError::OffsetOutOfRange => AppError::Internal(err.to_string()),
            _ => AppError::Unauthorized("Bad access token passed".into()),
        }
    }
}

/// Bearer token issuance and verification
pub struct TokenService {
    users: Arc<dyn UserStore>,
    records: Arc<dyn TokenStore>,
    epoch_offset: i64,
}

impl TokenService {
    pub fn new(users: Arc<dyn UserStore>, records: Arc<dyn TokenStore>, epoch_offset: i64) -> Self {
        Self {
            users,
            records,
            epoch_offset,
        }
    }

    /// Padded URL-safe base64 of the decimal user id.
    pub fn encode_user_id(user_id: i64) -> String {
        URL_SAFE.encode(user_id.to_string())
    }

    pub fn decode_user_id(segment: &str) -> Result<i64, TokenError> {
        let bytes = URL_SAFE_LENIENT
            .decode(segment)
            .map_err(|e| TokenError::Malformed(format!("user id segment: {}", e)))?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| TokenError::Malformed("user id is not text".into()))?;
        let user_id: i64 = text
            .parse()
            .map_err(|_| TokenError::Malformed("user id is not a number".into()))?;

        if user_id < 0 {
            return Err(TokenError::Malformed("user id is negative".into()));
        }
        Ok(user_id)
    }

    /// Padded URL-safe base64 of the offset's big-endian bytes, leading zero bytes dropped.
    pub fn encode_offset(offset: u32) -> String {
        let bytes = offset.to_be_bytes();
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
        URL_SAFE.encode(&bytes[first..])
    }

    pub fn decode_offset(segment: &str) -> Result<u32, TokenError> {
        let bytes = URL_SAFE_LENIENT
            .decode(segment)
            .map_err(|e| TokenError::Malformed(format!("offset segment: {}", e)))?;

        if bytes.is_empty() || bytes.len() > 4 {
            return Err(TokenError::Malformed(format!(
                "offset is {} bytes long",
                bytes.len()
            )));
        }
        Ok(bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b)))
    }

    /// Unpadded URL-safe base64 of HMAC-SHA1 over `"{user_id}.{offset}"`.
    pub fn encode_hmac(secret: &[u8], user_id: i64, offset: u32) -> String {
        URL_SAFE_NO_PAD.encode(Self::signer(secret, user_id, offset).finalize().into_bytes())
    }

    fn signer(secret: &[u8], user_id: i64, offset: u32) -> HmacSha1 {
        let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC can take key of any size");
        mac.update(format!("{}.{}", user_id, offset).as_bytes());
        mac
    }

    /// Seconds since the token epoch, now.
    pub fn current_offset(&self) -> Result<u32, TokenError> {
        u32::try_from(Utc::now().timestamp() - self.epoch_offset)
            .map_err(|_| TokenError::OffsetOutOfRange)
    }

    /// Parse token text, optionally prefixed with `Bearer `. Touches no storage.
    pub fn parse(input: &str) -> Result<AccessToken, TokenError> {
        let input = input.trim();
        let text = match input.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => input[7..].trim_start(),
            _ => input,
        };

        let parts: Vec<&str> = text.split('.').collect();
        let [user_segment, offset_segment, hmac_segment] = parts.as_slice() else {
            return Err(TokenError::Malformed(format!(
                "expected 3 segments, got {}",
                parts.len()
            )));
        };

        let user_id = Self::decode_user_id(user_segment)?;
        let create_offset = Self::decode_offset(offset_segment)?;
        let signature = URL_SAFE_LENIENT
            .decode(hmac_segment)
            .map_err(|e| TokenError::Malformed(format!("signature segment: {}", e)))?;
        if signature.is_empty() {
            return Err(TokenError::Malformed("empty signature".into()));
        }

        Ok(AccessToken::new(
            user_id,
            create_offset,
            [
                user_segment.to_string(),
                offset_segment.to_string(),
                hmac_segment.to_string(),
            ],
            signature,
        ))
    }

    /// Sign a token for `user_id` at `offset` without persisting it.
    pub(crate) fn sign(secret: &[u8], user_id: i64, offset: u32) -> AccessToken {
        let signature = Self::signer(secret, user_id, offset).finalize().into_bytes().to_vec();
        let hmac = URL_SAFE_NO_PAD.encode(&signature);

        AccessToken::new(
            user_id,
            offset,
            [Self::encode_user_id(user_id), Self::encode_offset(offset), hmac],
            signature,
        )
    }

    /// Issue a token for the current time. When `persist` is set the record is
    /// stored so that the token verifies.
    pub async fn issue(
        &self,
        user_id: i64,
        secret: &[u8],
        app_id: i64,
        scope: BTreeSet<String>,
        persist: bool,
    ) -> Result<AccessToken, TokenError> {
        if user_id < 0 {
            return Err(TokenError::Malformed("user id is negative".into()));
        }

        let offset = self.current_offset()?;
        let token = Self::sign(secret, user_id, offset);
        let grant = token.cache_grant(TokenGrant { app_id, scope });

        if persist {
            self.records
                .put(&TokenRecord {
                    user_id,
                    hmac: token.hmac().to_string(),
                    app_id: grant.app_id,
                    scope: grant.scope.clone(),
                    create_offset: offset,
                })
                .await?;
        }

        tracing::debug!(user_id, app_id, persist, "Issued access token");
        Ok(token)
    }

    /// Check the signature against the user's current secret, then check the
    /// record still exists. A bad signature or a missing record yields `false`.
    pub async fn verify(&self, token: &AccessToken) -> Result<bool, TokenError> {
        let user_id = token.user_id();
        let secret = self
            .users
            .get_secret(user_id)
            .await?
            .ok_or(TokenError::UserNotFound(user_id))?;

        let mac = Self::signer(&secret, user_id, token.create_offset());
        if mac.verify_slice(token.signature()).is_err() {
            tracing::debug!(user_id, "Token signature mismatch");
            return Ok(false);
        }

        self.exists(token).await
    }

    /// Look the record up and cache its grant on the token.
    async fn exists(&self, token: &AccessToken) -> Result<bool, TokenError> {
        match self.records.get(token.user_id(), token.hmac()).await? {
            Some(record) => {
                token.cache_grant(record.grant());
                Ok(true)
            }
            None => {
                tracing::debug!(user_id = token.user_id(), "Token record not found");
                Ok(false)
            }
        }
    }

    async fn grant_of<'a>(&self, token: &'a AccessToken) -> Result<&'a TokenGrant, TokenError> {
        if token.grant().is_none() && !self.exists(token).await? {
            return Err(TokenError::NotRegistered);
        }
        token.grant().ok_or(TokenError::NotRegistered)
    }

    /// Scope the token was granted. Cached after the first lookup.
    pub async fn scope_of(&self, token: &AccessToken) -> Result<BTreeSet<String>, TokenError> {
        Ok(self.grant_of(token).await?.scope.clone())
    }

    /// Application the token was granted to. Cached after the first lookup.
    pub async fn app_of(&self, token: &AccessToken) -> Result<i64, TokenError> {
        Ok(self.grant_of(token).await?.app_id)
    }

    /// Delete the token's record. Revoking twice is not an error.
    pub async fn revoke(&self, token: &AccessToken) -> Result<(), TokenError> {
        let existed = self.records.delete(token.user_id(), token.hmac()).await?;
        tracing::debug!(user_id = token.user_id(), existed, "Revoked access token");
        Ok(())
    }

    /// Parse and verify in one step. Any rejection maps to an error.
    pub async fn authenticate(&self, raw: &str) -> Result<AccessToken, TokenError> {
        let token = Self::parse(raw)?;
        if !self.verify(&token).await? {
            return Err(TokenError::Rejected);
        }
        Ok(token)
    }
}
