//! User store contract.
//!
//! Users are owned by the surrounding application. The gateway core only
//! needs two lookups: the secret that token signatures are derived from and
//! the set of channels a user belongs to.

use async_trait::async_trait;

use crate::shared::error::AppError;

/// Read access to user data consumed by token verification and fanout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Current signing secret of a user, `None` if the user does not exist.
    async fn get_secret(&self, user_id: i64) -> Result<Option<Vec<u8>>, AppError>;

    /// Channels the user is a recipient of. Unknown users have none.
    async fn get_channel_ids(&self, user_id: i64) -> Result<Vec<i64>, AppError>;
}
