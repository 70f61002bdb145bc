//! Store Implementations
//!
//! Concrete implementations of the domain store traits.
//!
//! ## Available Stores
//!
//! - **PgUserStore** - user secrets and channel memberships from `users`
//! - **PgTokenStore** - token records in the `tokens` table
//! - **RedisTokenStore** - token records as Redis JSON values
//! - **InMemoryUserStore** / **InMemoryTokenStore** - process-local stores
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use crate::infrastructure::repositories::{PgTokenStore, PgUserStore};
//!
//! let users = Arc::new(PgUserStore::new(pool.clone()));
//! let records = Arc::new(PgTokenStore::new(pool));
//! ```

pub mod memory;
pub mod redis_token_store;
pub mod token_store;
pub mod user_store;

pub use memory::{InMemoryTokenStore, InMemoryUserStore};
pub use redis_token_store::RedisTokenStore;
pub use token_store::PgTokenStore;
pub use user_store::PgUserStore;
