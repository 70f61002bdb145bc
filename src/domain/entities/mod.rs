//! # Domain Entities
//!
//! Core objects the gateway works with and the persistence contracts it
//! consumes. Store traits are implemented in the infrastructure layer.
//!
//! - **AccessToken**: bearer capability bound to a user, with its persisted record
//! - **Event**: addressed payload fanned out to live connections
//! - **UserStore**: user secret and channel membership lookups

mod access_token;
mod event;
mod user;

pub use access_token::{AccessToken, TokenGrant, TokenRecord, TokenStore};
pub use event::{Event, EventError, EventScope};
pub use user::UserStore;

#[cfg(test)]
pub use access_token::MockTokenStore;
#[cfg(test)]
pub use user::MockUserStore;
