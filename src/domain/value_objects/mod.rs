//! # Domain Value Objects
//!
//! Immutable value types that represent domain concepts without identity.
//!
//! ## Value Objects
//!
//! - **Snowflake**: time-ordered unique ID with embedded timestamp and node ids

mod snowflake;

pub use snowflake::*;
