//! # Domain Layer
//!
//! Framework-independent types of the gateway core.
//!
//! ## Structure
//!
//! - **entities**: tokens, events and the store contracts they depend on
//! - **value_objects**: immutable value types (Snowflake)

pub mod entities;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use value_objects::*;
