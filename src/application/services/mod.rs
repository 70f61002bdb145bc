//! Application Services
//!
//! Business logic that coordinates domain types and stores.
//!
//! ## Available Services
//!
//! - **TokenService**: bearer token issuance, parsing, verification and revocation

pub mod token_service;

pub use token_service::{TokenError, TokenService, DEFAULT_TOKEN_EPOCH};
