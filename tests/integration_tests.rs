//! Integration Tests Entry Point
//!
//! Tests are organized by module:
//! - `api/` - HTTP endpoint tests
//! - `gateway/` - WebSocket gateway tests
//! - `common/` - Shared test utilities

mod api;
mod common;
mod gateway;
