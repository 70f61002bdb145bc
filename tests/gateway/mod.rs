//! Gateway Tests
//!
//! End-to-end tests over a real WebSocket client.

mod gateway_tests;
