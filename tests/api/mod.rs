//! HTTP API Tests

mod health_tests;
mod token_tests;
