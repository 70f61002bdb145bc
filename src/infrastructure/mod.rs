//! Infrastructure Layer
//!
//! Implementations for external services:
//! - PostgreSQL connection pool and stores
//! - Redis connection and token store
//! - In-memory stores
//! - Prometheus metrics

pub mod cache;
pub mod database;
pub mod metrics;
pub mod repositories;
