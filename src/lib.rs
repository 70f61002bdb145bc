//! # Chat Gateway Library
//!
//! Real-time delivery layer of a chat service:
//! - Snowflake id allocation
//! - HMAC-signed bearer access tokens with revocation
//! - WebSocket gateway with heartbeats and scoped event fanout
//!   (channel-local, contact-wide and global)
//!
//! ## Architecture
//!
//! - **Domain Layer**: Entities, value objects and store traits
//! - **Application Layer**: Token service
//! - **Infrastructure Layer**: PostgreSQL, Redis and in-memory stores, metrics
//! - **Presentation Layer**: WebSocket gateway, HTTP health and token endpoints
//!
//! ## Module Structure
//!
//! ```text
//! chat_gateway/
//! +-- config/         Configuration management
//! +-- domain/         Entities, value objects and store traits
//! +-- application/    Token service
//! +-- infrastructure/ Store implementations and metrics
//! +-- presentation/   Gateway, HTTP routes and middleware
//! +-- shared/         Common utilities (errors, snowflake ids)
//! ```
//!
//! Write paths publish through [`EventBus::emit`](presentation::websocket::EventBus::emit)
//! after committing a change; the gateway needs no knowledge of them.

// Configuration module
pub mod config;

// Domain layer
pub mod domain;

// Application layer
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
