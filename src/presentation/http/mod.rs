//! HTTP Surface
//!
//! Routes and handlers served next to the gateway.

pub mod handlers;
pub mod routes;

pub use routes::create_router;
