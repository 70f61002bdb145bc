//! Application Layer
//!
//! Services that sit between the presentation layer and the domain
//! contracts.

pub mod services;
