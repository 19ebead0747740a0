//! # Webhook Delivery Worker Common Library
//!
//! Shared infrastructure used by the worker binary: structured logging
//! setup and a crate-wide error type. Kept separate from the worker crate
//! so it can be reused by future services in the same deployment (a second
//! consumer binary, a migration tool, ...) without dragging in broker or
//! HTTP client dependencies.

pub mod db;
pub mod error;
pub mod logging;

pub use db::create_pool;
pub use error::{Error, Result};
pub use logging::init_tracing;
