//! Rewind Common Utilities
//!
//! Shared infrastructure for all Rewind crates:
//! - Error types and result aliases
//! - Clock sources and drift measurement for timestamp resynchronization
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
