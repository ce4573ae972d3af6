//! Clipforge Common Utilities
//!
//! Shared infrastructure for all Clipforge crates:
//! - Error types and result aliases
//! - Engine timecode parsing and log rate limiting
//! - Tracing/logging initialization
//! - Configuration loading

pub mod config;
pub mod error;
pub mod logging;
pub mod timecode;

pub use config::*;
pub use error::*;
pub use timecode::*;
