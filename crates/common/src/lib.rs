//! Virtuoso Gateway Common Library
//!
//! Shared types, configuration, and errors for the Virtuoso gateway.

pub mod commands;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use commands::StepCommand;
pub use config::Settings;
pub use error::{Error, Result};
pub use types::*;

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
