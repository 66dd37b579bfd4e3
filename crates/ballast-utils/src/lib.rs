//! # ballast utilities
//!
//! Shared helpers for the ballast workspace, chiefly logging set-up built on
//! `tracing`.

pub mod logging;

// Re-export commonly used logging items for convenience
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
