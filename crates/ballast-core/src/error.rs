//! # Error Types
//!
//! General error handling for size queries and target process control.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use std::fmt;

use thiserror::Error;

/// Main error type for ballast operations
///
/// A size query can only ever fail in two ways: an address could not be
/// evaluated against live memory ([`BallastError::Resolution`]) or a type
/// named by a formula could not be found in debug information
/// ([`BallastError::TypeLookup`]). Both abort the query; there is no partial
/// result.
///
/// The remaining variants belong to process control (attaching, tracing) and
/// to loading debug information.
#[derive(Error, Debug)]
pub enum BallastError
{
    /// An address or field expression could not be evaluated against live memory
    ///
    /// This happens when:
    /// - A pointer in the container structure is null or points into unmapped memory
    /// - A value was optimized out or a global has no static location
    /// - A container's internal bookkeeping is inconsistent (e.g. `end < begin`)
    #[error("Cannot resolve `{expression}`: {reason}")]
    Resolution
    {
        /// Printable path of the value being read
        expression: String,
        /// What went wrong
        reason: String,
    },

    /// A named type could not be resolved in debug information
    ///
    /// Raised when a formula refers to a type by name (an aggregate base type,
    /// a container's template argument) that the debug information does not
    /// describe.
    #[error("Type lookup failed: no type named `{0}`")]
    TypeLookup(String),

    /// The process with the given PID doesn't exist or has exited
    #[error("Process not found: PID {0}")]
    ProcessNotFound(u32),

    /// Insufficient permissions to inspect the target process
    ///
    /// On Linux this usually means `ptrace` is restricted by
    /// `/proc/sys/kernel/yama/ptrace_scope` or the target belongs to another user.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid argument passed to a command or API
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to attach to a process
    #[error("Failed to attach to process: {0}")]
    AttachFailed(String),

    /// Operation requires an attached process
    #[error("Not attached to a process")]
    NotAttached,

    /// A `ptrace` request failed
    #[error("ptrace {operation} failed: {source}")]
    Ptrace
    {
        /// The request that failed (e.g. `PTRACE_CONT`)
        operation: &'static str,
        /// The underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Debug information could not be parsed
    #[error("Debug information error: {0}")]
    Dwarf(String),

    /// I/O error (for file operations, /proc access, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BallastError
{
    /// Build a [`BallastError::Resolution`] for the given expression.
    pub fn resolution(expression: impl fmt::Display, reason: impl Into<String>) -> Self
    {
        Self::Resolution {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this is one of the two errors a size query can produce.
    #[must_use]
    pub fn is_query_error(&self) -> bool
    {
        matches!(self, Self::Resolution { .. } | Self::TypeLookup(_))
    }

    /// Re-label a resolution error with the expression being evaluated.
    ///
    /// Memory readers only know raw addresses; the size calculator knows the
    /// printable path. Other variants pass through untouched.
    #[must_use]
    pub fn at_expression(self, expression: impl fmt::Display) -> Self
    {
        match self {
            Self::Resolution { reason, .. } => Self::Resolution {
                expression: expression.to_string(),
                reason,
            },
            other => other,
        }
    }
}

/// Convenience type alias for `Result<T, BallastError>`
///
/// ```rust
/// use ballast_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, BallastError>;
