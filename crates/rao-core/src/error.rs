//! Unified error types for the remedial-action optimizer
//!
//! [`RaoError`] represents failures from any layer of the optimizer. The
//! algorithm crate keeps narrower error enums for its collaborators
//! (sensitivity engine, LP solver) and converts them into `RaoError` at the
//! API boundary.
//!
//! # Example
//!
//! ```ignore
//! use rao_core::{RaoError, RaoResult};
//!
//! fn load_case(path: &str) -> RaoResult<()> {
//!     let catalog = read_catalog(path)?;
//!     catalog.validate()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all optimizer operations.
#[derive(Error, Debug)]
pub enum RaoError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Catalog validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors (unknown stop criterion, malformed range, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sensitivity computation errors
    #[error("Sensitivity error: {0}")]
    Sensitivity(String),

    /// LP solver errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Network state errors
    #[error("Network error: {0}")]
    Network(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using RaoError.
pub type RaoResult<T> = Result<T, RaoError>;

impl From<anyhow::Error> for RaoError {
    fn from(err: anyhow::Error) -> Self {
        RaoError::Other(err.to_string())
    }
}

impl From<String> for RaoError {
    fn from(s: String) -> Self {
        RaoError::Other(s)
    }
}

impl From<&str> for RaoError {
    fn from(s: &str) -> Self {
        RaoError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for RaoError {
    fn from(err: serde_json::Error) -> Self {
        RaoError::Parse(err.to_string())
    }
}
