//! Error types for bezel-docs

use thiserror::Error;

/// Result type for documentation operations.
pub type Result<T> = std::result::Result<T, DocsError>;

/// Errors that can occur while updating documentation.
#[derive(Error, Debug)]
pub enum DocsError {
    /// README marker not found.
    #[error("README marker not found: {0}")]
    MarkerNotFound(String),

    /// End marker appears before the start marker.
    #[error("README markers out of order")]
    MarkerOrder,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
