//! Error types for bezel

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading a bezel table
#[derive(Debug, Error)]
pub enum Error {
    /// Table is not valid distributable JSON
    #[error("Invalid bezel table: {0}")]
    Parse(#[from] serde_json::Error),

    /// Table contains a value that is not a usable radius
    #[error("Invalid bezel for {identifier}: {value}")]
    InvalidValue {
        /// Model identifier
        identifier: String,
        /// Offending value
        value: f64,
    },

    /// The same identifier appears under two categories
    #[error("Duplicate identifier in bezel table: {0}")]
    Duplicate(String),

    /// The table compiled into the crate could not be loaded
    #[error("Embedded bezel table is unusable: {0}")]
    Embedded(String),
}
