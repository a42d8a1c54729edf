//! Error types for bezel-gen

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while regenerating the bezel dataset
#[derive(Debug, Error)]
pub enum Error {
    /// Registry file does not exist
    #[error("Registry not found: {}", .0.display())]
    RegistryNotFound(PathBuf),

    /// Registry file is not valid JSON or does not match the schema
    #[error("Registry parse error in {}: {source}", path.display())]
    RegistryParse {
        /// Registry path
        path: PathBuf,
        /// Underlying parse error
        source: serde_json::Error,
    },

    /// Registry parsed but violates a data invariant
    #[error("Invalid registry {}: {reason}", path.display())]
    RegistryInvalid {
        /// Registry path
        path: PathBuf,
        /// Violated invariant
        reason: String,
    },

    /// No installed runtime supports the device name
    #[error("No simulator runtime supports device: {name}")]
    UnresolvableDevice {
        /// Friendly device name
        name: String,
    },

    /// Instance creation or lookup failed
    #[error("Provisioning failed for {name}: {reason}")]
    Provisioning {
        /// Friendly device name
        name: String,
        /// Reason for failure
        reason: String,
    },

    /// simctl command exited unsuccessfully
    #[error("Command failed: {command} (exit code: {exit_code})")]
    CommandFailed {
        /// The command that failed
        command: String,
        /// Exit code
        exit_code: i32,
        /// Stderr output
        stderr: String,
    },

    /// Probe never produced a measurement file
    #[error("Measurement for {identifier} not written after {timeout_ms}ms")]
    ExtractionTimeout {
        /// Device identifier
        identifier: String,
        /// Poll timeout in milliseconds
        timeout_ms: u64,
    },

    /// Measurement file exists but is not usable
    #[error("Measurement parse error in {}: {reason}", path.display())]
    ExtractionParse {
        /// Measurement file path
        path: PathBuf,
        /// Reason for failure
        reason: String,
    },

    /// Probe reported a different model identifier than requested
    #[error("Probe reported {actual}, expected {expected}")]
    IdentifierMismatch {
        /// Identifier being extracted
        expected: String,
        /// Identifier reported by the probe
        actual: String,
    },

    /// Output could not be committed
    #[error("Failed to write {}: {source}", path.display())]
    Persistence {
        /// Target path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Invalid generator configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether the error is scoped to a single device.
    ///
    /// Per-device errors are recorded as outcomes and reclassify the device as
    /// problematic; everything else aborts the run.
    #[must_use]
    pub const fn is_per_device(&self) -> bool {
        matches!(
            self,
            Self::UnresolvableDevice { .. }
                | Self::Provisioning { .. }
                | Self::CommandFailed { .. }
                | Self::ExtractionTimeout { .. }
                | Self::ExtractionParse { .. }
                | Self::IdentifierMismatch { .. }
        )
    }
}
