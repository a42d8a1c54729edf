//! Extraction runner
//!
//! Drives one simulator instance through boot, probe install, launch and
//! measurement read, then tears it down.

use crate::command::SimctlRunner;
use crate::error::{Error, Result};
use crate::lifecycle::{BootRegistry, InstanceGuard};
use crate::simulator::{InstanceHandle, Simulators};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Measurement reported by the probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Model identifier the probe ran on
    pub identifier: String,
    /// Corner radius in points
    pub bezel: f64,
}

/// On-disk format written by the probe
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(alias = "identifier")]
    identifiers: String,
    bezel: f64,
}

/// Parse the probe's measurement file.
///
/// # Errors
///
/// Returns [`Error::ExtractionParse`] if the content is not probe JSON or the
/// bezel is negative.
pub fn parse_measurement(path: &Path, content: &str) -> Result<Measurement> {
    let parse_error = |reason: String| Error::ExtractionParse {
        path: path.to_path_buf(),
        reason,
    };
    let output: ProbeOutput =
        serde_json::from_str(content).map_err(|e| parse_error(e.to_string()))?;
    let identifier = output.identifiers.trim().to_string();
    if identifier.is_empty() {
        return Err(parse_error("empty identifier".to_string()));
    }
    if !output.bezel.is_finite() || output.bezel < 0.0 {
        return Err(parse_error(format!("invalid bezel {}", output.bezel)));
    }
    Ok(Measurement {
        identifier,
        bezel: output.bezel,
    })
}

/// Bounded polling for the measurement file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Give up after this long
    pub timeout: Duration,
    /// First wait between checks
    pub initial_interval: Duration,
    /// Backoff ceiling
    pub max_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(2),
        }
    }
}

/// Static inputs of an extraction
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Path to the probe `.app` bundle
    pub probe_app: PathBuf,
    /// Bundle identifier of the probe
    pub bundle_id: String,
    /// Measurement file path relative to the probe's data container
    pub measurement_file: PathBuf,
    /// Polling behavior
    pub poll: PollConfig,
    /// Delete instances that were created for this run after extraction
    pub delete_created: bool,
}

/// Runs extractions one instance at a time
pub struct ExtractionRunner<'a, R: SimctlRunner> {
    sims: &'a Simulators<R>,
    config: ExtractionConfig,
    boot_registry: Arc<BootRegistry>,
}

impl<'a, R: SimctlRunner> ExtractionRunner<'a, R> {
    /// Create a runner registering booted instances in the global registry
    #[must_use]
    pub fn new(sims: &'a Simulators<R>, config: ExtractionConfig) -> Self {
        Self {
            sims,
            config,
            boot_registry: BootRegistry::global(),
        }
    }

    /// Use a specific boot registry
    #[must_use]
    pub fn with_boot_registry(mut self, registry: Arc<BootRegistry>) -> Self {
        self.boot_registry = registry;
        self
    }

    /// Extraction configuration
    #[must_use]
    pub const fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Measure the corner radius of `identifier` on `instance`.
    ///
    /// The instance is shut down (and deleted, if configured and created for
    /// this run) before returning, whether or not extraction succeeded.
    ///
    /// # Errors
    ///
    /// Returns the first failing simctl step, [`Error::ExtractionTimeout`] or
    /// [`Error::ExtractionParse`] if no valid measurement appeared, and
    /// [`Error::IdentifierMismatch`] if the probe ran on a different model.
    pub fn extract(&self, instance: &InstanceHandle, identifier: &str) -> Result<Measurement> {
        let config = &self.config;
        let udid = instance.udid.as_str();

        let mut guard = InstanceGuard::boot(
            self.sims,
            &self.boot_registry,
            instance,
            &config.bundle_id,
            config.delete_created,
        )?;
        guard.install(&config.probe_app)?;

        let container = self.sims.app_data_path(udid, &config.bundle_id)?;
        let file = container.join(&config.measurement_file);
        match std::fs::remove_file(&file) {
            Ok(()) => tracing::debug!(path = %file.display(), "removed stale measurement"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.sims.launch(udid, &config.bundle_id)?;
        tracing::debug!(identifier, udid, "probe launched");

        let measurement = poll_measurement(&file, identifier, config.poll);
        guard.release();

        let measurement = measurement?;
        if measurement.identifier != identifier {
            return Err(Error::IdentifierMismatch {
                expected: identifier.to_string(),
                actual: measurement.identifier,
            });
        }
        Ok(measurement)
    }
}

/// Wait for `file` to contain a valid measurement.
///
/// A file that exists but does not parse yet is treated as still being
/// written until the deadline; the last parse error is returned on timeout.
///
/// # Errors
///
/// Returns [`Error::ExtractionTimeout`] if the file never appears and
/// [`Error::ExtractionParse`] if it never becomes valid.
pub fn poll_measurement(file: &Path, identifier: &str, poll: PollConfig) -> Result<Measurement> {
    let start = Instant::now();
    let mut interval = poll.initial_interval;
    let mut last_error = None;

    loop {
        match std::fs::read_to_string(file) {
            Ok(content) => match parse_measurement(file, &content) {
                Ok(measurement) => {
                    tracing::debug!(
                        identifier,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "measurement read"
                    );
                    return Ok(measurement);
                }
                Err(e) => last_error = Some(e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let elapsed = start.elapsed();
        if elapsed >= poll.timeout {
            return Err(last_error.unwrap_or_else(|| Error::ExtractionTimeout {
                identifier: identifier.to_string(),
                timeout_ms: poll.timeout.as_millis() as u64,
            }));
        }
        std::thread::sleep(interval.min(poll.timeout - elapsed));
        interval = (interval * 2).min(poll.max_interval);
    }
}
