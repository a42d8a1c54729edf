//! Generator configuration
//!
//! Loaded from an optional YAML file; the CLI overrides individual fields
//! from flags afterwards.

use crate::command::{DEFAULT_BUNDLE_ID, DEFAULT_MEASUREMENT_FILE};
use crate::error::{Error, Result};
use crate::extraction::{ExtractionConfig, PollConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for one generator run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Canonical registry (input and output)
    pub registry_path: PathBuf,
    /// Minified artifact consumed by the lookup library
    pub distributable_path: PathBuf,
    /// Probe `.app` bundle, required unless `dry_run`
    pub probe_app_path: Option<PathBuf>,
    /// Probe bundle identifier
    pub bundle_id: String,
    /// Measurement file relative to the probe's data container
    pub measurement_file: PathBuf,
    /// `xcrun` executable
    pub xcrun_binary: String,
    /// Measurement poll timeout in milliseconds
    pub poll_timeout_ms: u64,
    /// First poll interval in milliseconds
    pub poll_initial_interval_ms: u64,
    /// Poll backoff ceiling in milliseconds
    pub poll_max_interval_ms: u64,
    /// Delete instances created by the run once measured
    pub delete_created_instances: bool,
    /// Re-attempt `problematic` identifiers
    pub retry_problematic: bool,
    /// Report pending work without touching simulators or files
    pub dry_run: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from("data/bezel.json"),
            distributable_path: PathBuf::from("crates/bezel/data/bezel.min.json"),
            probe_app_path: None,
            bundle_id: DEFAULT_BUNDLE_ID.to_string(),
            measurement_file: PathBuf::from(DEFAULT_MEASUREMENT_FILE),
            xcrun_binary: "xcrun".to_string(),
            poll_timeout_ms: 15_000,
            poll_initial_interval_ms: 250,
            poll_max_interval_ms: 2_000,
            delete_created_instances: false,
            retry_problematic: true,
            dry_run: false,
        }
    }
}

impl GeneratorConfig {
    /// Load a configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a configuration from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or fails validation.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(Error::from)
    }

    /// Check field constraints
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.bundle_id.trim().is_empty() {
            return Err(Error::Config("bundle_id must not be empty".to_string()));
        }
        if self.measurement_file.as_os_str().is_empty() || self.measurement_file.is_absolute() {
            return Err(Error::Config(
                "measurement_file must be a relative path".to_string(),
            ));
        }
        if self.poll_initial_interval_ms == 0 {
            return Err(Error::Config(
                "poll_initial_interval_ms must be positive".to_string(),
            ));
        }
        if self.poll_max_interval_ms < self.poll_initial_interval_ms {
            return Err(Error::Config(format!(
                "poll_max_interval_ms ({}) is below poll_initial_interval_ms ({})",
                self.poll_max_interval_ms, self.poll_initial_interval_ms
            )));
        }
        if self.registry_path == self.distributable_path {
            return Err(Error::Config(
                "registry_path and distributable_path must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Polling settings
    #[must_use]
    pub const fn poll(&self) -> PollConfig {
        PollConfig {
            timeout: Duration::from_millis(self.poll_timeout_ms),
            initial_interval: Duration::from_millis(self.poll_initial_interval_ms),
            max_interval: Duration::from_millis(self.poll_max_interval_ms),
        }
    }

    /// Extraction settings, once the probe bundle is known to exist
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `probe_app_path` is unset or missing.
    pub fn extraction(&self) -> Result<ExtractionConfig> {
        let probe_app = self
            .probe_app_path
            .clone()
            .ok_or_else(|| Error::Config("probe_app_path is required".to_string()))?;
        if !probe_app.exists() {
            return Err(Error::Config(format!(
                "probe app not found: {}",
                probe_app.display()
            )));
        }
        Ok(ExtractionConfig {
            probe_app,
            bundle_id: self.bundle_id.clone(),
            measurement_file: self.measurement_file.clone(),
            poll: self.poll(),
            delete_created: self.delete_created_instances,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GeneratorConfig::default();
        assert_eq!(config.registry_path, PathBuf::from("data/bezel.json"));
        assert_eq!(config.bundle_id, "com.bezel.probe");
        assert_eq!(config.poll().timeout, Duration::from_secs(15));
        assert!(config.retry_problematic);
        assert!(!config.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = GeneratorConfig::from_yaml(
            "registry_path: fixtures/registry.json\npoll_timeout_ms: 500\nretry_problematic: false\n",
        )
        .unwrap();
        assert_eq!(config.registry_path, PathBuf::from("fixtures/registry.json"));
        assert_eq!(config.poll_timeout_ms, 500);
        assert!(!config.retry_problematic);
        assert_eq!(config.xcrun_binary, "xcrun");
    }

    #[test]
    fn test_from_yaml_rejects_unknown_field() {
        let err = GeneratorConfig::from_yaml("registry: x.json\n").unwrap_err();
        assert!(matches!(err, Error::YamlError(_)));
    }

    #[test]
    fn test_validate_intervals() {
        let err = GeneratorConfig::from_yaml(
            "poll_initial_interval_ms: 500\npoll_max_interval_ms: 100\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_absolute_measurement_file() {
        let config = GeneratorConfig {
            measurement_file: PathBuf::from("/tmp/bezel.json"),
            ..GeneratorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extraction_requires_probe() {
        let config = GeneratorConfig::default();
        assert!(matches!(config.extraction(), Err(Error::Config(_))));

        let dir = tempfile::tempdir().unwrap();
        let probe = dir.path().join("BezelProbe.app");
        std::fs::create_dir(&probe).unwrap();
        let config = GeneratorConfig {
            probe_app_path: Some(probe.clone()),
            ..GeneratorConfig::default()
        };
        let extraction = config.extraction().unwrap();
        assert_eq!(extraction.probe_app, probe);
        assert_eq!(extraction.bundle_id, "com.bezel.probe");
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = GeneratorConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(GeneratorConfig::from_yaml(&yaml).unwrap(), config);
    }
}
