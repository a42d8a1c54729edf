//! Generation pipeline
//!
//! Load → diff → resolve and extract each pending device in turn → merge →
//! save. Registry load and save failures abort the run; anything that goes
//! wrong for a single device is recorded in its [`DeviceOutcome`] and the
//! device is reclassified as problematic.

use crate::command::SimctlRunner;
use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::extraction::{ExtractionRunner, Measurement};
use crate::lifecycle::BootRegistry;
use crate::merge::{MeasuredDevice, Unresolved, merge};
use crate::output;
use crate::registry::{PendingDevice, Registry};
use crate::simulator::Simulators;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of one device in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Measured and merged into `devices`
    Measured {
        /// Corner radius in points
        bezel: f64,
    },
    /// No simulator runtime supports the device
    Unresolvable,
    /// Provisioning or extraction failed
    Failed {
        /// Error description
        reason: String,
    },
    /// Dry run: would be attempted
    Planned,
}

impl DeviceStatus {
    /// Short label for console output
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Measured { .. } => "measured",
            Self::Unresolvable => "unresolvable",
            Self::Failed { .. } => "failed",
            Self::Planned => "planned",
        }
    }
}

/// One attempted device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceOutcome {
    /// Model identifier
    pub identifier: String,
    /// Friendly device name
    pub name: String,
    /// What happened
    pub status: DeviceStatus,
}

/// Summary of a generator run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
    /// Registry the run read (and wrote, if `saved`)
    pub registry_path: PathBuf,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// Whether the registry and artifact were written
    pub saved: bool,
    /// Per-device outcomes in processing order
    pub outcomes: Vec<DeviceOutcome>,
}

impl RunSummary {
    /// Devices merged into `devices`
    #[must_use]
    pub fn measured(&self) -> usize {
        self.count(|s| matches!(s, DeviceStatus::Measured { .. }))
    }

    /// Devices reclassified as problematic
    #[must_use]
    pub fn reclassified(&self) -> usize {
        self.count(|s| matches!(s, DeviceStatus::Unresolvable | DeviceStatus::Failed { .. }))
    }

    /// Whether the run found nothing to do
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.outcomes.is_empty()
    }

    fn count(&self, predicate: impl Fn(&DeviceStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.status)).count()
    }

    /// Write the summary as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        output::write_atomic(path, &json)
    }
}

/// Drives a full generator run against a simctl implementation
pub struct Generator<R: SimctlRunner> {
    config: GeneratorConfig,
    sims: Simulators<R>,
    boot_registry: Arc<BootRegistry>,
}

impl<R: SimctlRunner> Generator<R> {
    /// Create a generator registering booted instances globally
    #[must_use]
    pub fn new(config: GeneratorConfig, runner: R) -> Self {
        Self {
            config,
            sims: Simulators::new(runner),
            boot_registry: BootRegistry::global(),
        }
    }

    /// Use a specific boot registry
    #[must_use]
    pub fn with_boot_registry(mut self, registry: Arc<BootRegistry>) -> Self {
        self.boot_registry = registry;
        self
    }

    /// Run configuration
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Simulator adapter
    #[must_use]
    pub const fn simulators(&self) -> &Simulators<R> {
        &self.sims
    }

    /// Load the registry and compute the devices this run would attempt.
    ///
    /// # Errors
    ///
    /// Returns the registry load error.
    pub fn plan(&self) -> Result<(Registry, Vec<PendingDevice>)> {
        let registry = Registry::load(&self.config.registry_path)?;
        let work = registry.diff(self.config.retry_problematic);
        Ok((registry, work))
    }

    /// Execute the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be loaded, the configuration
    /// is unusable, or the results cannot be saved. Errors for which
    /// [`Error::is_per_device`] holds are reported in the summary instead;
    /// any other error during extraction aborts the run without saving.
    pub fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        self.config.validate()?;
        let (registry, work) = self.plan()?;

        let mut summary = RunSummary {
            started_at,
            finished_at: started_at,
            registry_path: self.config.registry_path.clone(),
            dry_run: self.config.dry_run,
            saved: false,
            outcomes: Vec::with_capacity(work.len()),
        };

        if work.is_empty() {
            tracing::info!("no pending devices, nothing to do");
            summary.finished_at = Utc::now();
            return Ok(summary);
        }

        if self.config.dry_run {
            summary.outcomes = work
                .into_iter()
                .map(|device| DeviceOutcome {
                    identifier: device.identifier,
                    name: device.name,
                    status: DeviceStatus::Planned,
                })
                .collect();
            summary.finished_at = Utc::now();
            return Ok(summary);
        }

        let extraction = ExtractionRunner::new(&self.sims, self.config.extraction()?)
            .with_boot_registry(Arc::clone(&self.boot_registry));

        let mut measured = Vec::new();
        let mut unresolved = Vec::new();
        for (index, device) in work.iter().enumerate() {
            tracing::info!(
                identifier = %device.identifier,
                name = %device.name,
                index = index + 1,
                total = work.len(),
                "extracting"
            );
            let status = match self.process(&extraction, device) {
                Ok(measurement) => {
                    tracing::info!(
                        identifier = %device.identifier,
                        bezel = measurement.bezel,
                        "measured"
                    );
                    measured.push(MeasuredDevice {
                        identifier: measurement.identifier,
                        name: device.name.clone(),
                        bezel: measurement.bezel,
                    });
                    DeviceStatus::Measured {
                        bezel: measurement.bezel,
                    }
                }
                Err(e) if !e.is_per_device() => {
                    tracing::error!(
                        identifier = %device.identifier,
                        error = %e,
                        "aborting run, registry left unchanged"
                    );
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        identifier = %device.identifier,
                        error = %e,
                        "marking problematic"
                    );
                    unresolved.push(Unresolved {
                        identifier: device.identifier.clone(),
                        name: device.name.clone(),
                        reason: e.to_string(),
                    });
                    match e {
                        Error::UnresolvableDevice { .. } => DeviceStatus::Unresolvable,
                        other => DeviceStatus::Failed {
                            reason: other.to_string(),
                        },
                    }
                }
            };
            summary.outcomes.push(DeviceOutcome {
                identifier: device.identifier.clone(),
                name: device.name.clone(),
                status,
            });
        }

        let merged = merge(registry, &measured, &unresolved);
        output::save(
            &merged,
            &self.config.registry_path,
            &self.config.distributable_path,
        )?;
        summary.saved = true;
        summary.finished_at = Utc::now();
        Ok(summary)
    }

    fn process(
        &self,
        extraction: &ExtractionRunner<'_, R>,
        device: &PendingDevice,
    ) -> Result<Measurement> {
        if device.name.trim().is_empty() {
            return Err(Error::UnresolvableDevice {
                name: device.identifier.clone(),
            });
        }
        let instance = self
            .sims
            .resolve(&device.name)?
            .ok_or_else(|| Error::UnresolvableDevice {
                name: device.name.clone(),
            })?;
        tracing::debug!(
            identifier = %device.identifier,
            udid = %instance.udid,
            created = instance.created,
            "resolved instance"
        );
        extraction.extract(&instance, &device.identifier)
    }
}
