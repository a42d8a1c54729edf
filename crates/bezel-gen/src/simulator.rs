//! Simulator provisioning
//!
//! Typed views of `simctl list --json` output and the [`Simulators`] adapter,
//! which resolves a friendly device name to a bootable instance.

use crate::command::{SimctlOp, SimctlRunner};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Simulator instance state as reported by simctl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    /// Powered off
    Shutdown,
    /// Running
    Booted,
    /// Boot in progress
    Booting,
    /// Shutdown in progress
    #[serde(rename = "Shutting Down")]
    ShuttingDown,
    /// Being created
    Creating,
    /// Any state this crate does not know about
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Shutdown => "Shutdown",
            Self::Booted => "Booted",
            Self::Booting => "Booting",
            Self::ShuttingDown => "Shutting Down",
            Self::Creating => "Creating",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// One installed simulator instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimDevice {
    /// Instance UDID
    pub udid: String,
    /// Instance name
    pub name: String,
    /// Current state
    pub state: DeviceState,
    /// False when the runtime backing the instance is missing
    #[serde(default = "default_true")]
    pub is_available: bool,
    /// Device type identifier
    #[serde(default)]
    pub device_type_identifier: String,
}

/// `simctl list devices --json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceList {
    /// Instances keyed by runtime identifier
    pub devices: BTreeMap<String, Vec<SimDevice>>,
}

/// Device type supported by a runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceType {
    /// e.g. `com.apple.CoreSimulator.SimDeviceType.iPhone-13-Pro`
    pub identifier: String,
    /// e.g. `iPhone 13 Pro`
    pub name: String,
    /// e.g. `iPhone`
    #[serde(default)]
    pub product_family: String,
}

/// One installed runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runtime {
    /// e.g. `com.apple.CoreSimulator.SimRuntime.iOS-17-2`
    pub identifier: String,
    /// e.g. `iOS 17.2`
    pub name: String,
    /// e.g. `17.2`
    pub version: String,
    /// False when the runtime is not usable on this host
    #[serde(default = "default_true")]
    pub is_available: bool,
    /// Device types this runtime can simulate
    #[serde(default)]
    pub supported_device_types: Vec<DeviceType>,
}

impl Runtime {
    /// Parsed version for ordering
    #[must_use]
    pub fn parsed_version(&self) -> RuntimeVersion {
        RuntimeVersion::parse(&self.version)
    }
}

/// `simctl list runtimes --json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeList {
    /// Installed runtimes
    pub runtimes: Vec<Runtime>,
}

const fn default_true() -> bool {
    true
}

/// Dotted runtime version compared component-wise (`17.10` > `17.2`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RuntimeVersion(Vec<u32>);

impl RuntimeVersion {
    /// Parse a dotted version. Non-numeric components count as zero.
    #[must_use]
    pub fn parse(version: &str) -> Self {
        let mut parts: Vec<u32> = version
            .split('.')
            .map(|part| part.trim().parse().unwrap_or(0))
            .collect();
        while parts.len() > 1 && parts.last() == Some(&0) {
            parts.pop();
        }
        Self(parts)
    }
}

/// A simulator instance chosen for extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    /// Instance UDID
    pub udid: String,
    /// Instance name
    pub name: String,
    /// State at resolution time
    pub state: DeviceState,
    /// True if the adapter created the instance for this run
    pub created: bool,
}

/// Provisioning adapter over a [`SimctlRunner`]
#[derive(Debug)]
pub struct Simulators<R: SimctlRunner> {
    runner: R,
}

impl<R: SimctlRunner> Simulators<R> {
    /// Wrap a runner
    #[must_use]
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Access the underlying runner
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Installed, available instances across all runtimes
    ///
    /// # Errors
    ///
    /// Returns an error if simctl fails or prints unexpected JSON.
    pub fn list_instances(&self) -> Result<DeviceList> {
        let stdout = self
            .runner
            .list_devices()
            .into_result(SimctlOp::ListDevices, "")?;
        Ok(serde_json::from_str(&stdout)?)
    }

    /// Available runtimes, newest version first
    ///
    /// # Errors
    ///
    /// Returns an error if simctl fails or prints unexpected JSON.
    pub fn list_runtimes(&self) -> Result<Vec<Runtime>> {
        let stdout = self
            .runner
            .list_runtimes()
            .into_result(SimctlOp::ListRuntimes, "")?;
        let list: RuntimeList = serde_json::from_str(&stdout)?;
        let mut runtimes: Vec<Runtime> =
            list.runtimes.into_iter().filter(|r| r.is_available).collect();
        runtimes.sort_by(|a, b| {
            b.parsed_version()
                .cmp(&a.parsed_version())
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        Ok(runtimes)
    }

    /// Resolve a friendly device name to an instance.
    ///
    /// An existing instance with exactly this name is reused; the one on the
    /// newest runtime wins if there are several. Otherwise a new instance is
    /// created from the newest runtime that supports a device type of that
    /// name. Returns `Ok(None)` when no runtime supports the name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provisioning`] if listing or creation fails.
    pub fn resolve(&self, name: &str) -> Result<Option<InstanceHandle>> {
        let provisioning = |e: Error| Error::Provisioning {
            name: name.to_string(),
            reason: e.to_string(),
        };

        let instances = self.list_instances().map_err(provisioning)?;
        let runtimes = self.list_runtimes().map_err(provisioning)?;

        if let Some(existing) = find_instance(&instances, &runtimes, name) {
            tracing::debug!(name, udid = %existing.udid, state = %existing.state, "reusing instance");
            return Ok(Some(InstanceHandle {
                udid: existing.udid.clone(),
                name: existing.name.clone(),
                state: existing.state,
                created: false,
            }));
        }

        let Some((device_type, runtime)) = find_device_type(&runtimes, name) else {
            tracing::info!(name, "no runtime supports device");
            return Ok(None);
        };

        let udid = self
            .runner
            .create(name, &device_type.identifier, &runtime.identifier)
            .into_result(SimctlOp::Create, name)
            .map_err(provisioning)?
            .trim()
            .to_string();
        if udid.is_empty() {
            return Err(Error::Provisioning {
                name: name.to_string(),
                reason: "simctl create printed no UDID".to_string(),
            });
        }
        tracing::info!(name, %udid, runtime = %runtime.name, "created instance");
        Ok(Some(InstanceHandle {
            udid,
            name: name.to_string(),
            state: DeviceState::Shutdown,
            created: true,
        }))
    }

    /// Boot an instance
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] on a nonzero exit.
    pub fn boot(&self, udid: &str) -> Result<()> {
        self.runner
            .boot(udid)
            .into_result(SimctlOp::Boot, udid)
            .map(drop)
    }

    /// Shut an instance down. Already-shutdown instances are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] on any other failure.
    pub fn shutdown(&self, udid: &str) -> Result<()> {
        let output = self.runner.shutdown(udid);
        if !output.success && output.stderr.contains("current state: Shutdown") {
            return Ok(());
        }
        output.into_result(SimctlOp::Shutdown, udid).map(drop)
    }

    /// Delete an instance
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] on a nonzero exit.
    pub fn delete(&self, udid: &str) -> Result<()> {
        self.runner
            .delete(udid)
            .into_result(SimctlOp::Delete, udid)
            .map(drop)
    }

    /// Install an app bundle
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] on a nonzero exit.
    pub fn install(&self, udid: &str, app: &Path) -> Result<()> {
        self.runner
            .install(udid, app)
            .into_result(SimctlOp::Install, udid)
            .map(drop)
    }

    /// Uninstall an app
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] on a nonzero exit.
    pub fn uninstall(&self, udid: &str, bundle_id: &str) -> Result<()> {
        self.runner
            .uninstall(udid, bundle_id)
            .into_result(SimctlOp::Uninstall, udid)
            .map(drop)
    }

    /// Launch an app
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] on a nonzero exit.
    pub fn launch(&self, udid: &str, bundle_id: &str) -> Result<()> {
        self.runner
            .launch(udid, bundle_id)
            .into_result(SimctlOp::Launch, udid)
            .map(drop)
    }

    /// Terminate an app
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] on a nonzero exit.
    pub fn terminate(&self, udid: &str, bundle_id: &str) -> Result<()> {
        self.runner
            .terminate(udid, bundle_id)
            .into_result(SimctlOp::Terminate, udid)
            .map(drop)
    }

    /// Sandbox data container of an installed app
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] on a nonzero exit.
    pub fn app_data_path(&self, udid: &str, bundle_id: &str) -> Result<PathBuf> {
        let stdout = self
            .runner
            .app_container(udid, bundle_id)
            .into_result(SimctlOp::AppContainer, udid)?;
        Ok(PathBuf::from(stdout.trim()))
    }
}

/// Exact-name match among available instances, preferring the newest runtime.
fn find_instance<'a>(
    instances: &'a DeviceList,
    runtimes: &[Runtime],
    name: &str,
) -> Option<&'a SimDevice> {
    let rank = |runtime_id: &str| {
        runtimes
            .iter()
            .position(|r| r.identifier == runtime_id)
            .unwrap_or(usize::MAX)
    };
    instances
        .devices
        .iter()
        .flat_map(|(runtime_id, devices)| devices.iter().map(move |d| (runtime_id, d)))
        .filter(|(_, d)| d.is_available && d.name == name)
        .min_by(|(ra, a), (rb, b)| match rank(ra).cmp(&rank(rb)) {
            Ordering::Equal => a.udid.cmp(&b.udid),
            other => other,
        })
        .map(|(_, d)| d)
}

/// First runtime (newest first) supporting a device type named `name`.
fn find_device_type<'a>(
    runtimes: &'a [Runtime],
    name: &str,
) -> Option<(&'a DeviceType, &'a Runtime)> {
    runtimes.iter().find_map(|runtime| {
        runtime
            .supported_device_types
            .iter()
            .find(|dt| dt.name == name)
            .map(|dt| (dt, runtime))
    })
}
