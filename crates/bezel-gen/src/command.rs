//! simctl execution abstraction for testability
//!
//! Every interaction with the device-management tool goes through the
//! [`SimctlRunner`] trait so the pipeline can run against
//! [`MockSimctlRunner`] instead of a real `xcrun simctl`.

use crate::error::{Error, Result};
use crate::simulator::{DeviceList, DeviceState, DeviceType, Runtime, RuntimeList, SimDevice};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Default bundle identifier of the probe application
pub const DEFAULT_BUNDLE_ID: &str = "com.bezel.probe";

/// Default location of the probe's measurement file inside its data container
pub const DEFAULT_MEASUREMENT_FILE: &str = "Documents/bezel.json";

/// Result of executing a command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code (negative for signals)
    pub exit_code: i32,
    /// Whether the command succeeded
    pub success: bool,
}

impl CommandOutput {
    /// Create a successful command output
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            success: true,
        }
    }

    /// Create a failed command output
    #[must_use]
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            success: false,
        }
    }

    /// Stdout on success, [`Error::CommandFailed`] otherwise
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandFailed`] when the command did not succeed.
    pub fn into_result(self, op: SimctlOp, target: &str) -> Result<String> {
        if self.success {
            Ok(self.stdout)
        } else {
            let command = if target.is_empty() {
                format!("simctl {op}")
            } else {
                format!("simctl {op} {target}")
            };
            Err(Error::CommandFailed {
                command,
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// simctl subcommands used by the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimctlOp {
    /// `list devices --json`
    ListDevices,
    /// `list runtimes --json`
    ListRuntimes,
    /// `create`
    Create,
    /// `boot`
    Boot,
    /// `shutdown`
    Shutdown,
    /// `delete`
    Delete,
    /// `install`
    Install,
    /// `uninstall`
    Uninstall,
    /// `launch`
    Launch,
    /// `terminate`
    Terminate,
    /// `get_app_container ... data`
    AppContainer,
}

impl fmt::Display for SimctlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ListDevices => "list devices",
            Self::ListRuntimes => "list runtimes",
            Self::Create => "create",
            Self::Boot => "boot",
            Self::Shutdown => "shutdown",
            Self::Delete => "delete",
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Launch => "launch",
            Self::Terminate => "terminate",
            Self::AppContainer => "get_app_container",
        };
        f.write_str(s)
    }
}

/// Trait for driving the simulator device manager
///
/// This abstraction allows for mocking simctl in tests.
pub trait SimctlRunner: Send + Sync {
    /// `simctl list devices --json`
    fn list_devices(&self) -> CommandOutput;

    /// `simctl list runtimes --json`
    fn list_runtimes(&self) -> CommandOutput;

    /// `simctl create <name> <device type> <runtime>`, printing the new UDID
    fn create(&self, name: &str, device_type: &str, runtime: &str) -> CommandOutput;

    /// `simctl boot <udid>`
    fn boot(&self, udid: &str) -> CommandOutput;

    /// `simctl shutdown <udid>`
    fn shutdown(&self, udid: &str) -> CommandOutput;

    /// `simctl delete <udid>`
    fn delete(&self, udid: &str) -> CommandOutput;

    /// `simctl install <udid> <app>`
    fn install(&self, udid: &str, app: &Path) -> CommandOutput;

    /// `simctl uninstall <udid> <bundle id>`
    fn uninstall(&self, udid: &str, bundle_id: &str) -> CommandOutput;

    /// `simctl launch <udid> <bundle id>`
    fn launch(&self, udid: &str, bundle_id: &str) -> CommandOutput;

    /// `simctl terminate <udid> <bundle id>`
    fn terminate(&self, udid: &str, bundle_id: &str) -> CommandOutput;

    /// `simctl get_app_container <udid> <bundle id> data`
    fn app_container(&self, udid: &str, bundle_id: &str) -> CommandOutput;
}

impl<R: SimctlRunner + ?Sized> SimctlRunner for &R {
    fn list_devices(&self) -> CommandOutput {
        (**self).list_devices()
    }
    fn list_runtimes(&self) -> CommandOutput {
        (**self).list_runtimes()
    }
    fn create(&self, name: &str, device_type: &str, runtime: &str) -> CommandOutput {
        (**self).create(name, device_type, runtime)
    }
    fn boot(&self, udid: &str) -> CommandOutput {
        (**self).boot(udid)
    }
    fn shutdown(&self, udid: &str) -> CommandOutput {
        (**self).shutdown(udid)
    }
    fn delete(&self, udid: &str) -> CommandOutput {
        (**self).delete(udid)
    }
    fn install(&self, udid: &str, app: &Path) -> CommandOutput {
        (**self).install(udid, app)
    }
    fn uninstall(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        (**self).uninstall(udid, bundle_id)
    }
    fn launch(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        (**self).launch(udid, bundle_id)
    }
    fn terminate(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        (**self).terminate(udid, bundle_id)
    }
    fn app_container(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        (**self).app_container(udid, bundle_id)
    }
}

/// Real runner that shells out to `xcrun simctl`
#[derive(Debug, Clone)]
pub struct RealSimctlRunner {
    /// Path to the xcrun binary (default: "xcrun")
    pub xcrun_binary: String,
}

impl Default for RealSimctlRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl RealSimctlRunner {
    /// Create a runner using `xcrun` from `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self {
            xcrun_binary: "xcrun".to_string(),
        }
    }

    /// Create with a custom xcrun binary path
    #[must_use]
    pub fn with_binary(xcrun_binary: impl Into<String>) -> Self {
        Self {
            xcrun_binary: xcrun_binary.into(),
        }
    }

    fn execute(&self, args: &[&str]) -> CommandOutput {
        use std::process::Command;

        tracing::trace!(binary = %self.xcrun_binary, ?args, "simctl");
        match Command::new(&self.xcrun_binary)
            .arg("simctl")
            .args(args)
            .output()
        {
            Ok(output) => CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                success: output.status.success(),
            },
            Err(e) => CommandOutput::failure(-1, format!("Failed to execute command: {e}")),
        }
    }
}

impl SimctlRunner for RealSimctlRunner {
    fn list_devices(&self) -> CommandOutput {
        self.execute(&["list", "devices", "--json"])
    }

    fn list_runtimes(&self) -> CommandOutput {
        self.execute(&["list", "runtimes", "--json"])
    }

    fn create(&self, name: &str, device_type: &str, runtime: &str) -> CommandOutput {
        self.execute(&["create", name, device_type, runtime])
    }

    fn boot(&self, udid: &str) -> CommandOutput {
        self.execute(&["boot", udid])
    }

    fn shutdown(&self, udid: &str) -> CommandOutput {
        self.execute(&["shutdown", udid])
    }

    fn delete(&self, udid: &str) -> CommandOutput {
        self.execute(&["delete", udid])
    }

    fn install(&self, udid: &str, app: &Path) -> CommandOutput {
        let app_str = app.display().to_string();
        self.execute(&["install", udid, &app_str])
    }

    fn uninstall(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        self.execute(&["uninstall", udid, bundle_id])
    }

    fn launch(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        self.execute(&["launch", udid, bundle_id])
    }

    fn terminate(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        self.execute(&["terminate", udid, bundle_id])
    }

    fn app_container(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        self.execute(&["get_app_container", udid, bundle_id, "data"])
    }
}

#[derive(Debug, Default)]
struct MockState {
    devices: BTreeMap<String, Vec<SimDevice>>,
    installed: HashSet<String>,
    running: HashSet<String>,
    calls: Vec<String>,
    next_udid: u32,
}

/// In-memory simulator host for testing
///
/// Tracks instance state, installed apps and every call made. Any installed
/// app is registered under the mock's bundle identifier. Launching the
/// probe on an instance whose device name has a configured measurement writes
/// that measurement into the instance's data container under
/// `container_root`, the way the real probe would.
#[derive(Debug)]
pub struct MockSimctlRunner {
    container_root: PathBuf,
    bundle_id: String,
    measurement_file: String,
    runtimes: Vec<Runtime>,
    measurements: HashMap<String, String>,
    failures: HashSet<SimctlOp>,
    state: Mutex<MockState>,
}

impl MockSimctlRunner {
    /// Create a mock whose app containers live under `container_root`
    #[must_use]
    pub fn new(container_root: impl Into<PathBuf>) -> Self {
        Self {
            container_root: container_root.into(),
            bundle_id: DEFAULT_BUNDLE_ID.to_string(),
            measurement_file: DEFAULT_MEASUREMENT_FILE.to_string(),
            runtimes: Vec::new(),
            measurements: HashMap::new(),
            failures: HashSet::new(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Add an available runtime supporting `(device type id, name)` pairs
    #[must_use]
    pub fn with_runtime(
        mut self,
        identifier: &str,
        name: &str,
        version: &str,
        device_types: &[(&str, &str)],
    ) -> Self {
        self.runtimes.push(Runtime {
            identifier: identifier.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            is_available: true,
            supported_device_types: device_types
                .iter()
                .map(|(id, name)| DeviceType {
                    identifier: (*id).to_string(),
                    name: (*name).to_string(),
                    product_family: name.split_whitespace().next().unwrap_or("").to_string(),
                })
                .collect(),
        });
        self
    }

    /// Mark a previously added runtime as unavailable
    #[must_use]
    pub fn with_unavailable_runtime(mut self, identifier: &str) -> Self {
        for runtime in &mut self.runtimes {
            if runtime.identifier == identifier {
                runtime.is_available = false;
            }
        }
        self
    }

    /// Add an existing instance
    #[must_use]
    pub fn with_device(self, udid: &str, name: &str, runtime: &str, state: DeviceState) -> Self {
        self.lock().devices.entry(runtime.to_string()).or_default().push(SimDevice {
            udid: udid.to_string(),
            name: name.to_string(),
            state,
            is_available: true,
            device_type_identifier: String::new(),
        });
        self
    }

    /// Content the probe writes when launched on an instance named `device_name`
    #[must_use]
    pub fn with_measurement(mut self, device_name: &str, content: impl Into<String>) -> Self {
        self.measurements
            .insert(device_name.to_string(), content.into());
        self
    }

    /// Bundle identifier that `install` registers for any app path
    #[must_use]
    pub fn with_bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
        self.bundle_id = bundle_id.into();
        self
    }

    /// Change the measurement file path relative to the data container
    #[must_use]
    pub fn with_measurement_file(mut self, relative: impl Into<String>) -> Self {
        self.measurement_file = relative.into();
        self
    }

    /// Make every call of `op` fail
    #[must_use]
    pub fn with_failure(mut self, op: SimctlOp) -> Self {
        self.failures.insert(op);
        self
    }

    /// Calls made so far, e.g. `"boot MOCK-0001"`
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Current state of an instance
    #[must_use]
    pub fn device_state(&self, udid: &str) -> Option<DeviceState> {
        self.lock()
            .devices
            .values()
            .flatten()
            .find(|d| d.udid == udid)
            .map(|d| d.state)
    }

    /// Number of instances currently known
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.lock().devices.values().map(Vec::len).sum()
    }

    /// Whether the app is installed on an instance
    #[must_use]
    pub fn is_installed(&self, udid: &str, bundle_id: &str) -> bool {
        self.lock().installed.contains(&app_key(udid, bundle_id))
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn record(&self, op: SimctlOp, args: &[&str]) -> Option<CommandOutput> {
        let mut call = op.to_string();
        for arg in args {
            call.push(' ');
            call.push_str(arg);
        }
        self.lock().calls.push(call);
        self.failures
            .contains(&op)
            .then(|| CommandOutput::failure(1, format!("mock failure: {op}")))
    }

    fn container_of(&self, udid: &str) -> PathBuf {
        self.container_root.join(udid)
    }

    fn with_instance<F>(&self, udid: &str, f: F) -> CommandOutput
    where
        F: FnOnce(&mut SimDevice) -> CommandOutput,
    {
        let mut state = self.lock();
        state
            .devices
            .values_mut()
            .flatten()
            .find(|d| d.udid == udid)
            .map_or_else(
                || CommandOutput::failure(148, format!("Invalid device: {udid}")),
                f,
            )
    }
}

fn app_key(udid: &str, bundle_id: &str) -> String {
    format!("{udid}/{bundle_id}")
}

impl SimctlRunner for MockSimctlRunner {
    fn list_devices(&self) -> CommandOutput {
        if let Some(failed) = self.record(SimctlOp::ListDevices, &[]) {
            return failed;
        }
        let list = DeviceList {
            devices: self.lock().devices.clone(),
        };
        serde_json::to_string(&list).map_or_else(
            |e| CommandOutput::failure(1, e.to_string()),
            CommandOutput::success,
        )
    }

    fn list_runtimes(&self) -> CommandOutput {
        if let Some(failed) = self.record(SimctlOp::ListRuntimes, &[]) {
            return failed;
        }
        let list = RuntimeList {
            runtimes: self.runtimes.clone(),
        };
        serde_json::to_string(&list).map_or_else(
            |e| CommandOutput::failure(1, e.to_string()),
            CommandOutput::success,
        )
    }

    fn create(&self, name: &str, device_type: &str, runtime: &str) -> CommandOutput {
        if let Some(failed) = self.record(SimctlOp::Create, &[name, device_type, runtime]) {
            return failed;
        }
        let mut state = self.lock();
        state.next_udid += 1;
        let udid = format!("MOCK-{:04}", state.next_udid);
        state
            .devices
            .entry(runtime.to_string())
            .or_default()
            .push(SimDevice {
                udid: udid.clone(),
                name: name.to_string(),
                state: DeviceState::Shutdown,
                is_available: true,
                device_type_identifier: device_type.to_string(),
            });
        CommandOutput::success(format!("{udid}\n"))
    }

    fn boot(&self, udid: &str) -> CommandOutput {
        if let Some(failed) = self.record(SimctlOp::Boot, &[udid]) {
            return failed;
        }
        self.with_instance(udid, |device| {
            if device.state == DeviceState::Booted {
                return CommandOutput::failure(
                    149,
                    "Unable to boot device in current state: Booted",
                );
            }
            device.state = DeviceState::Booted;
            CommandOutput::success("")
        })
    }

    fn shutdown(&self, udid: &str) -> CommandOutput {
        if let Some(failed) = self.record(SimctlOp::Shutdown, &[udid]) {
            return failed;
        }
        let output = self.with_instance(udid, |device| {
            if device.state == DeviceState::Shutdown {
                return CommandOutput::failure(
                    149,
                    "Unable to shutdown device in current state: Shutdown",
                );
            }
            device.state = DeviceState::Shutdown;
            CommandOutput::success("")
        });
        let prefix = format!("{udid}/");
        self.lock().running.retain(|key| !key.starts_with(&prefix));
        output
    }

    fn delete(&self, udid: &str) -> CommandOutput {
        if let Some(failed) = self.record(SimctlOp::Delete, &[udid]) {
            return failed;
        }
        let mut state = self.lock();
        let before: usize = state.devices.values().map(Vec::len).sum();
        for devices in state.devices.values_mut() {
            devices.retain(|d| d.udid != udid);
        }
        let after: usize = state.devices.values().map(Vec::len).sum();
        if before == after {
            CommandOutput::failure(148, format!("Invalid device: {udid}"))
        } else {
            CommandOutput::success("")
        }
    }

    fn install(&self, udid: &str, app: &Path) -> CommandOutput {
        let app_str = app.display().to_string();
        if let Some(failed) = self.record(SimctlOp::Install, &[udid, &app_str]) {
            return failed;
        }
        if self.device_state(udid) != Some(DeviceState::Booted) {
            return CommandOutput::failure(149, "Unable to install: device is not booted");
        }
        let key = app_key(udid, &self.bundle_id);
        self.lock().installed.insert(key);
        CommandOutput::success("")
    }

    fn uninstall(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        if let Some(failed) = self.record(SimctlOp::Uninstall, &[udid, bundle_id]) {
            return failed;
        }
        let key = app_key(udid, bundle_id);
        let mut state = self.lock();
        state.running.remove(&key);
        if state.installed.remove(&key) {
            drop(state);
            let _ = std::fs::remove_dir_all(self.container_of(udid));
            CommandOutput::success("")
        } else {
            CommandOutput::failure(1, format!("{bundle_id} is not installed"))
        }
    }

    fn launch(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        if let Some(failed) = self.record(SimctlOp::Launch, &[udid, bundle_id]) {
            return failed;
        }
        let key = app_key(udid, bundle_id);
        let device_name = {
            let state = self.lock();
            if !state.installed.contains(&key) {
                return CommandOutput::failure(4, format!("{bundle_id} is not installed"));
            }
            state
                .devices
                .values()
                .flatten()
                .find(|d| d.udid == udid)
                .map(|d| d.name.clone())
        };
        let Some(device_name) = device_name else {
            return CommandOutput::failure(148, format!("Invalid device: {udid}"));
        };
        self.lock().running.insert(key);

        if let Some(content) = self.measurements.get(&device_name) {
            let path = self.container_of(udid).join(&self.measurement_file);
            let written = path
                .parent()
                .map_or(Ok(()), std::fs::create_dir_all)
                .and_then(|()| std::fs::write(&path, content));
            if let Err(e) = written {
                return CommandOutput::failure(1, e.to_string());
            }
        }
        CommandOutput::success(format!("{bundle_id}: 4242\n"))
    }

    fn terminate(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        if let Some(failed) = self.record(SimctlOp::Terminate, &[udid, bundle_id]) {
            return failed;
        }
        if self.lock().running.remove(&app_key(udid, bundle_id)) {
            CommandOutput::success("")
        } else {
            CommandOutput::failure(3, format!("{bundle_id} is not running"))
        }
    }

    fn app_container(&self, udid: &str, bundle_id: &str) -> CommandOutput {
        if let Some(failed) = self.record(SimctlOp::AppContainer, &[udid, bundle_id]) {
            return failed;
        }
        if !self.is_installed(udid, bundle_id) {
            return CommandOutput::failure(2, format!("{bundle_id} is not installed"));
        }
        let container = self.container_of(udid);
        if let Err(e) = std::fs::create_dir_all(&container) {
            return CommandOutput::failure(1, e.to_string());
        }
        CommandOutput::success(format!("{}\n", container.display()))
    }
}
