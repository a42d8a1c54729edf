//! Simulator instance lifecycle
//!
//! Booted instances are shared host resources. Every instance the generator
//! boots is registered in a [`BootRegistry`] and wrapped in an
//! [`InstanceGuard`] that terminates the probe, uninstalls it and shuts the
//! instance down on every exit path, including early returns and panics.
//! The registry lets a signal handler shut down whatever is still in flight.

use crate::command::SimctlRunner;
use crate::error::Result;
use crate::simulator::{DeviceState, InstanceHandle, Simulators};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// Global registry used by the CLI signal handler
static GLOBAL_REGISTRY: OnceLock<Arc<BootRegistry>> = OnceLock::new();

/// Set of instance UDIDs currently booted by this process
#[derive(Debug, Default)]
pub struct BootRegistry {
    udids: Mutex<Vec<String>>,
}

impl BootRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(Self::new())))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.udids
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Track a booted instance
    pub fn register(&self, udid: &str) {
        let mut udids = self.lock();
        if !udids.iter().any(|u| u == udid) {
            udids.push(udid.to_string());
        }
    }

    /// Stop tracking an instance
    pub fn unregister(&self, udid: &str) {
        self.lock().retain(|u| u != udid);
    }

    /// Currently tracked UDIDs
    #[must_use]
    pub fn registered(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Shut down every tracked instance and clear the registry.
    ///
    /// Returns the number of instances shut down successfully.
    #[must_use]
    pub fn shutdown_all<R: SimctlRunner>(&self, runner: &R) -> usize {
        let udids = std::mem::take(&mut *self.lock());
        udids
            .iter()
            .filter(|udid| {
                let output = runner.shutdown(udid);
                if !output.success {
                    tracing::warn!(udid = %udid, stderr = %output.stderr.trim(), "shutdown failed");
                }
                output.success
            })
            .count()
    }
}

/// RAII owner of one instance for the duration of one extraction
///
/// If the guard is dropped without [`InstanceGuard::release`], teardown runs
/// from `Drop`.
pub struct InstanceGuard<'a, R: SimctlRunner> {
    sims: &'a Simulators<R>,
    registry: &'a BootRegistry,
    udid: String,
    bundle_id: String,
    installed: bool,
    delete_on_release: bool,
    released: bool,
}

impl<'a, R: SimctlRunner> InstanceGuard<'a, R> {
    /// Take ownership of an instance and bring it to a freshly booted state.
    ///
    /// A non-shutdown instance is shut down first. If booting fails the
    /// guard is dropped, which still returns the instance to `Shutdown`.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial shutdown or the boot fails.
    pub fn boot(
        sims: &'a Simulators<R>,
        registry: &'a BootRegistry,
        handle: &InstanceHandle,
        bundle_id: &str,
        delete_on_release: bool,
    ) -> Result<Self> {
        let guard = Self {
            sims,
            registry,
            udid: handle.udid.clone(),
            bundle_id: bundle_id.to_string(),
            installed: false,
            delete_on_release: delete_on_release && handle.created,
            released: false,
        };

        if handle.state != DeviceState::Shutdown {
            tracing::debug!(udid = %guard.udid, state = %handle.state, "shutting down before boot");
            sims.shutdown(&guard.udid)?;
        }
        registry.register(&guard.udid);
        sims.boot(&guard.udid)?;
        tracing::debug!(udid = %guard.udid, "booted");
        Ok(guard)
    }

    /// Install the probe bundle
    ///
    /// # Errors
    ///
    /// Returns an error if simctl install fails.
    pub fn install(&mut self, app: &Path) -> Result<()> {
        // Marked before the call so a half-finished install is still removed.
        self.installed = true;
        self.sims.install(&self.udid, app)
    }

    /// Terminate and uninstall the probe, then shut down (and optionally
    /// delete) the instance. Failures are logged, not returned.
    pub fn release(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.installed {
            if let Err(e) = self.sims.terminate(&self.udid, &self.bundle_id) {
                tracing::debug!(udid = %self.udid, error = %e, "terminate");
            }
            if let Err(e) = self.sims.uninstall(&self.udid, &self.bundle_id) {
                tracing::warn!(udid = %self.udid, error = %e, "uninstall failed");
            }
        }
        match self.sims.shutdown(&self.udid) {
            Ok(()) => {
                self.registry.unregister(&self.udid);
                tracing::debug!(udid = %self.udid, "shut down");
            }
            Err(e) => tracing::warn!(udid = %self.udid, error = %e, "shutdown failed"),
        }
        if self.delete_on_release {
            match self.sims.delete(&self.udid) {
                Ok(()) => tracing::debug!(udid = %self.udid, "deleted"),
                Err(e) => tracing::warn!(udid = %self.udid, error = %e, "delete failed"),
            }
        }
    }
}

impl<R: SimctlRunner> Drop for InstanceGuard<'_, R> {
    fn drop(&mut self) {
        self.teardown();
    }
}
