//! Display corner radius lookup for Apple devices
//!
//! Maps hardware model identifiers such as `iPhone14,2` to the corner radius
//! of the device's display, in points. The table is generated by
//! `bezel-gen` and embedded at compile time.
//!
//! ```
//! let radius = bezel::lookup("iPhone14,2")?;
//! assert_eq!(radius, Some(47.33));
//!
//! let fallback = bezel::Fallback::new(10.0);
//! assert_eq!(bezel::resolve("iPhone1,1", fallback)?, 10.0);
//! # Ok::<(), bezel::Error>(())
//! ```
//!
//! A radius of `0.0` is a real value meaning square corners. Whether to
//! substitute something else for it is the caller's choice, see
//! [`Fallback::if_zero`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::doc_markdown)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::float_cmp))]

pub mod error;

pub use error::{Error, Result};

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Distributable artifact shipped with the crate
pub const EMBEDDED_JSON: &str = include_str!("../data/bezel.min.json");

/// Environment variable the simulator sets to the simulated model identifier
pub const SIMULATOR_MODEL_ENV: &str = "SIMULATOR_MODEL_IDENTIFIER";

static EMBEDDED: OnceLock<std::result::Result<BezelTable, String>> = OnceLock::new();

/// Per-device entry in the distributable JSON
#[derive(Debug, Deserialize)]
struct RawEntry {
    bezel: f64,
}

/// Top level of the distributable JSON
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    devices: BTreeMap<String, BTreeMap<String, RawEntry>>,
}

/// Consumer policy for missing and zero radii
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fallback {
    /// Returned when the identifier is unknown
    pub if_missing: f64,
    /// Returned instead of a stored `0.0`; `None` keeps the zero
    pub if_zero: Option<f64>,
}

impl Fallback {
    /// Fall back for unknown identifiers, keep zeros
    #[must_use]
    pub const fn new(if_missing: f64) -> Self {
        Self {
            if_missing,
            if_zero: None,
        }
    }

    /// Also replace stored zeros
    #[must_use]
    pub const fn with_zero(mut self, if_zero: f64) -> Self {
        self.if_zero = Some(if_zero);
        self
    }
}

impl Default for Fallback {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Flattened identifier → radius table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BezelTable {
    radii: HashMap<String, f64>,
}

impl BezelTable {
    /// Parse a distributable artifact, flattening its categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the artifact format, a
    /// radius is negative or not finite, or an identifier is listed twice.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawTable = serde_json::from_str(json)?;
        let mut radii = HashMap::new();
        for entries in raw.devices.into_values() {
            for (identifier, entry) in entries {
                if !entry.bezel.is_finite() || entry.bezel < 0.0 {
                    return Err(Error::InvalidValue {
                        identifier,
                        value: entry.bezel,
                    });
                }
                if radii.insert(identifier.clone(), entry.bezel).is_some() {
                    return Err(Error::Duplicate(identifier));
                }
            }
        }
        Ok(Self { radii })
    }

    /// The table compiled into the crate, parsed on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Embedded`] if the compiled-in artifact does not
    /// parse. The failure is cached, so every call reports it.
    pub fn embedded() -> Result<&'static Self> {
        EMBEDDED
            .get_or_init(|| Self::from_json(EMBEDDED_JSON).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|reason| Error::Embedded(reason.clone()))
    }

    /// Radius for `identifier`, if known
    #[must_use]
    pub fn lookup(&self, identifier: &str) -> Option<f64> {
        self.radii.get(identifier.trim()).copied()
    }

    /// Radius for `identifier` after applying `fallback`
    #[must_use]
    pub fn resolve(&self, identifier: &str, fallback: Fallback) -> f64 {
        match self.lookup(identifier) {
            None => fallback.if_missing,
            Some(r) if r == 0.0 => fallback.if_zero.unwrap_or(r),
            Some(r) => r,
        }
    }

    /// Number of identifiers
    #[must_use]
    pub fn len(&self) -> usize {
        self.radii.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.radii.is_empty()
    }

    /// Identifiers in the table, unordered
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.radii.keys().map(String::as_str)
    }
}

/// Radius for `identifier` from the embedded table
///
/// # Errors
///
/// Returns [`Error::Embedded`] if the embedded table is unusable.
pub fn lookup(identifier: &str) -> Result<Option<f64>> {
    Ok(BezelTable::embedded()?.lookup(identifier))
}

/// Radius for `identifier` from the embedded table, with `fallback` applied
///
/// # Errors
///
/// Returns [`Error::Embedded`] if the embedded table is unusable.
pub fn resolve(identifier: &str, fallback: Fallback) -> Result<f64> {
    Ok(BezelTable::embedded()?.resolve(identifier, fallback))
}

/// Model identifier of the simulated device, when running in a simulator
///
/// Reads [`SIMULATOR_MODEL_ENV`]. Returns `None` on real hardware or when the
/// variable is empty.
#[must_use]
pub fn current_identifier() -> Option<String> {
    std::env::var(SIMULATOR_MODEL_ENV)
        .ok()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

/// Radius of the current device from the embedded table, with `fallback`
/// applied. Unknown devices get `fallback.if_missing`.
///
/// # Errors
///
/// Returns [`Error::Embedded`] if the embedded table is unusable.
pub fn current(fallback: Fallback) -> Result<f64> {
    match current_identifier() {
        Some(id) => resolve(&id, fallback),
        None => Ok(fallback.if_missing),
    }
}
