//! Device registry store
//!
//! The registry is the canonical, human-edited JSON document. It has three
//! partitions and every identifier belongs to exactly one of them:
//!
//! - `devices`: measured devices grouped by [`Category`]
//! - `pending`: identifiers added by hand, awaiting extraction
//! - `problematic`: identifiers that could not be resolved or measured

use crate::category::Category;
use crate::error::{Error, Result};
use crate::natural::NaturalKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Measured device entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Friendly device name
    pub name: String,
    /// Corner radius in points. Zero means square corners.
    pub bezel: f64,
}

/// Entry in `pending` or `problematic`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntry {
    /// Friendly device name, empty when unknown
    #[serde(default)]
    pub name: String,
}

impl NamedEntry {
    /// Create an entry
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Measured devices by category, then identifier
pub type DeviceMap = BTreeMap<Category, BTreeMap<NaturalKey, DeviceEntry>>;

/// Registry partition an identifier was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// `devices`
    Devices,
    /// `pending`
    Pending,
    /// `problematic`
    Problematic,
}

/// A device that still needs extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDevice {
    /// Model identifier
    pub identifier: String,
    /// Friendly device name
    pub name: String,
    /// Where the identifier came from
    pub origin: Partition,
}

/// The full registry document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    /// Measured devices
    #[serde(default)]
    pub devices: DeviceMap,
    /// Awaiting extraction
    #[serde(default)]
    pub pending: BTreeMap<NaturalKey, NamedEntry>,
    /// Failed resolution or extraction
    #[serde(default)]
    pub problematic: BTreeMap<NaturalKey, NamedEntry>,
}

impl Registry {
    /// Load the registry from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryNotFound`] if the file is missing,
    /// [`Error::RegistryParse`] if it is not valid registry JSON and
    /// [`Error::RegistryInvalid`] if a bezel value is negative or an
    /// identifier is measured in more than one category.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::RegistryNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&content).map_err(|source| Error::RegistryParse {
            path: path.to_path_buf(),
            source,
        })?;
        registry
            .validate()
            .map_err(|reason| Error::RegistryInvalid {
                path: path.to_path_buf(),
                reason,
            })?;

        for conflict in registry.conflicts() {
            tracing::warn!(identifier = %conflict, "identifier present in more than one partition");
        }
        tracing::debug!(
            path = %path.display(),
            devices = registry.device_count(),
            pending = registry.pending.len(),
            problematic = registry.problematic.len(),
            "loaded registry"
        );
        Ok(registry)
    }

    /// Parse a registry from JSON text
    ///
    /// # Errors
    ///
    /// Returns the serde error if the document does not match the schema.
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Check value invariants that the schema cannot express.
    ///
    /// Overlap between `devices` and the other partitions is tolerated here
    /// since [`crate::merge`] resolves it; an identifier measured under two
    /// categories is not, because the lookup table could not be built.
    ///
    /// # Errors
    ///
    /// Returns a description of the first offending entry.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut seen: BTreeMap<&NaturalKey, Category> = BTreeMap::new();
        for (category, entries) in &self.devices {
            for (identifier, entry) in entries {
                if !entry.bezel.is_finite() || entry.bezel < 0.0 {
                    return Err(format!(
                        "{category}/{identifier} has invalid bezel {}",
                        entry.bezel
                    ));
                }
                if let Some(first) = seen.insert(identifier, *category) {
                    return Err(format!(
                        "{identifier} is measured under both {first} and {category}"
                    ));
                }
            }
        }
        Ok(())
    }

    /// Identifiers still needing extraction, retrying problematic ones.
    #[must_use]
    pub fn diff_pending(&self) -> Vec<PendingDevice> {
        self.diff(true)
    }

    /// Identifiers in `pending` (and optionally `problematic`) that are not
    /// already measured.
    ///
    /// If an identifier is in both `pending` and `problematic`, the pending
    /// entry wins. The result is in natural key order.
    #[must_use]
    pub fn diff(&self, include_problematic: bool) -> Vec<PendingDevice> {
        let mut work: BTreeMap<&NaturalKey, PendingDevice> = BTreeMap::new();

        if include_problematic {
            for (identifier, entry) in &self.problematic {
                work.insert(
                    identifier,
                    PendingDevice {
                        identifier: identifier.to_string(),
                        name: entry.name.clone(),
                        origin: Partition::Problematic,
                    },
                );
            }
        }
        for (identifier, entry) in &self.pending {
            work.insert(
                identifier,
                PendingDevice {
                    identifier: identifier.to_string(),
                    name: entry.name.clone(),
                    origin: Partition::Pending,
                },
            );
        }

        work.into_iter()
            .filter(|(identifier, _)| !self.contains_device(identifier.as_str()))
            .map(|(_, device)| device)
            .collect()
    }

    /// Whether `identifier` is measured in any category
    #[must_use]
    pub fn contains_device(&self, identifier: &str) -> bool {
        self.device(identifier).is_some()
    }

    /// Find a measured device by identifier
    #[must_use]
    pub fn device(&self, identifier: &str) -> Option<(Category, &DeviceEntry)> {
        let key = NaturalKey::from(identifier);
        self.devices
            .iter()
            .find_map(|(category, entries)| entries.get(&key).map(|entry| (*category, entry)))
    }

    /// Total number of measured devices
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.values().map(BTreeMap::len).sum()
    }

    /// Partitions containing `identifier`, with one entry per category hit.
    #[must_use]
    pub fn partitions_of(&self, identifier: &str) -> Vec<Partition> {
        let key = NaturalKey::from(identifier);
        let mut found: Vec<Partition> = self
            .devices
            .values()
            .filter(|entries| entries.contains_key(&key))
            .map(|_| Partition::Devices)
            .collect();
        if self.pending.contains_key(&key) {
            found.push(Partition::Pending);
        }
        if self.problematic.contains_key(&key) {
            found.push(Partition::Problematic);
        }
        found
    }

    /// Identifiers that violate partition exclusivity, in natural order.
    #[must_use]
    pub fn conflicts(&self) -> Vec<NaturalKey> {
        let all: BTreeSet<&NaturalKey> = self
            .devices
            .values()
            .flat_map(BTreeMap::keys)
            .chain(self.pending.keys())
            .chain(self.problematic.keys())
            .collect();
        all.into_iter()
            .filter(|key| self.partitions_of(key.as_str()).len() > 1)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "devices": {
            "iPhone": {
                "iPhone10,3": {"name": "iPhone X", "bezel": 39.0},
                "iPhone9,1": {"name": "iPhone 7", "bezel": 0}
            },
            "iPad": {
                "iPad13,8": {"name": "iPad Pro (12.9-inch) (5th generation)", "bezel": 18.0}
            }
        },
        "pending": {
            "iPhone14,2": {"name": "iPhone 13 Pro"},
            "iPhone10,3": {"name": "iPhone X"}
        },
        "problematic": {
            "iPadXX,1": {"name": "iPad Imaginary"},
            "iPhone14,2": {"name": "stale name"}
        }
    }"#;

    #[test]
    fn test_parse_sample() {
        let registry = Registry::from_json(SAMPLE).unwrap();
        assert_eq!(registry.device_count(), 3);
        assert_eq!(registry.pending.len(), 2);
        assert_eq!(registry.problematic.len(), 2);
        let (category, entry) = registry.device("iPhone9,1").unwrap();
        assert_eq!(category, Category::IPhone);
        assert!(entry.bezel.abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_partitions_default_empty() {
        let registry = Registry::from_json(r#"{"devices": {}}"#).unwrap();
        assert!(registry.pending.is_empty());
        assert!(registry.problematic.is_empty());
    }

    #[test]
    fn test_unknown_category_rejected() {
        let result = Registry::from_json(r#"{"devices": {"TV": {}}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_diff_pending_skips_measured_and_retries_problematic() {
        let registry = Registry::from_json(SAMPLE).unwrap();
        let work = registry.diff_pending();
        let ids: Vec<&str> = work.iter().map(|d| d.identifier.as_str()).collect();
        assert_eq!(ids, vec!["iPadXX,1", "iPhone14,2"]);
        assert_eq!(work[0].origin, Partition::Problematic);

        // Pending name wins over the problematic duplicate
        assert_eq!(work[1].name, "iPhone 13 Pro");
        assert_eq!(work[1].origin, Partition::Pending);
    }

    #[test]
    fn test_diff_without_problematic() {
        let registry = Registry::from_json(SAMPLE).unwrap();
        let work = registry.diff(false);
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].identifier, "iPhone14,2");
    }

    #[test]
    fn test_diff_empty_registry() {
        assert!(Registry::default().diff_pending().is_empty());
    }

    #[test]
    fn test_conflicts() {
        let registry = Registry::from_json(SAMPLE).unwrap();
        let conflicts: Vec<String> = registry
            .conflicts()
            .into_iter()
            .map(NaturalKey::into_inner)
            .collect();
        assert_eq!(conflicts, vec!["iPhone10,3", "iPhone14,2"]);
        assert_eq!(
            registry.partitions_of("iPhone10,3"),
            vec![Partition::Devices, Partition::Pending]
        );
    }

    #[test]
    fn test_validate_negative_bezel() {
        let registry = Registry::from_json(
            r#"{"devices": {"iPhone": {"iPhone1,1": {"name": "iPhone", "bezel": -1.0}}}}"#,
        )
        .unwrap();
        let err = registry.validate().unwrap_err();
        assert!(err.contains("iPhone1,1"));
    }

    #[test]
    fn test_validate_cross_category_duplicate() {
        let registry = Registry::from_json(
            r#"{"devices": {
                "iPhone": {"X1,1": {"name": "Thing", "bezel": 1.0}},
                "iPad": {"X1,1": {"name": "Thing", "bezel": 2.0}}
            }}"#,
        )
        .unwrap();
        let err = registry.validate().unwrap_err();
        assert!(err.contains("X1,1"));
        assert!(err.contains("iPhone") && err.contains("iPad"));
    }

    #[test]
    fn test_load_cross_category_duplicate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"devices": {{"iPhone": {{"X1,1": {{"name": "a", "bezel": 1}}}}, "iPod": {{"X1,1": {{"name": "a", "bezel": 1}}}}}}}}"#
        )
        .unwrap();
        let err = Registry::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::RegistryInvalid { .. }));
    }

    #[test]
    fn test_load_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Registry::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, Error::RegistryNotFound(_)));
    }

    #[test]
    fn test_load_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = Registry::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::RegistryParse { .. }));
    }

    #[test]
    fn test_load_invalid_bezel() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"devices": {{"iPad": {{"iPad1,1": {{"name": "iPad", "bezel": -3}}}}}}}}"#
        )
        .unwrap();
        let err = Registry::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::RegistryInvalid { .. }));
    }

    #[test]
    fn test_load_roundtrip_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{SAMPLE}").unwrap();
        let loaded = Registry::load(file.path()).unwrap();
        assert_eq!(loaded, Registry::from_json(SAMPLE).unwrap());
    }
}
