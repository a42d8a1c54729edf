//! Merge engine
//!
//! Folds a run's measurements and failures back into the registry. The
//! result keeps partition exclusivity: every identifier ends up in exactly
//! one of `devices`, `pending` or `problematic`, and `pending` is empty.

use crate::category::Category;
use crate::natural::NaturalKey;
use crate::registry::{DeviceEntry, NamedEntry, Registry};
use serde::{Deserialize, Serialize};

/// A successfully measured device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredDevice {
    /// Model identifier
    pub identifier: String,
    /// Friendly device name
    pub name: String,
    /// Corner radius in points
    pub bezel: f64,
}

/// A device that could not be provisioned or measured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unresolved {
    /// Model identifier
    pub identifier: String,
    /// Friendly device name, empty when unknown
    pub name: String,
    /// Why the device was not measured
    pub reason: String,
}

/// Merge measurements and failures into `registry`.
///
/// - Measurements are upserted into `devices` under the category derived
///   from their name. An identifier moves out of every other category and
///   out of `pending` and `problematic`.
/// - A measurement whose category cannot be derived goes to `problematic`.
/// - Unresolved identifiers not already measured go to `problematic`.
/// - Leftover `pending` entries that were not attempted also go to
///   `problematic`, so nothing is dropped.
///
/// An empty incoming name never overwrites a known one.
#[must_use]
pub fn merge(
    mut registry: Registry,
    measurements: &[MeasuredDevice],
    unresolved: &[Unresolved],
) -> Registry {
    for measured in measurements {
        let key = NaturalKey::from(measured.identifier.as_str());
        let name = if measured.name.is_empty() {
            known_name(&registry, &key)
        } else {
            measured.name.clone()
        };

        let Some(category) = Category::classify(&name, &measured.identifier) else {
            tracing::warn!(
                identifier = %measured.identifier,
                name = %name,
                "no category for measured device, marking problematic"
            );
            remove_device(&mut registry, &key);
            registry.pending.remove(&key);
            registry.problematic.insert(key, NamedEntry::new(name));
            continue;
        };

        remove_device(&mut registry, &key);
        registry.pending.remove(&key);
        registry.problematic.remove(&key);
        registry.devices.entry(category).or_default().insert(
            key,
            DeviceEntry {
                name,
                bezel: measured.bezel,
            },
        );
    }

    for failed in unresolved {
        let key = NaturalKey::from(failed.identifier.as_str());
        if registry.contains_device(key.as_str()) {
            registry.pending.remove(&key);
            registry.problematic.remove(&key);
            continue;
        }
        let name = if failed.name.is_empty() {
            known_name(&registry, &key)
        } else {
            failed.name.clone()
        };
        registry.pending.remove(&key);
        registry.problematic.insert(key, NamedEntry::new(name));
    }

    for (key, entry) in std::mem::take(&mut registry.pending) {
        if !registry.contains_device(key.as_str()) {
            registry.problematic.entry(key).or_insert(entry);
        }
    }

    let measured: Vec<NaturalKey> = registry
        .problematic
        .keys()
        .filter(|key| registry.contains_device(key.as_str()))
        .cloned()
        .collect();
    for key in measured {
        registry.problematic.remove(&key);
    }

    registry.devices.retain(|_, entries| !entries.is_empty());
    registry
}

/// Name recorded for `key` in any partition, or `""`.
fn known_name(registry: &Registry, key: &NaturalKey) -> String {
    registry
        .device(key.as_str())
        .map(|(_, entry)| entry.name.clone())
        .or_else(|| registry.pending.get(key).map(|e| e.name.clone()))
        .or_else(|| registry.problematic.get(key).map(|e| e.name.clone()))
        .unwrap_or_default()
}

fn remove_device(registry: &mut Registry, key: &NaturalKey) {
    for entries in registry.devices.values_mut() {
        entries.remove(key);
    }
}
