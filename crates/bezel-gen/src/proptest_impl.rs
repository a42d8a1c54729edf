//! Proptest strategies for registry and merge inputs

use crate::category::Category;
use crate::merge::{MeasuredDevice, Unresolved};
use crate::natural::NaturalKey;
use crate::registry::{DeviceEntry, NamedEntry, Registry};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for model identifiers like `iPhone14,2`
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["iPhone", "iPad", "iPod", "Watch"]),
        1u32..20,
        1u32..12,
    )
        .prop_map(|(family, major, minor)| format!("{family}{major},{minor}"))
}

/// Plausible friendly name for an identifier, classifiable into its family
pub fn name_for(identifier: &str) -> String {
    let family = identifier
        .split(|c: char| c.is_ascii_digit())
        .next()
        .unwrap_or_default();
    let generation = identifier
        .trim_start_matches(family)
        .split(',')
        .next()
        .unwrap_or_default();
    match family {
        "Watch" => format!("Apple Watch Series {generation}"),
        "iPod" => format!("iPod touch ({generation}th generation)"),
        other => format!("{other} {generation}"),
    }
}

/// Strategy for bezel values, biased towards square corners
pub fn bezel_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        1 => Just(0.0),
        3 => (0u32..6000).prop_map(|centi| f64::from(centi) / 100.0),
    ]
}

/// Strategy for measurements with classifiable names
pub fn measured_strategy() -> impl Strategy<Value = MeasuredDevice> {
    (identifier_strategy(), bezel_strategy()).prop_map(|(identifier, bezel)| MeasuredDevice {
        name: name_for(&identifier),
        identifier,
        bezel,
    })
}

/// Strategy for failed devices, sometimes with unknown names
pub fn unresolved_strategy() -> impl Strategy<Value = Unresolved> {
    (identifier_strategy(), any::<bool>()).prop_map(|(identifier, named)| Unresolved {
        name: if named { name_for(&identifier) } else { String::new() },
        identifier,
        reason: "no runtime".to_string(),
    })
}

/// Strategy for registries that respect partition exclusivity
pub fn registry_strategy() -> impl Strategy<Value = Registry> {
    prop::collection::vec((identifier_strategy(), 0u8..3, bezel_strategy()), 0..24).prop_map(
        |entries| {
            let mut seen = BTreeSet::new();
            let mut registry = Registry::default();
            for (identifier, partition, bezel) in entries {
                if !seen.insert(identifier.clone()) {
                    continue;
                }
                let name = name_for(&identifier);
                let key = NaturalKey::from(identifier.as_str());
                match partition {
                    0 => {
                        let category =
                            Category::classify(&name, &identifier).unwrap_or(Category::IPhone);
                        registry
                            .devices
                            .entry(category)
                            .or_default()
                            .insert(key, DeviceEntry { name, bezel });
                    }
                    1 => {
                        registry.pending.insert(key, NamedEntry::new(name));
                    }
                    _ => {
                        registry.problematic.insert(key, NamedEntry::new(name));
                    }
                }
            }
            registry
        },
    )
}

/// All identifiers in any partition
pub fn all_identifiers(registry: &Registry) -> BTreeSet<String> {
    registry
        .devices
        .values()
        .flat_map(|entries| entries.keys())
        .chain(registry.pending.keys())
        .chain(registry.problematic.keys())
        .map(ToString::to_string)
        .collect()
}
