//! Device categories and name-prefix classification

use crate::natural::natural_cmp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Device family used as the top-level grouping of the `devices` partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// iPhone handsets
    #[serde(rename = "iPhone")]
    IPhone,
    /// iPad tablets
    #[serde(rename = "iPad")]
    IPad,
    /// iPod touch
    #[serde(rename = "iPod")]
    IPod,
    /// Apple Watch
    #[serde(rename = "Watch")]
    Watch,
}

/// Ordered `(prefix, category)` table. First match wins.
const NAME_PREFIXES: &[(&str, Category)] = &[
    ("iPhone", Category::IPhone),
    ("iPad", Category::IPad),
    ("iPod", Category::IPod),
    ("Apple Watch", Category::Watch),
    ("Watch", Category::Watch),
];

impl Category {
    /// All categories
    pub const ALL: [Self; 4] = [Self::IPhone, Self::IPad, Self::IPod, Self::Watch];

    /// Key used in the registry JSON
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IPhone => "iPhone",
            Self::IPad => "iPad",
            Self::IPod => "iPod",
            Self::Watch => "Watch",
        }
    }

    /// Classify a friendly device name (e.g. "iPad Pro (11-inch)").
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim_start();
        NAME_PREFIXES
            .iter()
            .find(|(prefix, _)| name.starts_with(prefix))
            .map(|(_, category)| *category)
    }

    /// Classify a device by name, falling back to its model identifier.
    ///
    /// Model identifiers share the same prefixes (`iPhone14,2`, `Watch6,1`),
    /// which covers entries whose friendly name was never recorded.
    #[must_use]
    pub fn classify(name: &str, identifier: &str) -> Option<Self> {
        Self::from_name(name).or_else(|| Self::from_name(identifier))
    }
}

impl Ord for Category {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(self.as_str(), other.as_str())
    }
}

impl PartialOrd for Category {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
