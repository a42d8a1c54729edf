//! Device table generation and README synchronization.
//!
//! Renders the registry as markdown tables, one per device category, and
//! splices them into a README between marker comments.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;

pub use error::{DocsError, Result};

use bezel_gen::{Category, NamedEntry, NaturalKey, Registry};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;

/// Markers for README table replacement.
pub const START_MARKER: &str = "<!-- BEZEL_TABLE_START -->";
/// End marker for README table.
pub const END_MARKER: &str = "<!-- BEZEL_TABLE_END -->";

/// Format a radius without trailing zeros: `47.33`, `39`, `0`.
#[must_use]
pub fn format_bezel(bezel: f64) -> String {
    let fixed = format!("{bezel:.2}");
    fixed
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Generate registry summary statistics.
#[must_use]
pub fn generate_summary(registry: &Registry, timestamp: DateTime<Utc>) -> String {
    let mut lines = vec![
        format!(
            "**Bezel Dataset** (updated: {})",
            timestamp.format("%Y-%m-%d %H:%M UTC")
        ),
        String::new(),
        "| Category | Devices |".to_string(),
        "|----------|---------|".to_string(),
    ];
    for (category, entries) in &registry.devices {
        lines.push(format!("| {category} | {} |", entries.len()));
    }
    lines.push(format!("| **Total** | {} |", registry.device_count()));
    lines.push(String::new());
    lines.push(format!(
        "Pending: {} · Problematic: {}",
        registry.pending.len(),
        registry.problematic.len()
    ));
    lines.join("\n")
}

/// Generate one markdown table per category, followed by the devices that
/// still lack a measurement.
#[must_use]
pub fn generate_table(registry: &Registry) -> String {
    let mut sections = Vec::new();

    for category in Category::ALL {
        let Some(entries) = registry.devices.get(&category) else {
            continue;
        };
        if entries.is_empty() {
            continue;
        }
        let mut lines = vec![
            format!("### {category}"),
            String::new(),
            "| Device | Identifier | Bezel |".to_string(),
            "|--------|------------|-------|".to_string(),
        ];
        for (identifier, entry) in entries {
            let name = if entry.name.is_empty() {
                "-"
            } else {
                entry.name.as_str()
            };
            lines.push(format!(
                "| {name} | `{identifier}` | {} |",
                format_bezel(entry.bezel)
            ));
        }
        sections.push(lines.join("\n"));
    }

    if let Some(section) = unmeasured_section("Pending", &registry.pending) {
        sections.push(section);
    }
    if let Some(section) = unmeasured_section("Problematic", &registry.problematic) {
        sections.push(section);
    }

    sections.join("\n\n")
}

fn unmeasured_section(title: &str, entries: &BTreeMap<NaturalKey, NamedEntry>) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let mut lines = vec![
        format!("### {title}"),
        String::new(),
        "| Device | Identifier |".to_string(),
        "|--------|------------|".to_string(),
    ];
    for (identifier, entry) in entries {
        let name = if entry.name.is_empty() {
            "-"
        } else {
            entry.name.as_str()
        };
        lines.push(format!("| {name} | `{identifier}` |"));
    }
    Some(lines.join("\n"))
}

/// Summary and tables together, as placed between the README markers.
#[must_use]
pub fn generate_section(registry: &Registry, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}\n\n{}",
        generate_summary(registry, timestamp),
        generate_table(registry)
    )
}

/// Update README content with a new device table.
///
/// # Errors
///
/// Returns `DocsError::MarkerNotFound` if a marker is missing and
/// `DocsError::MarkerOrder` if the end marker comes first.
pub fn update_readme(readme: &str, table_content: &str) -> Result<String> {
    let start_idx = readme
        .find(START_MARKER)
        .ok_or_else(|| DocsError::MarkerNotFound(START_MARKER.to_string()))?;
    let end_idx = readme
        .find(END_MARKER)
        .ok_or_else(|| DocsError::MarkerNotFound(END_MARKER.to_string()))?;
    if end_idx < start_idx {
        return Err(DocsError::MarkerOrder);
    }

    let before = &readme[..start_idx + START_MARKER.len()];
    let after = &readme[end_idx..];

    Ok(format!("{before}\n{table_content}\n{after}"))
}

/// Rewrite the README at `path` in place. Returns whether it changed.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written, or lacks markers.
pub fn sync_readme(path: &Path, registry: &Registry, timestamp: DateTime<Utc>) -> Result<bool> {
    let readme = std::fs::read_to_string(path)?;
    let updated = update_readme(&readme, &generate_section(registry, timestamp))?;
    if updated == readme {
        return Ok(false);
    }
    std::fs::write(path, updated)?;
    Ok(true)
}
