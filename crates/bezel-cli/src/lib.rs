//! Bezel CLI Library
//!
//! Library functions for the `bezel-cli` command-line tool.

#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

use bezel::{BezelTable, Fallback};
use bezel_docs::format_bezel;
use bezel_gen::{DeviceStatus, GeneratorConfig, Registry, RunSummary};
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Flag values that override the configuration file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Canonical registry path
    pub registry: Option<PathBuf>,
    /// Distributable artifact path
    pub distributable: Option<PathBuf>,
    /// Probe app bundle
    pub probe_app: Option<PathBuf>,
    /// Probe bundle identifier
    pub bundle_id: Option<String>,
    /// xcrun binary
    pub xcrun: Option<String>,
    /// Measurement poll timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Skip previously problematic devices
    pub no_retry_problematic: bool,
    /// Delete instances created by the run
    pub delete_created: bool,
    /// Plan only
    pub dry_run: bool,
}

/// Load the optional YAML config and apply flag overrides.
pub fn build_generator_config(
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
) -> bezel_gen::Result<GeneratorConfig> {
    let mut config = match config_file {
        Some(path) => GeneratorConfig::from_file(path)?,
        None => GeneratorConfig::default(),
    };

    if let Some(registry) = &overrides.registry {
        config.registry_path.clone_from(registry);
    }
    if let Some(distributable) = &overrides.distributable {
        config.distributable_path.clone_from(distributable);
    }
    if let Some(probe_app) = &overrides.probe_app {
        config.probe_app_path = Some(probe_app.clone());
    }
    if let Some(bundle_id) = &overrides.bundle_id {
        config.bundle_id.clone_from(bundle_id);
    }
    if let Some(xcrun) = &overrides.xcrun {
        config.xcrun_binary.clone_from(xcrun);
    }
    if let Some(timeout_ms) = overrides.timeout_ms {
        config.poll_timeout_ms = timeout_ms;
    }
    if overrides.no_retry_problematic {
        config.retry_problematic = false;
    }
    if overrides.delete_created {
        config.delete_created_instances = true;
    }
    if overrides.dry_run {
        config.dry_run = true;
    }

    config.validate()?;
    Ok(config)
}

/// Human-readable run summary
pub fn format_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    if summary.is_noop() {
        let _ = writeln!(out, "No pending devices in {}", summary.registry_path.display());
        return out;
    }

    let heading = if summary.dry_run {
        "Dry run: would extract"
    } else {
        "Extraction results"
    };
    let _ = writeln!(out, "{heading} ({} device(s))", summary.outcomes.len());
    for outcome in &summary.outcomes {
        let detail = match &outcome.status {
            DeviceStatus::Measured { bezel } => format_bezel(*bezel),
            DeviceStatus::Failed { reason } => reason.clone(),
            DeviceStatus::Unresolvable => "no simulator runtime".to_string(),
            DeviceStatus::Planned => String::new(),
        };
        let _ = writeln!(
            out,
            "  {:<12} {:<14} {:<32} {detail}",
            outcome.status.label(),
            outcome.identifier,
            outcome.name,
        );
    }

    if !summary.dry_run {
        let elapsed = summary.finished_at - summary.started_at;
        let _ = writeln!(
            out,
            "Measured: {}  Problematic: {}  ({}s)",
            summary.measured(),
            summary.reclassified(),
            elapsed.num_seconds()
        );
    }
    out
}

/// List the devices the next run would attempt
pub fn format_pending(registry: &Registry, include_problematic: bool) -> String {
    let work = registry.diff(include_problematic);
    if work.is_empty() {
        return "Nothing pending\n".to_string();
    }
    let mut out = String::new();
    for device in work {
        let name = if device.name.is_empty() {
            "-"
        } else {
            device.name.as_str()
        };
        let _ = writeln!(
            out,
            "{:<14} {:<12} {name}",
            device.identifier,
            format!("{:?}", device.origin).to_lowercase(),
        );
    }
    out
}

/// One lookup result line: `identifier<TAB>radius`
pub fn lookup_line(table: &BezelTable, identifier: &str, fallback: Option<Fallback>) -> String {
    let value = match fallback {
        Some(fallback) => Some(table.resolve(identifier, fallback)),
        None => table.lookup(identifier),
    };
    match value {
        Some(radius) => format!("{identifier}\t{}", format_bezel(radius)),
        None => format!("{identifier}\tunknown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bezel_gen::DeviceOutcome;
    use chrono::Utc;

    #[test]
    fn test_build_config_defaults() {
        let config = build_generator_config(None, &ConfigOverrides::default()).unwrap();
        assert_eq!(config, GeneratorConfig::default());
    }

    #[test]
    fn test_build_config_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bezel.yaml");
        std::fs::write(
            &path,
            "registry_path: from-file.json\nbundle_id: com.example.file\npoll_timeout_ms: 1000\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            bundle_id: Some("com.example.flag".to_string()),
            no_retry_problematic: true,
            ..ConfigOverrides::default()
        };
        let config = build_generator_config(Some(&path), &overrides).unwrap();
        assert_eq!(config.registry_path, PathBuf::from("from-file.json"));
        assert_eq!(config.bundle_id, "com.example.flag");
        assert_eq!(config.poll_timeout_ms, 1000);
        assert!(!config.retry_problematic);
    }

    #[test]
    fn test_build_config_missing_file() {
        let result = build_generator_config(
            Some(Path::new("/nonexistent/bezel.yaml")),
            &ConfigOverrides::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_build_config_validates_overrides() {
        let overrides = ConfigOverrides {
            bundle_id: Some("  ".to_string()),
            ..ConfigOverrides::default()
        };
        assert!(build_generator_config(None, &overrides).is_err());
    }

    fn summary(dry_run: bool, outcomes: Vec<DeviceOutcome>) -> RunSummary {
        let now = Utc::now();
        RunSummary {
            started_at: now,
            finished_at: now,
            registry_path: PathBuf::from("data/bezel.json"),
            dry_run,
            saved: !dry_run,
            outcomes,
        }
    }

    #[test]
    fn test_format_summary_noop() {
        let text = format_summary(&summary(false, Vec::new()));
        assert!(text.contains("No pending devices"));
    }

    #[test]
    fn test_format_summary_results() {
        let text = format_summary(&summary(
            false,
            vec![
                DeviceOutcome {
                    identifier: "iPhone14,2".to_string(),
                    name: "iPhone 13 Pro".to_string(),
                    status: DeviceStatus::Measured { bezel: 47.33 },
                },
                DeviceOutcome {
                    identifier: "iPadXX,1".to_string(),
                    name: "iPad Imaginary".to_string(),
                    status: DeviceStatus::Unresolvable,
                },
            ],
        ));
        assert!(text.contains("47.33"));
        assert!(text.contains("unresolvable"));
        assert!(text.contains("Measured: 1  Problematic: 1"));
    }

    #[test]
    fn test_format_summary_dry_run() {
        let text = format_summary(&summary(
            true,
            vec![DeviceOutcome {
                identifier: "iPhone14,2".to_string(),
                name: "iPhone 13 Pro".to_string(),
                status: DeviceStatus::Planned,
            }],
        ));
        assert!(text.starts_with("Dry run"));
        assert!(!text.contains("Measured:"));
    }

    #[test]
    fn test_format_pending() {
        let registry = Registry::from_json(
            r#"{"pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}},
                "problematic": {"iPadXX,1": {"name": ""}}}"#,
        )
        .unwrap();
        let all = format_pending(&registry, true);
        assert!(all.contains("iPadXX,1"));
        assert!(all.contains("problematic"));
        let pending_only = format_pending(&registry, false);
        assert!(!pending_only.contains("iPadXX,1"));
        assert_eq!(format_pending(&Registry::default(), true), "Nothing pending\n");
    }

    #[test]
    fn test_lookup_line() {
        let table =
            BezelTable::from_json(r#"{"devices":{"iPhone":{"iPhone9,1":{"bezel":0}}}}"#).unwrap();
        assert_eq!(lookup_line(&table, "iPhone9,1", None), "iPhone9,1\t0");
        assert_eq!(lookup_line(&table, "iPhone1,1", None), "iPhone1,1\tunknown");
        let fallback = Fallback::new(12.0).with_zero(3.5);
        assert_eq!(
            lookup_line(&table, "iPhone9,1", Some(fallback)),
            "iPhone9,1\t3.5"
        );
        assert_eq!(
            lookup_line(&table, "iPhone1,1", Some(fallback)),
            "iPhone1,1\t12"
        );
    }
}
