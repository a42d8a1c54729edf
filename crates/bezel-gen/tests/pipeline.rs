//! End-to-end generator runs against the mock simulator host

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use bezel_gen::{
    BootRegistry, Category, DeviceState, DeviceStatus, Error, Generator, GeneratorConfig,
    MockSimctlRunner, NaturalKey, Registry, SimctlOp,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const IOS_16: &str = "com.apple.CoreSimulator.SimRuntime.iOS-16-4";
const IOS_17: &str = "com.apple.CoreSimulator.SimRuntime.iOS-17-2";

struct Fixture {
    dir: TempDir,
    config: GeneratorConfig,
}

impl Fixture {
    fn new(registry: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let registry_path = dir.path().join("data/bezel.json");
        std::fs::create_dir_all(registry_path.parent().unwrap()).unwrap();
        std::fs::write(&registry_path, registry).unwrap();

        let probe = dir.path().join("BezelProbe.app");
        std::fs::create_dir_all(&probe).unwrap();

        let config = GeneratorConfig {
            registry_path,
            distributable_path: dir.path().join("dist/bezel.min.json"),
            probe_app_path: Some(probe),
            poll_timeout_ms: 40,
            poll_initial_interval_ms: 5,
            poll_max_interval_ms: 10,
            ..GeneratorConfig::default()
        };
        Self { dir, config }
    }

    fn containers(&self) -> PathBuf {
        self.dir.path().join("containers")
    }

    fn mock(&self) -> MockSimctlRunner {
        MockSimctlRunner::new(self.containers())
            .with_runtime(
                IOS_16,
                "iOS 16.4",
                "16.4",
                &[(
                    "com.apple.CoreSimulator.SimDeviceType.iPhone-13-Pro",
                    "iPhone 13 Pro",
                )],
            )
            .with_runtime(
                IOS_17,
                "iOS 17.2",
                "17.2",
                &[
                    (
                        "com.apple.CoreSimulator.SimDeviceType.iPhone-13-Pro",
                        "iPhone 13 Pro",
                    ),
                    (
                        "com.apple.CoreSimulator.SimDeviceType.iPod-touch--7th-generation-",
                        "iPod touch (7th generation)",
                    ),
                ],
            )
            .with_measurement(
                "iPhone 13 Pro",
                r#"{"identifiers": "iPhone14,2", "bezel": 47.33}"#,
            )
            .with_measurement(
                "iPod touch (7th generation)",
                r#"{"identifiers": "iPod9,1", "bezel": 0}"#,
            )
    }

    fn generator(
        &self,
        runner: MockSimctlRunner,
    ) -> (Generator<MockSimctlRunner>, Arc<BootRegistry>) {
        let boot_registry = Arc::new(BootRegistry::new());
        let generator = Generator::new(self.config.clone(), runner)
            .with_boot_registry(Arc::clone(&boot_registry));
        (generator, boot_registry)
    }

    fn registry(&self) -> Registry {
        Registry::load(&self.config.registry_path).unwrap()
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }
}

#[test]
fn test_pending_device_is_measured() {
    let fixture = Fixture::new(
        r#"{"devices": {}, "pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}}, "problematic": {}}"#,
    );
    let (generator, boot_registry) = fixture.generator(fixture.mock());

    let summary = generator.run().unwrap();
    assert!(summary.saved);
    assert_eq!(summary.measured(), 1);
    assert_eq!(summary.outcomes[0].identifier, "iPhone14,2");
    assert_eq!(
        summary.outcomes[0].status,
        DeviceStatus::Measured { bezel: 47.33 }
    );

    let registry = fixture.registry();
    let (category, entry) = registry.device("iPhone14,2").unwrap();
    assert_eq!(category, Category::IPhone);
    assert_eq!(entry.name, "iPhone 13 Pro");
    assert_eq!(entry.bezel, 47.33);
    assert!(registry.pending.is_empty());
    assert!(registry.problematic.is_empty());

    let runner = generator.simulators().runner();
    assert_eq!(runner.device_state("MOCK-0001"), Some(DeviceState::Shutdown));
    assert!(!runner.is_installed("MOCK-0001", "com.bezel.probe"));
    assert!(runner.calls().iter().any(|c| c.contains(IOS_17)));
    assert!(boot_registry.registered().is_empty());
}

#[test]
fn test_distributable_feeds_lookup() {
    let fixture = Fixture::new(
        r#"{
            "devices": {"iPhone": {"iPhone10,3": {"name": "iPhone X", "bezel": 39.0}}},
            "pending": {
                "iPhone14,2": {"name": "iPhone 13 Pro"},
                "iPod9,1": {"name": "iPod touch (7th generation)"}
            }
        }"#,
    );
    let (generator, _) = fixture.generator(fixture.mock());
    generator.run().unwrap();

    let dist = Fixture::read(&fixture.config.distributable_path);
    assert!(!dist.contains("pending"));
    assert!(!dist.contains("problematic"));
    let table = bezel::BezelTable::from_json(&dist).unwrap();
    assert_eq!(table.lookup("iPhone14,2"), Some(47.33));
    assert_eq!(table.lookup("iPhone10,3"), Some(39.0));
    assert_eq!(table.lookup("iPod9,1"), Some(0.0));
    assert_eq!(table.lookup("iPhone1,1"), None);
}

#[test]
fn test_unresolvable_device_becomes_problematic() {
    let fixture = Fixture::new(
        r#"{"devices": {}, "pending": {"iPadXX,1": {"name": "iPad Imaginary"}}, "problematic": {}}"#,
    );
    let (generator, _) = fixture.generator(fixture.mock());

    let summary = generator.run().unwrap();
    assert_eq!(summary.outcomes[0].status, DeviceStatus::Unresolvable);
    assert_eq!(summary.reclassified(), 1);

    let registry = fixture.registry();
    assert_eq!(
        registry.problematic[&NaturalKey::from("iPadXX,1")].name,
        "iPad Imaginary"
    );
    assert!(registry.pending.is_empty());
    assert!(!registry.contains_device("iPadXX,1"));
    assert_eq!(generator.simulators().runner().instance_count(), 0);
}

#[test]
fn test_failures_are_isolated_per_device() {
    let fixture = Fixture::new(
        r#"{
            "pending": {
                "iPhone14,2": {"name": "iPhone 13 Pro"},
                "iPod9,1": {"name": "iPod touch (7th generation)"}
            }
        }"#,
    );
    // The iPod probe never writes its file
    let runner = MockSimctlRunner::new(fixture.containers())
        .with_runtime(
            IOS_17,
            "iOS 17.2",
            "17.2",
            &[
                ("iPhone-13-Pro", "iPhone 13 Pro"),
                ("iPod-touch-7", "iPod touch (7th generation)"),
            ],
        )
        .with_measurement(
            "iPhone 13 Pro",
            r#"{"identifiers": "iPhone14,2", "bezel": 47.33}"#,
        );
    let (generator, boot_registry) = fixture.generator(runner);

    let summary = generator.run().unwrap();
    let ids: Vec<&str> = summary
        .outcomes
        .iter()
        .map(|o| o.identifier.as_str())
        .collect();
    assert_eq!(ids, vec!["iPod9,1", "iPhone14,2"]);
    assert!(matches!(
        summary.outcomes[0].status,
        DeviceStatus::Failed { .. }
    ));
    assert_eq!(summary.measured(), 1);

    let registry = fixture.registry();
    assert!(registry.contains_device("iPhone14,2"));
    assert!(registry.problematic.contains_key(&NaturalKey::from("iPod9,1")));
    assert!(registry.conflicts().is_empty());

    let runner = generator.simulators().runner();
    assert_eq!(runner.device_state("MOCK-0001"), Some(DeviceState::Shutdown));
    assert_eq!(runner.device_state("MOCK-0002"), Some(DeviceState::Shutdown));
    assert!(boot_registry.registered().is_empty());
}

#[test]
fn test_existing_instance_is_reused() {
    let fixture = Fixture::new(r#"{"pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}}}"#);
    let runner = fixture
        .mock()
        .with_device("EXISTING", "iPhone 13 Pro", IOS_17, DeviceState::Booted);
    let (generator, _) = fixture.generator(runner);

    generator.run().unwrap();
    let runner = generator.simulators().runner();
    assert_eq!(runner.instance_count(), 1);
    assert!(!runner.calls().iter().any(|c| c.starts_with("create")));
    assert_eq!(runner.device_state("EXISTING"), Some(DeviceState::Shutdown));
}

#[test]
fn test_created_instances_deleted_when_configured() {
    let mut fixture = Fixture::new(r#"{"pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}}}"#);
    fixture.config.delete_created_instances = true;
    let (generator, _) = fixture.generator(fixture.mock());

    generator.run().unwrap();
    assert_eq!(generator.simulators().runner().instance_count(), 0);
    assert!(fixture.registry().contains_device("iPhone14,2"));
}

#[test]
fn test_problematic_devices_are_retried() {
    let fixture = Fixture::new(r#"{"problematic": {"iPhone14,2": {"name": "iPhone 13 Pro"}}}"#);
    let (generator, _) = fixture.generator(fixture.mock());

    let summary = generator.run().unwrap();
    assert_eq!(summary.measured(), 1);
    let registry = fixture.registry();
    assert!(registry.contains_device("iPhone14,2"));
    assert!(registry.problematic.is_empty());
}

#[test]
fn test_problematic_skipped_without_retry() {
    let mut fixture =
        Fixture::new(r#"{"problematic": {"iPhone14,2": {"name": "iPhone 13 Pro"}}}"#);
    fixture.config.retry_problematic = false;
    let before = Fixture::read(&fixture.config.registry_path);
    let (generator, _) = fixture.generator(fixture.mock());

    let summary = generator.run().unwrap();
    assert!(summary.is_noop());
    assert!(!summary.saved);
    assert_eq!(Fixture::read(&fixture.config.registry_path), before);
}

#[test]
fn test_nothing_pending_is_noop() {
    let fixture = Fixture::new(
        r#"{"devices": {"iPhone": {"iPhone10,3": {"name": "iPhone X", "bezel": 39.0}}},
            "pending": {"iPhone10,3": {"name": "iPhone X"}}}"#,
    );
    let before = Fixture::read(&fixture.config.registry_path);
    let (generator, _) = fixture.generator(fixture.mock());

    let summary = generator.run().unwrap();
    assert!(summary.is_noop());
    assert!(!summary.saved);
    assert!(generator.simulators().runner().calls().is_empty());
    assert!(!fixture.config.distributable_path.exists());
    assert_eq!(Fixture::read(&fixture.config.registry_path), before);
}

#[test]
fn test_dry_run_has_no_side_effects() {
    let mut fixture = Fixture::new(
        r#"{"pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}, "iPadXX,1": {"name": "iPad Imaginary"}}}"#,
    );
    fixture.config.dry_run = true;
    fixture.config.probe_app_path = None;
    let before = Fixture::read(&fixture.config.registry_path);
    let (generator, _) = fixture.generator(fixture.mock());

    let summary = generator.run().unwrap();
    assert!(summary.dry_run);
    assert!(!summary.saved);
    assert_eq!(summary.outcomes.len(), 2);
    assert!(
        summary
            .outcomes
            .iter()
            .all(|o| o.status == DeviceStatus::Planned)
    );
    assert!(generator.simulators().runner().calls().is_empty());
    assert_eq!(Fixture::read(&fixture.config.registry_path), before);
    assert!(!fixture.config.distributable_path.exists());
}

#[test]
fn test_missing_registry_aborts_before_side_effects() {
    let fixture = Fixture::new("{}");
    std::fs::remove_file(&fixture.config.registry_path).unwrap();
    let (generator, _) = fixture.generator(fixture.mock());

    let err = generator.run().unwrap_err();
    assert!(matches!(err, Error::RegistryNotFound(_)));
    assert!(generator.simulators().runner().calls().is_empty());
}

#[test]
fn test_corrupt_registry_aborts() {
    let fixture = Fixture::new(r#"{"devices": ["not", "a", "map"]}"#);
    let (generator, _) = fixture.generator(fixture.mock());
    let err = generator.run().unwrap_err();
    assert!(matches!(err, Error::RegistryParse { .. }));
    assert!(!err.is_per_device());
}

#[test]
fn test_missing_probe_is_config_error() {
    let mut fixture = Fixture::new(r#"{"pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}}}"#);
    fixture.config.probe_app_path = Some(fixture.dir.path().join("Missing.app"));
    let before = Fixture::read(&fixture.config.registry_path);
    let (generator, _) = fixture.generator(fixture.mock());

    let err = generator.run().unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(generator.simulators().runner().calls().is_empty());
    assert_eq!(Fixture::read(&fixture.config.registry_path), before);
}

#[test]
fn test_boot_failure_marks_problematic() {
    let fixture = Fixture::new(r#"{"pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}}}"#);
    let (generator, boot_registry) = fixture.generator(fixture.mock().with_failure(SimctlOp::Boot));

    let summary = generator.run().unwrap();
    match &summary.outcomes[0].status {
        DeviceStatus::Failed { reason } => assert!(reason.contains("boot")),
        other => panic!("unexpected status {other:?}"),
    }
    assert!(
        fixture
            .registry()
            .problematic
            .contains_key(&NaturalKey::from("iPhone14,2"))
    );
    assert!(boot_registry.registered().is_empty());
}

#[test]
fn test_second_run_is_stable() {
    let fixture = Fixture::new(
        r#"{"pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}, "iPadXX,1": {"name": "iPad Imaginary"}}}"#,
    );
    let (generator, _) = fixture.generator(fixture.mock());
    generator.run().unwrap();
    let first = Fixture::read(&fixture.config.registry_path);

    // Only the problematic iPad is retried, and it fails the same way
    let (generator, _) = fixture.generator(fixture.mock());
    let summary = generator.run().unwrap();
    assert_eq!(summary.outcomes.len(), 1);
    assert_eq!(Fixture::read(&fixture.config.registry_path), first);
}

#[test]
fn test_report_written() {
    let fixture = Fixture::new(r#"{"pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}}}"#);
    let (generator, _) = fixture.generator(fixture.mock());
    let summary = generator.run().unwrap();

    let report = fixture.dir.path().join("reports/run.json");
    summary.write_json(&report).unwrap();
    let value: serde_json::Value = serde_json::from_str(&Fixture::read(&report)).unwrap();
    assert_eq!(value["saved"], true);
    assert_eq!(value["outcomes"][0]["identifier"], "iPhone14,2");
}

#[test]
fn test_custom_probe_bundle_and_measurement_file() {
    let mut fixture = Fixture::new(r#"{"pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}}}"#);
    fixture.config.bundle_id = "org.example.probe".to_string();
    fixture.config.measurement_file = PathBuf::from("Library/radius.json");
    let runner = fixture
        .mock()
        .with_bundle_id("org.example.probe")
        .with_measurement_file("Library/radius.json");
    let (generator, _) = fixture.generator(runner);

    let summary = generator.run().unwrap();
    assert_eq!(summary.measured(), 1);
    let runner = generator.simulators().runner();
    assert!(
        runner
            .calls()
            .iter()
            .any(|c| c == "launch MOCK-0001 org.example.probe")
    );
    assert!(!runner.is_installed("MOCK-0001", "org.example.probe"));
    assert!(
        fixture
            .containers()
            .join("MOCK-0001/Library/radius.json")
            .is_file()
    );
}

#[test]
fn test_wrong_bundle_id_marks_problematic() {
    let fixture = Fixture::new(r#"{"pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}}}"#);
    // The installed probe registers a bundle id the config does not use
    let runner = fixture.mock().with_bundle_id("org.example.other");
    let (generator, boot_registry) = fixture.generator(runner);

    let summary = generator.run().unwrap();
    assert!(matches!(
        summary.outcomes[0].status,
        DeviceStatus::Failed { .. }
    ));
    assert!(
        fixture
            .registry()
            .problematic
            .contains_key(&NaturalKey::from("iPhone14,2"))
    );
    assert!(boot_registry.registered().is_empty());
}

#[test]
fn test_host_io_error_aborts_without_saving() {
    let fixture = Fixture::new(
        r#"{"pending": {"iPhone14,2": {"name": "iPhone 13 Pro"}, "iPod9,1": {"name": "iPod touch (7th generation)"}}}"#,
    );
    // A directory where the stale measurement file would be cannot be removed
    std::fs::create_dir_all(fixture.containers().join("MOCK-0001/Documents/bezel.json/inner"))
        .unwrap();
    let before = Fixture::read(&fixture.config.registry_path);
    let (generator, boot_registry) = fixture.generator(fixture.mock());

    let err = generator.run().unwrap_err();
    assert!(matches!(err, Error::IoError(_)));
    assert!(!err.is_per_device());
    assert_eq!(Fixture::read(&fixture.config.registry_path), before);
    assert!(!fixture.config.distributable_path.exists());
    assert!(boot_registry.registered().is_empty());
    assert_eq!(
        generator.simulators().runner().device_state("MOCK-0001"),
        Some(DeviceState::Shutdown)
    );
}
