//! Bezel dataset generator
//!
//! Regenerates the identifier → corner radius table by driving iOS
//! simulators. Pending identifiers from the registry are resolved to
//! simulator instances, a probe app is launched on each to report its own
//! display corner radius, and the results are merged back into the registry
//! and published as a minified artifact for the `bezel` lookup crate.
//!
//! ```text
//! Registry::load → diff → Simulators::resolve → ExtractionRunner::extract
//!                → merge → output::save
//! ```
//!
//! All simulator access goes through [`SimctlRunner`], so the pipeline runs
//! against [`MockSimctlRunner`] in tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod category;
pub mod command;
pub mod config;
pub mod error;
pub mod extraction;
pub mod lifecycle;
pub mod merge;
pub mod natural;
pub mod output;
pub mod pipeline;
pub mod proptest_impl;
pub mod registry;
pub mod simulator;

pub use category::Category;
pub use command::{
    CommandOutput, DEFAULT_BUNDLE_ID, DEFAULT_MEASUREMENT_FILE, MockSimctlRunner,
    RealSimctlRunner, SimctlOp, SimctlRunner,
};
pub use config::GeneratorConfig;
pub use error::{Error, Result};
pub use extraction::{ExtractionConfig, ExtractionRunner, Measurement, PollConfig};
pub use lifecycle::{BootRegistry, InstanceGuard};
pub use merge::{MeasuredDevice, Unresolved, merge};
pub use natural::{NaturalKey, natural_cmp, natural_sort};
pub use pipeline::{DeviceOutcome, DeviceStatus, Generator, RunSummary};
pub use registry::{DeviceEntry, DeviceMap, NamedEntry, Partition, PendingDevice, Registry};
pub use simulator::{DeviceState, InstanceHandle, Simulators};
