//! Bezel CLI
//!
//! Regenerates the device corner radius dataset and queries it.

#![allow(clippy::doc_markdown)]

use bezel::{BezelTable, Fallback};
use bezel_cli::{
    ConfigOverrides, build_generator_config, format_pending, format_summary, lookup_line,
};
use bezel_gen::{BootRegistry, Generator, RealSimctlRunner, Registry};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "bezel-cli")]
#[command(about = "Apple device display corner radius dataset", long_about = None)]
#[command(version)]
struct Cli {
    /// Log progress
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log every simulator step
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure pending devices on simulators and update the dataset
    Generate {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Canonical registry JSON
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Minified output for the lookup library
        #[arg(long)]
        distributable: Option<PathBuf>,

        /// Probe .app bundle
        #[arg(long)]
        probe_app: Option<PathBuf>,

        /// Probe bundle identifier
        #[arg(long)]
        bundle_id: Option<String>,

        /// xcrun binary
        #[arg(long)]
        xcrun: Option<String>,

        /// Measurement timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Do not retry devices marked problematic
        #[arg(long)]
        no_retry_problematic: bool,

        /// Delete simulator instances created by this run
        #[arg(long)]
        delete_created: bool,

        /// Show what would be extracted without touching simulators
        #[arg(long)]
        dry_run: bool,

        /// Write the run summary as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List devices awaiting extraction
    Pending {
        /// Canonical registry JSON
        #[arg(long, default_value = "data/bezel.json")]
        registry: PathBuf,

        /// Leave out devices marked problematic
        #[arg(long)]
        no_problematic: bool,
    },

    /// Regenerate the device table in the README
    Docs {
        /// Canonical registry JSON
        #[arg(long, default_value = "data/bezel.json")]
        registry: PathBuf,

        /// README containing the table markers
        #[arg(long, default_value = "README.md")]
        readme: PathBuf,
    },

    /// Look up corner radii by model identifier
    Lookup {
        /// Model identifiers (default: the simulated device)
        #[arg(value_name = "IDENTIFIER")]
        identifiers: Vec<String>,

        /// Distributable JSON to read instead of the embedded table
        #[arg(long)]
        table: Option<PathBuf>,

        /// Value for unknown identifiers
        #[arg(long)]
        fallback: Option<f64>,

        /// Value replacing square-corner zeros (requires --fallback)
        #[arg(long, requires = "fallback")]
        if_zero: Option<f64>,
    },
}

/// Shut down any simulator still booted by this process on SIGINT.
fn setup_signal_handler(xcrun: String) {
    if let Err(e) = ctrlc::set_handler(move || {
        let runner = RealSimctlRunner::with_binary(xcrun.clone());
        let count = BootRegistry::global().shutdown_all(&runner);
        eprintln!("\nInterrupted. Shut down {count} simulator(s); registry left unchanged.");
        std::process::exit(130); // 128 + SIGINT(2)
    }) {
        eprintln!("Warning: Failed to set signal handler: {e}");
    }
}

fn init_tracing(verbose: bool, debug: bool) {
    let filter_layer = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else if verbose {
        tracing_subscriber::EnvFilter::new("info")
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.debug);
    info!("bezel v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Generate {
            config,
            registry,
            distributable,
            probe_app,
            bundle_id,
            xcrun,
            timeout,
            no_retry_problematic,
            delete_created,
            dry_run,
            report,
        } => {
            let overrides = ConfigOverrides {
                registry,
                distributable,
                probe_app,
                bundle_id,
                xcrun,
                timeout_ms: timeout,
                no_retry_problematic,
                delete_created,
                dry_run,
            };
            run_generate(config.as_deref(), &overrides, report.as_deref())
        }
        Commands::Pending {
            registry,
            no_problematic,
        } => match Registry::load(&registry) {
            Ok(registry) => {
                print!("{}", format_pending(&registry, !no_problematic));
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {e}");
                ExitCode::FAILURE
            }
        },
        Commands::Docs { registry, readme } => run_docs(&registry, &readme),
        Commands::Lookup {
            identifiers,
            table,
            fallback,
            if_zero,
        } => run_lookup(identifiers, table.as_deref(), fallback, if_zero),
    }
}

fn run_generate(
    config: Option<&Path>,
    overrides: &ConfigOverrides,
    report: Option<&Path>,
) -> ExitCode {
    let config = match build_generator_config(config, overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    setup_signal_handler(config.xcrun_binary.clone());

    let runner = RealSimctlRunner::with_binary(config.xcrun_binary.clone());
    let generator = Generator::new(config, runner);
    let summary = match generator.run() {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    print!("{}", format_summary(&summary));
    if summary.saved {
        println!(
            "Wrote {} and {}",
            generator.config().registry_path.display(),
            generator.config().distributable_path.display()
        );
    }
    if let Some(path) = report {
        if let Err(e) = summary.write_json(path) {
            eprintln!("Error writing report: {e}");
            return ExitCode::FAILURE;
        }
        println!("Report: {}", path.display());
    }
    ExitCode::SUCCESS
}

fn run_docs(registry: &Path, readme: &Path) -> ExitCode {
    let registry = match Registry::load(registry) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    match bezel_docs::sync_readme(readme, &registry, chrono::Utc::now()) {
        Ok(true) => {
            println!("Updated {}", readme.display());
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("{} is up to date", readme.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error updating {}: {e}", readme.display());
            ExitCode::FAILURE
        }
    }
}

fn run_lookup(
    identifiers: Vec<String>,
    table: Option<&Path>,
    fallback: Option<f64>,
    if_zero: Option<f64>,
) -> ExitCode {
    let loaded;
    let table = match table {
        Some(path) => {
            let parsed = std::fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|json| BezelTable::from_json(&json).map_err(|e| e.to_string()));
            match parsed {
                Ok(t) => {
                    loaded = t;
                    &loaded
                }
                Err(e) => {
                    eprintln!("Error reading {}: {e}", path.display());
                    return ExitCode::FAILURE;
                }
            }
        }
        None => match BezelTable::embedded() {
            Ok(t) => t,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let identifiers = if identifiers.is_empty() {
        match bezel::current_identifier() {
            Some(id) => vec![id],
            None => {
                eprintln!("No identifier given and {} is not set", bezel::SIMULATOR_MODEL_ENV);
                return ExitCode::FAILURE;
            }
        }
    } else {
        identifiers
    };

    let fallback = fallback.map(|if_missing| {
        let policy = Fallback::new(if_missing);
        if_zero.map_or(policy, |z| policy.with_zero(z))
    });
    for identifier in &identifiers {
        println!("{}", lookup_line(table, identifier, fallback));
    }
    ExitCode::SUCCESS
}
