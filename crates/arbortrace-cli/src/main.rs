//! arbortrace: command-line driver for skeleton-guided reconstruction.
//!
//! Runs the reconstruction pipeline on a configuration file and writes the
//! annotation document. Two segmentation sources are wired up here:
//!
//! - `stub` -- the deterministic test-data source, for pipeline checks and
//!   demos without any segmentation data
//! - `watershed` -- precomputed watershed segmentations served from a
//!   directory of per-node mask records
//!
//! The model-backed source needs an inference backend and imaging-volume
//! containers this binary does not bundle; it is available through the
//! `arbortrace-io` library API. `volumes` inspects volume descriptor files
//! without running anything.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod logging;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use arbortrace_io::{DirectoryOracle, drivers, volumes};
use arbortrace_pipeline::TracingSink;

/// Skeleton-guided neuron reconstruction.
#[derive(Parser)]
#[command(name = "arbortrace", version)]
struct Cli {
    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline with the deterministic test-data source.
    Stub {
        /// Pipeline configuration TOML.
        config: PathBuf,

        /// Output annotation document path.
        #[arg(long)]
        out: PathBuf,

        /// Also write the reconstructed skeleton as SWC text.
        #[arg(long)]
        swc: Option<PathBuf>,
    },

    /// Run the pipeline against precomputed watershed segmentations.
    Watershed {
        /// Pipeline configuration TOML.
        config: PathBuf,

        /// Sensitivity-parameters JSON file.
        #[arg(long)]
        sensitives: PathBuf,

        /// Directory of per-node mask records (`<node_id>.json`).
        #[arg(long)]
        masks: PathBuf,

        /// Output annotation document path.
        #[arg(long)]
        out: PathBuf,
    },

    /// Inspect volume descriptor files.
    Volumes {
        /// Descriptor TOML files.
        files: Vec<PathBuf>,

        /// Keep only volumes whose name matches this regular expression.
        #[arg(long)]
        name_filter: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Command::Stub { config, out, swc } => run_stub(&config, &out, swc.as_deref()),
        Command::Watershed {
            config,
            sensitives,
            masks,
            out,
        } => run_watershed(&config, &sensitives, &masks, &out),
        Command::Volumes { files, name_filter } => run_volumes(&files, name_filter.as_deref()),
    }
}

fn run_stub(config_path: &Path, out: &Path, swc_out: Option<&Path>) -> anyhow::Result<()> {
    let config = drivers::read_config(config_path)
        .with_context(|| format!("loading configuration {}", config_path.display()))?;

    let report = drivers::reconstruct_with_stub(&config, out, &TracingSink)?;
    println!("{}", report.merge().report());
    println!("Annotation document written to {}", report.output.display());

    if let Some(swc_path) = swc_out {
        let text = arbortrace_export::to_swc(&report.reconstruction.skeleton);
        std::fs::write(swc_path, text)
            .with_context(|| format!("writing SWC to {}", swc_path.display()))?;
        println!("SWC written to {}", swc_path.display());
    }
    Ok(())
}

fn run_watershed(
    config_path: &Path,
    sensitives: &Path,
    masks: &Path,
    out: &Path,
) -> anyhow::Result<()> {
    let config = drivers::read_config(config_path)
        .with_context(|| format!("loading configuration {}", config_path.display()))?;
    let oracle = Box::new(
        DirectoryOracle::new(masks)
            .with_context(|| format!("opening mask directory {}", masks.display()))?,
    );

    let report =
        drivers::reconstruct_with_watershed(&config, sensitives, oracle, out, &TracingSink)?;
    println!("{}", report.merge().report());
    println!("Annotation document written to {}", report.output.display());
    Ok(())
}

fn run_volumes(files: &[PathBuf], name_filter: Option<&str>) -> anyhow::Result<()> {
    let mut descriptors = volumes::load_descriptors(files)?;
    if let Some(pattern) = name_filter {
        descriptors = volumes::filter_by_name(descriptors, pattern)?;
    }

    if descriptors.is_empty() {
        println!("no volumes matched");
        return Ok(());
    }

    println!(
        "{:<20} {:<12} {:>18} {:>15} {:>21}",
        "Name", "Kind", "Shape", "Offset", "Resolution (nm)"
    );
    println!("{}", "-".repeat(90));
    for (name, descriptor) in &descriptors {
        let geometry = descriptor.geometry();
        println!(
            "{:<20} {:<12} {:>18} {:>15} {:>21}",
            name,
            descriptor.kind(),
            format_triple(&geometry.shape),
            format_triple(&geometry.offset),
            format_resolution(&geometry.resolution),
        );
    }
    Ok(())
}

fn format_triple<T: std::fmt::Display>(values: &[T; 3]) -> String {
    format!("{} x {} x {}", values[0], values[1], values[2])
}

fn format_resolution(values: &[f64; 3]) -> String {
    format!("{:.1} x {:.1} x {:.1}", values[0], values[1], values[2])
}
