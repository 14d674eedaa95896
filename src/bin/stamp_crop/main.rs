//! stamp-crop: find and crop ink stamps on scanned documents.
//!
//! # Usage
//!
//! ```bash
//! # Every PDF/image below `scans/`, crops written to `stamps/<document>/`
//! stamp-crop batch --input scans --output stamps --min-area 2000
//!
//! # One file, results printed as JSON
//! stamp-crop detect --file invoice.pdf --format json
//!
//! # Color threshold first, trained detector second, keep every confident hit
//! stamp-crop detect --file scan.png --strategy color --strategy yolo \
//!     --detector-model models/stamp_yolo.onnx --policy all --min-score 0.5
//! ```

mod cli;

use clap::{Args, Parser, Subcommand, ValueEnum};
use stamp_crop::domain::StrategyKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stamp-crop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Locate and crop ink stamps on scanned document pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every supported document below a directory
    Batch {
        /// Directory scanned recursively for .pdf/.png/.jpg/.jpeg/.webp files
        #[arg(long, short)]
        input: PathBuf,

        /// Directory receiving one subdirectory of crops per document
        #[arg(long, short)]
        output: PathBuf,

        /// Maximum number of worker threads
        #[arg(long, env = "STAMP_CROP_THREADS")]
        threads: Option<usize>,

        /// Write the batch report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Process a single document and print the detections
    Detect {
        /// Local file path of the document
        #[arg(long, short)]
        file: PathBuf,

        /// Also save the crops below this directory
        #[arg(long)]
        save_to: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    /// Keep only the best candidate per page
    Single,
    /// Keep every candidate scoring at least --min-score (default 0)
    All,
}

/// Engine settings shared by both commands.
#[derive(Args)]
struct EngineArgs {
    /// JSON engine configuration; flags below override it
    #[arg(long, env = "STAMP_CROP_CONFIG")]
    config: Option<PathBuf>,

    /// Strategy to run, repeatable, in invocation order (color, segmentation, detection)
    #[arg(long = "strategy", value_parser = parse_strategy)]
    strategies: Vec<StrategyKind>,

    /// Minimum bounding-box area for the color strategy, in pixels
    #[arg(long)]
    min_area: Option<u64>,

    /// Candidate selection policy
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Score threshold; implies `--policy all`
    #[arg(long)]
    min_score: Option<f32>,

    /// FastSAM ONNX model for the segmentation strategy
    #[arg(long, env = "STAMP_CROP_SEGMENTATION_MODEL")]
    segmentation_model: Option<PathBuf>,

    /// Mean blue value a segmentation mask must exceed
    #[arg(long)]
    color_threshold: Option<f32>,

    /// Object detector ONNX model
    #[arg(long, env = "STAMP_CROP_DETECTOR_MODEL")]
    detector_model: Option<PathBuf>,

    /// Class id of the stamp class in the detector
    #[arg(long)]
    target_class: Option<usize>,

    /// Per-strategy time budget in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Continue with the remaining strategies when a model cannot be loaded
    #[arg(long)]
    allow_fallback: bool,

    /// PDF render resolution
    #[arg(long, default_value_t = 300.0)]
    dpi: f32,

    /// Device for model inference (cpu, cuda, cuda:0)
    #[arg(long, default_value = "cpu", env = "STAMP_CROP_DEVICE")]
    device: String,
}

fn parse_strategy(value: &str) -> Result<StrategyKind, String> {
    value.parse::<StrategyKind>().map_err(|e| e.to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    stamp_crop::utils::init_tracing();

    let args = Cli::parse();

    match args.command {
        Commands::Batch {
            input,
            output,
            threads,
            report,
            engine,
        } => cli::run_batch(&input, &output, threads, report.as_deref(), &engine)?,
        Commands::Detect {
            file,
            save_to,
            format,
            engine,
        } => cli::run_detect(&file, save_to.as_deref(), format, &engine)?,
    }

    Ok(())
}
