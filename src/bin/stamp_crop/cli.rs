//! Command implementations.

use crate::{EngineArgs, OutputFormat, PolicyArg};
use stamp_crop::batch::BatchRunner;
use stamp_crop::core::config::{OrtExecutionProvider, OrtSessionConfig, ParallelPolicy};
use stamp_crop::core::StampError;
use stamp_crop::engine::{EngineBuilder, EngineConfig, StampDetectionEngine};
use stamp_crop::io::{CropWriter, DocumentPageSource, PageSource, PdfRenderSettings, document_stem};
use stamp_crop::selection::SelectionPolicy;
use stamp_crop::strategies::{FastSamConfig, OnnxObjectDetectorConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn session_config(device: &str) -> Result<Option<OrtSessionConfig>, StampError> {
    let device = device.to_ascii_lowercase();
    if device == "cpu" {
        return Ok(None);
    }
    let device_id = match device.split_once(':') {
        Some(("cuda", id)) => Some(id.parse::<i32>().map_err(|_| {
            StampError::config_error(format!("invalid CUDA device id '{id}'"))
        })?),
        None if device == "cuda" => None,
        _ => return Err(StampError::config_error(format!("unknown device '{device}'"))),
    };
    Ok(Some(OrtSessionConfig::new().add_execution_provider(
        OrtExecutionProvider::CUDA {
            device_id,
            gpu_mem_limit: None,
        },
    )))
}

/// Selection policy requested on the command line, if any. A threshold
/// alone selects `all`; a threshold with `single` is rejected.
fn selection_policy(
    policy: Option<PolicyArg>,
    min_score: Option<f32>,
) -> Result<Option<SelectionPolicy>, StampError> {
    match (policy, min_score) {
        (Some(PolicyArg::Single), Some(_)) => Err(StampError::config_error(
            "--min-score only applies to --policy all",
        )),
        (Some(PolicyArg::Single), None) => Ok(Some(SelectionPolicy::SingleBest)),
        (Some(PolicyArg::All), min_score) => Ok(Some(SelectionPolicy::AllAboveThreshold {
            min_score: min_score.unwrap_or(0.0),
        })),
        (None, Some(min_score)) => Ok(Some(SelectionPolicy::AllAboveThreshold { min_score })),
        (None, None) => Ok(None),
    }
}

/// Merges the JSON configuration (if any) with the command-line flags.
fn engine_config(args: &EngineArgs) -> CliResult<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let session = session_config(&args.device)?;

    if !args.strategies.is_empty() {
        config.strategies = args.strategies.clone();
    }
    if let Some(min_area) = args.min_area {
        config.color.min_area = min_area;
    }
    if let Some(selection) = selection_policy(args.policy, args.min_score)? {
        config.selection = selection;
    }
    if let Some(path) = &args.segmentation_model {
        let mut fastsam = FastSamConfig::new(path);
        fastsam.session = session.clone();
        config.fastsam = Some(fastsam);
    }
    if let Some(threshold) = args.color_threshold {
        config.segmentation.color_threshold = threshold;
    }
    if let Some(path) = &args.detector_model {
        let mut detector = OnnxObjectDetectorConfig::new(path);
        detector.session = session;
        config.detector = Some(detector);
    }
    if let Some(class) = args.target_class {
        config.object_detection.target_class = class;
    }
    if args.timeout_ms.is_some() {
        config.strategy_timeout_ms = args.timeout_ms;
    }
    config.allow_fallback |= args.allow_fallback;
    Ok(config)
}

fn build_engine(args: &EngineArgs) -> CliResult<StampDetectionEngine> {
    let start = Instant::now();
    let engine = EngineBuilder::from_config(engine_config(args)?).build()?;
    for skipped in engine.skipped() {
        eprintln!("warning: strategy disabled: {skipped}");
    }
    info!(
        strategies = ?engine.strategies(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "engine initialized"
    );
    Ok(engine)
}

fn page_source(args: &EngineArgs) -> DocumentPageSource {
    DocumentPageSource::new(PdfRenderSettings {
        dpi: args.dpi,
        ..PdfRenderSettings::default()
    })
}

pub fn run_batch(
    input: &Path,
    output: &Path,
    threads: Option<usize>,
    report_path: Option<&Path>,
    args: &EngineArgs,
) -> CliResult<()> {
    let engine = Arc::new(build_engine(args)?);
    let runner = BatchRunner::new(engine)
        .with_page_source(Arc::new(page_source(args)))
        .with_output_dir(output)
        .with_parallel_policy(ParallelPolicy::new().with_max_threads(threads));

    let report = runner.run(input)?;

    println!("Documents:          {}", report.document_count());
    println!("Pages:              {}", report.page_count());
    println!("Pages with stamp:   {}", report.pages_with_stamp());
    println!("Pages without:      {}", report.pages_without_stamp());
    println!("Failed pages:       {}", report.failed_pages());
    println!("Failed documents:   {}", report.failed_documents());
    println!("Stamps saved:       {}", report.stamp_count());

    if let Some(path) = report_path {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!(report = %path.display(), "batch report written");
    }
    Ok(())
}

pub fn run_detect(
    file: &Path,
    save_to: Option<&Path>,
    format: OutputFormat,
    args: &EngineArgs,
) -> CliResult<()> {
    let engine = build_engine(args)?;
    let pages = page_source(args).load(file)?;
    info!(pages = pages.len(), "document loaded");

    let writer = save_to.map(CropWriter::new);
    let stem = document_stem(file);
    let mut json_pages = Vec::with_capacity(pages.len());

    for (i, page) in pages.iter().enumerate() {
        let page_number = i + 1;
        let start = Instant::now();
        let result = match engine.detect(page) {
            Ok(result) => result,
            Err(err) => {
                match format {
                    OutputFormat::Json => json_pages.push(serde_json::json!({
                        "page": page_number,
                        "outcome": "failed",
                        "error": err.to_string(),
                    })),
                    OutputFormat::Pretty => {
                        println!("Page {page_number}: could not analyze ({err})")
                    }
                }
                continue;
            }
        };
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let files = match &writer {
            Some(writer) => writer.save_page(Path::new(&stem), page_number, &result)?,
            None => Vec::new(),
        };

        match format {
            OutputFormat::Json => json_pages.push(serde_json::json!({
                "page": page_number,
                "outcome": result.outcome(),
                "stamps": result.summary(),
                "files": files,
                "strategy_failures": result.failures().iter().map(ToString::to_string).collect::<Vec<_>>(),
                "processing_time_ms": elapsed_ms,
            })),
            OutputFormat::Pretty => {
                println!(
                    "Page {page_number} ({}x{}, {elapsed_ms:.1} ms):",
                    page.width(),
                    page.height()
                );
                if result.is_empty() {
                    println!("    no stamp found");
                }
                for (idx, crop) in result.crops().iter().enumerate() {
                    println!(
                        "    [{}] {} bbox={} score={:.2}{}",
                        idx + 1,
                        crop.candidate.source,
                        crop.candidate.bbox,
                        crop.candidate.score,
                        if crop.clamped { " (clamped)" } else { "" }
                    );
                }
                for failure in result.failures() {
                    println!("    strategy failed: {failure}");
                }
                for file in &files {
                    println!("    saved {}", file.display());
                }
            }
        }
    }

    if format == OutputFormat::Json {
        let document = serde_json::json!({
            "document": file,
            "pages": json_pages,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
    }
    Ok(())
}
