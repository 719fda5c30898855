//! Batch processing command for multiple document images.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use futures_util::stream::{self, StreamExt};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, warn};

use docex_core::{ExtractionOrchestrator, FinalResult};

use super::process::{apply_overrides, format_result, OutputFormat, StrategyArg};
use super::{file_label, load_config};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "tif", "tiff", "bmp", "gif"];

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Document type applied to every file
    #[arg(short = 't', long = "type", default_value = "generic")]
    document_type: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of documents processed concurrently
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// Provider strategy (overrides the config file)
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Skip the result cache
    #[arg(long)]
    no_cache: bool,
}

/// Result of processing a single file.
struct FileOutcome {
    path: PathBuf,
    result: Option<FinalResult>,
    error: Option<String>,
    processing_time_ms: u64,
}

impl FileOutcome {
    fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, args.strategy, args.no_cache, false);

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| is_image(p))
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
            .unwrap()
            .progress_chars("=>-"),
    );

    let orchestrator = ExtractionOrchestrator::from_config(&config)?;
    let document_type = args.document_type.as_str();

    let mut pending = stream::iter(files)
        .map(|path| {
            let orchestrator = &orchestrator;
            async move { process_single_file(orchestrator, path, document_type).await }
        })
        .buffer_unordered(args.jobs.max(1));

    let mut outcomes = Vec::new();
    while let Some(outcome) = pending.next().await {
        overall_pb.inc(1);

        if let Some(error_msg) = &outcome.error {
            if args.continue_on_error {
                warn!("Failed to process {}: {}", outcome.path.display(), error_msg);
            } else {
                error!("Failed to process {}: {}", outcome.path.display(), error_msg);
                overall_pb.abandon();
                anyhow::bail!("Processing failed: {}", error_msg);
            }
        }

        if let (Some(result), Some(output_dir)) = (&outcome.result, &args.output_dir) {
            let stem = outcome
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("document");
            let output_path = output_dir.join(format!("{}.{}", stem, args.format.extension()));
            fs::write(&output_path, format_result(result, args.format)?)?;
            debug!("Wrote output to {}", output_path.display());
        }

        outcomes.push(outcome);
    }

    overall_pb.finish_with_message("Complete");
    outcomes.sort_by(|a, b| a.path.cmp(&b.path));

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &outcomes)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let (successful, failed): (Vec<_>, Vec<_>) = outcomes.iter().partition(|o| o.succeeded());

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        outcomes.len(),
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(successful.len()).green(),
        style(failed.len()).red()
    );

    let metrics = orchestrator.metrics();
    debug!(
        "Cache hits: {}, misses: {}, providers: {}",
        metrics.cache_hits,
        metrics.cache_misses,
        orchestrator.providers().len()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for outcome in &failed {
            println!(
                "  - {}: {}",
                outcome.path.display(),
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

fn is_image(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str())
}

async fn process_single_file(
    orchestrator: &ExtractionOrchestrator,
    path: PathBuf,
    document_type: &str,
) -> FileOutcome {
    let file_start = Instant::now();

    let (result, error) = match fs::read(&path) {
        Ok(data) => {
            let result = orchestrator.process_document(&data, document_type).await;
            let error = result.error.clone();
            (Some(result), error)
        }
        Err(e) => (None, Some(e.to_string())),
    };

    FileOutcome {
        path,
        result,
        error,
        processing_time_ms: file_start.elapsed().as_millis() as u64,
    }
}

fn write_summary(path: &Path, outcomes: &[FileOutcome]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "method",
        "confidence",
        "name",
        "birth_date",
        "processing_time_ms",
        "error",
    ])?;

    for outcome in outcomes {
        let field = |name: &str| {
            outcome
                .result
                .as_ref()
                .and_then(|r| r.fields.get(name))
                .cloned()
                .unwrap_or_default()
        };
        let (method, confidence) = outcome
            .result
            .as_ref()
            .map(|r| (r.method.to_string(), r.confidence.to_string()))
            .unwrap_or_default();

        wtr.write_record([
            file_label(&outcome.path),
            if outcome.succeeded() { "success" } else { "error" },
            &method,
            &confidence,
            &field("name"),
            &field("birth_date"),
            &outcome.processing_time_ms.to_string(),
            outcome.error.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
