//! Process command - extract fields from a single document image.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use docex_core::{DocexConfig, ExtractionOrchestrator, FinalResult, Strategy};

use super::load_config;

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input image
    #[arg(required = true)]
    input: PathBuf,

    /// Document type: zairyu_card, license, rirekisho or generic
    #[arg(short = 't', long = "type", default_value = "generic")]
    document_type: String,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Provider strategy (overrides the config file)
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Skip the result cache
    #[arg(long)]
    no_cache: bool,

    /// Leave the face photo out of the output
    #[arg(long)]
    no_photo: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output (one header row, one data row)
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum StrategyArg {
    /// Try providers one by one
    Sequential,
    /// Run all providers at once
    Parallel,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Sequential => Strategy::Sequential,
            StrategyArg::Parallel => Strategy::Parallel,
        }
    }
}

/// Apply command-line overrides shared by `process` and `batch`.
pub fn apply_overrides(config: &mut DocexConfig, strategy: Option<StrategyArg>, no_cache: bool, no_photo: bool) {
    if let Some(strategy) = strategy {
        config.orchestration.strategy = strategy.into();
    }
    if no_cache {
        config.cache.enabled = false;
    }
    if no_photo {
        config.face.enabled = false;
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, args.strategy, args.no_cache, args.no_photo);

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );
    pb.set_message(format!("Extracting {}...", args.document_type));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let orchestrator = ExtractionOrchestrator::from_config(&config)?;
    let data = fs::read(&args.input)?;
    let result = orchestrator.process_document(&data, &args.document_type).await;

    pb.finish_and_clear();

    let output = format_result(&result, args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    if let Some(error) = &result.error {
        anyhow::bail!("Extraction failed: {}", error);
    }
    eprintln!(
        "{} {} via {} (confidence {})",
        style("✓").green(),
        result.document_type,
        result.method,
        result.confidence
    );
    Ok(())
}

pub fn format_result(result: &FinalResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Csv => format_csv(result),
        OutputFormat::Text => Ok(format_text(result)),
    }
}

fn format_csv(result: &FinalResult) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["document_type", "method", "confidence"];
    header.extend(result.fields.keys().map(String::as_str));
    wtr.write_record(&header)?;

    let mut row = vec![
        result.document_type.to_string(),
        result.method.to_string(),
        result.confidence.to_string(),
    ];
    row.extend(result.fields.values().cloned());
    wtr.write_record(&row)?;

    Ok(String::from_utf8(wtr.into_inner()?)?)
}

fn format_text(result: &FinalResult) -> String {
    let mut output = String::new();

    output.push_str(&format!("Document: {}\n", result.document_type));
    output.push_str(&format!("Method: {}\n", result.method));
    output.push_str(&format!("Confidence: {}\n", result.confidence));
    output.push_str(&format!("Processed: {}\n", result.processed_at.to_rfc3339()));

    if let Some(error) = &result.error {
        output.push_str(&format!("Error: {}\n", error));
    }

    if !result.fields.is_empty() {
        output.push('\n');
        let width = result.fields.keys().map(|k| k.len()).max().unwrap_or(0);
        for (name, value) in &result.fields {
            let value = value.replace('\n', &format!("\n  {:width$}", ""));
            output.push_str(&format!("  {:<width$}  {}\n", name, value));
        }
    }

    if result.photo.is_some() {
        output.push_str("\nPhoto: attached (JPEG)\n");
    }

    output
}
