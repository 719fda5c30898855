//! Models command - download and manage the face detection model.
//!
//! The face detector is optional. Without it, portraits are cropped from
//! a fixed card region.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use docex_core::ContentHash;

use super::data_dir;

/// Arguments for the models command.
#[derive(Args)]
pub struct ModelsArgs {
    #[command(subcommand)]
    command: ModelsCommand,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// List available models
    List,

    /// Download the face detection model
    Download(DownloadArgs),

    /// Check model status
    Status,

    /// Remove the downloaded model and partial downloads
    Clean,
}

#[derive(Args)]
struct DownloadArgs {
    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force re-download even if the file exists
    #[arg(long)]
    force: bool,
}

struct ModelInfo {
    filename: &'static str,
    size_bytes: u64,
    description: &'static str,
    url: &'static str,
}

const FACE_MODEL: ModelInfo = ModelInfo {
    filename: "version-RFB-320.onnx",
    size_bytes: 1_270_000,
    description: "Ultra-Light face detector, 320x240 input",
    url: "https://github.com/Linzaer/Ultra-Light-Fast-Generic-Face-Detector-1MB/raw/master/models/onnx/version-RFB-320.onnx",
};

const PARTIAL_EXTENSION: &str = "part";

/// What is on disk for a model file.
#[derive(Debug, PartialEq, Eq)]
enum ModelState {
    Missing,
    /// Smaller than half the expected size, most likely an interrupted download.
    Incomplete(u64),
    Ready(u64),
}

impl ModelState {
    fn inspect(path: &Path, expected: u64) -> std::io::Result<Self> {
        if !path.exists() {
            return Ok(ModelState::Missing);
        }
        let size = fs::metadata(path)?.len();
        Ok(if size > expected / 2 {
            ModelState::Ready(size)
        } else {
            ModelState::Incomplete(size)
        })
    }
}

fn models_dir() -> PathBuf {
    data_dir().join("models")
}

/// Where `docex models download` stores the face model by default.
pub fn face_model_path() -> PathBuf {
    models_dir().join(FACE_MODEL.filename)
}

pub async fn run(args: ModelsArgs) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::List => list_models(),
        ModelsCommand::Download(download_args) => download_model(download_args).await,
        ModelsCommand::Status => print_status(&models_dir()),
        ModelsCommand::Clean => clean_models(&models_dir()),
    }
}

fn list_models() -> anyhow::Result<()> {
    println!("{}", style("Available Models").bold());
    println!();
    println!(
        "  {} {:<22} {:>8}  {}",
        style("▸").cyan(),
        FACE_MODEL.filename,
        format_size(FACE_MODEL.size_bytes),
        style(FACE_MODEL.description).dim()
    );
    println!();
    println!("Used for portraits on zairyu_card and license documents.");
    println!("Run 'docex models download' to install it.");
    Ok(())
}

async fn download_model(args: DownloadArgs) -> anyhow::Result<()> {
    let output_dir = args.output.unwrap_or_else(models_dir);
    fs::create_dir_all(&output_dir)?;
    let target = output_dir.join(FACE_MODEL.filename);

    if !args.force {
        if let ModelState::Ready(size) = ModelState::inspect(&target, FACE_MODEL.size_bytes)? {
            println!(
                "{} {} already present ({}), use --force to fetch again",
                style("✓").green(),
                FACE_MODEL.filename,
                format_size(size)
            );
            return Ok(());
        }
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("docex-cli/", env!("CARGO_PKG_VERSION")))
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let pb = ProgressBar::new(FACE_MODEL.size_bytes);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} {msg:<24} [{bar:25.cyan/blue}] {bytes}/{total_bytes}")
            .unwrap()
            .progress_chars("=>-"),
    );
    pb.set_message(FACE_MODEL.filename);

    if let Err(e) = fetch(&client, FACE_MODEL.url, &target, &pb).await {
        pb.abandon_with_message(format!("{} {}", style("✗").red(), FACE_MODEL.filename));
        return Err(e.context(format!("downloading {}", FACE_MODEL.url)));
    }
    pb.finish_with_message(format!("{} {}", style("✓").green(), FACE_MODEL.filename));

    println!();
    print_status(&output_dir)
}

/// Stream `url` into `<target>.part`, then rename over `target`.
async fn fetch(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
    pb: &ProgressBar,
) -> anyhow::Result<()> {
    let response = client.get(url).send().await?.error_for_status()?;
    if let Some(length) = response.content_length() {
        pb.set_length(length);
    }

    let partial = target.with_extension(PARTIAL_EXTENSION);
    let mut file = File::create(&partial)?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        pb.inc(chunk.len() as u64);
    }
    file.sync_all()?;
    drop(file);

    fs::rename(&partial, target)?;
    debug!("Saved {}", target.display());
    Ok(())
}

fn print_status(dir: &Path) -> anyhow::Result<()> {
    let path = dir.join(FACE_MODEL.filename);
    println!("{} {}", style("Face model").bold(), path.display());

    match ModelState::inspect(&path, FACE_MODEL.size_bytes)? {
        ModelState::Ready(size) => {
            let digest = ContentHash::of(&fs::read(&path)?);
            println!("  {} ready, {}", style("✓").green(), format_size(size));
            println!("  sha256 {}", digest);
        }
        ModelState::Incomplete(size) => {
            println!(
                "  {} only {} on disk, run 'docex models download --force'",
                style("⚠").yellow(),
                format_size(size)
            );
        }
        ModelState::Missing => {
            println!(
                "  {} missing, portraits use the fixed card region",
                style("✗").red()
            );
        }
    }
    Ok(())
}

fn clean_models(dir: &Path) -> anyhow::Result<()> {
    let mut removed = Vec::new();
    let mut freed: u64 = 0;

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let is_model = path.file_name().and_then(|n| n.to_str()) == Some(FACE_MODEL.filename);
            let is_partial = path.extension().and_then(|e| e.to_str()) == Some(PARTIAL_EXTENSION);
            if is_model || is_partial {
                freed += entry.metadata().map(|m| m.len()).unwrap_or(0);
                fs::remove_file(&path)?;
                removed.push(path);
            }
        }
    }

    if removed.is_empty() {
        println!("{} No model files to remove.", style("ℹ").blue());
        return Ok(());
    }
    for path in &removed {
        println!("  {} Removed {}", style("✓").green(), path.display());
    }
    println!("Freed {}", format_size(freed));
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1}GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.1}MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1}KB", bytes as f64 / 1_000.0)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(1_270_000), "1.3MB");
        assert_eq!(format_size(2_500_000_000), "2.5GB");
    }

    #[test]
    fn test_model_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.onnx");
        assert_eq!(ModelState::inspect(&path, 1000).unwrap(), ModelState::Missing);

        fs::write(&path, vec![0u8; 100]).unwrap();
        assert_eq!(ModelState::inspect(&path, 1000).unwrap(), ModelState::Incomplete(100));

        fs::write(&path, vec![0u8; 900]).unwrap();
        assert_eq!(ModelState::inspect(&path, 1000).unwrap(), ModelState::Ready(900));
    }

    #[test]
    fn test_clean_removes_model_and_partials_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(FACE_MODEL.filename), b"model").unwrap();
        fs::write(dir.path().join("version-RFB-320.part"), b"half").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        clean_models(dir.path()).unwrap();

        let left: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(left, vec!["notes.txt".to_string()]);
    }

    #[test]
    fn test_face_model_path() {
        assert!(face_model_path().ends_with("docex/models/version-RFB-320.onnx"));
    }
}
