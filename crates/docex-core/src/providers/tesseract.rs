//! Offline OCR by shelling out to the `tesseract` binary.

use std::io::Write;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::ExtractionProvider;
use crate::error::ProviderError;
use crate::models::config::TesseractConfig;
use crate::models::{PreparedImage, ProviderKind, ProviderResult};
use crate::parser::meaningful_chars;
use crate::schema::DocumentSchema;

/// Last-resort provider. Runs every configured page segmentation mode over
/// the enhanced and binarized renditions and keeps the richest transcript.
pub struct TesseractProvider {
    enabled: bool,
    command: String,
    languages: String,
    psm_modes: Vec<u8>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

/// One tesseract run's output.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub rendition: &'static str,
    pub psm: u8,
    pub text: String,
}

impl TesseractProvider {
    pub fn from_config(config: &TesseractConfig) -> Self {
        Self {
            enabled: config.enabled,
            command: config.command.clone(),
            languages: config.languages.clone(),
            psm_modes: config.psm_modes.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
        }
    }

    fn args(&self, input: &str, psm: u8) -> Vec<String> {
        vec![
            input.to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.languages.clone(),
            "--oem".to_string(),
            "3".to_string(),
            "--psm".to_string(),
            psm.to_string(),
            "-c".to_string(),
            "preserve_interword_spaces=1".to_string(),
        ]
    }

    async fn run_all(&self, image: &PreparedImage) -> Result<Vec<Transcript>, ProviderError> {
        let mut renditions = vec![("enhanced", Arc::clone(&image.enhanced))];
        if !Arc::ptr_eq(&image.enhanced, &image.binarized) {
            renditions.push(("binarized", Arc::clone(&image.binarized)));
        }

        // Temp files must outlive every spawned process.
        let mut files = Vec::with_capacity(renditions.len());
        for (label, bytes) in &renditions {
            files.push((*label, write_temp(bytes)?));
        }

        let mut tasks = JoinSet::new();
        for (label, file) in &files {
            for &psm in &self.psm_modes {
                let command = self.command.clone();
                let args = self.args(&file.path().to_string_lossy(), psm);
                let permits = Arc::clone(&self.permits);
                let rendition = *label;
                tasks.spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| ProviderError::Engine(e.to_string()))?;
                    let text = run_tesseract(&command, &args).await?;
                    Ok::<_, ProviderError>(Transcript { rendition, psm, text })
                });
            }
        }

        let mut transcripts = Vec::new();
        let mut last_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(transcript)) => transcripts.push(transcript),
                Ok(Err(e)) => {
                    warn!("tesseract run failed: {}", e);
                    last_error = Some(e);
                }
                Err(e) => last_error = Some(ProviderError::Engine(e.to_string())),
            }
        }

        if transcripts.is_empty() {
            return Err(last_error.unwrap_or_else(|| ProviderError::Engine("no runs".to_string())));
        }
        Ok(transcripts)
    }
}

/// Transcript with the most meaningful characters. Ties go to the earlier
/// (rendition, psm) pair.
pub fn best_transcript(mut transcripts: Vec<Transcript>, psm_order: &[u8]) -> Option<Transcript> {
    let rank = |t: &Transcript| {
        let rendition = usize::from(t.rendition != "enhanced");
        let psm = psm_order.iter().position(|&p| p == t.psm).unwrap_or(usize::MAX);
        (rendition, psm)
    };
    transcripts.sort_by_key(rank);

    let mut best: Option<(usize, Transcript)> = None;
    for transcript in transcripts {
        let score = meaningful_chars(&transcript.text);
        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((score, transcript));
        }
    }
    best.filter(|(score, _)| *score > 0).map(|(_, t)| t)
}

fn write_temp(bytes: &[u8]) -> Result<NamedTempFile, ProviderError> {
    let mut file = tempfile::Builder::new()
        .prefix("docex-ocr-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| ProviderError::Engine(format!("temp file: {}", e)))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| ProviderError::Engine(format!("temp file: {}", e)))?;
    Ok(file)
}

async fn run_tesseract(command: &str, args: &[String]) -> Result<String, ProviderError> {
    let output = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ProviderError::Engine(format!("failed to start {}: {}", command, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProviderError::Engine(format!(
            "{} exited with {}: {}",
            command,
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl ExtractionProvider for TesseractProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Offline
    }

    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_configured(&self) -> bool {
        self.enabled && !self.command.trim().is_empty() && !self.psm_modes.is_empty()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn extract(
        &self,
        image: &PreparedImage,
        _schema: &DocumentSchema,
    ) -> Result<ProviderResult, ProviderError> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured);
        }

        let transcripts = self.run_all(image).await?;
        let runs = transcripts.len();
        let best = best_transcript(transcripts, &self.psm_modes)
            .ok_or_else(|| ProviderError::Engine("no text recognized".to_string()))?;

        debug!(
            "tesseract picked {} psm {} out of {} runs",
            best.rendition, best.psm, runs
        );
        Ok(ProviderResult::text(ProviderKind::Offline, best.text.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;
    use crate::schema::schema_for;

    fn transcript(rendition: &'static str, psm: u8, text: &str) -> Transcript {
        Transcript {
            rendition,
            psm,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_best_transcript_prefers_more_characters() {
        let picked = best_transcript(
            vec![
                transcript("enhanced", 3, "氏名"),
                transcript("binarized", 6, "氏名 山田 太郎"),
                transcript("enhanced", 11, "|| -- ||"),
            ],
            &[3, 6, 11],
        )
        .unwrap();
        assert_eq!((picked.rendition, picked.psm), ("binarized", 6));
    }

    #[test]
    fn test_best_transcript_tie_goes_to_first_mode() {
        let picked = best_transcript(
            vec![
                transcript("binarized", 3, "ABC"),
                transcript("enhanced", 11, "ABC"),
                transcript("enhanced", 3, "ABC"),
            ],
            &[3, 6, 11],
        )
        .unwrap();
        assert_eq!((picked.rendition, picked.psm), ("enhanced", 3));
    }

    #[test]
    fn test_best_transcript_rejects_empty_output() {
        assert_eq!(best_transcript(vec![transcript("enhanced", 3, " \n|")], &[3]), None);
        assert_eq!(best_transcript(Vec::new(), &[3]), None);
    }

    #[test]
    fn test_args() {
        let provider = TesseractProvider::from_config(&TesseractConfig::default());
        let args = provider.args("/tmp/x.png", 6);
        assert_eq!(args[0], "/tmp/x.png");
        assert_eq!(args[1], "stdout");
        assert!(args.windows(2).any(|w| w == ["-l", "jpn+eng"]));
        assert!(args.windows(2).any(|w| w == ["--psm", "6"]));
    }

    #[test]
    fn test_disabled_is_not_configured() {
        let provider = TesseractProvider::from_config(&TesseractConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(!provider.is_configured());
    }

    #[tokio::test]
    async fn test_missing_binary_is_engine_error() {
        let provider = TesseractProvider::from_config(&TesseractConfig {
            command: "docex-no-such-tesseract-binary".to_string(),
            psm_modes: vec![3],
            ..Default::default()
        });
        let image = PreparedImage::unprocessed(vec![1, 2, 3], "image/png");

        let err = provider
            .extract(&image, schema_for(DocumentType::Generic))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Engine(_)));
    }
}
