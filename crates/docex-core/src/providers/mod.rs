//! Extraction providers: two remote services and a local OCR engine.

mod gemini;
mod tesseract;
mod vision;

pub use gemini::GeminiProvider;
pub use tesseract::TesseractProvider;
pub use vision::VisionProvider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{DocexError, ProviderError, Result};
use crate::models::config::ProvidersConfig;
use crate::models::{PreparedImage, ProviderKind, ProviderResult};
use crate::preprocess::compress_for_upload;
use crate::schema::DocumentSchema;

/// One slot in the provider cascade.
///
/// Implementations return either structured fields or raw text; the
/// orchestrator parses and validates whatever comes back.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Which slot this provider fills. Fixes its confidence tier.
    fn kind(&self) -> ProviderKind;

    /// Engine name for logs (e.g. "gemini", "tesseract").
    fn name(&self) -> &str;

    /// Providers without credentials or with the engine disabled are skipped.
    fn is_configured(&self) -> bool;

    /// Upper bound for a single `extract` call.
    fn timeout(&self) -> Duration;

    async fn extract(
        &self,
        image: &PreparedImage,
        schema: &DocumentSchema,
    ) -> std::result::Result<ProviderResult, ProviderError>;
}

/// Build the three configured providers in tier order.
pub fn from_config(config: &ProvidersConfig) -> Result<Vec<Arc<dyn ExtractionProvider>>> {
    Ok(vec![
        Arc::new(GeminiProvider::from_config(&config.primary)?),
        Arc::new(VisionProvider::from_config(&config.secondary)?),
        Arc::new(TesseractProvider::from_config(&config.offline)),
    ])
}

/// Bytes and MIME type to upload, re-encoded on the blocking pool when the
/// original exceeds `max_bytes`.
pub(crate) async fn upload_payload(
    image: &PreparedImage,
    max_bytes: usize,
) -> std::result::Result<(Vec<u8>, String), ProviderError> {
    let original = Arc::clone(&image.original);
    let mime_type = image.mime_type.clone();
    tokio::task::spawn_blocking(move || compress_for_upload(&original, &mime_type, max_bytes))
        .await
        .map_err(|e| ProviderError::Engine(format!("image compression task failed: {}", e)))
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DocexError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Turn a non-success HTTP response into a `ProviderError::Status`.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> std::result::Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body: body.chars().take(300).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::DocexConfig;

    #[test]
    fn test_from_config_order_and_tiers() {
        let mut config = DocexConfig::default();
        config.providers.primary.api_key_env = String::new();
        config.providers.secondary.api_key_env = String::new();

        let providers = from_config(&config.providers).unwrap();
        let kinds: Vec<ProviderKind> = providers.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, ProviderKind::ALL.to_vec());

        assert!(!providers[0].is_configured());
        assert!(!providers[1].is_configured());
        assert!(providers[2].is_configured());
    }

    fn checkerboard_png(size: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(size, size, |x, y| {
            if (x / 3 + y / 3) % 2 == 0 {
                image::Rgb([20, 20, 20])
            } else {
                image::Rgb([230, 230, 230])
            }
        });
        let mut buffer = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
            .unwrap();
        buffer
    }

    #[tokio::test]
    async fn test_upload_payload_compresses_off_runtime() {
        let png = checkerboard_png(200);
        let prepared = PreparedImage::unprocessed(png.clone(), "image/png");

        let (bytes, mime) = upload_payload(&prepared, 1).await.unwrap();
        assert_eq!(mime, "image/jpeg");
        assert!(image::load_from_memory(&bytes).is_ok());
        assert_eq!(prepared.original.as_slice(), png.as_slice());

        let (same, mime) = upload_payload(&prepared, png.len()).await.unwrap();
        assert_eq!(same, png);
        assert_eq!(mime, "image/png");
    }
}
