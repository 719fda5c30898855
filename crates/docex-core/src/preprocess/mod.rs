//! Image preprocessing for OCR.

pub mod filters;

use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::morphology;
use tracing::{debug, warn};

use crate::error::{DocexError, Result};
use crate::models::config::PreprocessConfig;
use crate::models::PreparedImage;

use filters::clahe;

/// Enhances document photos before they are handed to the offline OCR engine.
///
/// All operations are pure: the input bytes are never modified and the same
/// input always produces the same output.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    min_dimension: u32,
    max_dimension: u32,
    max_upscale: f32,
    clip_limit: f32,
    tiles: u32,
    denoise_radius: u32,
}

impl ImagePreprocessor {
    /// Create a new preprocessor with default settings.
    pub fn new() -> Self {
        Self::from_config(&PreprocessConfig::default())
    }

    pub fn from_config(config: &PreprocessConfig) -> Self {
        Self {
            min_dimension: config.min_dimension,
            max_dimension: config.max_dimension,
            max_upscale: config.max_upscale.max(1.0),
            clip_limit: config.clahe_clip_limit,
            tiles: config.clahe_tiles.max(1),
            denoise_radius: config.denoise_radius,
        }
    }

    /// Set the shorter-side size below which images are upscaled.
    pub fn with_min_dimension(mut self, size: u32) -> Self {
        self.min_dimension = size;
        self
    }

    pub fn with_max_dimension(mut self, size: u32) -> Self {
        self.max_dimension = size;
        self
    }

    /// Enhanced grayscale rendition as PNG bytes.
    ///
    /// If the input cannot be decoded the original bytes are returned unchanged.
    pub fn enhance(&self, bytes: &[u8]) -> Vec<u8> {
        self.try_render(bytes, false).unwrap_or_else(|e| {
            warn!("Preprocessing skipped: {}", e);
            bytes.to_vec()
        })
    }

    /// Enhanced and binarized rendition as PNG bytes, with the same fallback as [`enhance`](Self::enhance).
    pub fn binarize(&self, bytes: &[u8]) -> Vec<u8> {
        self.try_render(bytes, true).unwrap_or_else(|e| {
            warn!("Preprocessing skipped: {}", e);
            bytes.to_vec()
        })
    }

    /// Decode once and build every rendition the providers need.
    pub fn prepare(&self, bytes: Vec<u8>, mime_type: &str) -> PreparedImage {
        let image = match image::load_from_memory(&bytes) {
            Ok(image) => image,
            Err(e) => {
                warn!("Image decode failed, providers get the raw bytes: {}", e);
                return PreparedImage::unprocessed(bytes, mime_type);
            }
        };

        let enhanced = self.enhance_image(&image);
        let binarized = Self::binarize_gray(&enhanced);

        match (encode_png(&enhanced), encode_png(&binarized)) {
            (Ok(enhanced), Ok(binarized)) => PreparedImage {
                original: Arc::new(bytes),
                mime_type: mime_type.to_string(),
                enhanced: Arc::new(enhanced),
                binarized: Arc::new(binarized),
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to encode preprocessed image: {}", e);
                PreparedImage::unprocessed(bytes, mime_type)
            }
        }
    }

    fn try_render(&self, bytes: &[u8], binarize: bool) -> Result<Vec<u8>> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| DocexError::Decode(e.to_string()))?;
        let enhanced = self.enhance_image(&image);
        if binarize {
            encode_png(&Self::binarize_gray(&enhanced))
        } else {
            encode_png(&enhanced)
        }
    }

    /// Resize, grayscale, local contrast, denoise.
    pub fn enhance_image(&self, image: &DynamicImage) -> GrayImage {
        let (width, height) = image.dimensions();
        let scale = self.calculate_scale(width, height);

        let resized = if (scale - 1.0).abs() > f32::EPSILON {
            let new_width = ((width as f32 * scale).round() as u32).max(1);
            let new_height = ((height as f32 * scale).round() as u32).max(1);
            debug!(
                "Resizing {}x{} -> {}x{} for OCR",
                width, height, new_width, new_height
            );
            image.resize_exact(new_width, new_height, FilterType::Lanczos3)
        } else {
            image.clone()
        };

        let gray = resized.to_luma8();
        let contrasted = clahe(&gray, self.tiles, self.clip_limit);
        self.denoise(contrasted)
    }

    fn denoise(&self, gray: GrayImage) -> GrayImage {
        match self.denoise_radius {
            0 => gray,
            r => median_filter(&gray, r, r),
        }
    }

    /// Otsu threshold, then a 3x3 opening of the white background so
    /// one-pixel gaps in dark strokes are filled.
    fn binarize_gray(gray: &GrayImage) -> GrayImage {
        let binary = threshold(gray, otsu_level(gray), ThresholdType::Binary);
        morphology::open(&binary, Norm::LInf, 1)
    }

    /// Scale factor: shrink oversized images, enlarge small ones up to `max_upscale`.
    fn calculate_scale(&self, width: u32, height: u32) -> f32 {
        let longer = width.max(height);
        let shorter = width.min(height);

        if longer > self.max_dimension && self.max_dimension > 0 {
            return self.max_dimension as f32 / longer as f32;
        }
        if shorter > 0 && shorter < self.min_dimension {
            let wanted = self.min_dimension as f32 / shorter as f32;
            let limit = self.max_upscale.min(self.max_dimension as f32 / longer.max(1) as f32);
            return wanted.min(limit).max(1.0);
        }
        1.0
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_png(gray: &GrayImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    DynamicImage::ImageLuma8(gray.clone()).write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(buffer)
}

/// Shrink an image for upload to a remote service.
///
/// Returns the input unchanged when it already fits. Otherwise the image is
/// downscaled to at most 1600px on its longer side and re-encoded as JPEG,
/// lowering quality from 85 to 50 until it fits.
pub fn compress_for_upload(bytes: &[u8], mime_type: &str, max_bytes: usize) -> (Vec<u8>, String) {
    if bytes.len() <= max_bytes {
        return (bytes.to_vec(), mime_type.to_string());
    }

    let image = match image::load_from_memory(bytes) {
        Ok(image) => image,
        Err(e) => {
            warn!("Cannot decode image for upload compression: {}", e);
            return (bytes.to_vec(), mime_type.to_string());
        }
    };

    let (width, height) = image.dimensions();
    let image = if width.max(height) > 1600 {
        image.resize(1600, 1600, FilterType::Lanczos3)
    } else {
        image
    };
    let rgb = image.to_rgb8();

    let mut best: Option<Vec<u8>> = None;
    for quality in (50..=85u8).rev().step_by(5) {
        let mut buffer = Vec::new();
        if let Err(e) = JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&rgb) {
            warn!("JPEG encoding failed at quality {}: {}", quality, e);
            break;
        }
        let fits = buffer.len() <= max_bytes;
        best = Some(buffer);
        if fits {
            debug!("Compressed upload {} -> {} bytes (q={})", bytes.len(), best.as_ref().map_or(0, Vec::len), quality);
            break;
        }
    }

    match best {
        Some(buffer) => (buffer, "image/jpeg".to_string()),
        None => (bytes.to_vec(), mime_type.to_string()),
    }
}
