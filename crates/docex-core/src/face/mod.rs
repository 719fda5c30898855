//! Face photo cropping for documents that carry a portrait.

mod detector;

pub use detector::{nms, FaceDetector, INPUT_HEIGHT, INPUT_WIDTH};

use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

use crate::error::FaceError;
use crate::models::config::FaceConfig;

/// Axis-aligned face box in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &FaceBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }
}

/// Anything that can find faces in a decoded image.
pub trait FaceLocator: Send + Sync {
    fn locate(&self, image: &DynamicImage) -> Result<Vec<FaceBox>, FaceError>;
}

/// Pixel rectangle: x, y, width, height.
pub type Region = (u32, u32, u32, u32);

/// Crops the portrait from a card image and returns it as a JPEG data URL.
///
/// Uses the largest detected face when a locator is available; otherwise
/// (or when nothing is found) crops a fixed region where cards print the photo.
#[derive(Clone)]
pub struct FaceRegionExtractor {
    locator: Option<Arc<dyn FaceLocator>>,
    padding: u32,
    output_width: u32,
    output_height: u32,
    jpeg_quality: u8,
    fallback_region: [f32; 4],
}

impl FaceRegionExtractor {
    pub fn new() -> Self {
        Self::from_config(&FaceConfig::default())
    }

    /// Build from config without loading a model.
    pub fn from_config(config: &FaceConfig) -> Self {
        Self {
            locator: None,
            padding: config.padding,
            output_width: config.output_width.max(1),
            output_height: config.output_height.max(1),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
            fallback_region: config.fallback_region,
        }
    }

    /// Build from config and load the detector model when one is configured.
    ///
    /// A model that fails to load is logged and the fixed region is used instead.
    pub fn load(config: &FaceConfig) -> Self {
        let extractor = Self::from_config(config);
        match load_detector(config) {
            Ok(Some(locator)) => extractor.with_locator(locator),
            Ok(None) => extractor,
            Err(e) => {
                warn!("Face model unavailable, using fixed region: {}", e);
                extractor
            }
        }
    }

    pub fn with_locator(mut self, locator: Arc<dyn FaceLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// `data:image/jpeg;base64,...` for the face, or `None` on any failure.
    pub fn extract(&self, image_bytes: &[u8]) -> Option<String> {
        match self.try_extract(image_bytes) {
            Ok(url) => Some(url),
            Err(e) => {
                debug!("Face extraction failed: {}", e);
                None
            }
        }
    }

    pub fn try_extract(&self, image_bytes: &[u8]) -> Result<String, FaceError> {
        let image = image::load_from_memory(image_bytes).map_err(|e| FaceError::Image(e.to_string()))?;
        let (x, y, w, h) = self.crop_region(&image)?;

        let face = image
            .crop_imm(x, y, w, h)
            .resize_exact(self.output_width, self.output_height, FilterType::Lanczos3)
            .to_rgb8();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut Cursor::new(&mut jpeg), self.jpeg_quality)
            .encode_image(&face)
            .map_err(|e| FaceError::Image(e.to_string()))?;

        Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)))
    }

    /// Region to crop: padded largest face, or the fixed fallback.
    pub fn crop_region(&self, image: &DynamicImage) -> Result<Region, FaceError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(FaceError::Image("empty image".to_string()));
        }

        let largest = match &self.locator {
            Some(locator) => match locator.locate(image) {
                Ok(faces) => faces.into_iter().max_by(|a, b| a.area().total_cmp(&b.area())),
                Err(e) => {
                    warn!("Face detection failed, using fixed region: {}", e);
                    None
                }
            },
            None => None,
        };

        let region = match largest {
            Some(face) => self.padded(&face, width, height),
            None => self.fallback(width, height),
        };
        if region.2 == 0 || region.3 == 0 {
            return Err(FaceError::Image("crop region is empty".to_string()));
        }
        Ok(region)
    }

    fn padded(&self, face: &FaceBox, width: u32, height: u32) -> Region {
        let pad = self.padding as f32;
        let x1 = (face.x1 - pad).max(0.0) as u32;
        let y1 = (face.y1 - pad).max(0.0) as u32;
        let x2 = ((face.x2 + pad).ceil() as u32).min(width);
        let y2 = ((face.y2 + pad).ceil() as u32).min(height);
        (x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
    }

    fn fallback(&self, width: u32, height: u32) -> Region {
        let [fx, fy, fw, fh] = self.fallback_region.map(|v| v.clamp(0.0, 1.0));
        let x = ((fx * width as f32).round() as u32).min(width - 1);
        let y = ((fy * height as f32).round() as u32).min(height - 1);
        let w = ((fw * width as f32).round() as u32).clamp(1, width - x);
        let h = ((fh * height as f32).round() as u32).clamp(1, height - y);
        (x, y, w, h)
    }
}

impl Default for FaceRegionExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "native")]
fn load_detector(config: &FaceConfig) -> Result<Option<Arc<dyn FaceLocator>>, FaceError> {
    let Some(path) = config.model_path.as_ref() else {
        return Ok(None);
    };
    if !path.exists() {
        return Err(FaceError::ModelLoad(format!("{} not found", path.display())));
    }

    let backend = docex_inference::OrtBackend::from_file(path)?;
    debug!("Loaded face model from {}", path.display());
    let detector = FaceDetector::new(backend)
        .with_score_threshold(config.score_threshold)
        .with_nms_iou(config.nms_iou);
    Ok(Some(Arc::new(detector)))
}

#[cfg(not(feature = "native"))]
fn load_detector(config: &FaceConfig) -> Result<Option<Arc<dyn FaceLocator>>, FaceError> {
    match &config.model_path {
        Some(_) => Err(FaceError::ModelLoad("built without the native feature".to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLocator {
        faces: Vec<FaceBox>,
        calls: AtomicUsize,
    }

    impl FaceLocator for FixedLocator {
        fn locate(&self, _image: &DynamicImage) -> Result<Vec<FaceBox>, FaceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.faces.clone())
        }
    }

    struct FailingLocator;

    impl FaceLocator for FailingLocator {
        fn locate(&self, _image: &DynamicImage) -> Result<Vec<FaceBox>, FaceError> {
            Err(FaceError::Image("boom".to_string()))
        }
    }

    fn card_png(width: u32, height: u32) -> (DynamicImage, Vec<u8>) {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        (image, bytes)
    }

    fn face(x1: f32, y1: f32, x2: f32, y2: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, score: 0.9 }
    }

    #[test]
    fn test_fallback_region_without_locator() {
        let (image, _) = card_png(1000, 600);
        let extractor = FaceRegionExtractor::new();
        assert_eq!(extractor.crop_region(&image).unwrap(), (700, 60, 250, 210));
    }

    #[test]
    fn test_largest_face_padded_and_clamped() {
        let locator = Arc::new(FixedLocator {
            faces: vec![face(10.0, 10.0, 40.0, 40.0), face(700.0, 100.0, 900.0, 350.0)],
            calls: AtomicUsize::new(0),
        });
        let extractor = FaceRegionExtractor::new().with_locator(locator.clone());
        let (image, _) = card_png(950, 600);

        let region = extractor.crop_region(&image).unwrap();
        assert_eq!(region, (640, 40, 310, 370));
        assert_eq!(locator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_no_faces_or_locator_error_uses_fallback() {
        let (image, _) = card_png(1000, 600);
        let empty = FaceRegionExtractor::new().with_locator(Arc::new(FixedLocator {
            faces: Vec::new(),
            calls: AtomicUsize::new(0),
        }));
        assert_eq!(empty.crop_region(&image).unwrap(), (700, 60, 250, 210));

        let failing = FaceRegionExtractor::new().with_locator(Arc::new(FailingLocator));
        assert_eq!(failing.crop_region(&image).unwrap(), (700, 60, 250, 210));
    }

    #[test]
    fn test_extract_returns_sized_jpeg_data_url() {
        let (_, bytes) = card_png(400, 250);
        let url = FaceRegionExtractor::new().extract(&bytes).unwrap();
        let payload = url.strip_prefix("data:image/jpeg;base64,").unwrap();

        let jpeg = STANDARD.decode(payload).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (150, 180));
    }

    #[test]
    fn test_extract_invalid_bytes_is_none() {
        assert_eq!(FaceRegionExtractor::new().extract(b"not an image"), None);
    }

    #[test]
    fn test_tiny_image_still_crops() {
        let (_, bytes) = card_png(2, 2);
        assert!(FaceRegionExtractor::new().extract(&bytes).is_some());
    }

    #[test]
    fn test_iou() {
        let a = face(0.0, 0.0, 10.0, 10.0);
        let b = face(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&face(20.0, 20.0, 30.0, 30.0)), 0.0);
    }
}
