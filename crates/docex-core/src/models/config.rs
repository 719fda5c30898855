//! Configuration structures for the extraction pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocexError, Result};

/// Placeholder shipped in sample configs; treated as "no key".
const PLACEHOLDER_KEY: &str = "YOUR_API_KEY_HERE";

/// Main configuration for the docex pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocexConfig {
    pub providers: ProvidersConfig,
    pub orchestration: OrchestrationConfig,
    pub preprocessing: PreprocessConfig,
    pub face: FaceConfig,
    pub cache: CacheConfig,
    pub limits: LimitsConfig,
}

/// Settings for the three provider slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub primary: GeminiConfig,
    pub secondary: VisionConfig,
    pub offline: TesseractConfig,
}

/// Remote multimodal model (structured extraction).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    /// Inline API key. Takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Images above this size are re-encoded as JPEG before upload.
    pub max_upload_bytes: usize,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: 0.1,
            timeout_secs: 30,
            max_upload_bytes: 1024 * 1024,
        }
    }
}

impl GeminiConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

/// Remote text-detection service (raw text).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub language_hints: Vec<String>,
    pub timeout_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com/v1".to_string(),
            api_key: None,
            api_key_env: "GOOGLE_CLOUD_VISION_API_KEY".to_string(),
            language_hints: vec!["ja".to_string(), "en".to_string()],
            timeout_secs: 30,
            max_upload_bytes: 4 * 1024 * 1024,
        }
    }
}

impl VisionConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

/// Local tesseract OCR engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    pub enabled: bool,
    /// Binary name or path.
    pub command: String,
    /// Tesseract `-l` argument.
    pub languages: String,
    /// Page segmentation modes tried for each image rendition.
    pub psm_modes: Vec<u8>,
    /// Upper bound on concurrently running tesseract processes.
    pub max_concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "tesseract".to_string(),
            languages: "jpn+eng".to_string(),
            psm_modes: vec![3, 6, 11],
            max_concurrency: 3,
            timeout_secs: 60,
        }
    }
}

/// How the provider cascade is run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Providers in tier order; stop at the first valid result.
    #[default]
    Sequential,
    /// All providers at once; best tier among completed valid results wins.
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub strategy: Strategy,
    /// Hard limit for one whole request, cascade included.
    pub request_timeout_secs: u64,
    pub face_timeout_secs: u64,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Sequential,
            request_timeout_secs: 120,
            face_timeout_secs: 30,
        }
    }
}

impl OrchestrationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn face_timeout(&self) -> Duration {
        Duration::from_secs(self.face_timeout_secs)
    }
}

/// Image enhancement applied before offline OCR.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Images whose shorter side is below this are upscaled.
    pub min_dimension: u32,
    /// Images whose longer side exceeds this are downscaled first.
    pub max_dimension: u32,
    pub max_upscale: f32,
    pub clahe_clip_limit: f32,
    /// Tiles per axis for local contrast enhancement.
    pub clahe_tiles: u32,
    /// Median filter radius (0 disables denoising).
    pub denoise_radius: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_dimension: 1000,
            max_dimension: 2400,
            max_upscale: 2.0,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            denoise_radius: 1,
        }
    }
}

/// Face photo cropping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    pub enabled: bool,
    /// Ultra-Light face detector ONNX model. Without it the fixed layout region is used.
    pub model_path: Option<PathBuf>,
    pub score_threshold: f32,
    pub nms_iou: f32,
    /// Pixels added around the detected box on every side.
    pub padding: u32,
    pub output_width: u32,
    pub output_height: u32,
    pub jpeg_quality: u8,
    /// Fallback region as fractions of width/height: x, y, w, h.
    pub fallback_region: [f32; 4],
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_path: None,
            score_threshold: 0.7,
            nms_iou: 0.3,
            padding: 60,
            output_width: 150,
            output_height: 180,
            jpeg_quality: 90,
            fallback_region: [0.70, 0.10, 0.25, 0.35],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("ocr_cache"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Inputs above this size are rejected with a degraded result.
    pub max_image_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

impl DocexConfig {
    /// Load configuration from a JSON file and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| DocexError::Config(format!("{}: {}", path.display(), e)))?;
        config
            .validate()
            .map_err(|e| DocexError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Reject settings that would make every request fail.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let timeouts = [
            ("orchestration.request_timeout_secs", self.orchestration.request_timeout_secs),
            ("orchestration.face_timeout_secs", self.orchestration.face_timeout_secs),
            ("providers.primary.timeout_secs", self.providers.primary.timeout_secs),
            ("providers.secondary.timeout_secs", self.providers.secondary.timeout_secs),
            ("providers.offline.timeout_secs", self.providers.offline.timeout_secs),
        ];
        if let Some((key, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(format!("{} must be greater than 0", key));
        }
        if self.limits.max_image_bytes == 0 {
            return Err("limits.max_image_bytes must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Save configuration to a JSON file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn resolve_key(inline: Option<&str>, env_var: &str) -> Option<String> {
    let usable = |key: &str| !key.trim().is_empty() && key != PLACEHOLDER_KEY;

    if let Some(key) = inline.filter(|k| usable(k)) {
        return Some(key.to_string());
    }
    if env_var.is_empty() {
        return None;
    }
    std::env::var(env_var).ok().filter(|k| usable(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DocexConfig::default();
        assert_eq!(config.orchestration.strategy, Strategy::Sequential);
        assert_eq!(config.providers.offline.psm_modes, vec![3, 6, 11]);
        assert_eq!(config.providers.offline.languages, "jpn+eng");
        assert_eq!(config.limits.max_image_bytes, 10_485_760);
        assert_eq!(config.face.output_width, 150);
        assert_eq!(config.face.output_height, 180);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DocexConfig =
            serde_json::from_str(r#"{"orchestration": {"strategy": "parallel"}}"#).unwrap();
        assert_eq!(config.orchestration.strategy, Strategy::Parallel);
        assert_eq!(config.orchestration.request_timeout_secs, 120);
        assert_eq!(config.providers.primary.timeout_secs, 30);
    }

    #[test]
    fn test_placeholder_key_is_ignored() {
        let config = GeminiConfig {
            api_key: Some(PLACEHOLDER_KEY.to_string()),
            api_key_env: String::new(),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key(), None);

        let config = GeminiConfig {
            api_key: Some("abc".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("abc"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = DocexConfig::default();
        config.cache.dir = PathBuf::from("/tmp/docex-cache");
        config.save(&path).unwrap();

        let loaded = DocexConfig::from_file(&path).unwrap();
        assert_eq!(loaded.cache.dir, PathBuf::from("/tmp/docex-cache"));
    }

    #[test]
    fn test_zero_request_timeout_is_rejected() {
        let mut config = DocexConfig::default();
        assert_eq!(config.validate(), Ok(()));

        config.orchestration.request_timeout_secs = 0;
        assert_eq!(
            config.validate(),
            Err("orchestration.request_timeout_secs must be greater than 0".to_string())
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"orchestration": {"request_timeout_secs": 0}}"#).unwrap();
        let err = DocexConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, DocexError::Config(ref msg) if msg.contains("request_timeout_secs")));
    }

    #[test]
    fn test_zero_provider_timeout_is_rejected() {
        let mut config = DocexConfig::default();
        config.providers.offline.timeout_secs = 0;
        assert!(config.validate().unwrap_err().contains("providers.offline.timeout_secs"));
    }
}
