//! Core library for Japanese identity-document extraction.
//!
//! This crate provides:
//! - A provider cascade (remote multimodal model, remote text detection, local tesseract)
//! - Image preprocessing for OCR
//! - Rule-based field extraction with Japanese era date support
//! - Per-document validation (residence card, driver's license, rirekisho, generic)
//! - Face photo cropping
//! - A content-addressed result cache

pub mod cache;
pub mod error;
pub mod face;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod preprocess;
pub mod providers;
pub mod schema;

pub use cache::{CacheStats, ContentCache};
pub use error::{CacheError, DocexError, FaceError, ProviderError, Result};
pub use face::{FaceDetector, FaceLocator, FaceRegionExtractor};
pub use models::config::Strategy;
pub use models::{
    CacheEntry, ContentHash, DocexConfig, DocumentType, Fields, FinalResult, Method, PreparedImage,
    ProviderKind, ProviderResult,
};
pub use orchestrator::{ExtractionMetrics, ExtractionOrchestrator, ExtractionOrchestratorBuilder};
pub use parser::TextParser;
pub use preprocess::ImagePreprocessor;
pub use providers::{ExtractionProvider, GeminiProvider, TesseractProvider, VisionProvider};
pub use schema::{schema_for, DocumentSchema, ResultValidator};

/// Re-export inference types.
pub use docex_inference::{InferenceBackend, InputTensor, OutputTensor};

#[cfg(feature = "native")]
pub use docex_inference::OrtBackend;
