//! Error types for the docex-core library.

use std::time::Duration;

use thiserror::Error;

/// Main error type for the docex library.
///
/// The orchestrator never lets these escape `process_document`; they are
/// recorded in the attempt log and folded into a degraded result instead.
#[derive(Error, Debug)]
pub enum DocexError {
    /// Input bytes could not be decoded as an image or as base64.
    #[error("decode error: {0}")]
    Decode(String),

    /// A single provider failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A provider answered but its fields did not satisfy the document contract.
    #[error("{provider} result failed validation for {document_type}")]
    ValidationFailure {
        provider: String,
        document_type: String,
    },

    /// Every configured provider failed, timed out or returned invalid fields.
    #[error("all providers exhausted: {}", .attempts.join("; "))]
    AllProvidersExhausted { attempts: Vec<String> },

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("face extraction error: {0}")]
    Face(#[from] FaceError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Failures of one provider call.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Network level failure (DNS, TLS, connection reset).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered but the payload was empty or not the expected JSON.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The local OCR engine failed to run.
    #[error("OCR engine failed: {0}")]
    Engine(String),

    #[error("provider is not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// Errors related to the content cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A stored entry could not be parsed. Callers treat this as a miss.
    #[error("corrupted cache entry {hash}: {reason}")]
    Corrupted { hash: String, reason: String },

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors related to face detection and cropping.
#[derive(Error, Debug)]
pub enum FaceError {
    #[error("failed to load face model: {0}")]
    ModelLoad(String),

    #[error("face inference failed: {0}")]
    Inference(#[from] docex_inference::InferenceError),

    #[error("invalid image: {0}")]
    Image(String),
}

/// Result type for the docex library.
pub type Result<T> = std::result::Result<T, DocexError>;
