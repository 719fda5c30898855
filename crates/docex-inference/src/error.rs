//! Error types for the inference layer.

use thiserror::Error;

/// Errors that can occur while loading or running a model.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("failed to create session: {0}")]
    SessionCreate(String),

    /// Input tensor shape or data did not line up.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),

    /// A named output was missing or had an unexpected element type.
    #[error("failed to extract output: {0}")]
    OutputExtraction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
