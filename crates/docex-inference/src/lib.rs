//! ONNX inference layer for docex.
//!
//! The face detector in `docex-core` is written against the
//! [`InferenceBackend`] trait so it can be driven by ONNX Runtime in
//! production and by scripted backends in tests.

mod backend;
mod error;
mod tensor;

pub use backend::InferenceBackend;
pub use error::InferenceError;
pub use tensor::{InputTensor, OutputTensor};

#[cfg(feature = "native")]
pub use backend::ort::OrtBackend;

/// Result type for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;
