//! Inference backend implementations.

#[cfg(feature = "native")]
pub mod ort;

use crate::{InputTensor, OutputTensor, Result};

/// A loaded model that can be run on named input tensors.
///
/// Implementations must be shareable across threads: the face extractor
/// runs on a blocking worker while the text cascade is in flight.
pub trait InferenceBackend: Send + Sync {
    /// Run the model and return its outputs by name.
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>>;

    fn input_names(&self) -> &[String];

    fn output_names(&self) -> &[String];
}
