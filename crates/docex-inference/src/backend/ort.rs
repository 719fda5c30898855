//! ONNX Runtime (ort) backend with the XNNPACK execution provider.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{ArrayD, IxDyn};
use ort::ep::XNNPACK;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::value::Tensor;
use tracing::debug;

use crate::error::InferenceError;
use crate::tensor::{InputTensor, OutputTensor};
use crate::{InferenceBackend, Result};

/// Intra-op threads used by `from_file`.
const DEFAULT_INTRA_THREADS: usize = 2;

/// Backend using ONNX Runtime for native inference.
///
/// `Session::run` needs `&mut`, so the session sits behind a mutex and
/// concurrent callers are serialized.
pub struct OrtBackend {
    session: Mutex<Session>,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OrtBackend {
    /// Load a model from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading ONNX model from: {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, DEFAULT_INTRA_THREADS)
    }

    /// Load a model from bytes with the given number of intra-op threads.
    pub fn from_bytes(bytes: &[u8], intra_threads: usize) -> Result<Self> {
        let session = Session::builder()
            .map_err(session_error)?
            .with_execution_providers([XNNPACK::default().build()])
            .map_err(session_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(session_error)?
            .with_intra_threads(intra_threads.max(1))
            .map_err(session_error)?
            .commit_from_memory(bytes)
            .map_err(|e| InferenceError::ModelLoad(e.to_string()))?;

        let input_names: Vec<String> = session.inputs().iter().map(|i| i.name().to_string()).collect();
        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        debug!(
            bytes = bytes.len(),
            "Model loaded, inputs: {:?}, outputs: {:?}", input_names, output_names
        );

        Ok(Self {
            session: Mutex::new(session),
            input_names,
            output_names,
        })
    }
}

fn session_error(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::SessionCreate(e.to_string())
}

fn to_session_input(tensor: &InputTensor) -> Result<SessionInputValue<'static>> {
    let shape: Vec<i64> = tensor.shape().iter().map(|&s| s as i64).collect();
    let InputTensor::Float32(arr) = tensor;
    Tensor::from_array((shape, arr.iter().copied().collect::<Vec<f32>>()))
        .map(Into::into)
        .map_err(|e| InferenceError::InvalidInput(e.to_string()))
}

fn to_array<T: Clone>(shape: &[i64], data: &[T]) -> Result<ArrayD<T>> {
    let shape: Vec<usize> = shape.iter().map(|&s| s as usize).collect();
    ArrayD::from_shape_vec(IxDyn(&shape), data.to_vec())
        .map_err(|e| InferenceError::OutputExtraction(e.to_string()))
}

impl InferenceBackend for OrtBackend {
    fn run(&self, inputs: &[(&str, InputTensor)]) -> Result<Vec<(String, OutputTensor)>> {
        let ort_inputs = inputs
            .iter()
            .map(|(name, tensor)| Ok((*name, to_session_input(tensor)?)))
            .collect::<Result<Vec<(&str, SessionInputValue<'static>)>>>()?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| InferenceError::InferenceFailed(format!("session lock poisoned: {}", e)))?;

        let outputs = session
            .run(ort_inputs)
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let mut results = Vec::with_capacity(outputs.len());
        for (name, value) in outputs.iter() {
            let tensor = if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                OutputTensor::Float32(to_array(shape, data)?)
            } else if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
                OutputTensor::Int64(to_array(shape, data)?)
            } else {
                return Err(InferenceError::OutputExtraction(format!(
                    "unsupported element type for output '{}'",
                    name
                )));
            };
            results.push((name.to_string(), tensor));
        }
        Ok(results)
    }

    fn input_names(&self) -> &[String] {
        &self.input_names
    }

    fn output_names(&self) -> &[String] {
        &self.output_names
    }
}
