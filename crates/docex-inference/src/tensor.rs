//! Tensor types for inference input/output.

use ndarray::{ArrayD, IxDyn};

use crate::{InferenceError, Result};

/// Input tensor for inference.
#[derive(Debug, Clone)]
pub enum InputTensor {
    Float32(ArrayD<f32>),
}

impl InputTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            InputTensor::Float32(arr) => arr.shape(),
        }
    }

    /// Build a Float32 tensor, checking that `data` fills `shape` exactly.
    pub fn from_f32(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .map(InputTensor::Float32)
            .map_err(|e| InferenceError::InvalidInput(e.to_string()))
    }
}

/// Output tensor from inference.
#[derive(Debug, Clone)]
pub enum OutputTensor {
    Float32(ArrayD<f32>),
    Int64(ArrayD<i64>),
}

impl OutputTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            OutputTensor::Float32(arr) => arr.shape(),
            OutputTensor::Int64(arr) => arr.shape(),
        }
    }

    /// Try to get the inner Float32 array.
    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            OutputTensor::Float32(arr) => Some(arr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_f32_checks_shape() {
        let ok = InputTensor::from_f32(vec![0.0; 6], &[1, 2, 3]).unwrap();
        assert_eq!(ok.shape(), &[1, 2, 3]);

        let err = InputTensor::from_f32(vec![0.0; 5], &[1, 2, 3]);
        assert!(matches!(err, Err(InferenceError::InvalidInput(_))));
    }

    #[test]
    fn test_output_as_f32() {
        let arr = ArrayD::from_shape_vec(IxDyn(&[2]), vec![1.0f32, 2.0]).unwrap();
        let out = OutputTensor::Float32(arr);
        assert_eq!(out.as_f32().map(|a| a.len()), Some(2));

        let ints = ArrayD::from_shape_vec(IxDyn(&[1]), vec![3i64]).unwrap();
        assert!(OutputTensor::Int64(ints).as_f32().is_none());
    }
}
