//! Face detection using the Ultra-Light RFB-320 ONNX model.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ndarray::ArrayD;
use tracing::debug;

use docex_inference::{InferenceBackend, InputTensor, OutputTensor};

use super::{FaceBox, FaceLocator};
use crate::error::FaceError;

/// Model input width.
pub const INPUT_WIDTH: u32 = 320;
/// Model input height.
pub const INPUT_HEIGHT: u32 = 240;

/// Face detector. Outputs are `scores` [1, N, 2] (background, face) and
/// `boxes` [1, N, 4] as normalized corner coordinates.
pub struct FaceDetector<B: InferenceBackend> {
    backend: B,
    score_threshold: f32,
    nms_iou: f32,
}

impl<B: InferenceBackend> FaceDetector<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            score_threshold: 0.7,
            nms_iou: 0.3,
        }
    }

    /// Set the minimum face probability.
    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Set the overlap above which weaker boxes are suppressed.
    pub fn with_nms_iou(mut self, iou: f32) -> Self {
        self.nms_iou = iou;
        self
    }

    /// Detect faces, returned in descending score order in image pixel coordinates.
    pub fn detect(&self, image: &DynamicImage) -> Result<Vec<FaceBox>, FaceError> {
        let (width, height) = image.dimensions();
        let input = preprocess(image)?;

        let outputs = self.backend.run(&[("input", input)])?;
        let (scores, boxes) = split_outputs(outputs)?;
        debug!(
            "Face detector output shapes: scores {:?}, boxes {:?}",
            scores.shape(),
            boxes.shape()
        );

        let candidates = self.post_process(&scores, &boxes, width, height)?;
        let faces = nms(candidates, self.nms_iou);
        debug!("Detected {} faces", faces.len());
        Ok(faces)
    }

    fn post_process(
        &self,
        scores: &ArrayD<f32>,
        boxes: &ArrayD<f32>,
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceBox>, FaceError> {
        let (s, b) = (scores.shape(), boxes.shape());
        if s.len() != 3 || b.len() != 3 || s[2] < 2 || b[2] < 4 || s[1] != b[1] {
            return Err(FaceError::Image(format!(
                "unexpected detector output shapes {:?} and {:?}",
                s, b
            )));
        }

        let (w, h) = (width as f32, height as f32);
        let mut faces = Vec::new();
        for i in 0..s[1] {
            let score = scores[[0, i, 1]];
            if score < self.score_threshold {
                continue;
            }
            faces.push(FaceBox {
                x1: (boxes[[0, i, 0]] * w).clamp(0.0, w),
                y1: (boxes[[0, i, 1]] * h).clamp(0.0, h),
                x2: (boxes[[0, i, 2]] * w).clamp(0.0, w),
                y2: (boxes[[0, i, 3]] * h).clamp(0.0, h),
                score,
            });
        }
        Ok(faces)
    }
}

impl<B: InferenceBackend> FaceLocator for FaceDetector<B> {
    fn locate(&self, image: &DynamicImage) -> Result<Vec<FaceBox>, FaceError> {
        self.detect(image)
    }
}

/// Resize to the model input and normalize to roughly [-1, 1], CHW layout.
fn preprocess(image: &DynamicImage) -> Result<InputTensor, FaceError> {
    let resized = image
        .resize_exact(INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle)
        .to_rgb8();

    let plane = (INPUT_WIDTH * INPUT_HEIGHT) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = (y * INPUT_WIDTH + x) as usize;
        for c in 0..3 {
            data[c * plane + offset] = (pixel[c] as f32 - 127.0) / 128.0;
        }
    }

    Ok(InputTensor::from_f32(
        data,
        &[1, 3, INPUT_HEIGHT as usize, INPUT_WIDTH as usize],
    )?)
}

fn split_outputs(
    outputs: Vec<(String, OutputTensor)>,
) -> Result<(ArrayD<f32>, ArrayD<f32>), FaceError> {
    let mut scores = None;
    let mut boxes = None;
    let mut positional = Vec::new();

    for (name, tensor) in outputs {
        let OutputTensor::Float32(array) = tensor else {
            continue;
        };
        match name.as_str() {
            "scores" => scores = Some(array),
            "boxes" => boxes = Some(array),
            _ => positional.push(array),
        }
    }

    let mut positional = positional.into_iter();
    let scores = scores.or_else(|| positional.next());
    let boxes = boxes.or_else(|| positional.next());
    match (scores, boxes) {
        (Some(scores), Some(boxes)) => Ok((scores, boxes)),
        _ => Err(FaceError::Image("detector did not return scores and boxes".to_string())),
    }
}

/// Greedy non-maximum suppression. Output is sorted by descending score.
pub fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
