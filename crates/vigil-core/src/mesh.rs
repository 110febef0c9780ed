//! ONNX face-mesh landmark provider.
//!
//! Runs a 468-point face-mesh model (input `1×192×192×3` RGB in [0, 1];
//! outputs a flat `x, y, z` landmark tensor in input pixels plus a
//! face-presence logit) on the centred square crop of each frame.

use std::path::Path;
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;

use crate::decode::FrameSample;
use crate::integrity::ModelDigest;
use crate::landmarks::{Landmark, LandmarkError, LandmarkProvider, LandmarkSet, MESH_POINTS};

/// Side length of the model input.
pub const INPUT_SIZE: u32 = 192;

/// Face-mesh landmark detector. The session is loaded once and shared;
/// inference calls are serialized on an internal lock.
pub struct FaceMeshDetector {
    session: Mutex<Session>,
    score_min: f32,
}

impl FaceMeshDetector {
    /// Load the model. `score_min` is the minimum face-presence probability.
    pub fn load(path: &Path, score_min: f32) -> Result<Self, LandmarkError> {
        let session = Session::builder()
            .map_err(|e| LandmarkError::Model(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e| LandmarkError::Model(format!("{}: {e}", path.display())))?;

        tracing::info!(path = %path.display(), score_min, "face mesh model loaded");
        Ok(Self {
            session: Mutex::new(session),
            score_min,
        })
    }

    /// Load the model after checking it against a pinned digest, if any.
    /// A mismatching file never reaches the inference runtime.
    pub fn load_verified(
        path: &Path,
        score_min: f32,
        pinned: Option<&ModelDigest>,
    ) -> Result<Self, LandmarkError> {
        match pinned {
            Some(digest) => digest.verify(path)?,
            None => tracing::debug!(path = %path.display(), "no model digest pinned"),
        }
        Self::load(path, score_min)
    }

    fn infer(&self, input: Array4<f32>) -> Result<(Vec<f32>, Option<f32>), LandmarkError> {
        let tensor = Tensor::from_array(input).map_err(|e| LandmarkError::Inference(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| LandmarkError::Inference("session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| LandmarkError::Inference(e.to_string()))?;

        let mut points = None;
        let mut logit = None;
        for i in 0..outputs.len() {
            let (_, data) = outputs[i]
                .try_extract_tensor::<f32>()
                .map_err(|e| LandmarkError::Output(e.to_string()))?;
            if data.len() >= MESH_POINTS * 3 {
                points = Some(data[..MESH_POINTS * 3].to_vec());
            } else if data.len() == 1 {
                logit = Some(data[0]);
            }
        }

        let points = points.ok_or_else(|| {
            LandmarkError::Output(format!("no output with {} values", MESH_POINTS * 3))
        })?;
        Ok((points, logit))
    }
}

impl LandmarkProvider for FaceMeshDetector {
    fn detect(&self, frame: &FrameSample) -> Result<Option<LandmarkSet>, LandmarkError> {
        let crop = CropWindow::centered_square(frame.width(), frame.height());
        let input = preprocess(&frame.pixels, crop);
        let (raw, logit) = self.infer(input)?;

        if let Some(logit) = logit {
            let score = sigmoid(logit);
            if score < self.score_min {
                tracing::debug!(frame = frame.index, score, "face mesh: no face");
                return Ok(None);
            }
        }

        let points = to_frame_points(&raw, crop, frame.width(), frame.height());
        LandmarkSet::new(points).map(Some)
    }
}

/// Square region of the frame fed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x0: u32,
    pub y0: u32,
    pub side: u32,
}

impl CropWindow {
    pub fn centered_square(width: u32, height: u32) -> Self {
        let side = width.min(height);
        Self {
            x0: (width - side) / 2,
            y0: (height - side) / 2,
            side,
        }
    }
}

/// Crop, resize to the model input and scale to [0, 1], NHWC.
pub fn preprocess(frame: &RgbImage, crop: CropWindow) -> Array4<f32> {
    let square = imageops::crop_imm(frame, crop.x0, crop.y0, crop.side, crop.side).to_image();
    let resized = imageops::resize(&square, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    let n = INPUT_SIZE as usize;
    let mut input = Array4::<f32>::zeros((1, n, n, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            input[[0, y as usize, x as usize, c]] = f32::from(pixel.0[c]) / 255.0;
        }
    }
    input
}

/// Map model-space `x, y, z` triples back to frame-normalized landmarks.
pub fn to_frame_points(raw: &[f32], crop: CropWindow, width: u32, height: u32) -> Vec<Landmark> {
    let scale = crop.side as f32 / INPUT_SIZE as f32;
    raw.chunks_exact(3)
        .map(|p| {
            let x = (crop.x0 as f32 + p[0] * scale) / width as f32;
            let y = (crop.y0 as f32 + p[1] * scale) / height as f32;
            Landmark::new(x, y, p[2] / INPUT_SIZE as f32)
        })
        .collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
