//! Facial landmark types and the detector capability consumed by the pipeline.
//!
//! Indices follow the 468-point face-mesh topology.

use thiserror::Error;

use crate::decode::FrameSample;
use crate::integrity::ModelIntegrityError;

/// Number of points in a face-mesh landmark set.
pub const MESH_POINTS: usize = 468;

/// Eye contour points: outer corner, two upper lid points, inner corner, two lower lid points.
pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
pub const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
pub const NOSE_TIP: usize = 1;
pub const UPPER_LIP_INNER: usize = 13;
pub const LOWER_LIP_INNER: usize = 14;
pub const LEFT_EYE_OUTER: usize = 33;
pub const RIGHT_EYE_OUTER: usize = 263;
pub const MOUTH_LEFT: usize = 61;
pub const MOUTH_RIGHT: usize = 291;
pub const FOREHEAD: usize = 10;

/// Points tracked across frames by the static-image check.
pub const ANCHORS: [usize; 5] = [NOSE_TIP, LEFT_EYE_OUTER, RIGHT_EYE_OUTER, MOUTH_LEFT, MOUTH_RIGHT];

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("landmark set has {0} points (expected at least 468)")]
    TooFewPoints(usize),
    #[error("landmark {0} has a non-finite coordinate")]
    NonFinite(usize),
    #[error("failed to load landmark model: {0}")]
    Model(String),
    #[error(transparent)]
    Integrity(#[from] ModelIntegrityError),
    #[error("landmark inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    Output(String),
}

/// A landmark in frame-normalized coordinates. `x` and `y` lie in [0, 1]
/// relative to frame width/height; `z` is a unitless relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Pixel-space position for a frame of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (f64, f64) {
        (
            f64::from(self.x) * f64::from(width),
            f64::from(self.y) * f64::from(height),
        )
    }
}

/// Landmarks of the single face detected in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    /// Build a set, rejecting short or non-finite input and clamping `x`/`y`
    /// into [0, 1].
    pub fn new(points: Vec<Landmark>) -> Result<Self, LandmarkError> {
        if points.len() < MESH_POINTS {
            return Err(LandmarkError::TooFewPoints(points.len()));
        }
        let points = points
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                    return Err(LandmarkError::NonFinite(i));
                }
                Ok(Landmark::new(p.x.clamp(0.0, 1.0), p.y.clamp(0.0, 1.0), p.z))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { points })
    }

    /// Landmark at a mesh index. Every index below [`MESH_POINTS`] is present.
    pub fn point(&self, index: usize) -> Landmark {
        self.points[index]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}

/// Maps a pixel grid to the landmarks of exactly one face.
///
/// Implementations are long-lived and shared across worker threads.
/// `Ok(None)` means no face was found; `Err` is a detector failure, which
/// callers treat the same way for the affected frame.
pub trait LandmarkProvider: Send + Sync {
    fn detect(&self, frame: &FrameSample) -> Result<Option<LandmarkSet>, LandmarkError>;
}
