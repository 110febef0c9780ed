//! Static-image detection via landmark stability analysis.
//!
//! A printed photograph or a still image on a screen produces near-identical
//! facial landmark positions in every frame. A live person exhibits
//! involuntary micro-movement (head tremor, breathing, gaze drift) that moves
//! the anchor landmarks measurably between frames, even while holding still.
//!
//! The check reuses the landmarks already produced for the metric extractor:
//! no extra inference and no user interaction.
//!
//! # Threat Coverage
//!
//! - **Blocks:** printed photographs and still images held in front of the camera.
//! - **Does not block:** video replays or animated deepfakes (landmarks move),
//!   or a photo deliberately waved in front of the camera.

/// Result of a landmark stability check.
#[derive(Debug, Clone, PartialEq)]
pub struct StabilityResult {
    /// Whether the anchors moved enough to indicate a live subject.
    pub is_live: bool,
    /// Mean over the anchor coordinates of their variance across frames.
    pub landmark_variance: f64,
    /// Number of frames analysed.
    pub frames_analysed: usize,
}

/// Check whether anchor landmarks move across the request.
///
/// # Arguments
///
/// * `anchor_sequence`: Normalized `(x, y)` anchors per face frame, in frame order.
/// * `min_variance`: Mean coordinate variance below which the anchors count as frozen.
///
/// Returns `is_live = true` when fewer than 2 frames are provided, since a
/// single frame carries no motion information.
pub fn check_landmark_stability(
    anchor_sequence: &[[(f32, f32); 5]],
    min_variance: f64,
) -> StabilityResult {
    if anchor_sequence.len() < 2 {
        return StabilityResult {
            is_live: true,
            landmark_variance: 0.0,
            frames_analysed: anchor_sequence.len(),
        };
    }

    let mut coordinate_variances = Vec::with_capacity(10);
    for point in 0..5 {
        let xs: Vec<f64> = anchor_sequence.iter().map(|a| f64::from(a[point].0)).collect();
        let ys: Vec<f64> = anchor_sequence.iter().map(|a| f64::from(a[point].1)).collect();
        coordinate_variances.push(crate::stats::variance(&xs).unwrap_or(0.0));
        coordinate_variances.push(crate::stats::variance(&ys).unwrap_or(0.0));
    }
    let landmark_variance = crate::stats::mean(&coordinate_variances).unwrap_or(0.0);

    StabilityResult {
        is_live: landmark_variance >= min_variance,
        landmark_variance,
        frames_analysed: anchor_sequence.len(),
    }
}
