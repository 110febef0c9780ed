use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read thresholds file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid thresholds file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid threshold `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Every tunable constant of the liveness decision.
///
/// The values are empirically calibrated against a particular capture setup
/// and are expected to be recalibrated per deployment camera. Any field left
/// out of a TOML file keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Fewer submitted frames than this is a malformed request.
    pub min_submitted_frames: usize,
    /// More submitted frames than this is a malformed request.
    pub max_submitted_frames: usize,
    /// Fewer decodable frames than this is a malformed request.
    pub min_decoded_frames: usize,
    /// Fewer frames with a detected face than this yields `no_face_detected`.
    pub min_face_frames: usize,

    /// Side length (pixels) of the square grayscale image fed to the FFT.
    pub analysis_size: u32,
    /// A frame passes the frequency check when the spectrum std is at most this.
    pub frequency_std_max: f64,
    /// A frame passes the texture check when the Laplacian variance is at least this.
    pub laplacian_var_min: f64,
    /// Passive layer fails when the share of failing frames exceeds this.
    pub passive_fail_ratio_max: f64,
    /// A single passive cause is reported only when its fail ratio exceeds this.
    pub dominant_cause_ratio_min: f64,

    /// Side length (pixels) of the forehead region sampled for the pulse proxy.
    pub pulse_roi_size: u32,
    /// Pulse-sample variance strictly below this yields `no_biological_signal`.
    pub pulse_variance_min: f64,
    /// Anchor landmark variance strictly below this yields `static_image`.
    /// `None` disables the gate.
    pub static_landmark_variance_min: Option<f64>,

    /// `blink` passes when the EAR range exceeds this.
    pub blink_ear_range_min: f64,
    /// `head_turn` passes when the minimum yaw ratio is below this...
    pub head_yaw_low: f64,
    /// ...or the maximum yaw ratio is above this.
    pub head_yaw_high: f64,
    /// `mouth_open` passes when the mouth ratio range exceeds this.
    pub mouth_ratio_range_min: f64,

    /// Minimum face-presence probability reported by the mesh model.
    pub face_score_min: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_submitted_frames: 8,
            max_submitted_frames: 64,
            min_decoded_frames: 8,
            min_face_frames: 5,
            analysis_size: 200,
            frequency_std_max: 55.0,
            laplacian_var_min: 70.0,
            passive_fail_ratio_max: 0.3,
            dominant_cause_ratio_min: 0.2,
            pulse_roi_size: 20,
            pulse_variance_min: 0.001,
            static_landmark_variance_min: Some(0.000005),
            blink_ear_range_min: 0.07,
            head_yaw_low: 0.6,
            head_yaw_high: 1.7,
            mouth_ratio_range_min: 0.1,
            face_score_min: 0.7,
        }
    }
}

impl Thresholds {
    /// Parse thresholds from TOML text and validate them.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let thresholds: Self = toml::from_str(text)?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Load thresholds from a TOML file and validate them.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_submitted_frames == 0 {
            return Err(invalid("min_submitted_frames", "must be at least 1"));
        }
        if self.max_submitted_frames < self.min_submitted_frames {
            return Err(invalid(
                "max_submitted_frames",
                "must not be below min_submitted_frames",
            ));
        }
        if self.min_decoded_frames > self.min_submitted_frames {
            return Err(invalid(
                "min_decoded_frames",
                "must not exceed min_submitted_frames",
            ));
        }
        if self.analysis_size < 2 {
            return Err(invalid("analysis_size", "must be at least 2"));
        }
        if self.pulse_roi_size == 0 {
            return Err(invalid("pulse_roi_size", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.passive_fail_ratio_max) {
            return Err(invalid("passive_fail_ratio_max", "must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.dominant_cause_ratio_min) {
            return Err(invalid("dominant_cause_ratio_min", "must lie in [0, 1]"));
        }
        if self.head_yaw_low <= 0.0 || self.head_yaw_low >= self.head_yaw_high {
            return Err(invalid(
                "head_yaw_low",
                "must be positive and below head_yaw_high",
            ));
        }
        if !(0.0..=1.0).contains(&self.face_score_min) {
            return Err(invalid("face_score_min", "must lie in [0, 1]"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
