//! Verdict engine: fuses the request aggregate into a single live/spoof decision.
//!
//! Layers are evaluated in a fixed order and the first one that decides wins:
//!
//! 1. request preconditions (frame counts); malformed requests are errors,
//!    not verdicts;
//! 2. face presence;
//! 3. passive spoof layer (frequency / texture fail ratios);
//! 4. biological layer (pulse-sample variance);
//! 5. static-image layer (anchor landmark variance);
//! 6. the requested active challenge.
//!
//! `evaluate` is a pure function of its inputs.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::aggregate::RequestAggregate;
use crate::config::Thresholds;
use crate::passive::PassiveScore;
use crate::stability::check_landmark_stability;
use crate::stats;

/// A request rejected before any liveness judgment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Insufficient frames for analysis: received {submitted}, need at least {required}.")]
    TooFewFrames { submitted: usize, required: usize },
    #[error("Too many frames for analysis: received {submitted}, at most {max} accepted.")]
    TooManyFrames { submitted: usize, max: usize },
    #[error("Insufficient decodable frames: decoded {decoded}, need at least {required}.")]
    TooFewDecodable { decoded: usize, required: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Live,
    Spoof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    NoFaceDetected,
    PassiveCheckFailed,
    NoBiologicalSignal,
    StaticImage,
    NoFaceLandmarks,
    BlinkDetected,
    NoBlinkDetected,
    HeadTurnDetected,
    HeadRemainedStatic,
    MouthOpenDetected,
    MouthNotOpened,
    UnknownChallenge,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoFaceDetected => "no_face_detected",
            Self::PassiveCheckFailed => "passive_check_failed",
            Self::NoBiologicalSignal => "no_biological_signal",
            Self::StaticImage => "static_image",
            Self::NoFaceLandmarks => "no_face_landmarks",
            Self::BlinkDetected => "blink_detected",
            Self::NoBlinkDetected => "no_blink_detected",
            Self::HeadTurnDetected => "head_turn_detected",
            Self::HeadRemainedStatic => "head_remained_static",
            Self::MouthOpenDetected => "mouth_open_detected",
            Self::MouthNotOpened => "mouth_not_opened",
            Self::UnknownChallenge => "unknown_challenge",
        }
    }

    /// User-facing guidance for this outcome.
    pub fn message(&self) -> &'static str {
        match self {
            Self::BlinkDetected | Self::HeadTurnDetected | Self::MouthOpenDetected => {
                "Liveness verified!"
            }
            Self::NoFaceDetected => "Face not detected clearly.",
            Self::PassiveCheckFailed => "Possible screen or printed photo detected.",
            Self::NoBiologicalSignal => {
                "No natural skin signal detected. Please retry in even lighting."
            }
            Self::StaticImage => "Static image detected. Please move naturally.",
            Self::NoFaceLandmarks => "Facial landmarks could not be tracked. Please face the camera.",
            Self::NoBlinkDetected => "Please blink naturally while looking at the camera.",
            Self::HeadRemainedStatic => "Please turn your head slowly from left to right.",
            Self::MouthNotOpened => "Please open your mouth clearly.",
            Self::UnknownChallenge => "Unsupported challenge requested.",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackType {
    /// Frequency failures dominate: display grid / Moiré.
    ReplayScreen,
    /// Texture failures dominate: blurry or flat print.
    ReplayPhoto,
    /// Passive failure without a dominant cause.
    PassiveSpoof,
    /// Landmarks frozen across the request.
    StaticImage,
}

/// The motion the subject was asked to perform.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Challenge {
    #[default]
    HeadTurn,
    Blink,
    MouthOpen,
    Unrecognized(String),
}

impl Challenge {
    pub fn parse(s: &str) -> Self {
        match s {
            "head_turn" => Self::HeadTurn,
            "blink" => Self::Blink,
            "mouth_open" => Self::MouthOpen,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::HeadTurn => "head_turn",
            Self::Blink => "blink",
            Self::MouthOpen => "mouth_open",
            Self::Unrecognized(s) => s,
        }
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which passive check drove a passive failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassiveCause {
    Frequency,
    Texture,
    Undetermined,
}

impl PassiveCause {
    pub fn attack_type(self) -> AttackType {
        match self {
            Self::Frequency => AttackType::ReplayScreen,
            Self::Texture => AttackType::ReplayPhoto,
            Self::Undetermined => AttackType::PassiveSpoof,
        }
    }
}

/// Outcome of the passive layer over the whole request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassiveAssessment {
    /// Share of frames where either check failed.
    pub fail_ratio: f64,
    pub frequency_fail_ratio: f64,
    pub texture_fail_ratio: f64,
    /// `Some` when the layer failed.
    pub failure: Option<PassiveCause>,
}

/// Classify the passive layer. It fails when the fail ratio exceeds
/// `passive_fail_ratio_max`; the cause is the strictly larger of the two
/// per-check ratios if that ratio also exceeds `dominant_cause_ratio_min`.
pub fn assess_passive(scores: &[PassiveScore], thresholds: &Thresholds) -> PassiveAssessment {
    let ratio = |count: usize| {
        if scores.is_empty() {
            0.0
        } else {
            count as f64 / scores.len() as f64
        }
    };
    let fail_ratio = ratio(scores.iter().filter(|s| !s.passed()).count());
    let frequency_fail_ratio = ratio(scores.iter().filter(|s| !s.frequency_ok).count());
    let texture_fail_ratio = ratio(scores.iter().filter(|s| !s.texture_ok).count());

    let failure = (fail_ratio > thresholds.passive_fail_ratio_max).then(|| {
        let min = thresholds.dominant_cause_ratio_min;
        if frequency_fail_ratio > texture_fail_ratio && frequency_fail_ratio > min {
            PassiveCause::Frequency
        } else if texture_fail_ratio > frequency_fail_ratio && texture_fail_ratio > min {
            PassiveCause::Texture
        } else {
            PassiveCause::Undetermined
        }
    });

    PassiveAssessment {
        fail_ratio,
        frequency_fail_ratio,
        texture_fail_ratio,
        failure,
    }
}

/// Per-frame values reported in debug output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameDiagnostics {
    pub index: usize,
    pub frequency_std: f64,
    pub laplacian_var: f64,
    pub frequency_ok: bool,
    pub texture_ok: bool,
    pub face: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ear: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mouth_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_yaw: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pulse_sample: Option<f64>,
}

/// Intermediate statistics, attached to the verdict on request. Fields of
/// layers that were not reached stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub frames_submitted: usize,
    pub frames_decoded: usize,
    pub frames_with_face: usize,
    pub passive_fail_ratio: Option<f64>,
    pub frequency_fail_ratio: Option<f64>,
    pub texture_fail_ratio: Option<f64>,
    pub pulse_variance: Option<f64>,
    pub landmark_variance: Option<f64>,
    pub ear_range: Option<f64>,
    pub mouth_range: Option<f64>,
    pub yaw_min: Option<f64>,
    pub yaw_max: Option<f64>,
    pub frames: Vec<FrameDiagnostics>,
}

impl Diagnostics {
    fn from_aggregate(agg: &RequestAggregate) -> Self {
        let mut faces = agg.face_indices.iter().zip(&agg.metrics).peekable();
        let frames = agg
            .frame_indices
            .iter()
            .zip(&agg.passive)
            .map(|(&index, passive)| {
                let metrics = match faces.peek() {
                    Some(&(&face_index, m)) if face_index == index => Some(*m),
                    _ => None,
                };
                if metrics.is_some() {
                    faces.next();
                }
                FrameDiagnostics {
                    index,
                    frequency_std: passive.frequency_std,
                    laplacian_var: passive.laplacian_var,
                    frequency_ok: passive.frequency_ok,
                    texture_ok: passive.texture_ok,
                    face: metrics.is_some(),
                    ear: metrics.map(|m| m.ear),
                    mouth_ratio: metrics.map(|m| m.mouth_ratio),
                    head_yaw: metrics.map(|m| m.head_yaw),
                    pulse_sample: metrics.map(|m| m.pulse_sample),
                }
            })
            .collect();

        Self {
            frames_submitted: agg.submitted,
            frames_decoded: agg.decoded(),
            frames_with_face: agg.faces(),
            frames,
            ..Self::default()
        }
    }
}

/// Final decision for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub status: Status,
    pub reason: Reason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_type: Option<AttackType>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Diagnostics>,
}

impl Verdict {
    pub fn live(reason: Reason) -> Self {
        Self::new(Status::Live, reason)
    }

    pub fn spoof(reason: Reason) -> Self {
        Self::new(Status::Spoof, reason)
    }

    fn new(status: Status, reason: Reason) -> Self {
        Self {
            status,
            reason,
            attack_type: None,
            message: reason.message().to_string(),
            debug: None,
        }
    }

    fn with_attack(mut self, attack: AttackType) -> Self {
        self.attack_type = Some(attack);
        self
    }

    pub fn is_live(&self) -> bool {
        self.status == Status::Live
    }

    /// Drop the debug payload.
    pub fn without_debug(mut self) -> Self {
        self.debug = None;
        self
    }
}

/// Reject requests whose submitted frame count is out of bounds. Runs
/// before any decoding.
pub fn check_submitted(submitted: usize, thresholds: &Thresholds) -> Result<(), RequestError> {
    if submitted < thresholds.min_submitted_frames {
        return Err(RequestError::TooFewFrames {
            submitted,
            required: thresholds.min_submitted_frames,
        });
    }
    if submitted > thresholds.max_submitted_frames {
        return Err(RequestError::TooManyFrames {
            submitted,
            max: thresholds.max_submitted_frames,
        });
    }
    Ok(())
}

/// Decide liveness for an aggregated request. The returned verdict always
/// carries [`Diagnostics`]; callers strip them when debug output was not
/// requested.
pub fn evaluate(
    agg: &RequestAggregate,
    challenge: &Challenge,
    thresholds: &Thresholds,
) -> Result<Verdict, RequestError> {
    check_submitted(agg.submitted, thresholds)?;
    if agg.decoded() < thresholds.min_decoded_frames {
        return Err(RequestError::TooFewDecodable {
            decoded: agg.decoded(),
            required: thresholds.min_decoded_frames,
        });
    }

    let mut diag = Diagnostics::from_aggregate(agg);
    let verdict = decide(agg, challenge, thresholds, &mut diag);
    Ok(Verdict {
        debug: Some(diag),
        ..verdict
    })
}

fn decide(
    agg: &RequestAggregate,
    challenge: &Challenge,
    t: &Thresholds,
    diag: &mut Diagnostics,
) -> Verdict {
    if agg.faces() < t.min_face_frames {
        return Verdict::spoof(Reason::NoFaceDetected);
    }

    let passive = assess_passive(&agg.passive, t);
    diag.passive_fail_ratio = Some(passive.fail_ratio);
    diag.frequency_fail_ratio = Some(passive.frequency_fail_ratio);
    diag.texture_fail_ratio = Some(passive.texture_fail_ratio);
    if let Some(cause) = passive.failure {
        return Verdict::spoof(Reason::PassiveCheckFailed).with_attack(cause.attack_type());
    }

    if let Some(variance) = stats::variance(&agg.pulse_series()) {
        diag.pulse_variance = Some(variance);
        if variance < t.pulse_variance_min {
            return Verdict::spoof(Reason::NoBiologicalSignal);
        }
    }

    if let Some(min_variance) = t.static_landmark_variance_min {
        let stability = check_landmark_stability(&agg.anchor_series(), min_variance);
        if stability.frames_analysed >= 2 {
            diag.landmark_variance = Some(stability.landmark_variance);
        }
        if !stability.is_live {
            return Verdict::spoof(Reason::StaticImage).with_attack(AttackType::StaticImage);
        }
    }

    match challenge {
        Challenge::Blink => {
            let Some(range) = stats::range(&agg.ear_series()) else {
                return Verdict::spoof(Reason::NoFaceLandmarks);
            };
            diag.ear_range = Some(range);
            if range > t.blink_ear_range_min {
                Verdict::live(Reason::BlinkDetected)
            } else {
                Verdict::spoof(Reason::NoBlinkDetected)
            }
        }
        Challenge::HeadTurn => {
            let Some((lo, hi)) = stats::min_max(&agg.yaw_series()) else {
                return Verdict::spoof(Reason::NoFaceLandmarks);
            };
            diag.yaw_min = Some(lo);
            diag.yaw_max = Some(hi);
            if lo < t.head_yaw_low || hi > t.head_yaw_high {
                Verdict::live(Reason::HeadTurnDetected)
            } else {
                Verdict::spoof(Reason::HeadRemainedStatic)
            }
        }
        Challenge::MouthOpen => {
            let Some(range) = stats::range(&agg.mouth_series()) else {
                return Verdict::spoof(Reason::NoFaceLandmarks);
            };
            diag.mouth_range = Some(range);
            if range > t.mouth_ratio_range_min {
                Verdict::live(Reason::MouthOpenDetected)
            } else {
                Verdict::spoof(Reason::MouthNotOpened)
            }
        }
        Challenge::Unrecognized(_) => Verdict::spoof(Reason::UnknownChallenge),
    }
}
