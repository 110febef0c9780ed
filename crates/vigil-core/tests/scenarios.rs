//! Full-pipeline scenarios: encoded frames in, verdict out, with a scripted
//! landmark provider standing in for the face-mesh model.

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};

use vigil_core::landmarks::{
    FOREHEAD, LEFT_EYE, LEFT_EYE_OUTER, LOWER_LIP_INNER, MESH_POINTS, MOUTH_LEFT, MOUTH_RIGHT,
    NOSE_TIP, RIGHT_EYE, RIGHT_EYE_OUTER, UPPER_LIP_INNER,
};
use vigil_core::{
    AttackType, Challenge, FrameSample, Landmark, LandmarkError, LandmarkProvider, LandmarkSet,
    LivenessPipeline, Reason, RequestError, Status, Thresholds,
};

#[derive(Debug, Clone, Copy)]
struct Pose {
    eye_open: f32,
    lip_gap: f32,
    nose_x: f32,
    shift: f32,
}

impl Pose {
    fn neutral(shift: f32) -> Self {
        Self {
            eye_open: 0.04,
            lip_gap: 0.01,
            nose_x: 0.5,
            shift,
        }
    }

    fn landmarks(self) -> LandmarkSet {
        let s = self.shift;
        let at = |x: f32, y: f32| Landmark::new(x + s, y + s, 0.0);
        let mut pts = vec![at(0.5, 0.5); MESH_POINTS];
        for (eye, x0) in [(LEFT_EYE, 0.3f32), (RIGHT_EYE, 0.6f32)] {
            let half = self.eye_open / 2.0;
            pts[eye[0]] = at(x0, 0.4);
            pts[eye[3]] = at(x0 + 0.1, 0.4);
            pts[eye[1]] = at(x0 + 0.03, 0.4 - half);
            pts[eye[2]] = at(x0 + 0.07, 0.4 - half);
            pts[eye[4]] = at(x0 + 0.07, 0.4 + half);
            pts[eye[5]] = at(x0 + 0.03, 0.4 + half);
        }
        pts[LEFT_EYE_OUTER] = at(0.3, 0.4);
        pts[RIGHT_EYE_OUTER] = at(0.7, 0.4);
        pts[NOSE_TIP] = at(self.nose_x, 0.55);
        pts[UPPER_LIP_INNER] = at(0.5, 0.7);
        pts[LOWER_LIP_INNER] = at(0.5, 0.7 + self.lip_gap);
        pts[MOUTH_LEFT] = at(0.4, 0.72);
        pts[MOUTH_RIGHT] = at(0.6, 0.72);
        pts[FOREHEAD] = at(0.5, 0.15);
        LandmarkSet::new(pts).unwrap()
    }
}

/// Replays a fixed pose per frame index; `None` means no face.
struct Scripted(Vec<Option<Pose>>);

impl LandmarkProvider for Scripted {
    fn detect(&self, frame: &FrameSample) -> Result<Option<LandmarkSet>, LandmarkError> {
        Ok(self
            .0
            .get(frame.index)
            .copied()
            .flatten()
            .map(Pose::landmarks))
    }
}

fn encode(img: &RgbImage) -> String {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    base64::engine::general_purpose::STANDARD.encode(buf.into_inner())
}

/// Flat frames whose green level alternates, giving the pulse proxy some
/// variance unless `flat` is set.
fn frames(n: usize, flat: bool) -> Vec<String> {
    (0..n)
        .map(|i| {
            let green = if flat || i % 2 == 0 { 120 } else { 126 };
            encode(&RgbImage::from_pixel(64, 64, Rgb([150, green, 110])))
        })
        .collect()
}

/// Passive layer that accepts flat synthetic frames.
fn lenient() -> Thresholds {
    Thresholds {
        frequency_std_max: f64::MAX,
        laplacian_var_min: 0.0,
        ..Thresholds::default()
    }
}

fn sway(i: usize) -> f32 {
    if i % 2 == 0 {
        0.01
    } else {
        -0.01
    }
}

fn run(
    thresholds: Thresholds,
    script: Vec<Option<Pose>>,
    frames: &[String],
    challenge: &str,
) -> vigil_core::Verdict {
    let pipeline = LivenessPipeline::new(thresholds, Arc::new(Scripted(script)));
    pipeline
        .run(frames, &Challenge::parse(challenge), true)
        .unwrap()
}

#[test]
fn test_head_turn_is_live() {
    let script = (0..8)
        .map(|i| {
            Some(Pose {
                nose_x: if i < 4 { 0.5 } else { 0.35 },
                ..Pose::neutral(sway(i))
            })
        })
        .collect();
    let verdict = run(lenient(), script, &frames(8, false), "head_turn");

    assert_eq!(verdict.status, Status::Live);
    assert_eq!(verdict.reason, Reason::HeadTurnDetected);
    assert_eq!(verdict.attack_type, None);
    let debug = verdict.debug.unwrap();
    assert!(debug.yaw_min.unwrap() < 0.6);
    assert!((debug.pulse_variance.unwrap() - 9.0).abs() < 1e-9);
}

#[test]
fn test_still_head_is_spoof() {
    let script = (0..8).map(|i| Some(Pose::neutral(sway(i)))).collect();
    let verdict = run(lenient(), script, &frames(8, false), "head_turn");
    assert_eq!(verdict.status, Status::Spoof);
    assert_eq!(verdict.reason, Reason::HeadRemainedStatic);
}

#[test]
fn test_blink_is_live() {
    let script = (0..10)
        .map(|i| {
            Some(Pose {
                eye_open: if i == 5 { 0.005 } else { 0.04 },
                ..Pose::neutral(sway(i))
            })
        })
        .collect();
    let verdict = run(lenient(), script, &frames(10, false), "blink");
    assert_eq!(verdict.reason, Reason::BlinkDetected);
    assert!(verdict.debug.unwrap().ear_range.unwrap() > 0.3);
}

#[test]
fn test_mouth_open_is_live() {
    let script = (0..8)
        .map(|i| {
            Some(Pose {
                lip_gap: if i > 4 { 0.1 } else { 0.01 },
                ..Pose::neutral(sway(i))
            })
        })
        .collect();
    let verdict = run(lenient(), script, &frames(8, false), "mouth_open");
    assert_eq!(verdict.reason, Reason::MouthOpenDetected);
}

#[test]
fn test_too_few_faces() {
    let script = (0..8)
        .map(|i| (i % 2 == 0).then(|| Pose::neutral(sway(i))))
        .collect();
    let verdict = run(lenient(), script, &frames(8, false), "head_turn");
    assert_eq!(verdict.reason, Reason::NoFaceDetected);
    assert_eq!(verdict.debug.unwrap().frames_with_face, 4);
}

#[test]
fn test_blurry_frames_are_a_photo_replay() {
    let thresholds = Thresholds {
        laplacian_var_min: 1.0,
        ..lenient()
    };
    let script = (0..8).map(|i| Some(Pose::neutral(sway(i)))).collect();
    let verdict = run(thresholds, script, &frames(8, false), "head_turn");
    assert_eq!(verdict.reason, Reason::PassiveCheckFailed);
    assert_eq!(verdict.attack_type, Some(AttackType::ReplayPhoto));
}

#[test]
fn test_spectral_artifacts_are_a_screen_replay() {
    let thresholds = Thresholds {
        frequency_std_max: -1.0,
        ..lenient()
    };
    let script = (0..8).map(|i| Some(Pose::neutral(sway(i)))).collect();
    let verdict = run(thresholds, script, &frames(8, false), "blink");
    assert_eq!(verdict.attack_type, Some(AttackType::ReplayScreen));
}

#[test]
fn test_constant_skin_tone_has_no_biological_signal() {
    let script = (0..8)
        .map(|i| {
            Some(Pose {
                nose_x: if i < 4 { 0.5 } else { 0.35 },
                ..Pose::neutral(sway(i))
            })
        })
        .collect();
    let verdict = run(lenient(), script, &frames(8, true), "head_turn");
    assert_eq!(verdict.reason, Reason::NoBiologicalSignal);
}

#[test]
fn test_frozen_anchors_are_a_static_image() {
    // Eyelids move but nothing else does.
    let script: Vec<_> = (0..8)
        .map(|i| {
            Some(Pose {
                eye_open: if i == 3 { 0.005 } else { 0.04 },
                ..Pose::neutral(0.0)
            })
        })
        .collect();
    let verdict = run(lenient(), script.clone(), &frames(8, false), "blink");
    assert_eq!(verdict.reason, Reason::StaticImage);
    assert_eq!(verdict.attack_type, Some(AttackType::StaticImage));

    let disabled = Thresholds {
        static_landmark_variance_min: None,
        ..lenient()
    };
    let verdict = run(disabled, script, &frames(8, false), "blink");
    assert_eq!(verdict.reason, Reason::BlinkDetected);
}

#[test]
fn test_unknown_challenge_is_spoof() {
    let script = (0..8).map(|i| Some(Pose::neutral(sway(i)))).collect();
    let verdict = run(lenient(), script, &frames(8, false), "smile");
    assert_eq!(verdict.reason, Reason::UnknownChallenge);
    assert_eq!(verdict.status, Status::Spoof);
}

#[test]
fn test_undecodable_frames_are_dropped_from_diagnostics() {
    let mut input = frames(9, false);
    input[4] = "data:image/png;base64,!!!".to_string();
    let script = (0..9)
        .map(|i| {
            Some(Pose {
                nose_x: if i < 5 { 0.5 } else { 0.65 },
                ..Pose::neutral(sway(i))
            })
        })
        .collect();
    let verdict = run(lenient(), script, &input, "head_turn");

    assert_eq!(verdict.reason, Reason::HeadTurnDetected);
    let debug = verdict.debug.unwrap();
    assert_eq!(debug.frames_submitted, 9);
    assert_eq!(debug.frames_decoded, 8);
    let indices: Vec<usize> = debug.frames.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 5, 6, 7, 8]);
}

#[test]
fn test_too_many_frames_is_a_request_error() {
    let pipeline = LivenessPipeline::new(lenient(), Arc::new(Scripted(Vec::new())));
    let err = pipeline
        .run(&frames(65, false), &Challenge::HeadTurn, false)
        .unwrap_err();
    assert_eq!(
        err,
        RequestError::TooManyFrames {
            submitted: 65,
            max: 64
        }
    );
}
