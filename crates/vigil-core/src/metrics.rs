//! Behavioral metrics derived from one frame's landmarks.

use image::RgbImage;
use serde::Serialize;

use crate::landmarks::{
    Landmark, LandmarkSet, ANCHORS, FOREHEAD, LEFT_EYE, LEFT_EYE_OUTER, LOWER_LIP_INNER, NOSE_TIP,
    RIGHT_EYE, RIGHT_EYE_OUTER, UPPER_LIP_INNER,
};

/// Guards the ratios below against a zero denominator.
const EPSILON: f64 = 1e-6;

/// Per-frame scalar metrics for a frame with a detected face.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameMetrics {
    /// Mean eye aspect ratio of both eyes. Low values mean closed eyes.
    pub ear: f64,
    /// Inner-lip distance over outer-eye-corner distance.
    pub mouth_ratio: f64,
    /// Nose-to-left-corner over nose-to-right-corner horizontal distance.
    /// Near 1 when facing the camera.
    pub head_yaw: f64,
    /// Mean green intensity (0-255) of the forehead region.
    pub pulse_sample: f64,
    /// Normalized `(x, y)` of the anchor points used by the static-image check.
    #[serde(skip)]
    pub anchors: [(f32, f32); 5],
}

/// Compute all metrics for one frame. `pulse_roi_size` is the side length in
/// pixels of the square sampled around the forehead landmark.
pub fn extract(landmarks: &LandmarkSet, frame: &RgbImage, pulse_roi_size: u32) -> FrameMetrics {
    let (w, h) = (frame.width(), frame.height());

    let ear = (eye_aspect_ratio(landmarks, &LEFT_EYE, w, h)
        + eye_aspect_ratio(landmarks, &RIGHT_EYE, w, h))
        / 2.0;

    FrameMetrics {
        ear,
        mouth_ratio: mouth_ratio(landmarks, w, h),
        head_yaw: head_yaw(landmarks),
        pulse_sample: pulse_sample(frame, landmarks.point(FOREHEAD), pulse_roi_size),
        anchors: ANCHORS.map(|i| {
            let p = landmarks.point(i);
            (p.x, p.y)
        }),
    }
}

/// `(|p1 - p5| + |p2 - p4|) / (2 · |p0 - p3|)` in pixel space.
pub fn eye_aspect_ratio(landmarks: &LandmarkSet, eye: &[usize; 6], w: u32, h: u32) -> f64 {
    let p = eye.map(|i| landmarks.point(i).to_pixels(w, h));
    let v1 = distance(p[1], p[5]);
    let v2 = distance(p[2], p[4]);
    let horizontal = distance(p[0], p[3]) + EPSILON;
    (v1 + v2) / (2.0 * horizontal)
}

/// Inner-lip gap normalized by outer-eye-corner span, in pixel space.
pub fn mouth_ratio(landmarks: &LandmarkSet, w: u32, h: u32) -> f64 {
    let gap = distance(
        landmarks.point(UPPER_LIP_INNER).to_pixels(w, h),
        landmarks.point(LOWER_LIP_INNER).to_pixels(w, h),
    );
    let span = distance(
        landmarks.point(LEFT_EYE_OUTER).to_pixels(w, h),
        landmarks.point(RIGHT_EYE_OUTER).to_pixels(w, h),
    );
    gap / (span + EPSILON)
}

/// Horizontal yaw ratio in normalized coordinates.
pub fn head_yaw(landmarks: &LandmarkSet) -> f64 {
    let nose = f64::from(landmarks.point(NOSE_TIP).x);
    let d_left = (nose - f64::from(landmarks.point(LEFT_EYE_OUTER).x)).abs();
    let d_right = (nose - f64::from(landmarks.point(RIGHT_EYE_OUTER).x)).abs();
    d_left / (d_right + EPSILON)
}

/// Mean green intensity over a `size × size` square centred on `center`,
/// clipped to the frame. Returns 0 when nothing of the square is inside.
pub fn pulse_sample(frame: &RgbImage, center: Landmark, size: u32) -> f64 {
    let (w, h) = (i64::from(frame.width()), i64::from(frame.height()));
    let (cx, cy) = center.to_pixels(frame.width(), frame.height());
    let half = i64::from(size / 2);
    let (cx, cy) = (cx.round() as i64, cy.round() as i64);

    let x0 = (cx - half).max(0);
    let y0 = (cy - half).max(0);
    let x1 = (cx - half + i64::from(size)).min(w);
    let y1 = (cy - half + i64::from(size)).min(h);
    if x0 >= x1 || y0 >= y1 {
        return 0.0;
    }

    let mut sum = 0u64;
    for y in y0..y1 {
        for x in x0..x1 {
            sum += u64::from(frame.get_pixel(x as u32, y as u32).0[1]);
        }
    }
    sum as f64 / ((x1 - x0) * (y1 - y0)) as f64
}

fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::MESH_POINTS;

    /// Face on a 100×100 frame: outer eye corners at x = 0.3 / 0.7, nose at
    /// `nose_x`, eyes 0.1 wide and `eye_open` tall, lips `gap` apart.
    fn face(eye_open: f32, gap: f32, nose_x: f32) -> LandmarkSet {
        let mut pts = vec![Landmark::new(0.5, 0.5, 0.0); MESH_POINTS];
        for (eye, x0) in [(LEFT_EYE, 0.3f32), (RIGHT_EYE, 0.6f32)] {
            pts[eye[0]] = Landmark::new(x0, 0.4, 0.0);
            pts[eye[3]] = Landmark::new(x0 + 0.1, 0.4, 0.0);
            pts[eye[1]] = Landmark::new(x0 + 0.03, 0.4 - eye_open / 2.0, 0.0);
            pts[eye[2]] = Landmark::new(x0 + 0.07, 0.4 - eye_open / 2.0, 0.0);
            pts[eye[4]] = Landmark::new(x0 + 0.07, 0.4 + eye_open / 2.0, 0.0);
            pts[eye[5]] = Landmark::new(x0 + 0.03, 0.4 + eye_open / 2.0, 0.0);
        }
        pts[LEFT_EYE_OUTER] = Landmark::new(0.3, 0.4, 0.0);
        pts[RIGHT_EYE_OUTER] = Landmark::new(0.7, 0.4, 0.0);
        pts[NOSE_TIP] = Landmark::new(nose_x, 0.55, 0.0);
        pts[UPPER_LIP_INNER] = Landmark::new(0.5, 0.7, 0.0);
        pts[LOWER_LIP_INNER] = Landmark::new(0.5, 0.7 + gap, 0.0);
        pts[FOREHEAD] = Landmark::new(0.5, 0.1, 0.0);
        LandmarkSet::new(pts).unwrap()
    }

    fn blank(w: u32, h: u32, green: u8) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb([0, green, 0]))
    }

    #[test]
    fn test_ear_is_vertical_over_horizontal_opening() {
        // Each eye: lids 4 px apart, corners 10 px apart -> (4 + 4) / 20 = 0.4
        let lm = face(0.04, 0.0, 0.5);
        let ear = eye_aspect_ratio(&lm, &LEFT_EYE, 100, 100);
        assert!((ear - 0.4).abs() < 1e-4, "ear = {ear}");

        let closed = face(0.0, 0.0, 0.5);
        assert!(eye_aspect_ratio(&closed, &RIGHT_EYE, 100, 100) < 1e-6);
    }

    #[test]
    fn test_mouth_ratio_is_scale_invariant() {
        // Lip gap 0.08, corner span 0.4 -> 0.2 at any frame size.
        let lm = face(0.04, 0.08, 0.5);
        let small = mouth_ratio(&lm, 100, 100);
        let large = mouth_ratio(&lm, 1000, 1000);
        assert!((small - 0.2).abs() < 1e-4);
        assert!((small - large).abs() < 1e-6);
    }

    #[test]
    fn test_head_yaw_is_one_when_centered_and_moves_with_turns() {
        assert!((head_yaw(&face(0.04, 0.0, 0.5)) - 1.0).abs() < 1e-4);
        // Nose close to the left corner -> ratio well below 1.
        assert!(head_yaw(&face(0.04, 0.0, 0.35)) < 0.6);
        // Nose close to the right corner -> ratio well above 1.
        assert!(head_yaw(&face(0.04, 0.0, 0.65)) > 1.7);
    }

    #[test]
    fn test_pulse_sample_averages_green_channel() {
        let mut frame = blank(100, 100, 80);
        // Paint half of the 20×20 ROI around (50, 10) brighter.
        for y in 0..20 {
            for x in 40..50 {
                frame.put_pixel(x, y, image::Rgb([255, 120, 255]));
            }
        }
        let sample = pulse_sample(&frame, Landmark::new(0.5, 0.1, 0.0), 20);
        assert!((sample - 100.0).abs() < 1e-9, "sample = {sample}");
    }

    #[test]
    fn test_pulse_sample_clips_to_frame() {
        let frame = blank(10, 10, 42);
        // Centre on the corner: only a quarter of the ROI is inside.
        assert_eq!(pulse_sample(&frame, Landmark::new(0.0, 0.0, 0.0), 6), 42.0);
    }

    #[test]
    fn test_degenerate_roi_yields_neutral_default() {
        let frame = blank(10, 10, 42);
        assert_eq!(pulse_sample(&frame, Landmark::new(1.0, 1.0, 0.0), 1), 0.0);
    }

    #[test]
    fn test_extract_collects_all_metrics() {
        let lm = face(0.04, 0.08, 0.5);
        let m = extract(&lm, &blank(100, 100, 90), 20);
        assert!((m.ear - 0.4).abs() < 1e-4);
        assert!((m.mouth_ratio - 0.2).abs() < 1e-4);
        assert!((m.head_yaw - 1.0).abs() < 1e-4);
        assert_eq!(m.pulse_sample, 90.0);
        assert_eq!(m.anchors[0], (0.5, 0.55));
    }
}
