//! Request-wide accumulation of per-frame results.

use crate::metrics::FrameMetrics;
use crate::passive::PassiveScore;

/// Everything computed for one decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub index: usize,
    pub passive: PassiveScore,
    /// `None` when no face was detected (or the detector failed).
    pub metrics: Option<FrameMetrics>,
}

/// Appends frame outcomes in arrival order.
#[derive(Debug, Clone)]
pub struct TemporalAggregator {
    aggregate: RequestAggregate,
}

impl TemporalAggregator {
    /// Start a request with `submitted` frames received from the client.
    pub fn new(submitted: usize) -> Self {
        Self {
            aggregate: RequestAggregate {
                submitted,
                ..RequestAggregate::default()
            },
        }
    }

    /// Record a successfully decoded frame.
    pub fn record(&mut self, outcome: FrameOutcome) {
        let agg = &mut self.aggregate;
        agg.frame_indices.push(outcome.index);
        agg.passive.push(outcome.passive);
        if let Some(metrics) = outcome.metrics {
            agg.face_indices.push(outcome.index);
            agg.metrics.push(metrics);
        }
    }

    pub fn finish(self) -> RequestAggregate {
        self.aggregate
    }
}

/// The full-request reduction handed to the verdict engine. Sequences are
/// in input frame order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestAggregate {
    /// Frames submitted by the client, decodable or not.
    pub submitted: usize,
    /// Request index of every decoded frame; parallel to `passive`.
    pub frame_indices: Vec<usize>,
    pub passive: Vec<PassiveScore>,
    /// Request index of every frame with a face; parallel to `metrics`.
    pub face_indices: Vec<usize>,
    pub metrics: Vec<FrameMetrics>,
}

impl RequestAggregate {
    /// Frames successfully decoded.
    pub fn decoded(&self) -> usize {
        self.passive.len()
    }

    /// Frames with a detected face.
    pub fn faces(&self) -> usize {
        self.metrics.len()
    }

    pub fn ear_series(&self) -> Vec<f64> {
        self.metrics.iter().map(|m| m.ear).collect()
    }

    pub fn mouth_series(&self) -> Vec<f64> {
        self.metrics.iter().map(|m| m.mouth_ratio).collect()
    }

    pub fn yaw_series(&self) -> Vec<f64> {
        self.metrics.iter().map(|m| m.head_yaw).collect()
    }

    pub fn pulse_series(&self) -> Vec<f64> {
        self.metrics.iter().map(|m| m.pulse_sample).collect()
    }

    pub fn anchor_series(&self) -> Vec<[(f32, f32); 5]> {
        self.metrics.iter().map(|m| m.anchors).collect()
    }
}
