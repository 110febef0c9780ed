//! End-to-end request evaluation: decode, per-frame analysis, temporal
//! aggregation, verdict.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rayon::prelude::*;

use crate::aggregate::{FrameOutcome, RequestAggregate, TemporalAggregator};
use crate::config::Thresholds;
use crate::decode::decode_frame;
use crate::landmarks::LandmarkProvider;
use crate::metrics;
use crate::passive::PassiveAnalyzer;
use crate::verdict::{check_submitted, evaluate, Challenge, RequestError, Verdict};

/// Stateless liveness evaluator. One instance serves any number of
/// concurrent requests; nothing is carried between calls.
pub struct LivenessPipeline {
    thresholds: Thresholds,
    analyzer: PassiveAnalyzer,
    provider: Arc<dyn LandmarkProvider>,
}

impl LivenessPipeline {
    pub fn new(thresholds: Thresholds, provider: Arc<dyn LandmarkProvider>) -> Self {
        let analyzer = PassiveAnalyzer::new(&thresholds);
        Self {
            thresholds,
            analyzer,
            provider,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Evaluate one request. `debug` keeps the diagnostics on the verdict.
    pub fn run(
        &self,
        frames: &[String],
        challenge: &Challenge,
        debug: bool,
    ) -> Result<Verdict, RequestError> {
        check_submitted(frames.len(), &self.thresholds)?;

        let aggregate = self.aggregate(frames);
        let verdict = evaluate(&aggregate, challenge, &self.thresholds)?;

        tracing::info!(
            submitted = aggregate.submitted,
            decoded = aggregate.decoded(),
            faces = aggregate.faces(),
            challenge = %challenge,
            status = ?verdict.status,
            reason = %verdict.reason,
            "liveness verdict"
        );

        Ok(if debug { verdict } else { verdict.without_debug() })
    }

    /// Analyse every frame in parallel and fold the outcomes in request
    /// order. Undecodable frames are dropped. Worker threads log inside the
    /// caller's span.
    pub fn aggregate(&self, frames: &[String]) -> RequestAggregate {
        let span = tracing::Span::current();
        let outcomes: Vec<Option<FrameOutcome>> = frames
            .par_iter()
            .enumerate()
            .map(|(index, encoded)| span.in_scope(|| self.analyze_frame(index, encoded)))
            .collect();

        let mut aggregator = TemporalAggregator::new(frames.len());
        for outcome in outcomes.into_iter().flatten() {
            aggregator.record(outcome);
        }
        aggregator.finish()
    }

    /// Decode and analyse a single frame. `None` when it cannot be decoded.
    pub fn analyze_frame(&self, index: usize, encoded: &str) -> Option<FrameOutcome> {
        let frame = match decode_frame(index, encoded) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(frame = index, error = %e, "skipping undecodable frame");
                return None;
            }
        };

        let passive = self.analyzer.analyze(&frame);

        // A provider failure, panics included, costs this frame its face.
        let landmarks = match catch_unwind(AssertUnwindSafe(|| self.provider.detect(&frame))) {
            Ok(Ok(landmarks)) => landmarks,
            Ok(Err(e)) => {
                tracing::warn!(frame = index, error = %e, "landmark detection failed");
                None
            }
            Err(_) => {
                tracing::warn!(frame = index, "landmark provider panicked");
                None
            }
        };
        let metrics = landmarks
            .map(|set| metrics::extract(&set, &frame.pixels, self.thresholds.pulse_roi_size));

        tracing::debug!(
            frame = index,
            frequency_std = passive.frequency_std,
            laplacian_var = passive.laplacian_var,
            face = metrics.is_some(),
            "frame analysed"
        );

        Some(FrameOutcome {
            index,
            passive,
            metrics,
        })
    }
}
