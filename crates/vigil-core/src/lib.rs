//! vigil-core: Facial liveness verification engine.
//!
//! Turns a short burst of camera frames into a live/spoof verdict by fusing
//! passive pixel statistics (frequency spectrum, Laplacian texture), landmark
//! metrics aggregated across the burst (eye aspect ratio, mouth aperture,
//! head yaw), a coarse green-channel pulse proxy and an active motion
//! challenge.

pub mod aggregate;
pub mod config;
pub mod decode;
pub mod integrity;
pub mod landmarks;
pub mod mesh;
pub mod metrics;
pub mod passive;
pub mod pipeline;
pub mod stability;
pub mod stats;
pub mod verdict;

pub use aggregate::{FrameOutcome, RequestAggregate, TemporalAggregator};
pub use config::{ConfigError, Thresholds};
pub use decode::{decode_frame, DecodeError, FrameSample};
pub use integrity::{ModelDigest, ModelIntegrityError};
pub use landmarks::{Landmark, LandmarkError, LandmarkProvider, LandmarkSet};
pub use mesh::FaceMeshDetector;
pub use metrics::FrameMetrics;
pub use passive::{PassiveAnalyzer, PassiveScore};
pub use pipeline::LivenessPipeline;
pub use verdict::{AttackType, Challenge, Reason, RequestError, Status, Verdict};
