use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use vigil_core::{ConfigError, Thresholds};

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:8001).
    pub bind_addr: SocketAddr,
    /// Face-mesh ONNX model file.
    pub model_path: PathBuf,
    /// Expected SHA-256 of the model file. Verified at startup when set.
    pub model_sha256: Option<String>,
    /// Optional TOML file overriding the default thresholds.
    pub thresholds_path: Option<PathBuf>,
    /// Upper bound in seconds on a single liveness evaluation.
    pub request_timeout_secs: u64,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Pending requests the engine thread will queue before callers wait.
    pub engine_queue: usize,
}

impl Config {
    /// Load configuration from `VIGIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_path = std::env::var("VIGIL_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                default_model_path(
                    std::env::var("XDG_DATA_HOME").ok(),
                    std::env::var("HOME").ok(),
                )
            });

        Self {
            bind_addr: env_parse("VIGIL_BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8001))),
            model_path,
            model_sha256: env_non_empty("VIGIL_MODEL_SHA256"),
            thresholds_path: env_non_empty("VIGIL_THRESHOLDS").map(PathBuf::from),
            request_timeout_secs: env_parse("VIGIL_REQUEST_TIMEOUT_SECS", 10),
            max_body_bytes: env_parse("VIGIL_MAX_BODY_BYTES", 16 * 1024 * 1024),
            engine_queue: env_parse::<usize>("VIGIL_ENGINE_QUEUE", 8).max(1),
        }
    }

    /// Thresholds from `thresholds_path`, or the defaults.
    pub fn thresholds(&self) -> Result<Thresholds, ConfigError> {
        match &self.thresholds_path {
            Some(path) => Thresholds::load(path),
            None => Ok(Thresholds::default()),
        }
    }
}

fn default_model_path(xdg_data_home: Option<String>, home: Option<String>) -> PathBuf {
    xdg_data_home
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = home.unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("vigil")
        .join("face_landmark.onnx")
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable value, using default");
            default
        }),
        Err(_) => default,
    }
}
