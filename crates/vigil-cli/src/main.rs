use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vigil_core::Thresholds;

mod client;
mod local;

#[derive(Parser)]
#[command(name = "vigil", version, about = "Facial liveness verification tools")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send image files to a running vigild as one liveness request
    Verify {
        /// Daemon base URL
        #[arg(long, default_value = "http://127.0.0.1:8001")]
        url: String,
        /// head_turn, blink or mouth_open
        #[arg(long, default_value = "head_turn")]
        challenge: String,
        /// Ask for per-frame diagnostics
        #[arg(long)]
        debug: bool,
        /// Frames, in capture order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print passive frequency/texture scores per image for calibration
    Inspect {
        /// Thresholds TOML file
        #[arg(long)]
        thresholds: Option<PathBuf>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Run the full liveness pipeline locally against a model file
    Analyze {
        /// Face-mesh ONNX model
        #[arg(long)]
        model: PathBuf,
        /// Expected SHA-256 of the model file
        #[arg(long)]
        sha256: Option<String>,
        /// Thresholds TOML file
        #[arg(long)]
        thresholds: Option<PathBuf>,
        #[arg(long, default_value = "head_turn")]
        challenge: String,
        #[arg(long)]
        debug: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Verify {
            url,
            challenge,
            debug,
            files,
        } => {
            let frames = encode_files(&files)?;
            let live = client::verify(&url, frames, &challenge, debug)?;
            Ok(exit_code(live))
        }
        Commands::Inspect { thresholds, files } => {
            local::inspect(&load_thresholds(thresholds.as_deref())?, &files)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Analyze {
            model,
            sha256,
            thresholds,
            challenge,
            debug,
            files,
        } => {
            let thresholds = load_thresholds(thresholds.as_deref())?;
            let frames = encode_files(&files)?;
            let live = local::analyze(&model, sha256.as_deref(), thresholds, frames, &challenge, debug)?;
            Ok(exit_code(live))
        }
    }
}

/// Exit status 0 for a live verdict, 1 for spoof.
fn exit_code(live: bool) -> ExitCode {
    if live {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn load_thresholds(path: Option<&Path>) -> Result<Thresholds> {
    match path {
        Some(p) => {
            Thresholds::load(p).with_context(|| format!("failed to load {}", p.display()))
        }
        None => Ok(Thresholds::default()),
    }
}

/// Read each file and base64-encode its raw bytes, preserving order.
fn encode_files(files: &[PathBuf]) -> Result<Vec<String>> {
    files
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
        })
        .collect()
}
