//! In-process commands: `inspect` and `analyze`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use vigil_core::verdict::assess_passive;
use vigil_core::{
    Challenge, FaceMeshDetector, FrameSample, LivenessPipeline, ModelDigest, PassiveAnalyzer,
    PassiveScore, Thresholds,
};

/// Score every image with the passive analyzer and summarise the request
/// as the verdict engine would.
pub fn inspect(thresholds: &Thresholds, files: &[PathBuf]) -> Result<()> {
    let analyzer = PassiveAnalyzer::new(thresholds);
    let mut scores = Vec::with_capacity(files.len());

    println!(
        "{:<32} {:>12} {:>5} {:>12} {:>5}",
        "file", "freq_std", "ok", "lap_var", "ok"
    );
    for (index, path) in files.iter().enumerate() {
        let score = score_file(&analyzer, index, path)?;
        println!("{}", format_row(path, &score));
        scores.push(score);
    }

    let summary = assess_passive(&scores, thresholds);
    println!();
    println!(
        "fail ratio {:.2} (frequency {:.2}, texture {:.2}), limit {:.2}",
        summary.fail_ratio,
        summary.frequency_fail_ratio,
        summary.texture_fail_ratio,
        thresholds.passive_fail_ratio_max
    );
    match summary.failure {
        Some(cause) => println!("passive layer: FAIL ({:?})", cause.attack_type()),
        None => println!("passive layer: pass"),
    }
    Ok(())
}

/// Run the full pipeline in-process and print the verdict. `sha256` pins
/// the model file.
pub fn analyze(
    model: &Path,
    sha256: Option<&str>,
    thresholds: Thresholds,
    frames: Vec<String>,
    challenge: &str,
    debug: bool,
) -> Result<bool> {
    let pinned = sha256
        .map(str::parse::<ModelDigest>)
        .transpose()
        .context("invalid --sha256")?;
    let detector = FaceMeshDetector::load_verified(model, thresholds.face_score_min, pinned.as_ref())
        .with_context(|| format!("failed to load model {}", model.display()))?;
    tracing::info!(model = %model.display(), "face mesh model loaded");
    let pipeline = LivenessPipeline::new(thresholds, Arc::new(detector));

    tracing::info!(frames = frames.len(), challenge, "running liveness pipeline");
    let verdict = pipeline.run(&frames, &Challenge::parse(challenge), debug)?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(verdict.is_live())
}

fn score_file(analyzer: &PassiveAnalyzer, index: usize, path: &Path) -> Result<PassiveScore> {
    let pixels = image::open(path)
        .with_context(|| format!("failed to decode {}", path.display()))?
        .to_rgb8();
    tracing::debug!(file = %path.display(), width = pixels.width(), height = pixels.height(), "scoring frame");
    Ok(analyzer.analyze(&FrameSample::new(index, pixels)))
}

fn format_row(path: &Path, score: &PassiveScore) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!(
        "{:<32} {:>12.2} {:>5} {:>12.2} {:>5}",
        name,
        score.frequency_std,
        if score.frequency_ok { "yes" } else { "no" },
        score.laplacian_var,
        if score.texture_ok { "yes" } else { "no" },
    )
}
