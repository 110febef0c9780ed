//! `vigil verify`: post frames to a running daemon.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

/// Request body accepted by `POST /liveness`.
pub fn request_body(frames: Vec<String>, challenge: &str, debug: bool) -> Value {
    let frames: Vec<Value> = frames
        .into_iter()
        .map(|image_base64| json!({ "image_base64": image_base64 }))
        .collect();
    json!({ "frames": frames, "challenge": challenge, "debug": debug })
}

/// Post the frames, print the verdict and return whether it was live.
pub fn verify(base_url: &str, frames: Vec<String>, challenge: &str, debug: bool) -> Result<bool> {
    let endpoint = format!("{}/liveness", base_url.trim_end_matches('/'));
    tracing::info!(%endpoint, frames = frames.len(), challenge, "sending liveness request");
    let body = request_body(frames, challenge, debug).to_string();

    let mut resp = ureq::post(&endpoint)
        .config()
        .http_status_as_error(false)
        .build()
        .header("Content-Type", "application/json")
        .send(body)
        .with_context(|| format!("failed to reach {endpoint}"))?;

    let status = resp.status();
    tracing::debug!(status = status.as_u16(), "daemon responded");
    let request_id = resp
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let text = resp
        .body_mut()
        .read_to_string()
        .context("failed to read response body")?;

    if !status.is_success() {
        let detail = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v["detail"].as_str().map(str::to_owned))
            .unwrap_or(text);
        bail!("request rejected ({status}): {detail}");
    }

    let verdict: Value = serde_json::from_str(&text).context("invalid verdict JSON")?;
    if let Some(id) = request_id {
        eprintln!("request id: {id}");
    }
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(verdict["status"] == "live")
}
