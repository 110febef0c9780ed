use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use vigil_core::{Challenge, LivenessPipeline, RequestError, Verdict};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("liveness evaluation timed out after {0:?}")]
    Timeout(Duration),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from HTTP handlers to the engine thread.
struct EngineRequest {
    frames: Vec<String>,
    challenge: Challenge,
    debug: bool,
    /// Caller's span, re-entered on the engine thread.
    span: tracing::Span,
    reply: oneshot::Sender<Result<Verdict, RequestError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    /// Evaluate one request. Queueing and evaluation together are bounded by
    /// the engine timeout.
    pub async fn verify(
        &self,
        frames: Vec<String>,
        challenge: Challenge,
        debug: bool,
    ) -> Result<Verdict, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = EngineRequest {
            frames,
            challenge,
            debug,
            span: tracing::Span::current(),
            reply: reply_tx,
        };

        let exchange = async {
            self.tx
                .send(request)
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            let verdict = reply_rx.await.map_err(|_| EngineError::ChannelClosed)??;
            Ok::<_, EngineError>(verdict)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| EngineError::Timeout(self.timeout))?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the pipeline (and with it the loaded model) and serves
/// requests one at a time; frames within a request are analysed in
/// parallel by the pipeline itself.
pub fn spawn_engine(
    pipeline: LivenessPipeline,
    queue: usize,
    timeout: Duration,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue.max(1));

    std::thread::Builder::new()
        .name("vigil-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                if req.reply.is_closed() {
                    tracing::debug!("caller gone, dropping queued request");
                    continue;
                }
                let _entered = req.span.enter();
                match catch_unwind(AssertUnwindSafe(|| {
                    pipeline.run(&req.frames, &req.challenge, req.debug)
                })) {
                    Ok(result) => {
                        let _ = req.reply.send(result);
                    }
                    // Dropping the reply fails this request alone.
                    Err(_) => tracing::error!("liveness evaluation panicked"),
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, timeout })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing::Instrument;
    use vigil_core::{FrameSample, LandmarkError, LandmarkProvider, LandmarkSet, Reason, Thresholds};

    struct NoFace;

    impl LandmarkProvider for NoFace {
        fn detect(&self, _frame: &FrameSample) -> Result<Option<LandmarkSet>, LandmarkError> {
            Ok(None)
        }
    }

    /// Panics on every frame.
    struct Crashing;

    impl LandmarkProvider for Crashing {
        fn detect(&self, _frame: &FrameSample) -> Result<Option<LandmarkSet>, LandmarkError> {
            panic!("inference backend crashed")
        }
    }

    /// Records the span active while each frame is analysed.
    #[derive(Default)]
    struct SpanRecorder(Mutex<Vec<Option<&'static str>>>);

    impl LandmarkProvider for SpanRecorder {
        fn detect(&self, _frame: &FrameSample) -> Result<Option<LandmarkSet>, LandmarkError> {
            let name = tracing::Span::current().metadata().map(|m| m.name());
            self.0.lock().unwrap().push(name);
            Ok(None)
        }
    }

    fn png_frames(n: usize) -> Vec<String> {
        use base64::Engine;
        let img = image::RgbImage::from_fn(24, 24, |x, y| image::Rgb([(x * 9) as u8, (y * 9) as u8, 80]));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        vec![base64::engine::general_purpose::STANDARD.encode(buf.into_inner()); n]
    }

    fn engine(timeout: Duration) -> EngineHandle {
        let pipeline = LivenessPipeline::new(Thresholds::default(), Arc::new(NoFace));
        spawn_engine(pipeline, 2, timeout).unwrap()
    }

    #[tokio::test]
    async fn test_request_errors_pass_through() {
        let handle = engine(Duration::from_secs(5));
        let err = handle
            .verify(vec!["x".to_string(); 2], Challenge::HeadTurn, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Request(RequestError::TooFewFrames { submitted: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_undecodable_burst_is_rejected() {
        let handle = engine(Duration::from_secs(5));
        let err = handle
            .verify(vec!["%%%".to_string(); 8], Challenge::Blink, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Request(RequestError::TooFewDecodable { decoded: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_engine_survives_crashing_detector() {
        let pipeline = LivenessPipeline::new(Thresholds::default(), Arc::new(Crashing));
        let handle = spawn_engine(pipeline, 2, Duration::from_secs(10)).unwrap();

        for _ in 0..2 {
            let verdict = handle
                .verify(png_frames(8), Challenge::HeadTurn, false)
                .await
                .unwrap();
            assert_eq!(verdict.reason, Reason::NoFaceDetected);
        }
    }

    #[tokio::test]
    async fn test_engine_work_runs_in_caller_span() {
        // Registry without layers: spans get ids, nothing is printed.
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());

        let recorder = Arc::new(SpanRecorder::default());
        let pipeline = LivenessPipeline::new(Thresholds::default(), recorder.clone());
        let handle = spawn_engine(pipeline, 2, Duration::from_secs(10)).unwrap();

        handle
            .verify(png_frames(12), Challenge::Blink, false)
            .instrument(tracing::info_span!("liveness", request_id = "r-1"))
            .await
            .unwrap();

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 12);
        assert!(seen.iter().all(|name| *name == Some("liveness")), "{seen:?}");
    }
}
