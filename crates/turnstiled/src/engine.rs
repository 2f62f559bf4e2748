//! Screening engine: camera + ONNX models + blink state on a dedicated
//! OS thread, serviced over an async request channel.
//!
//! The session task never touches the hardware directly; it asks the
//! engine for one screened sample per cycle and gets back a tagged
//! verdict. Because the engine serves one request at a time, the blink
//! state needs no lock.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use turnstile_core::liveness::is_eye_open;
use turnstile_core::{BlinkGate, FaceDetector, HeadMotion, LandmarkNet};
use turnstile_hw::{Camera, CameraError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] turnstile_core::detector::DetectorError),
    #[error("landmark error: {0}")]
    Landmarks(#[from] turnstile_core::landmarks::LandmarkError),
    #[error("sample error: {0}")]
    Sample(#[from] turnstile_hw::SampleError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// Verdict for one screened sample.
#[derive(Debug)]
pub enum ScreenOutcome {
    /// Camera has not produced a usable frame; skip the cycle silently.
    NotReady,
    /// No face region above the confidence threshold.
    NoFace,
    /// Face present but the liveness gate did not pass.
    NotLive,
    /// Screening passed; the encoded sample is ready for upload.
    Live { jpeg: Vec<u8> },
}

/// Liveness policy knobs for the engine.
pub struct ScreenSettings {
    pub blink_hold: Duration,
    pub blink_ttl: Duration,
    pub require_motion: bool,
}

/// Messages sent from the session task to the engine thread.
enum EngineRequest {
    Screen {
        reply: oneshot::Sender<Result<ScreenOutcome, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Request one capture-and-screen pass.
    pub async fn screen(&self) -> Result<ScreenOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Screen { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

#[async_trait]
impl crate::session::Screen for EngineHandle {
    async fn screen(&self) -> Result<ScreenOutcome, EngineError> {
        EngineHandle::screen(self).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the camera, loads both ONNX models, discards warmup frames,
/// then enters a request loop. Fails fast at startup if any resource
/// is unavailable.
pub fn spawn_engine(
    camera_device: &str,
    detector_path: &str,
    landmark_path: &str,
    warmup_frames: usize,
    settings: ScreenSettings,
) -> Result<EngineHandle, EngineError> {
    let camera = Camera::open(camera_device)?;
    tracing::info!(
        device = camera_device,
        width = camera.width,
        height = camera.height,
        "camera opened"
    );

    let mut detector = FaceDetector::load(detector_path)?;
    tracing::info!(path = detector_path, "screening detector loaded");

    let mut landmarks = LandmarkNet::load(landmark_path)?;
    tracing::info!(path = landmark_path, "landmark model loaded");

    if warmup_frames > 0 {
        tracing::info!(count = warmup_frames, "discarding warmup frames");
        for _ in 0..warmup_frames {
            let _ = camera.capture_sample();
        }
    }

    let mut blink_gate = BlinkGate::new(settings.blink_hold, settings.blink_ttl);
    let mut head_motion = HeadMotion::default();
    let require_motion = settings.require_motion;

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("turnstile-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(EngineRequest::Screen { reply }) = rx.blocking_recv() {
                let result = run_screen(
                    &camera,
                    &mut detector,
                    &mut landmarks,
                    &mut blink_gate,
                    &mut head_motion,
                    require_motion,
                );
                let _ = reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Thread)?;

    Ok(EngineHandle { tx })
}

/// One capture-screen pass: presence gate, then liveness gate, then
/// JPEG encoding for the upload path.
fn run_screen(
    camera: &Camera,
    detector: &mut FaceDetector,
    landmarks: &mut LandmarkNet,
    blink_gate: &mut BlinkGate,
    head_motion: &mut HeadMotion,
    require_motion: bool,
) -> Result<ScreenOutcome, EngineError> {
    let mut sample = match camera.capture_sample() {
        Ok(sample) => sample,
        Err(CameraError::NotReady) => return Ok(ScreenOutcome::NotReady),
        Err(e) => return Err(e.into()),
    };

    // Unexposed warm-up frames count as "no full frame yet".
    if sample.is_dark() {
        tracing::debug!("dark frame, camera not ready");
        return Ok(ScreenOutcome::NotReady);
    }

    sample.normalize_contrast();

    let regions = detector.detect(&sample.data, sample.width, sample.height)?;
    let Some(face) = regions.first() else {
        return Ok(ScreenOutcome::NoFace);
    };
    tracing::debug!(confidence = face.confidence, "face present");

    // Ambiguous landmarks fail liveness without touching the blink state.
    let Some(eyes) = landmarks.eyes(&sample.data, sample.width, sample.height, face)? else {
        tracing::debug!("ambiguous landmarks");
        return Ok(ScreenOutcome::NotLive);
    };

    let left_open = is_eye_open(&eyes.left);
    let right_open = is_eye_open(&eyes.right);
    let moved = head_motion.moved(face);

    let mut live = blink_gate.observe(left_open, right_open, sample.captured_at);
    if require_motion {
        live = live && moved;
    }

    tracing::debug!(left_open, right_open, moved, live, "liveness evaluated");

    if !live {
        return Ok(ScreenOutcome::NotLive);
    }

    let jpeg = sample.to_jpeg()?;
    Ok(ScreenOutcome::Live { jpeg })
}
