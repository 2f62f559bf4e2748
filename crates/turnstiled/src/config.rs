use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Base URL of the object-store gateway (upload + match endpoints).
    pub gateway_base_url: String,
    /// Bucket path segment for uploaded samples.
    pub gateway_bucket: String,
    /// Base URL of the employee directory service.
    pub directory_base_url: String,
    /// Delay between the end of one cycle and the start of the next.
    pub cycle_interval: Duration,
    /// How long an authenticated display stays up before auto-reset.
    pub auth_hold: Duration,
    /// Minimum time between a blink and the open-eyed frame.
    pub blink_hold: Duration,
    /// Lifetime of a recorded blink.
    pub blink_ttl: Duration,
    /// Warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Whether liveness additionally requires head motion.
    pub require_motion: bool,
    /// Speech synthesis command for spoken greetings.
    pub speech_command: String,
}

impl Config {
    /// Load configuration from `TURNSTILE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("TURNSTILE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/usr/share/turnstile/models"));

        Self {
            camera_device: std::env::var("TURNSTILE_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            gateway_base_url: std::env::var("TURNSTILE_GATEWAY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string()),
            gateway_bucket: std::env::var("TURNSTILE_GATEWAY_BUCKET")
                .unwrap_or_else(|_| "visitor-images".to_string()),
            directory_base_url: std::env::var("TURNSTILE_DIRECTORY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9001/api/face-detection".to_string()),
            cycle_interval: env_ms("TURNSTILE_CYCLE_INTERVAL_MS", 5000),
            auth_hold: env_ms("TURNSTILE_AUTH_HOLD_MS", 10_000),
            blink_hold: env_ms("TURNSTILE_BLINK_HOLD_MS", 2000),
            blink_ttl: env_ms("TURNSTILE_BLINK_TTL_MS", 30_000),
            warmup_frames: env_usize("TURNSTILE_WARMUP_FRAMES", 4),
            require_motion: std::env::var("TURNSTILE_REQUIRE_MOTION")
                .map(|v| v == "1")
                .unwrap_or(false),
            speech_command: std::env::var("TURNSTILE_SPEECH_CMD")
                .unwrap_or_else(|_| "spd-say".to_string()),
        }
    }

    /// Path to the screening face detector model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("face_screen_128.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the 68-point landmark model.
    pub fn landmark_model_path(&self) -> String {
        self.model_dir
            .join("landmarks_68.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_ms(key: &str, default: u64) -> Duration {
    Duration::from_millis(
        std::env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
