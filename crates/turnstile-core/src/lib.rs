//! turnstile-core: local face screening for the attendance kiosk.
//!
//! The screening gate runs before any network round-trip is paid for:
//! a fast fixed-size presence detector, a 68-point landmark network for
//! the eye contours, and a blink-then-hold liveness policy.

pub mod detector;
pub mod landmarks;
pub mod liveness;
pub mod types;

pub use detector::FaceDetector;
pub use landmarks::LandmarkNet;
pub use liveness::{BlinkGate, HeadMotion};
pub use types::{EyeLandmarks, EyePoints, FaceRegion};
