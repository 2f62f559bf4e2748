//! turnstile-hw: hardware abstraction for the kiosk webcam.
//!
//! Provides V4L2-based frame capture and the `Sample` type that the
//! screening pipeline and upload path consume.

pub mod camera;
pub mod sample;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use sample::{Sample, SampleError};
