//! V4L2 webcam capture via the `v4l` crate.

use crate::sample::{self, Sample};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Requested capture resolution; the driver may negotiate differently.
const REQUEST_WIDTH: u32 = 640;
const REQUEST_HEIGHT: u32 = 480;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("camera has not produced a full frame yet")]
    NotReady,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("device does not support video capture")]
    CaptureNotSupported,
}

/// Info about a discovered V4L2 capture device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
}

/// Negotiated pixel layout for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelLayout {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract the Y channel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
    /// 16-bit grayscale (2 bytes/pixel little-endian, common on IR cameras).
    Y16,
}

/// V4L2 webcam handle. The kiosk's FrameSource.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    layout: PixelLayout,
}

impl Camera {
    /// Open a V4L2 device by path (e.g., "/dev/video0") and negotiate a
    /// pixel format the screening pipeline can consume.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::CaptureNotSupported);
        }

        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUEST_WIDTH;
        fmt.height = REQUEST_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let layout = if negotiated.fourcc == FourCC::new(b"YUYV") {
            PixelLayout::Yuyv
        } else if negotiated.fourcc == FourCC::new(b"GREY") {
            PixelLayout::Grey
        } else if negotiated.fourcc == FourCC::new(b"Y16 ") || negotiated.fourcc == FourCC::new(b"Y16\0")
        {
            PixelLayout::Y16
        } else {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, GREY, or Y16)",
                negotiated.fourcc
            )));
        };

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            layout,
        })
    }

    /// Capture one sample.
    ///
    /// Returns [`CameraError::NotReady`] when the stream cannot yet hand
    /// back a full frame (stream startup, empty dequeue). No retry here;
    /// callers decide what a skipped frame means.
    pub fn capture_sample(&self) -> Result<Sample, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|_| CameraError::NotReady)?;

        let (buf, meta) = stream.next().map_err(|_| CameraError::NotReady)?;
        if buf.is_empty() {
            return Err(CameraError::NotReady);
        }

        let gray = match self.layout {
            PixelLayout::Grey => {
                let pixels = (self.width * self.height) as usize;
                if buf.len() < pixels {
                    return Err(CameraError::NotReady);
                }
                buf[..pixels].to_vec()
            }
            PixelLayout::Yuyv => sample::yuyv_to_gray(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion: {e}")))?,
            PixelLayout::Y16 => sample::y16_to_gray(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("Y16 conversion: {e}")))?,
        };

        tracing::trace!(seq = meta.sequence, "captured frame");

        Sample::from_gray(gray, self.width, self.height)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
            });
        }

        devices
    }
}
