//! Sample type and image utilities: YUYV extraction, exposure checks,
//! contrast normalization, JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::time::Instant;
use thiserror::Error;

/// Fraction of pixels in the darkest histogram bucket above which a
/// frame is considered unexposed (sensor still warming up).
const DARK_PIXEL_FRACTION: f32 = 0.95;

/// JPEG quality for upload payloads.
const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("buffer too short for {width}x{height}: expected {expected}, got {actual}")]
    TruncatedBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// One captured still image plus its capture timestamp.
///
/// Samples are ephemeral: owned by the cycle that captured them and
/// dropped when that cycle completes or fails.
#[derive(Clone)]
pub struct Sample {
    /// Grayscale pixel data, `width * height` bytes.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic capture time; also the "now" for liveness decisions.
    pub captured_at: Instant,
}

impl Sample {
    /// Build a sample from raw grayscale data, stamping the capture time.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32) -> Result<Self, SampleError> {
        let expected = (width * height) as usize;
        if data.len() < expected {
            return Err(SampleError::TruncatedBuffer {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            captured_at: Instant::now(),
        })
    }

    /// True if the frame is essentially black (unexposed sensor output).
    pub fn is_dark(&self) -> bool {
        dark_fraction(&self.data) > DARK_PIXEL_FRACTION
    }

    /// Stretch pixel intensities so the 1st..99th percentile span 0..255.
    ///
    /// Cheap contrast normalization for washed-out webcam frames before
    /// detection. A flat frame (low == high percentile) is left as-is.
    pub fn normalize_contrast(&mut self) {
        let (low, high) = percentile_bounds(&self.data, 0.01, 0.99);
        if high <= low {
            return;
        }
        let span = (high - low) as f32;
        for px in self.data.iter_mut() {
            let v = (*px as f32 - low as f32) / span * 255.0;
            *px = v.round().clamp(0.0, 255.0) as u8;
        }
    }

    /// Encode the sample as grayscale JPEG bytes for upload.
    pub fn to_jpeg(&self) -> Result<Vec<u8>, SampleError> {
        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
        encoder.encode(&self.data, self.width, self.height, ExtendedColorType::L8)?;
        Ok(out)
    }
}

/// Fraction of pixels in the darkest bucket (0–31).
pub fn dark_fraction(gray: &[u8]) -> f32 {
    if gray.is_empty() {
        return 1.0;
    }
    let dark = gray.iter().filter(|&&p| p < 32).count();
    dark as f32 / gray.len() as f32
}

/// Extract the Y channel from packed YUYV 4:2:2.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; luma is every
/// even-indexed byte.
pub fn yuyv_to_gray(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, SampleError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(SampleError::TruncatedBuffer {
            width,
            height,
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Downscale 16-bit little-endian grayscale (Y16) to 8 bits per pixel.
pub fn y16_to_gray(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, SampleError> {
    let expected = (width * height * 2) as usize;
    if y16.len() < expected {
        return Err(SampleError::TruncatedBuffer {
            width,
            height,
            expected,
            actual: y16.len(),
        });
    }
    Ok(y16[..expected]
        .chunks_exact(2)
        .map(|px| (u16::from_le_bytes([px[0], px[1]]) >> 8) as u8)
        .collect())
}

/// Intensity values at the given low/high percentiles of the histogram.
fn percentile_bounds(gray: &[u8], low_pct: f32, high_pct: f32) -> (u8, u8) {
    if gray.is_empty() {
        return (0, 255);
    }
    let mut hist = [0u32; 256];
    for &p in gray {
        hist[p as usize] += 1;
    }

    let total = gray.len() as f32;
    let low_target = total * low_pct;
    let high_target = total * high_pct;

    let mut low = 0u8;
    let mut high = 255u8;
    let mut cumulative = 0f32;
    let mut low_found = false;

    for (value, &count) in hist.iter().enumerate() {
        cumulative += count as f32;
        if !low_found && cumulative >= low_target {
            low = value as u8;
            low_found = true;
        }
        if cumulative >= high_target {
            high = value as u8;
            break;
        }
    }

    (low, high)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_extracts_luma() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let yuyv = vec![100, 128, 200, 128];
        let gray = yuyv_to_gray(&yuyv, 2, 1).unwrap();
        assert_eq!(gray, vec![100, 200]);
    }

    #[test]
    fn y16_downscales_to_high_byte() {
        // 2x1 image, little-endian: 0x8000 -> 128, 0x0100 -> 1
        let y16 = vec![0x00, 0x80, 0x00, 0x01];
        let gray = y16_to_gray(&y16, 2, 1).unwrap();
        assert_eq!(gray, vec![128, 1]);
    }

    #[test]
    fn yuyv_rejects_short_buffer() {
        assert!(yuyv_to_gray(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn dark_fraction_black_frame() {
        assert!(dark_fraction(&vec![0u8; 1000]) > DARK_PIXEL_FRACTION);
    }

    #[test]
    fn dark_fraction_exposed_frame() {
        assert!(dark_fraction(&vec![128u8; 1000]) < 0.01);
    }

    #[test]
    fn dark_fraction_empty_counts_as_dark() {
        assert_eq!(dark_fraction(&[]), 1.0);
    }

    #[test]
    fn sample_rejects_truncated_data() {
        assert!(Sample::from_gray(vec![0u8; 10], 10, 10).is_err());
    }

    #[test]
    fn sample_dark_detection() {
        let mut data = vec![5u8; 960];
        data.extend(vec![180u8; 40]); // 96% dark
        let sample = Sample::from_gray(data, 40, 25).unwrap();
        assert!(sample.is_dark());

        let sample = Sample::from_gray(vec![120u8; 1000], 40, 25).unwrap();
        assert!(!sample.is_dark());
    }

    #[test]
    fn normalize_contrast_widens_range() {
        // Narrow band 100..120 should spread toward 0..255
        let data: Vec<u8> = (0..4096).map(|i| 100 + (i % 21) as u8).collect();
        let mut sample = Sample::from_gray(data, 64, 64).unwrap();
        sample.normalize_contrast();
        let min = *sample.data.iter().min().unwrap();
        let max = *sample.data.iter().max().unwrap();
        assert!(min < 20, "low end should stretch down, got {min}");
        assert!(max > 235, "high end should stretch up, got {max}");
    }

    #[test]
    fn normalize_contrast_flat_frame_unchanged() {
        let mut sample = Sample::from_gray(vec![77u8; 256], 16, 16).unwrap();
        sample.normalize_contrast();
        assert!(sample.data.iter().all(|&p| p == 77));
    }

    #[test]
    fn jpeg_encoding_produces_soi_marker() {
        let sample = Sample::from_gray(vec![128u8; 64 * 64], 64, 64).unwrap();
        let jpeg = sample.to_jpeg().unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
