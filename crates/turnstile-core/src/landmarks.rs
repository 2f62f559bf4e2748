//! 68-point facial landmark network via ONNX Runtime.
//!
//! Runs on a cropped face region and yields the two six-point eye
//! contours the liveness gate needs. Everything else the model predicts
//! (jaw, brows, mouth) is discarded.

use crate::types::{EyeLandmarks, EyePoints, FaceRegion};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const LANDMARK_INPUT_SIZE: usize = 112;
const LANDMARK_POINTS: usize = 68;
const LANDMARK_MEAN: f32 = 127.5;
const LANDMARK_STD: f32 = 127.5;
/// Margin added around the detector's box before cropping; landmark
/// models are trained on slightly loose crops.
const CROP_MARGIN: f32 = 0.15;
/// 68-point convention: points 36–41 are the left eye, 42–47 the right.
const LEFT_EYE_START: usize = 36;
const RIGHT_EYE_START: usize = 42;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Face crop in frame coordinates.
#[derive(Debug, Clone, Copy)]
struct CropBox {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// Landmark network handle.
pub struct LandmarkNet {
    session: Session,
}

impl LandmarkNet {
    /// Load the landmark ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, LandmarkError> {
        if !Path::new(model_path).exists() {
            return Err(LandmarkError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded landmark model"
        );

        Ok(Self { session })
    }

    /// Locate the eye contours for one detected face.
    ///
    /// Returns `Ok(None)` when the model output is implausible (points
    /// far outside the crop); the caller treats that as "ambiguous
    /// landmarks", not an error.
    pub fn eyes(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<Option<EyeLandmarks>, LandmarkError> {
        let Some(crop) = crop_for(region, width, height) else {
            return Ok(None);
        };

        let input = self.preprocess(frame, width as usize, &crop);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, coords) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmarks: {e}")))?;

        if coords.len() < LANDMARK_POINTS * 2 {
            return Err(LandmarkError::InferenceFailed(format!(
                "expected {} landmark coordinates, got {}",
                LANDMARK_POINTS * 2,
                coords.len()
            )));
        }

        Ok(extract_eyes(coords, &crop))
    }

    /// Crop the face region and resize to the square model input,
    /// bilinear, as NCHW floats with grayscale replicated per channel.
    fn preprocess(&self, frame: &[u8], stride: usize, crop: &CropBox) -> Array4<f32> {
        let side = LANDMARK_INPUT_SIZE;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        for y in 0..side {
            let sy = crop.y + (y as f32 + 0.5) / side as f32 * crop.height - 0.5;
            for x in 0..side {
                let sx = crop.x + (x as f32 + 0.5) / side as f32 * crop.width - 0.5;
                let pixel = bilinear(frame, stride, sx, sy);
                let normalized = (pixel - LANDMARK_MEAN) / LANDMARK_STD;
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }

        tensor
    }
}

/// Expand the detector box by the crop margin and clamp to the frame.
/// Returns `None` for degenerate regions (off-frame or tiny).
fn crop_for(region: &FaceRegion, width: u32, height: u32) -> Option<CropBox> {
    let mx = region.width * CROP_MARGIN;
    let my = region.height * CROP_MARGIN;

    let x0 = (region.x - mx).max(0.0);
    let y0 = (region.y - my).max(0.0);
    let x1 = (region.x + region.width + mx).min(width as f32);
    let y1 = (region.y + region.height + my).min(height as f32);

    let w = x1 - x0;
    let h = y1 - y0;
    if w < 8.0 || h < 8.0 {
        return None;
    }

    Some(CropBox {
        x: x0,
        y: y0,
        width: w,
        height: h,
    })
}

/// Sample the frame at a fractional position with bilinear weighting.
fn bilinear(frame: &[u8], stride: usize, x: f32, y: f32) -> f32 {
    if frame.is_empty() || stride == 0 {
        return 0.0;
    }
    let rows = frame.len() / stride;

    let x0 = (x.floor() as i64).clamp(0, stride as i64 - 1) as usize;
    let y0 = (y.floor() as i64).clamp(0, rows as i64 - 1) as usize;
    let x1 = (x0 + 1).min(stride - 1);
    let y1 = (y0 + 1).min(rows - 1);
    let fx = (x - x.floor()).clamp(0.0, 1.0);
    let fy = (y - y.floor()).clamp(0.0, 1.0);

    let tl = frame[y0 * stride + x0] as f32;
    let tr = frame[y0 * stride + x1] as f32;
    let bl = frame[y1 * stride + x0] as f32;
    let br = frame[y1 * stride + x1] as f32;

    tl * (1.0 - fx) * (1.0 - fy) + tr * fx * (1.0 - fy) + bl * (1.0 - fx) * fy + br * fx * fy
}

/// Pull the two eye contours out of the raw landmark vector.
///
/// Coordinates are normalized to the crop; anything outside a small
/// tolerance band means the model did not see a face-shaped crop and
/// the result is treated as ambiguous.
fn extract_eyes(coords: &[f32], crop: &CropBox) -> Option<EyeLandmarks> {
    let eye = |start: usize| -> Option<EyePoints> {
        let mut points = [(0.0f32, 0.0f32); 6];
        for (i, point) in points.iter_mut().enumerate() {
            let nx = coords[(start + i) * 2];
            let ny = coords[(start + i) * 2 + 1];
            if !plausible(nx) || !plausible(ny) {
                return None;
            }
            *point = (crop.x + nx * crop.width, crop.y + ny * crop.height);
        }
        Some(points)
    };

    let left = eye(LEFT_EYE_START)?;
    let right = eye(RIGHT_EYE_START)?;
    Some(EyeLandmarks { left, right })
}

/// A normalized coordinate is plausible if it lies near the crop.
fn plausible(n: f32) -> bool {
    n.is_finite() && (-0.25..=1.25).contains(&n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_coords(fill: (f32, f32)) -> Vec<f32> {
        let mut coords = Vec::with_capacity(LANDMARK_POINTS * 2);
        for _ in 0..LANDMARK_POINTS {
            coords.push(fill.0);
            coords.push(fill.1);
        }
        coords
    }

    #[test]
    fn crop_adds_margin() {
        let region = FaceRegion {
            x: 100.0,
            y: 100.0,
            width: 100.0,
            height: 100.0,
            confidence: 0.9,
        };
        let crop = crop_for(&region, 640, 480).unwrap();
        assert!((crop.x - 85.0).abs() < 1e-4);
        assert!((crop.y - 85.0).abs() < 1e-4);
        assert!((crop.width - 130.0).abs() < 1e-4);
        assert!((crop.height - 130.0).abs() < 1e-4);
    }

    #[test]
    fn crop_clamps_to_frame() {
        let region = FaceRegion {
            x: -20.0,
            y: -20.0,
            width: 700.0,
            height: 600.0,
            confidence: 0.9,
        };
        let crop = crop_for(&region, 640, 480).unwrap();
        assert_eq!(crop.x, 0.0);
        assert_eq!(crop.y, 0.0);
        assert_eq!(crop.width, 640.0);
        assert_eq!(crop.height, 480.0);
    }

    #[test]
    fn crop_rejects_degenerate_region() {
        let region = FaceRegion {
            x: 635.0,
            y: 475.0,
            width: 100.0,
            height: 100.0,
            confidence: 0.9,
        };
        assert!(crop_for(&region, 640, 480).is_none());
    }

    #[test]
    fn extract_eyes_maps_to_frame_coordinates() {
        let crop = CropBox {
            x: 100.0,
            y: 50.0,
            width: 200.0,
            height: 200.0,
        };
        let coords = full_coords((0.5, 0.25));
        let eyes = extract_eyes(&coords, &crop).unwrap();
        assert!((eyes.left[0].0 - 200.0).abs() < 1e-4);
        assert!((eyes.left[0].1 - 100.0).abs() < 1e-4);
        assert!((eyes.right[3].0 - 200.0).abs() < 1e-4);
    }

    #[test]
    fn extract_eyes_rejects_wild_output() {
        let crop = CropBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        };
        let mut coords = full_coords((0.5, 0.5));
        coords[LEFT_EYE_START * 2] = 7.3; // far outside the crop
        assert!(extract_eyes(&coords, &crop).is_none());
    }

    #[test]
    fn extract_eyes_rejects_nan() {
        let crop = CropBox {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        };
        let mut coords = full_coords((0.5, 0.5));
        coords[RIGHT_EYE_START * 2 + 1] = f32::NAN;
        assert!(extract_eyes(&coords, &crop).is_none());
    }

    #[test]
    fn bilinear_interpolates_midpoint() {
        // 2x1 frame: 0 and 100 → midpoint x=0.5 blends evenly
        let frame = [0u8, 100u8];
        let v = bilinear(&frame, 2, 0.5, 0.0);
        assert!((v - 50.0).abs() < 1e-4);
    }

    #[test]
    fn bilinear_clamps_at_edges() {
        let frame = [10u8, 20u8, 30u8, 40u8];
        assert_eq!(bilinear(&frame, 2, -5.0, -5.0), 10.0);
        assert_eq!(bilinear(&frame, 2, 10.0, 10.0), 40.0);
    }
}
