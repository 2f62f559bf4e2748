//! Fast face presence detector via ONNX Runtime.
//!
//! A low-resolution (128×128) single-stride anchor detector tuned for
//! the kiosk per-cycle screening gate. It answers one question,
//! "is a face plausibly in front of the terminal?", cheaply enough to
//! run on every cycle before any network I/O is spent.

use crate::types::FaceRegion;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const SCREEN_INPUT_SIZE: usize = 128;
const SCREEN_MEAN: f32 = 127.5;
const SCREEN_STD: f32 = 128.0;
const SCREEN_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCREEN_NMS_THRESHOLD: f32 = 0.4;
const SCREEN_STRIDE: usize = 8;
const SCREEN_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for mapping detections back out of the letterboxed input.
struct FitInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Screening face detector.
///
/// Expects a model with two outputs: anchor scores `[1, N]` and box
/// offsets `[1, N, 4]` as distances to the four sides in stride units.
pub struct FaceDetector {
    session: Session,
    input_size: usize,
}

impl FaceDetector {
    /// Load the screening ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded screening detector"
        );

        if num_outputs < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "screening model requires 2 outputs (scores, boxes), got {num_outputs}"
            )));
        }

        Ok(Self {
            session,
            input_size: SCREEN_INPUT_SIZE,
        })
    }

    /// Detect faces in a grayscale frame, best first.
    ///
    /// Presence for the screening gate is simply a non-empty result.
    pub fn detect(
        &mut self,
        frame: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceRegion>, DetectorError> {
        let (input, fit) = self.preprocess(frame, width as usize, height as usize);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("scores: {e}")))?;
        let (_, boxes) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("boxes: {e}")))?;

        let candidates = decode_grid(scores, boxes, self.input_size, &fit);
        let mut regions = suppress_overlaps(candidates, SCREEN_NMS_THRESHOLD);
        regions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(regions)
    }

    /// Letterbox the frame into the square model input as NCHW floats.
    ///
    /// Nearest-neighbour sampling is sufficient at screening resolution;
    /// padding uses the mean so it normalizes to zero.
    fn preprocess(&self, frame: &[u8], width: usize, height: usize) -> (Array4<f32>, FitInfo) {
        let side = self.input_size;
        let scale = (side as f32 / width as f32).min(side as f32 / height as f32);
        let fit_w = (width as f32 * scale).round() as usize;
        let fit_h = (height as f32 * scale).round() as usize;
        let pad_x = (side - fit_w) as f32 / 2.0;
        let pad_y = (side - fit_h) as f32 / 2.0;

        let x0 = pad_x.floor() as usize;
        let y0 = pad_y.floor() as usize;

        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
        for y in 0..side {
            for x in 0..side {
                let inside = x >= x0 && x < x0 + fit_w && y >= y0 && y < y0 + fit_h;
                let pixel = if inside {
                    let sx = (((x - x0) as f32 + 0.5) / scale) as usize;
                    let sy = (((y - y0) as f32 + 0.5) / scale) as usize;
                    let sx = sx.min(width - 1);
                    let sy = sy.min(height - 1);
                    frame[sy * width + sx] as f32
                } else {
                    SCREEN_MEAN
                };

                let normalized = (pixel - SCREEN_MEAN) / SCREEN_STD;
                // Grayscale replicated across the three input channels.
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }

        (tensor, FitInfo { scale, pad_x, pad_y })
    }
}

/// Decode the single-stride anchor grid into frame-space regions.
fn decode_grid(scores: &[f32], boxes: &[f32], input_size: usize, fit: &FitInfo) -> Vec<FaceRegion> {
    let grid = input_size / SCREEN_STRIDE;
    let num_anchors = grid * grid * SCREEN_ANCHORS_PER_CELL;

    let mut regions = Vec::new();

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= SCREEN_CONFIDENCE_THRESHOLD {
            continue;
        }

        let cell = idx / SCREEN_ANCHORS_PER_CELL;
        let anchor_x = (cell % grid) as f32 * SCREEN_STRIDE as f32;
        let anchor_y = (cell / grid) as f32 * SCREEN_STRIDE as f32;

        // Offsets are distances to the four sides in stride units.
        let off = idx * 4;
        if off + 3 >= boxes.len() {
            continue;
        }
        let left = anchor_x - boxes[off] * SCREEN_STRIDE as f32;
        let top = anchor_y - boxes[off + 1] * SCREEN_STRIDE as f32;
        let right = anchor_x + boxes[off + 2] * SCREEN_STRIDE as f32;
        let bottom = anchor_y + boxes[off + 3] * SCREEN_STRIDE as f32;

        // Back out of the letterbox into original frame coordinates.
        let x1 = (left - fit.pad_x) / fit.scale;
        let y1 = (top - fit.pad_y) / fit.scale;
        let x2 = (right - fit.pad_x) / fit.scale;
        let y2 = (bottom - fit.pad_y) / fit.scale;

        regions.push(FaceRegion {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
        });
    }

    regions
}

/// Non-maximum suppression: drop regions overlapping a better one.
fn suppress_overlaps(mut regions: Vec<FaceRegion>, iou_threshold: f32) -> Vec<FaceRegion> {
    regions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceRegion> = Vec::new();
    for region in regions {
        if keep.iter().all(|k| overlap_ratio(k, &region) <= iou_threshold) {
            keep.push(region);
        }
    }
    keep
}

/// Intersection-over-union of two regions.
fn overlap_ratio(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f32, y: f32, w: f32, h: f32, conf: f32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: w,
            height: h,
            confidence: conf,
        }
    }

    #[test]
    fn overlap_identical_is_one() {
        let a = region(0.0, 0.0, 100.0, 100.0, 1.0);
        assert!((overlap_ratio(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn overlap_disjoint_is_zero() {
        let a = region(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = region(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!(overlap_ratio(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn overlap_half_shifted() {
        let a = region(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = region(5.0, 0.0, 10.0, 10.0, 1.0);
        // Overlap 5x10 = 50, union 150
        assert!((overlap_ratio(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn nms_keeps_best_of_overlapping_pair() {
        let candidates = vec![
            region(0.0, 0.0, 100.0, 100.0, 0.9),
            region(5.0, 5.0, 100.0, 100.0, 0.8),
            region(200.0, 200.0, 50.0, 50.0, 0.7),
        ];
        let kept = suppress_overlaps(candidates, 0.4);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn nms_empty_input() {
        assert!(suppress_overlaps(vec![], 0.4).is_empty());
    }

    #[test]
    fn decode_ignores_scores_at_threshold() {
        let grid = SCREEN_INPUT_SIZE / SCREEN_STRIDE;
        let n = grid * grid * SCREEN_ANCHORS_PER_CELL;
        let scores = vec![SCREEN_CONFIDENCE_THRESHOLD; n]; // not strictly above
        let boxes = vec![1.0; n * 4];
        let fit = FitInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        assert!(decode_grid(&scores, &boxes, SCREEN_INPUT_SIZE, &fit).is_empty());
    }

    #[test]
    fn decode_maps_out_of_letterbox() {
        let grid = SCREEN_INPUT_SIZE / SCREEN_STRIDE;
        let n = grid * grid * SCREEN_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; n];
        let mut boxes = vec![0.0f32; n * 4];

        // One confident anchor at cell (4, 4), one stride of extent each way.
        let cell = 4 * grid + 4;
        let idx = cell * SCREEN_ANCHORS_PER_CELL;
        scores[idx] = 0.9;
        boxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        // Letterbox: half scale, no padding.
        let fit = FitInfo {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let regions = decode_grid(&scores, &boxes, SCREEN_INPUT_SIZE, &fit);
        assert_eq!(regions.len(), 1);

        let r = &regions[0];
        // Anchor at 32,32 with ±8 extent → 24..40 in input, doubled in frame.
        assert!((r.x - 48.0).abs() < 1e-4);
        assert!((r.y - 48.0).abs() < 1e-4);
        assert!((r.width - 32.0).abs() < 1e-4);
        assert!((r.height - 32.0).abs() < 1e-4);
    }
}
