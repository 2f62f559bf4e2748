/// Axis-aligned region for a detected face.
#[derive(Debug, Clone)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceRegion {
    /// Top-left corner, the reference point for head-motion tracking.
    pub fn origin(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

/// Six ordered contour points for one eye, in frame coordinates.
///
/// Ordering follows the 68-point landmark convention: index 0 is the
/// outer corner, 3 the inner corner, 1/2 the upper lid, 4/5 the lower
/// lid. Only the open/closed ratio is ever computed from these; they
/// are never persisted.
pub type EyePoints = [(f32, f32); 6];

/// Eye contours for a single detected face.
#[derive(Debug, Clone)]
pub struct EyeLandmarks {
    pub left: EyePoints,
    pub right: EyePoints,
}
