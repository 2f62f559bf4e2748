//! Blink-then-hold liveness policy.
//!
//! A static photograph never closes its eyes. The gate demands one
//! observed blink (both eyes closed), then both eyes open again after a
//! minimum hold, before it calls the subject live. The recorded blink
//! expires after a TTL so one blink cannot authorize unrelated cycles
//! indefinitely.

use crate::types::{EyePoints, FaceRegion};
use std::time::{Duration, Instant};

/// Eye is open when eyelid gap over eye width exceeds this ratio.
pub const EYE_OPEN_RATIO: f32 = 0.25;

/// Default minimum time between the blink and the open-eyed frame.
pub const DEFAULT_BLINK_HOLD: Duration = Duration::from_millis(2000);

/// Default lifetime of a recorded blink.
pub const DEFAULT_BLINK_TTL: Duration = Duration::from_millis(30_000);

/// Face-box displacement (Manhattan, pixels) that counts as head motion.
const HEAD_MOTION_THRESHOLD: f32 = 10.0;

/// Vertical eyelid distance over horizontal eye width.
///
/// Uses the upper-lid point (1) against the lower-lid point (5) and the
/// two corners (0, 3) of the six-point contour.
pub fn eye_open_ratio(eye: &EyePoints) -> f32 {
    let vertical = (eye[1].1 - eye[5].1).abs();
    let horizontal = (eye[0].0 - eye[3].0).abs();
    if horizontal <= f32::EPSILON {
        return 0.0;
    }
    vertical / horizontal
}

/// True if the eye's openness ratio clears the fixed threshold.
pub fn is_eye_open(eye: &EyePoints) -> bool {
    eye_open_ratio(eye) > EYE_OPEN_RATIO
}

/// Blink state for one kiosk session.
///
/// The recorded blink timestamp is only ever replaced by a newer
/// blink observation; a passing open-eyed frame does not clear it.
pub struct BlinkGate {
    last_blink: Option<Instant>,
    hold: Duration,
    ttl: Duration,
}

impl BlinkGate {
    pub fn new(hold: Duration, ttl: Duration) -> Self {
        Self {
            last_blink: None,
            hold,
            ttl,
        }
    }

    /// Feed one observation; returns the live verdict for this sample.
    ///
    /// - both closed: record `now` as the blink, not live;
    /// - both open, a prior unexpired blink exists, and at least the
    ///   hold has elapsed since it: live;
    /// - anything else (one eye open, too soon, never blinked, blink
    ///   expired): not live.
    pub fn observe(&mut self, left_open: bool, right_open: bool, now: Instant) -> bool {
        if !left_open && !right_open {
            self.last_blink = Some(now);
            tracing::debug!("blink recorded");
            return false;
        }

        if left_open && right_open {
            if let Some(blink) = self.last_blink {
                let elapsed = now.saturating_duration_since(blink);
                return elapsed >= self.hold && elapsed <= self.ttl;
            }
        }

        false
    }

    /// Time of the most recent recorded blink, if any.
    pub fn last_blink_at(&self) -> Option<Instant> {
        self.last_blink
    }
}

impl Default for BlinkGate {
    fn default() -> Self {
        Self::new(DEFAULT_BLINK_HOLD, DEFAULT_BLINK_TTL)
    }
}

/// Tracks face-box displacement between consecutive observations.
///
/// An optional extra anti-spoof signal; the first observation only
/// seeds the tracker and reports no motion.
#[derive(Default)]
pub struct HeadMotion {
    prev: Option<(f32, f32)>,
}

impl HeadMotion {
    /// Record the region and report whether the head moved since the
    /// previous observation.
    pub fn moved(&mut self, region: &FaceRegion) -> bool {
        let origin = region.origin();
        let moved = match self.prev {
            Some((px, py)) => (origin.0 - px).abs() + (origin.1 - py).abs() > HEAD_MOTION_THRESHOLD,
            None => false,
        };
        self.prev = Some(origin);
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Eye contour with the given lid gap and a fixed 40 px width.
    fn eye_with_gap(gap: f32) -> EyePoints {
        [
            (100.0, 50.0),        // outer corner
            (110.0, 50.0 - gap),  // upper lid
            (120.0, 50.0 - gap),  // upper lid
            (140.0, 50.0),        // inner corner
            (120.0, 50.0),        // lower lid
            (110.0, 50.0),        // lower lid
        ]
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn ratio_above_threshold_is_open() {
        // gap 12 over width 40 → 0.30
        let eye = eye_with_gap(12.0);
        assert!((eye_open_ratio(&eye) - 0.30).abs() < 1e-4);
        assert!(is_eye_open(&eye));
    }

    #[test]
    fn ratio_at_threshold_is_closed() {
        // gap 10 over width 40 → exactly 0.25, not strictly above
        let eye = eye_with_gap(10.0);
        assert!(!is_eye_open(&eye));
    }

    #[test]
    fn ratio_zero_width_is_closed() {
        let eye = [(50.0, 50.0); 6];
        assert_eq!(eye_open_ratio(&eye), 0.0);
    }

    #[test]
    fn closed_eyes_record_blink_and_fail() {
        let mut gate = BlinkGate::default();
        let t0 = Instant::now();
        assert!(!gate.observe(false, false, t0));
        assert_eq!(gate.last_blink_at(), Some(t0));
    }

    #[test]
    fn open_without_prior_blink_fails() {
        let mut gate = BlinkGate::default();
        assert!(!gate.observe(true, true, Instant::now()));
    }

    #[test]
    fn one_eye_open_never_passes_and_keeps_blink() {
        let mut gate = BlinkGate::default();
        let t0 = Instant::now();
        gate.observe(false, false, t0);
        assert!(!gate.observe(true, false, t0 + ms(3000)));
        assert_eq!(gate.last_blink_at(), Some(t0));
    }

    #[test]
    fn blink_then_hold_passes_at_exact_boundary() {
        let mut gate = BlinkGate::default();
        let t0 = Instant::now();
        gate.observe(false, false, t0);
        assert!(gate.observe(true, true, t0 + ms(2000)));
    }

    #[test]
    fn blink_then_open_too_soon_fails() {
        let mut gate = BlinkGate::default();
        let t0 = Instant::now();
        gate.observe(false, false, t0);
        // 1999 ms is strictly inside the hold window
        assert!(!gate.observe(true, true, t0 + ms(1999)));
    }

    #[test]
    fn expired_blink_fails() {
        let mut gate = BlinkGate::new(ms(2000), ms(30_000));
        let t0 = Instant::now();
        gate.observe(false, false, t0);
        assert!(gate.observe(true, true, t0 + ms(30_000)));
        assert!(!gate.observe(true, true, t0 + ms(30_001)));
    }

    #[test]
    fn new_blink_restarts_the_hold() {
        let mut gate = BlinkGate::default();
        let t0 = Instant::now();
        gate.observe(false, false, t0);
        gate.observe(false, false, t0 + ms(1500)); // second blink
        assert!(!gate.observe(true, true, t0 + ms(3000))); // 1500 ms since latest blink
        assert!(gate.observe(true, true, t0 + ms(3500)));
    }

    #[test]
    fn passing_does_not_clear_blink() {
        // A live verdict leaves the blink in place; only TTL bounds reuse.
        let mut gate = BlinkGate::default();
        let t0 = Instant::now();
        gate.observe(false, false, t0);
        assert!(gate.observe(true, true, t0 + ms(2000)));
        assert!(gate.observe(true, true, t0 + ms(4000)));
    }

    #[test]
    fn head_motion_first_observation_is_still() {
        let mut motion = HeadMotion::default();
        let region = FaceRegion {
            x: 100.0,
            y: 100.0,
            width: 80.0,
            height: 80.0,
            confidence: 0.9,
        };
        assert!(!motion.moved(&region));
    }

    #[test]
    fn head_motion_thresholded_on_manhattan_distance() {
        let mut motion = HeadMotion::default();
        let mut region = FaceRegion {
            x: 100.0,
            y: 100.0,
            width: 80.0,
            height: 80.0,
            confidence: 0.9,
        };
        motion.moved(&region);

        region.x = 104.0;
        region.y = 105.0; // 9 px total, under threshold
        assert!(!motion.moved(&region));

        region.x = 112.0; // 8 + 0 = 8 from previous... still under
        region.y = 105.0;
        assert!(!motion.moved(&region));

        region.x = 130.0; // 18 px, over threshold
        assert!(motion.moved(&region));
    }
}
