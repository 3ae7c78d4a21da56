//! Face landmarks: detection seam and the callback that carries them to
//! filters.
//!
//! Landmarks are a flat `[x0, y0, x1, y1, ...]` list in frame pixel
//! coordinates. A [`FaceDetector`] produces them on the queue thread right
//! after a camera upload; the registered [`LandmarkCallback`] is then invoked
//! synchronously on that same thread, before the frame is propagated.

use crate::graph::Frame;
use parking_lot::RwLock;
use std::sync::Arc;

/// Receives one landmark list per frame with a detected face.
pub type LandmarkCallback = Arc<dyn Fn(&[f32]) + Send + Sync>;

/// Points reported by a 106-point face model.
pub const BASE_POINT_COUNT: usize = 106;

/// Point pairs whose midpoints extend the 106-point set to 111 points.
pub const DERIVED_POINT_PAIRS: [(usize, usize); 5] =
    [(102, 98), (35, 65), (70, 40), (5, 80), (81, 27)];

/// Single-slot callback registration. Last write wins.
#[derive(Default)]
pub struct LandmarkSlot {
    callback: RwLock<Option<LandmarkCallback>>,
}

impl LandmarkSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, callback: LandmarkCallback) {
        *self.callback.write() = Some(callback);
    }

    pub fn clear(&self) {
        *self.callback.write() = None;
    }

    pub fn is_set(&self) -> bool {
        self.callback.read().is_some()
    }

    /// Invoke the callback, if any. The slot lock is released before the
    /// call so the callback may re-register.
    pub fn emit(&self, landmarks: &[f32]) -> bool {
        let callback = self.callback.read().clone();
        match callback {
            Some(cb) => {
                cb(landmarks);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for LandmarkSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LandmarkSlot")
            .field("set", &self.is_set())
            .finish()
    }
}

/// Locates a face in a frame.
pub trait FaceDetector: Send {
    /// Flat x,y landmark list of the first face, or empty when none is found.
    fn detect(&mut self, frame: &Frame) -> Vec<f32>;
}

/// Detector that reports the same landmarks for every frame.
#[derive(Debug, Clone, Default)]
pub struct StaticDetector {
    landmarks: Vec<f32>,
}

impl StaticDetector {
    pub fn new(landmarks: Vec<f32>) -> Self {
        Self { landmarks }
    }

    /// A detector that never finds a face.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A plausible 111-point face centered in a `width` x `height` frame.
    pub fn centered(width: u32, height: u32) -> Self {
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let radius = width.min(height) as f32 / 4.0;
        let mut landmarks = Vec::with_capacity(BASE_POINT_COUNT * 2);
        for i in 0..BASE_POINT_COUNT {
            let angle = i as f32 / BASE_POINT_COUNT as f32 * std::f32::consts::TAU;
            landmarks.push(cx + radius * angle.cos());
            landmarks.push(cy + radius * angle.sin());
        }
        extend_with_derived_points(&mut landmarks);
        Self { landmarks }
    }
}

impl FaceDetector for StaticDetector {
    fn detect(&mut self, _frame: &Frame) -> Vec<f32> {
        self.landmarks.clone()
    }
}

/// Append the five midpoints used by the reshape and lipstick filters.
///
/// Does nothing unless the list holds at least the 106 base points.
pub fn extend_with_derived_points(landmarks: &mut Vec<f32>) {
    if landmarks.len() < BASE_POINT_COUNT * 2 {
        return;
    }
    for (a, b) in DERIVED_POINT_PAIRS {
        let x = (landmarks[a * 2] + landmarks[b * 2]) / 2.0;
        let y = (landmarks[a * 2 + 1] + landmarks[b * 2 + 1]) / 2.0;
        landmarks.push(x);
        landmarks.push(y);
    }
}
