//! Callback recorders

use parking_lot::Mutex;
use std::sync::Arc;

/// One raw output delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub bytes: usize,
    pub width: u32,
    pub height: u32,
    pub timestamp: i64,
    pub thread: Option<String>,
}

/// Collects raw output deliveries from any thread
#[derive(Clone, Default)]
pub struct DeliveryRecorder {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
}

impl DeliveryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback suitable for `set_i420_callback` / `set_pixels_callback`
    pub fn callback(&self) -> impl Fn(&[u8], u32, u32, i64) + Send + Sync + 'static {
        let deliveries = self.deliveries.clone();
        move |bytes: &[u8], width: u32, height: u32, timestamp: i64| {
            deliveries.lock().push(Delivery {
                bytes: bytes.len(),
                width,
                height,
                timestamp,
                thread: std::thread::current().name().map(str::to_owned),
            });
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.deliveries.lock().len()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.deliveries.lock().iter().map(|d| d.timestamp).collect()
    }
}

/// Collects landmark callbacks
#[derive(Clone, Default)]
pub struct LandmarkRecorder {
    calls: Arc<Mutex<Vec<Vec<f32>>>>,
}

impl LandmarkRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callback(&self) -> impl Fn(&[f32]) + Send + Sync + 'static {
        let calls = self.calls.clone();
        move |landmarks: &[f32]| calls.lock().push(landmarks.to_vec())
    }

    pub fn calls(&self) -> Vec<Vec<f32>> {
        self.calls.lock().clone()
    }
}
