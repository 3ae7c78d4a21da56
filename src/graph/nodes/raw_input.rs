//! Frame sources: raw pixel input and camera.
//!
//! Both sources share the same upload path. `upload_bytes` validates and
//! stamps the buffer on the caller's thread, then queues two tasks: the
//! native upload and a propagation pass. Because both go through the same
//! FIFO, every upload produces exactly one pass, in upload order.

use crate::context::GpuContext;
use crate::error::Result;
use crate::graph::{Frame, NodeCore, Outputs, ProceedSignal, Rotation, Source};
use crate::landmark::{FaceDetector, LandmarkCallback, LandmarkSlot};
use crate::native::NodeKind;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct InputSettings {
    rotation: Rotation,
}

/// Upload and propagation shared by both source kinds.
struct InputSource {
    core: Arc<NodeCore<InputSettings>>,
    outputs: Arc<Outputs>,
}

impl InputSource {
    fn new(ctx: &Arc<GpuContext>, kind: NodeKind) -> Self {
        let core = NodeCore::new(ctx, kind, InputSettings::default());
        core.create(|settings, bound| {
            if settings.rotation != Rotation::NoRotation {
                bound.backend.set_rotation(bound.handle, settings.rotation);
            }
        });
        Self {
            core,
            outputs: Arc::new(Outputs::new()),
        }
    }

    fn upload<F>(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        stride: usize,
        on_uploaded: F,
    ) -> Result<()>
    where
        F: FnOnce(&Frame) + Send + 'static,
    {
        let timestamp = self.core.ctx().elapsed_ms();
        let frame = Frame::from_rgba(pixels, width, height, stride, timestamp)?;

        let core = self.core.clone();
        self.core.ctx().queue().enqueue(move || {
            let Some(handle) = core.bound_handle() else {
                tracing::warn!("{} not bound, dropping upload", core.id());
                return;
            };
            tracing::debug!(
                "{} upload {}x{} @{}ms",
                core.id(),
                frame.width,
                frame.height,
                frame.timestamp
            );
            match core.ctx().backend().upload(handle, frame.clone()) {
                Ok(()) => on_uploaded(&frame),
                Err(e) => tracing::error!("{} upload failed: {}", core.id(), e),
            }
        });

        self.proceed(ProceedSignal::FRESH);
        Ok(())
    }

    fn proceed(&self, signal: ProceedSignal) {
        let core = self.core.clone();
        let outputs = self.outputs.clone();
        self.core.ctx().queue().enqueue(move || {
            let Some(handle) = core.bound_handle() else {
                return;
            };
            let frame = core.ctx().backend().take_output(handle);
            if frame.is_none() {
                tracing::debug!("{} has no output for this pass", core.id());
            }
            outputs.propagate(frame.as_ref(), signal);
        });
    }

    fn set_rotation(&self, rotation: Rotation) {
        let applied = self.core.update(|settings, bound| {
            settings.rotation = rotation;
            if let Some(b) = bound {
                b.backend.set_rotation(b.handle, rotation);
            }
        });
        if applied.is_none() {
            tracing::warn!("set_rotation on destroyed {}", self.core.id());
        }
    }

    fn rotation(&self) -> Rotation {
        self.core.read(|s| s.rotation)
    }
}

/// Source fed with caller-owned RGBA buffers.
pub struct RawInputSource {
    input: InputSource,
}

impl RawInputSource {
    pub fn new(ctx: &Arc<GpuContext>) -> Arc<Self> {
        Arc::new(Self {
            input: InputSource::new(ctx, NodeKind::RawInput),
        })
    }

    /// Copy one RGBA frame in and push it through the graph.
    ///
    /// `stride` is the row pitch in bytes. Invalid geometry is rejected
    /// before anything is queued.
    pub fn upload_bytes(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        stride: usize,
    ) -> Result<()> {
        self.input.upload(pixels, width, height, stride, |_| {})
    }

    /// Orientation applied by the native layer to later uploads.
    pub fn set_rotation(&self, rotation: Rotation) {
        self.input.set_rotation(rotation);
    }

    pub fn rotation(&self) -> Rotation {
        self.input.rotation()
    }
}

impl_node!(RawInputSource, input.core);

impl Source for RawInputSource {
    fn outputs(&self) -> &Outputs {
        &self.input.outputs
    }

    fn proceed(&self, signal: ProceedSignal) {
        self.input.proceed(signal);
    }
}

/// Camera-fed source with face landmark detection.
///
/// After each upload the installed [`FaceDetector`] runs on the queue thread.
/// When it finds a face the landmark callback is invoked on that thread,
/// before the frame's propagation pass.
pub struct CameraSource {
    input: InputSource,
    landmarks: Arc<LandmarkSlot>,
    detector: Arc<Mutex<Option<Box<dyn FaceDetector>>>>,
}

impl CameraSource {
    pub fn new(ctx: &Arc<GpuContext>) -> Arc<Self> {
        Arc::new(Self {
            input: InputSource::new(ctx, NodeKind::Camera),
            landmarks: Arc::new(LandmarkSlot::new()),
            detector: Arc::new(Mutex::new(None)),
        })
    }

    pub fn upload_bytes(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        stride: usize,
    ) -> Result<()> {
        let slot = self.landmarks.clone();
        let detector = self.detector.clone();
        self.input.upload(pixels, width, height, stride, move |frame| {
            let points = match detector.lock().as_mut() {
                Some(detector) => detector.detect(frame),
                None => return,
            };
            if points.is_empty() {
                return;
            }
            tracing::debug!("Face found at {}ms, {} points", frame.timestamp, points.len() / 2);
            slot.emit(&points);
        })
    }

    pub fn set_rotation(&self, rotation: Rotation) {
        self.input.set_rotation(rotation);
    }

    pub fn rotation(&self) -> Rotation {
        self.input.rotation()
    }

    /// Replace the landmark callback. Last registration wins.
    pub fn set_landmark_callback<F>(&self, callback: F)
    where
        F: Fn(&[f32]) + Send + Sync + 'static,
    {
        let callback: LandmarkCallback = Arc::new(callback);
        self.landmarks.set(callback);
    }

    pub fn clear_landmark_callback(&self) {
        self.landmarks.clear();
    }

    /// Install the detector run after every upload.
    pub fn set_face_detector(&self, detector: impl FaceDetector + 'static) {
        *self.detector.lock() = Some(Box::new(detector));
    }
}

impl_node!(CameraSource, input.core);

impl Source for CameraSource {
    fn outputs(&self) -> &Outputs {
        &self.input.outputs
    }

    fn proceed(&self, signal: ProceedSignal) {
        self.input.proceed(signal);
    }
}
