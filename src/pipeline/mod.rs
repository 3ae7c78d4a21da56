//! The beauty-camera graph and its UI glue.
//!
//! # Topology
//!
//! ```text
//! [Camera] ──► [Lipstick] ──► [FaceReshape] ──► [BeautyFace] ──► [View]
//!    │             ▲               ▲                        └──► [RawOutput]
//!    └─landmarks───┴───────────────┘
//! ```
//!
//! The camera's landmark callback feeds both landmark-driven filters on the
//! queue thread before each frame's pass. Slider changes from the UI go
//! through [`BeautyPipeline::on_progress_changed`] and reach the filters
//! directly.

pub mod controls;

pub use controls::Control;

use crate::context::GpuContext;
use crate::error::{GraphError, Result, ResultExt};
use crate::graph::{
    CameraSource, Filter, Node, RawOutputTarget, Rotation, Source, ViewTarget,
};
use std::sync::{Arc, Weak};

/// Outcome of the host's camera permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPermission {
    Granted,
    Denied,
}

/// Camera → lipstick → reshape → beauty → {view, raw output}.
pub struct BeautyPipeline {
    camera: Arc<CameraSource>,
    lipstick: Arc<Filter>,
    reshape: Arc<Filter>,
    beauty: Arc<Filter>,
    view: Arc<ViewTarget>,
    raw_output: Arc<RawOutputTarget>,
}

impl std::fmt::Debug for BeautyPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeautyPipeline").finish_non_exhaustive()
    }
}

impl BeautyPipeline {
    /// Build and wire the graph.
    ///
    /// With [`CameraPermission::Denied`] nothing is constructed and no native
    /// resource is allocated.
    pub fn start(ctx: &Arc<GpuContext>, permission: CameraPermission) -> Result<Self> {
        if permission == CameraPermission::Denied {
            tracing::warn!("Camera permission denied, pipeline not started");
            return Err(GraphError::PermissionDenied);
        }

        let defaults = &ctx.config().defaults;
        let rotation = Rotation::try_from(defaults.rotation).context("defaults.rotation")?;

        let pipeline = Self {
            camera: CameraSource::new(ctx),
            lipstick: Filter::lipstick(ctx),
            reshape: Filter::face_reshape(ctx),
            beauty: Filter::beauty_face(ctx),
            view: ViewTarget::new(ctx),
            raw_output: RawOutputTarget::new(ctx),
        };

        if let Err(e) = pipeline.wire(rotation, defaults.smooth, defaults.whiteness) {
            tracing::error!("Failed to wire beauty pipeline: {}", e);
            pipeline.destroy();
            return Err(e);
        }

        tracing::info!("Beauty pipeline started");
        Ok(pipeline)
    }

    fn wire(&self, rotation: Rotation, smooth: f32, whiteness: f32) -> Result<()> {
        self.camera.add_target(self.lipstick.clone())?;
        self.lipstick.add_target(self.reshape.clone())?;
        self.reshape.add_target(self.beauty.clone())?;
        self.beauty.add_target(self.view.clone())?;
        self.beauty.add_target(self.raw_output.clone())?;

        self.camera.set_rotation(rotation);

        let reshape: Weak<Filter> = Arc::downgrade(&self.reshape);
        let lipstick: Weak<Filter> = Arc::downgrade(&self.lipstick);
        self.camera.set_landmark_callback(move |landmarks| {
            if let Some(reshape) = reshape.upgrade() {
                reshape.set_face_landmarks(landmarks);
            }
            if let Some(lipstick) = lipstick.upgrade() {
                lipstick.set_face_landmarks(landmarks);
            }
        });

        self.beauty.set_smooth_level(smooth)?;
        self.beauty.set_white_level(whiteness)?;
        Ok(())
    }

    /// Route a slider position to the filter that owns the control.
    pub fn on_progress_changed(&self, control: Control, progress: i32) -> Result<()> {
        let level = control.level(progress);
        tracing::debug!("{} -> {:.3}", control, level);
        let filter = match control {
            Control::Smooth | Control::Whiteness => &self.beauty,
            Control::FaceThin | Control::BigEye => &self.reshape,
            Control::LipstickBlend => &self.lipstick,
        };
        filter.set_parameter(control.param(), level)
    }

    pub fn camera(&self) -> &Arc<CameraSource> {
        &self.camera
    }

    pub fn lipstick(&self) -> &Arc<Filter> {
        &self.lipstick
    }

    pub fn reshape(&self) -> &Arc<Filter> {
        &self.reshape
    }

    pub fn beauty(&self) -> &Arc<Filter> {
        &self.beauty
    }

    pub fn view(&self) -> &Arc<ViewTarget> {
        &self.view
    }

    pub fn raw_output(&self) -> &Arc<RawOutputTarget> {
        &self.raw_output
    }

    /// Every node, upstream first.
    pub fn nodes(&self) -> [&dyn Node; 6] {
        [
            &*self.camera,
            &*self.lipstick,
            &*self.reshape,
            &*self.beauty,
            &*self.view,
            &*self.raw_output,
        ]
    }

    /// Release every node on the queue. Idempotent; also runs on drop.
    pub fn destroy(&self) {
        self.camera.clear_landmark_callback();
        for node in self.nodes() {
            node.destroy(true);
        }
    }
}

impl Drop for BeautyPipeline {
    fn drop(&mut self) {
        self.destroy();
    }
}
