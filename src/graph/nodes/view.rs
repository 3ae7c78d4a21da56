//! Display surface target.

use crate::context::GpuContext;
use crate::graph::{Frame, NodeCore, ProceedSignal, Target};
use crate::native::{FillMode, NodeKind, ViewSettings};
use std::sync::Arc;

/// Presents frames on a display surface owned by the host.
///
/// Fill mode, mirroring and surface size are held until the node is ready
/// and pushed to the native layer in one `configure_view` call per change.
pub struct ViewTarget {
    core: Arc<NodeCore<ViewSettings>>,
}

impl ViewTarget {
    /// Build a view using the fill mode and mirroring from the context config.
    pub fn new(ctx: &Arc<GpuContext>) -> Arc<Self> {
        let view = &ctx.config().view;
        let settings = ViewSettings {
            fill_mode: view.fill_mode,
            mirror: view.mirror,
            ..ViewSettings::default()
        };

        let core = NodeCore::new(ctx, NodeKind::View, settings);
        core.create(|settings, bound| bound.backend.configure_view(bound.handle, *settings));
        Arc::new(Self { core })
    }

    pub fn set_fill_mode(&self, fill_mode: FillMode) {
        self.configure(|s| s.fill_mode = fill_mode);
    }

    pub fn set_mirror(&self, mirror: bool) {
        self.configure(|s| s.mirror = mirror);
    }

    /// The host surface was resized.
    pub fn on_size_changed(&self, width: u32, height: u32) {
        tracing::debug!("{} surface {}x{}", self.core.id(), width, height);
        self.configure(|s| {
            s.view_width = width;
            s.view_height = height;
        });
    }

    pub fn settings(&self) -> ViewSettings {
        self.core.read(|s| *s)
    }

    /// Quad for a frame of the given size under the current settings.
    pub fn display_rect_for(&self, frame_width: u32, frame_height: u32) -> [f32; 8] {
        let s = self.settings();
        let mut quad = display_rect(
            frame_width,
            frame_height,
            s.view_width,
            s.view_height,
            s.fill_mode,
        );
        if s.mirror {
            for x in quad.iter_mut().step_by(2) {
                *x = -*x;
            }
        }
        quad
    }

    fn configure(&self, change: impl FnOnce(&mut ViewSettings)) {
        let applied = self.core.update(|settings, bound| {
            change(settings);
            if let Some(b) = bound {
                b.backend.configure_view(b.handle, *settings);
            }
        });
        if applied.is_none() {
            tracing::warn!("view settings on destroyed {} ignored", self.core.id());
        }
    }
}

impl_node!(ViewTarget, core);

impl Target for ViewTarget {
    fn receive(&self, input: Option<&Frame>, signal: ProceedSignal) {
        let Some(frame) = input.filter(|_| signal.has_output) else {
            return;
        };
        let Some(handle) = self.core.bound_handle() else {
            return;
        };
        if let Err(e) = self.core.ctx().backend().render(handle, frame) {
            tracing::error!("{} present failed: {}", self.core.id(), e);
        }
    }
}

/// Normalized device quad for a frame inside a view.
///
/// Returns the four corners as `[x0, y0, x1, y1, x2, y2, x3, y3]` in the
/// order bottom-left, bottom-right, top-left, top-right. A zero-sized frame
/// or view yields the full-screen quad.
pub fn display_rect(
    frame_width: u32,
    frame_height: u32,
    view_width: u32,
    view_height: u32,
    fill_mode: FillMode,
) -> [f32; 8] {
    let (mut sx, mut sy) = (1.0f32, 1.0f32);

    if frame_width > 0 && frame_height > 0 && view_width > 0 && view_height > 0 {
        let frame_aspect = frame_width as f32 / frame_height as f32;
        let view_aspect = view_width as f32 / view_height as f32;
        match fill_mode {
            FillMode::Stretch => {}
            FillMode::PreserveAspectRatio => {
                if frame_aspect > view_aspect {
                    sy = view_aspect / frame_aspect;
                } else {
                    sx = frame_aspect / view_aspect;
                }
            }
            FillMode::PreserveAspectRatioAndFill => {
                if frame_aspect > view_aspect {
                    sx = frame_aspect / view_aspect;
                } else {
                    sy = view_aspect / frame_aspect;
                }
            }
        }
    }

    [-sx, -sy, sx, -sy, -sx, sy, sx, sy]
}
