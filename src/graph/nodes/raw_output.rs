//! Terminal target that hands processed frames back as raw bytes.

use crate::context::GpuContext;
use crate::graph::{Frame, NodeCore, ProceedSignal, Target};
use crate::native::{NodeKind, RawFormat, RawOutputCallback};
use std::sync::Arc;

#[derive(Default)]
struct RawOutputSettings {
    i420: Option<RawOutputCallback>,
    pixels: Option<RawOutputCallback>,
}

impl RawOutputSettings {
    fn slot(&mut self, format: RawFormat) -> &mut Option<RawOutputCallback> {
        match format {
            RawFormat::I420 => &mut self.i420,
            RawFormat::Pixels => &mut self.pixels,
        }
    }
}

/// Delivers every frame it receives to up to two callbacks: one wants I420,
/// the other packed RGBA.
///
/// Callbacks run on the queue thread with `(bytes, width, height,
/// timestamp_ms)`. A callback registered before the node is ready is bound
/// in the same step that creates the native resource.
pub struct RawOutputTarget {
    core: Arc<NodeCore<RawOutputSettings>>,
}

impl RawOutputTarget {
    pub fn new(ctx: &Arc<GpuContext>) -> Arc<Self> {
        let core = NodeCore::new(ctx, NodeKind::RawOutput, RawOutputSettings::default());
        core.create(|settings, bound| {
            for format in [RawFormat::I420, RawFormat::Pixels] {
                if let Some(callback) = settings.slot(format).clone() {
                    bound
                        .backend
                        .set_raw_output_callback(bound.handle, format, Some(callback));
                }
            }
        });
        Arc::new(Self { core })
    }

    pub fn set_i420_callback<F>(&self, callback: F)
    where
        F: Fn(&[u8], u32, u32, i64) + Send + Sync + 'static,
    {
        self.set_callback(RawFormat::I420, Some(Arc::new(callback)));
    }

    pub fn set_pixels_callback<F>(&self, callback: F)
    where
        F: Fn(&[u8], u32, u32, i64) + Send + Sync + 'static,
    {
        self.set_callback(RawFormat::Pixels, Some(Arc::new(callback)));
    }

    /// Bind or clear one callback slot. Last write wins.
    pub fn set_callback(&self, format: RawFormat, callback: Option<RawOutputCallback>) {
        let applied = self.core.update(|settings, bound| {
            *settings.slot(format) = callback.clone();
            match bound {
                Some(b) => b.backend.set_raw_output_callback(b.handle, format, callback),
                None => tracing::debug!("{} {:?} callback held until ready", self.core.id(), format),
            }
        });
        if applied.is_none() {
            tracing::warn!("{:?} callback on destroyed {} ignored", format, self.core.id());
        }
    }

    pub fn has_callback(&self, format: RawFormat) -> bool {
        self.core.read(|s| match format {
            RawFormat::I420 => s.i420.is_some(),
            RawFormat::Pixels => s.pixels.is_some(),
        })
    }
}

impl_node!(RawOutputTarget, core);

impl Target for RawOutputTarget {
    fn receive(&self, input: Option<&Frame>, signal: ProceedSignal) {
        let Some(frame) = input.filter(|_| signal.has_output) else {
            return;
        };
        let Some(handle) = self.core.bound_handle() else {
            tracing::debug!("{} not bound, frame dropped", self.core.id());
            return;
        };
        if let Err(e) = self.core.ctx().backend().render(handle, frame) {
            tracing::error!("{} render failed: {}", self.core.id(), e);
        }
    }
}
