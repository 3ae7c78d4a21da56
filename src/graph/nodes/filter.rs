//! Filter nodes: both a target and a source.
//!
//! Parameter and landmark setters write straight to the native handle from
//! the calling thread. The native layer makes those writes atomic relative
//! to a pass running on the queue. Values written before the node is ready
//! are kept and replayed when the handle is created.

use crate::context::GpuContext;
use crate::error::{GraphError, Result};
use crate::graph::{Frame, NodeCore, Outputs, ProceedSignal, Source, Target};
use crate::native::{FilterKind, FilterParam, NodeKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct FilterSettings {
    params: HashMap<FilterParam, f32>,
    landmarks: Option<Vec<f32>>,
}

/// Last processed input timestamp and the output it produced.
struct CachedOutput {
    input_timestamp: i64,
    frame: Frame,
}

pub struct Filter {
    filter_kind: FilterKind,
    core: Arc<NodeCore<FilterSettings>>,
    outputs: Arc<Outputs>,
    cache: Arc<Mutex<Option<CachedOutput>>>,
}

impl Filter {
    pub fn new(ctx: &Arc<GpuContext>, kind: FilterKind) -> Arc<Self> {
        let core = NodeCore::new(ctx, NodeKind::Filter(kind), FilterSettings::default());
        core.create(|settings, bound| {
            for (param, value) in &settings.params {
                bound.backend.set_parameter(bound.handle, *param, *value);
            }
            if let Some(landmarks) = &settings.landmarks {
                bound.backend.set_face_landmarks(bound.handle, landmarks);
            }
        });

        Arc::new(Self {
            filter_kind: kind,
            core,
            outputs: Arc::new(Outputs::new()),
            cache: Arc::new(Mutex::new(None)),
        })
    }

    pub fn beauty_face(ctx: &Arc<GpuContext>) -> Arc<Self> {
        Self::new(ctx, FilterKind::BeautyFace)
    }

    pub fn face_reshape(ctx: &Arc<GpuContext>) -> Arc<Self> {
        Self::new(ctx, FilterKind::FaceReshape)
    }

    pub fn lipstick(ctx: &Arc<GpuContext>) -> Arc<Self> {
        Self::new(ctx, FilterKind::Lipstick)
    }

    pub fn filter_kind(&self) -> FilterKind {
        self.filter_kind
    }

    /// Set one knob. Fails if this filter has no such knob; silently ignored
    /// once the filter is destroyed.
    pub fn set_parameter(&self, param: FilterParam, value: f32) -> Result<()> {
        if !self.filter_kind.supports(param) {
            return Err(GraphError::UnsupportedParameter {
                node: self.core.id(),
                param,
            });
        }

        let applied = self.core.update(|settings, bound| {
            settings.params.insert(param, value);
            if let Some(b) = bound {
                b.backend.set_parameter(b.handle, param, value);
            }
        });
        if applied.is_none() {
            tracing::warn!("{:?} on destroyed {} ignored", param, self.core.id());
        }
        Ok(())
    }

    pub fn set_smooth_level(&self, level: f32) -> Result<()> {
        self.set_parameter(FilterParam::SmoothLevel, level)
    }

    pub fn set_white_level(&self, level: f32) -> Result<()> {
        self.set_parameter(FilterParam::WhiteLevel, level)
    }

    pub fn set_thin_level(&self, level: f32) -> Result<()> {
        self.set_parameter(FilterParam::ThinLevel, level)
    }

    pub fn set_bigeye_level(&self, level: f32) -> Result<()> {
        self.set_parameter(FilterParam::BigeyeLevel, level)
    }

    pub fn set_blend_level(&self, level: f32) -> Result<()> {
        self.set_parameter(FilterParam::BlendLevel, level)
    }

    /// Last value written for `param`, whether or not it reached the native
    /// layer yet.
    pub fn parameter(&self, param: FilterParam) -> Option<f32> {
        self.core.read(|s| s.params.get(&param).copied())
    }

    /// Replace the face landmarks used by reshape and lipstick filters.
    pub fn set_face_landmarks(&self, landmarks: &[f32]) {
        if !self.filter_kind.uses_landmarks() {
            tracing::debug!("{} ignores landmarks", self.filter_kind.name());
            return;
        }
        self.core.update(|settings, bound| {
            match &mut settings.landmarks {
                Some(stored) => {
                    stored.clear();
                    stored.extend_from_slice(landmarks);
                }
                None => settings.landmarks = Some(landmarks.to_vec()),
            }
            if let Some(b) = bound {
                b.backend.set_face_landmarks(b.handle, landmarks);
            }
        });
    }

    fn run(&self, input: &Frame, must_process: bool) -> Option<Frame> {
        if !must_process {
            if let Some(cached) = self.cache.lock().as_ref() {
                if cached.input_timestamp == input.timestamp {
                    return Some(cached.frame.clone());
                }
            }
        }

        let handle = self.core.bound_handle()?;
        match self.core.ctx().backend().process(handle, input) {
            Ok(frame) => {
                *self.cache.lock() = Some(CachedOutput {
                    input_timestamp: input.timestamp,
                    frame: frame.clone(),
                });
                Some(frame)
            }
            Err(e) => {
                tracing::error!("{} {} failed: {}", self.filter_kind.name(), self.core.id(), e);
                None
            }
        }
    }
}

impl_node!(Filter, core);

impl Target for Filter {
    fn receive(&self, input: Option<&Frame>, signal: ProceedSignal) {
        let output = match input {
            Some(frame) if signal.has_output => self.run(frame, signal.must_process),
            _ => None,
        };
        self.outputs.propagate(output.as_ref(), signal);
    }

    fn downstream(&self) -> Vec<Arc<dyn Target>> {
        self.outputs.snapshot()
    }
}

impl Source for Filter {
    fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Re-send the last output downstream.
    fn proceed(&self, signal: ProceedSignal) {
        let outputs = self.outputs.clone();
        let cache = self.cache.clone();
        self.core.ctx().queue().enqueue(move || {
            let frame = cache.lock().as_ref().map(|c| c.frame.clone());
            outputs.propagate(frame.as_ref(), signal);
        });
    }
}

impl std::fmt::Debug for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter")
            .field("kind", &self.filter_kind)
            .field("core", &self.core)
            .field("outputs", &self.outputs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::graph::{Node, NodeId};
    use crate::native::{MockNativeBackend, NativeCall, NativeHandle, SoftwareBackend};
    use std::time::Duration;

    fn context() -> (Arc<SoftwareBackend>, Arc<GpuContext>) {
        let (software, backend) = SoftwareBackend::shared();
        let ctx = GpuContext::new(GraphConfig::default(), backend).unwrap();
        (software, ctx)
    }

    fn frame(ts: i64) -> Frame {
        Frame::from_packed(vec![0; 16], 2, 2, ts).unwrap()
    }

    #[test]
    fn test_unsupported_parameter_rejected() {
        let (_, ctx) = context();
        let beauty = Filter::beauty_face(&ctx);
        let err = beauty.set_thin_level(0.3).unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnsupportedParameter {
                param: FilterParam::ThinLevel,
                ..
            }
        ));
    }

    #[test]
    fn test_pending_parameters_replayed_at_ready() {
        let (software, ctx) = context();
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        ctx.queue().enqueue(move || {
            let _ = gate_rx.recv();
        });

        let beauty = Filter::beauty_face(&ctx);
        beauty.set_smooth_level(0.2).unwrap();
        beauty.set_smooth_level(0.5).unwrap();
        beauty.set_white_level(0.4).unwrap();
        assert!(beauty.handle().is_null());
        gate_tx.send(()).unwrap();

        let handle = beauty.wait_ready(Duration::from_secs(1)).unwrap();
        assert_eq!(software.parameter(handle, FilterParam::SmoothLevel), Some(0.5));
        assert_eq!(software.parameter(handle, FilterParam::WhiteLevel), Some(0.4));
        let smooth_writes = software
            .calls()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    NativeCall::SetParameter {
                        param: FilterParam::SmoothLevel,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(smooth_writes, 1);
    }

    #[test]
    fn test_setters_bypass_queue_when_ready() {
        let mut mock = MockNativeBackend::new();
        mock.expect_create().returning(|_| Ok(NativeHandle(9)));
        mock.expect_set_parameter()
            .withf(|h, p, v| *h == NativeHandle(9) && *p == FilterParam::BigeyeLevel && *v == 0.5)
            .times(1)
            .returning(|_, _, _| {
                // Direct write: arrives on the caller's thread, not the queue.
                assert_ne!(
                    std::thread::current().name(),
                    Some("pixelgraph-gpu")
                );
            });
        mock.expect_destroy().return_const(());
        let ctx = GpuContext::new(GraphConfig::default(), Arc::new(mock)).unwrap();

        let reshape = Filter::face_reshape(&ctx);
        reshape.wait_ready(Duration::from_secs(1)).unwrap();
        reshape.set_bigeye_level(0.5).unwrap();
        reshape.destroy(true);
        ctx.flush().unwrap();
    }

    #[test]
    fn test_setters_after_destroy_are_noops() {
        let (software, ctx) = context();
        let lipstick = Filter::lipstick(&ctx);
        lipstick.wait_ready(Duration::from_secs(1)).unwrap();
        lipstick.destroy(true);
        ctx.flush().unwrap();
        software.clear_journal();

        lipstick.set_blend_level(0.9).unwrap();
        lipstick.set_face_landmarks(&[1.0, 2.0]);
        assert!(software.calls().is_empty());
    }

    #[test]
    fn test_landmarks_reach_native_layer() {
        let (software, ctx) = context();
        let reshape = Filter::face_reshape(&ctx);
        let handle = reshape.wait_ready(Duration::from_secs(1)).unwrap();
        reshape.set_face_landmarks(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(software.landmarks(handle), Some(vec![1.0, 2.0, 3.0, 4.0]));

        let beauty = Filter::beauty_face(&ctx);
        let beauty_handle = beauty.wait_ready(Duration::from_secs(1)).unwrap();
        beauty.set_face_landmarks(&[1.0, 2.0]);
        assert_eq!(software.landmarks(beauty_handle), Some(vec![]));
    }

    #[test]
    fn test_cached_output_reused_without_must_process() {
        let (software, ctx) = context();
        let beauty = Filter::beauty_face(&ctx);
        beauty.wait_ready(Duration::from_secs(1)).unwrap();

        let f = beauty.clone();
        ctx.queue()
            .run_sync(move || {
                f.receive(Some(&frame(5)), ProceedSignal::FRESH);
                f.receive(Some(&frame(5)), ProceedSignal::new(true, false));
                f.receive(Some(&frame(6)), ProceedSignal::new(true, false));
            })
            .unwrap();

        let processed = software
            .calls()
            .iter()
            .filter(|c| matches!(c, NativeCall::Process(_)))
            .count();
        assert_eq!(processed, 2);
    }

    #[test]
    fn test_filter_cannot_target_itself() {
        let (_, ctx) = context();
        let beauty = Filter::beauty_face(&ctx);
        let err = beauty.add_target(beauty.clone()).unwrap_err();
        assert!(matches!(err, GraphError::SelfEdge(id) if id == beauty.id()));
        assert_ne!(beauty.id(), NodeId::INVALID);
    }
}
