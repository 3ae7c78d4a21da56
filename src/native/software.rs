//! In-process software implementation of the native layer.
//!
//! This backend keeps one resource record per handle and does the minimum
//! real pixel work the graph needs: rotation on upload, RGBA → I420 for the
//! raw output target. Filters forward their input unchanged; the actual
//! beauty transforms live in a GPU backend outside this crate.
//!
//! Every call is appended to a bounded journal (see [`SoftwareBackend::records`])
//! so tests can assert on ordering and on which thread a call arrived from.
//! Once full, the oldest entries are dropped. Long-running callers can turn
//! it off with [`SoftwareBackend::with_journal_capacity`]`(0)`.
//!
//! # Example
//!
//! ```ignore
//! use pixelgraph::native::{NativeBackend, NodeKind, SoftwareBackend};
//!
//! let backend = SoftwareBackend::new();
//! let handle = backend.create(NodeKind::RawOutput)?;
//! assert_eq!(backend.live_handles(), 1);
//! ```

use super::convert::{rgba_to_i420, rotate_rgba};
use super::{
    FilterKind, FilterParam, NativeBackend, NativeHandle, NodeKind, RawFormat, RawOutputCallback,
    ViewSettings,
};
use crate::error::{GraphError, Result};
use crate::graph::{Frame, Rotation};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One call into the backend, as seen by the journal.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    Create { handle: NativeHandle, kind: NodeKind },
    Destroy(NativeHandle),
    Upload { handle: NativeHandle, width: u32, height: u32, timestamp: i64 },
    TakeOutput(NativeHandle),
    SetRotation { handle: NativeHandle, rotation: Rotation },
    Process(NativeHandle),
    SetParameter { handle: NativeHandle, param: FilterParam, value: f32 },
    SetLandmarks { handle: NativeHandle, count: usize },
    SetCallback { handle: NativeHandle, format: RawFormat, bound: bool },
    ConfigureView(NativeHandle),
    Render { handle: NativeHandle, width: u32, height: u32, timestamp: i64 },
}

/// A journal entry: the call plus the name of the thread that made it.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call: NativeCall,
    pub thread: Option<String>,
}

enum Resource {
    Source {
        rotation: Rotation,
        outputs: VecDeque<Frame>,
    },
    Filter {
        kind: FilterKind,
        params: HashMap<FilterParam, f32>,
        landmarks: Vec<f32>,
    },
    RawOutput {
        i420: Option<RawOutputCallback>,
        pixels: Option<RawOutputCallback>,
    },
    View {
        settings: ViewSettings,
        presented: u64,
        last_size: Option<(u32, u32)>,
    },
}

/// Journal entries kept by [`SoftwareBackend::new`].
pub const DEFAULT_JOURNAL_CAPACITY: usize = 16 * 1024;

struct Inner {
    resources: HashMap<NativeHandle, Resource>,
    journal: VecDeque<CallRecord>,
    journal_capacity: usize,
}

impl Inner {
    fn record(&mut self, call: NativeCall) {
        if self.journal_capacity == 0 {
            return;
        }
        if self.journal.len() == self.journal_capacity {
            self.journal.pop_front();
        }
        self.journal.push_back(CallRecord {
            call,
            thread: std::thread::current().name().map(str::to_owned),
        });
    }
}

/// Software native layer.
pub struct SoftwareBackend {
    inner: Mutex<Inner>,
    next_handle: AtomicU64,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::with_journal_capacity(DEFAULT_JOURNAL_CAPACITY)
    }

    /// Backend keeping at most `capacity` journal entries. Zero disables
    /// the journal.
    pub fn with_journal_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                resources: HashMap::new(),
                journal: VecDeque::with_capacity(capacity.min(DEFAULT_JOURNAL_CAPACITY)),
                journal_capacity: capacity,
            }),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Convenience constructor returning the backend as a shared trait object
    /// alongside a typed handle for inspection.
    pub fn shared() -> (Arc<SoftwareBackend>, Arc<dyn NativeBackend>) {
        let backend = Arc::new(Self::new());
        let dynamic: Arc<dyn NativeBackend> = backend.clone();
        (backend, dynamic)
    }

    /// Number of resources currently alive.
    pub fn live_handles(&self) -> usize {
        self.inner.lock().resources.len()
    }

    pub fn is_alive(&self, handle: NativeHandle) -> bool {
        self.inner.lock().resources.contains_key(&handle)
    }

    /// Last value written for a filter parameter.
    pub fn parameter(&self, handle: NativeHandle, param: FilterParam) -> Option<f32> {
        match self.inner.lock().resources.get(&handle) {
            Some(Resource::Filter { params, .. }) => params.get(&param).copied(),
            _ => None,
        }
    }

    pub fn landmarks(&self, handle: NativeHandle) -> Option<Vec<f32>> {
        match self.inner.lock().resources.get(&handle) {
            Some(Resource::Filter { landmarks, .. }) => Some(landmarks.clone()),
            _ => None,
        }
    }

    pub fn rotation(&self, handle: NativeHandle) -> Option<Rotation> {
        match self.inner.lock().resources.get(&handle) {
            Some(Resource::Source { rotation, .. }) => Some(*rotation),
            _ => None,
        }
    }

    pub fn view_settings(&self, handle: NativeHandle) -> Option<ViewSettings> {
        match self.inner.lock().resources.get(&handle) {
            Some(Resource::View { settings, .. }) => Some(*settings),
            _ => None,
        }
    }

    /// Frames presented by a view and the size of the last one.
    pub fn presented(&self, handle: NativeHandle) -> Option<(u64, Option<(u32, u32)>)> {
        match self.inner.lock().resources.get(&handle) {
            Some(Resource::View {
                presented,
                last_size,
                ..
            }) => Some((*presented, *last_size)),
            _ => None,
        }
    }

    /// Whether a raw output callback is currently bound.
    pub fn has_callback(&self, handle: NativeHandle, format: RawFormat) -> bool {
        match self.inner.lock().resources.get(&handle) {
            Some(Resource::RawOutput { i420, pixels }) => match format {
                RawFormat::I420 => i420.is_some(),
                RawFormat::Pixels => pixels.is_some(),
            },
            _ => false,
        }
    }

    /// Retained call journal, oldest first.
    pub fn records(&self) -> Vec<CallRecord> {
        self.inner.lock().journal.iter().cloned().collect()
    }

    /// Call journal without thread information.
    pub fn calls(&self) -> Vec<NativeCall> {
        self.inner
            .lock()
            .journal
            .iter()
            .map(|r| r.call.clone())
            .collect()
    }

    pub fn clear_journal(&self) {
        self.inner.lock().journal.clear();
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown(handle: NativeHandle, op: &str) -> GraphError {
    GraphError::Native(format!("{} on unknown or mismatched {:?}", op, handle))
}

impl NativeBackend for SoftwareBackend {
    fn create(&self, kind: NodeKind) -> Result<NativeHandle> {
        let handle = NativeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let resource = match kind {
            NodeKind::RawInput | NodeKind::Camera => Resource::Source {
                rotation: Rotation::NoRotation,
                outputs: VecDeque::new(),
            },
            NodeKind::Filter(kind) => Resource::Filter {
                kind,
                params: HashMap::new(),
                landmarks: Vec::new(),
            },
            NodeKind::RawOutput => Resource::RawOutput {
                i420: None,
                pixels: None,
            },
            NodeKind::View => Resource::View {
                settings: ViewSettings::default(),
                presented: 0,
                last_size: None,
            },
        };

        let mut inner = self.inner.lock();
        inner.resources.insert(handle, resource);
        inner.record(NativeCall::Create { handle, kind });
        tracing::trace!("native create {} -> {:?}", kind.name(), handle);
        Ok(handle)
    }

    fn destroy(&self, handle: NativeHandle) {
        let removed = {
            let mut inner = self.inner.lock();
            inner.record(NativeCall::Destroy(handle));
            inner.resources.remove(&handle)
        };
        // Dropped outside the lock: callbacks may own nodes whose drop
        // releases more handles.
        match removed {
            Some(resource) => drop(resource),
            None => tracing::warn!("native destroy of unknown {:?}", handle),
        }
    }

    fn upload(&self, handle: NativeHandle, frame: Frame) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.record(NativeCall::Upload {
            handle,
            width: frame.width,
            height: frame.height,
            timestamp: frame.timestamp,
        });
        match inner.resources.get_mut(&handle) {
            Some(Resource::Source { rotation, outputs }) => {
                let rotation = *rotation;
                let frame = if rotation == Rotation::NoRotation {
                    frame
                } else {
                    let (data, width, height) =
                        rotate_rgba(&frame.data, frame.width, frame.height, rotation);
                    Frame {
                        data: Arc::from(data),
                        width,
                        height,
                        rotation,
                        timestamp: frame.timestamp,
                    }
                };
                outputs.push_back(frame);
                Ok(())
            }
            _ => Err(unknown(handle, "upload")),
        }
    }

    fn take_output(&self, handle: NativeHandle) -> Option<Frame> {
        let mut inner = self.inner.lock();
        inner.record(NativeCall::TakeOutput(handle));
        match inner.resources.get_mut(&handle) {
            Some(Resource::Source { outputs, .. }) => outputs.pop_front(),
            _ => None,
        }
    }

    fn set_rotation(&self, handle: NativeHandle, rotation: Rotation) {
        let mut inner = self.inner.lock();
        inner.record(NativeCall::SetRotation { handle, rotation });
        if let Some(Resource::Source { rotation: r, .. }) = inner.resources.get_mut(&handle) {
            *r = rotation;
        }
    }

    fn process(&self, handle: NativeHandle, input: &Frame) -> Result<Frame> {
        let mut inner = self.inner.lock();
        inner.record(NativeCall::Process(handle));
        match inner.resources.get(&handle) {
            Some(Resource::Filter { kind, .. }) => {
                tracing::trace!("{} pass over {}x{}", kind.name(), input.width, input.height);
                Ok(input.clone())
            }
            _ => Err(unknown(handle, "process")),
        }
    }

    fn set_parameter(&self, handle: NativeHandle, param: FilterParam, value: f32) {
        let mut inner = self.inner.lock();
        inner.record(NativeCall::SetParameter {
            handle,
            param,
            value,
        });
        if let Some(Resource::Filter { params, .. }) = inner.resources.get_mut(&handle) {
            params.insert(param, value);
        }
    }

    fn set_face_landmarks(&self, handle: NativeHandle, landmarks: &[f32]) {
        let mut inner = self.inner.lock();
        inner.record(NativeCall::SetLandmarks {
            handle,
            count: landmarks.len(),
        });
        if let Some(Resource::Filter { landmarks: l, .. }) = inner.resources.get_mut(&handle) {
            l.clear();
            l.extend_from_slice(landmarks);
        }
    }

    fn set_raw_output_callback(
        &self,
        handle: NativeHandle,
        format: RawFormat,
        callback: Option<RawOutputCallback>,
    ) {
        let replaced = {
            let mut inner = self.inner.lock();
            inner.record(NativeCall::SetCallback {
                handle,
                format,
                bound: callback.is_some(),
            });
            match inner.resources.get_mut(&handle) {
                Some(Resource::RawOutput { i420, pixels }) => match format {
                    RawFormat::I420 => std::mem::replace(i420, callback),
                    RawFormat::Pixels => std::mem::replace(pixels, callback),
                },
                _ => callback,
            }
        };
        drop(replaced);
    }

    fn configure_view(&self, handle: NativeHandle, settings: ViewSettings) {
        let mut inner = self.inner.lock();
        inner.record(NativeCall::ConfigureView(handle));
        if let Some(Resource::View { settings: s, .. }) = inner.resources.get_mut(&handle) {
            *s = settings;
        }
    }

    fn render(&self, handle: NativeHandle, input: &Frame) -> Result<()> {
        let (i420_cb, pixels_cb) = {
            let mut inner = self.inner.lock();
            inner.record(NativeCall::Render {
                handle,
                width: input.width,
                height: input.height,
                timestamp: input.timestamp,
            });
            match inner.resources.get_mut(&handle) {
                Some(Resource::RawOutput { i420, pixels }) => (i420.clone(), pixels.clone()),
                Some(Resource::View {
                    presented,
                    last_size,
                    ..
                }) => {
                    *presented += 1;
                    *last_size = Some((input.width, input.height));
                    return Ok(());
                }
                _ => return Err(unknown(handle, "render")),
            }
        };

        // Callbacks run outside the lock; they may call back into the backend.
        if let Some(cb) = i420_cb {
            let yuv = rgba_to_i420(&input.data, input.width, input.height);
            cb(&yuv, input.width, input.height, input.timestamp);
        }
        if let Some(cb) = pixels_cb {
            cb(&input.data, input.width, input.height, input.timestamp);
        }
        Ok(())
    }
}
