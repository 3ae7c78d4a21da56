//! Node lifecycle and capability traits.
//!
//! Every node owns a [`NodeCore`] that tracks its native handle through three
//! states:
//!
//! ```text
//! Pending ──create task──► Ready ──destroy──► Destroyed
//!    └──────────────destroy──────────────────────┘
//! ```
//!
//! Settings written while the node is `Pending` are kept in the core and
//! applied by the create task in the same critical section that installs the
//! handle. Once `Ready`, writes go straight to the native layer.

use crate::context::GpuContext;
use crate::error::{GraphError, Result};
use crate::graph::{Frame, NodeId, Outputs};
use crate::native::{NativeBackend, NativeHandle, NodeKind};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Where a node is in its native lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Constructed, native resource not yet allocated
    Pending,
    /// Native handle is bound
    Ready,
    /// Released; the handle is null and stays null
    Destroyed,
}

/// Flags carried by one propagation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProceedSignal {
    /// The upstream node produced a frame this pass
    pub has_output: bool,
    /// Downstream filters must reprocess even if their input is unchanged
    pub must_process: bool,
}

impl ProceedSignal {
    pub const FRESH: ProceedSignal = ProceedSignal {
        has_output: true,
        must_process: true,
    };

    pub fn new(has_output: bool, must_process: bool) -> Self {
        Self {
            has_output,
            must_process,
        }
    }
}

/// A ready node's view of the native layer.
#[derive(Clone, Copy)]
pub struct Bound<'a> {
    pub backend: &'a dyn NativeBackend,
    pub handle: NativeHandle,
}

struct Lifecycle<S> {
    handle: NativeHandle,
    state: NodeState,
    settings: S,
}

/// Shared lifecycle state of one node.
///
/// `S` holds the node's settings (parameters, callbacks, rotation). They are
/// mirrored here for the whole lifetime of the node so that registrations
/// made before readiness can be replayed by the create task.
pub struct NodeCore<S> {
    id: NodeId,
    kind: NodeKind,
    ctx: Arc<GpuContext>,
    create_scheduled: AtomicBool,
    lifecycle: Mutex<Lifecycle<S>>,
    ready: Condvar,
}

impl<S: Send + 'static> NodeCore<S> {
    pub fn new(ctx: &Arc<GpuContext>, kind: NodeKind, settings: S) -> Arc<Self> {
        Arc::new(Self {
            id: ctx.next_node_id(),
            kind,
            ctx: ctx.clone(),
            create_scheduled: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle {
                handle: NativeHandle::NULL,
                state: NodeState::Pending,
                settings,
            }),
            ready: Condvar::new(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn ctx(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub fn handle(&self) -> NativeHandle {
        self.lifecycle.lock().handle
    }

    pub fn state(&self) -> NodeState {
        self.lifecycle.lock().state
    }

    /// The handle, if it is bound right now. Queue tasks call this when they
    /// run rather than capturing a handle when they are scheduled.
    pub fn bound_handle(&self) -> Option<NativeHandle> {
        let handle = self.handle();
        handle.is_bound().then_some(handle)
    }

    /// Schedule native allocation on the queue.
    ///
    /// `on_ready` runs on the queue thread with the lifecycle lock held, right
    /// after the handle is installed, and replays the pending settings. Only
    /// the first call schedules anything. A node destroyed before the task
    /// runs stays destroyed.
    pub fn create<F>(self: &Arc<Self>, on_ready: F)
    where
        F: FnOnce(&mut S, Bound<'_>) + Send + 'static,
    {
        if self.create_scheduled.swap(true, Ordering::AcqRel) {
            tracing::debug!("{} {} create already scheduled", self.kind.name(), self.id);
            return;
        }

        let core = self.clone();
        self.ctx.queue().enqueue(move || core.run_create(on_ready));
    }

    fn run_create<F>(&self, on_ready: F)
    where
        F: FnOnce(&mut S, Bound<'_>),
    {
        let backend = self.ctx.backend().as_ref();
        let mut lifecycle = self.lifecycle.lock();

        if lifecycle.state != NodeState::Pending || lifecycle.handle.is_bound() {
            tracing::debug!(
                "{} {} create skipped in state {:?}",
                self.kind.name(),
                self.id,
                lifecycle.state
            );
            return;
        }

        let handle = match backend.create(self.kind) {
            Ok(handle) if handle.is_bound() => handle,
            Ok(_) => {
                tracing::error!("{} {} native create returned a null handle", self.kind.name(), self.id);
                return;
            }
            Err(e) => {
                tracing::error!("{} {} native create failed: {}", self.kind.name(), self.id, e);
                return;
            }
        };

        lifecycle.handle = handle;
        on_ready(&mut lifecycle.settings, Bound { backend, handle });
        lifecycle.state = NodeState::Ready;
        drop(lifecycle);

        self.ready.notify_all();
        tracing::info!("{} {} ready as {:?}", self.kind.name(), self.id, handle);
    }

    /// Release the native resource.
    ///
    /// The handle is nulled and the node marked `Destroyed` immediately, so
    /// later tasks see an unbound handle. With `on_queue` the native release
    /// is scheduled on the queue; otherwise it runs on the calling thread,
    /// which must then be the queue thread or a thread that knows no pass is
    /// running. Repeated calls are no-ops.
    pub fn destroy(&self, on_queue: bool) {
        let handle = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == NodeState::Destroyed {
                return;
            }
            lifecycle.state = NodeState::Destroyed;
            std::mem::replace(&mut lifecycle.handle, NativeHandle::NULL)
        };
        self.ready.notify_all();

        if handle.is_null() {
            tracing::debug!("{} {} destroyed before it was created", self.kind.name(), self.id);
            return;
        }

        tracing::info!("{} {} destroying {:?}", self.kind.name(), self.id, handle);
        if on_queue {
            let ctx = self.ctx.clone();
            self.ctx
                .queue()
                .enqueue(move || ctx.backend().destroy(handle));
        } else {
            self.ctx.backend().destroy(handle);
        }
    }

    /// Block until the node is `Ready`.
    ///
    /// Fails with `NotReady` on timeout, if the node was destroyed, or when
    /// called from the queue thread while still pending (the create task
    /// could never run).
    pub fn wait_ready(&self, timeout: Duration) -> Result<NativeHandle> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state == NodeState::Pending && self.ctx.queue().is_current_thread() {
            tracing::warn!("wait_ready on the queue thread for pending {}", self.id);
            return Err(GraphError::NotReady(self.id));
        }

        self.ready.wait_while_for(
            &mut lifecycle,
            |l| l.state == NodeState::Pending,
            timeout,
        );

        match lifecycle.state {
            NodeState::Ready => Ok(lifecycle.handle),
            _ => Err(GraphError::NotReady(self.id)),
        }
    }

    /// Run `f` against the settings under the lifecycle lock.
    ///
    /// `f` receives the native binding when the node is ready, `None` while
    /// it is pending. Returns `None` without calling `f` once destroyed.
    pub fn update<R>(&self, f: impl FnOnce(&mut S, Option<Bound<'_>>) -> R) -> Option<R> {
        let backend = self.ctx.backend().as_ref();
        let mut lifecycle = self.lifecycle.lock();
        let lifecycle = &mut *lifecycle;
        match lifecycle.state {
            NodeState::Destroyed => None,
            NodeState::Pending => Some(f(&mut lifecycle.settings, None)),
            NodeState::Ready => Some(f(
                &mut lifecycle.settings,
                Some(Bound {
                    backend,
                    handle: lifecycle.handle,
                }),
            )),
        }
    }

    /// Read the settings.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.lifecycle.lock().settings)
    }
}

impl<S> Drop for NodeCore<S> {
    fn drop(&mut self) {
        let handle = self.lifecycle.get_mut().handle;
        if handle.is_null() {
            return;
        }

        tracing::info!("{} {} dropped, releasing {:?}", self.kind.name(), self.id, handle);
        let queue = self.ctx.queue();
        if queue.is_closed() {
            self.ctx.backend().destroy(handle);
        } else {
            let ctx = self.ctx.clone();
            queue.enqueue(move || ctx.backend().destroy(handle));
        }
    }
}

impl<S> std::fmt::Debug for NodeCore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lifecycle = self.lifecycle.lock();
        f.debug_struct("NodeCore")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("handle", &lifecycle.handle)
            .field("state", &lifecycle.state)
            .finish()
    }
}

/// Identity and lifecycle shared by every node.
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    fn kind(&self) -> NodeKind;

    fn state(&self) -> NodeState;

    /// Current native handle; null while pending and after destroy.
    fn handle(&self) -> NativeHandle;

    /// See [`NodeCore::destroy`].
    fn destroy(&self, on_queue: bool);

    fn wait_ready(&self, timeout: Duration) -> Result<NativeHandle>;
}

/// A node that consumes frames: filters and terminal targets.
pub trait Target: Node {
    /// Handle one propagation pass. Runs on the queue thread.
    fn receive(&self, input: Option<&Frame>, signal: ProceedSignal);

    /// Targets this node feeds, used by the cycle check. Empty for terminal
    /// targets.
    fn downstream(&self) -> Vec<Arc<dyn Target>> {
        Vec::new()
    }
}

/// A node that emits frames: inputs and filters.
pub trait Source: Node {
    fn outputs(&self) -> &Outputs;

    /// Append an edge to `target`. Self-edges and edges closing a cycle are
    /// rejected.
    fn add_target(&self, target: Arc<dyn Target>) -> Result<()> {
        self.outputs().add(self.id(), &target)
    }

    /// Remove the first edge to `target`. No-op if there is none.
    fn remove_target(&self, target: &dyn Target) -> bool {
        self.outputs().remove(target.id())
    }

    /// Live targets in edge order.
    fn targets(&self) -> Vec<Arc<dyn Target>> {
        self.outputs().snapshot()
    }

    /// Start a propagation pass from this node.
    fn proceed(&self, signal: ProceedSignal);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::native::{MockNativeBackend, SoftwareBackend};

    fn context() -> (Arc<SoftwareBackend>, Arc<GpuContext>) {
        let (software, backend) = SoftwareBackend::shared();
        let ctx = GpuContext::new(GraphConfig::default(), backend).unwrap();
        (software, ctx)
    }

    #[test]
    fn test_create_then_destroy() {
        let (software, ctx) = context();
        let core = NodeCore::new(&ctx, NodeKind::View, ());
        assert_eq!(core.state(), NodeState::Pending);
        assert!(core.handle().is_null());

        core.create(|_, _| {});
        let handle = core.wait_ready(Duration::from_secs(1)).unwrap();
        assert!(handle.is_bound());
        assert_eq!(software.live_handles(), 1);

        core.destroy(true);
        assert!(core.handle().is_null());
        assert_eq!(core.state(), NodeState::Destroyed);
        ctx.flush().unwrap();
        assert_eq!(software.live_handles(), 0);
    }

    #[test]
    fn test_create_is_idempotent() {
        let (software, ctx) = context();
        let core = NodeCore::new(&ctx, NodeKind::RawOutput, ());
        core.create(|_, _| {});
        core.create(|_, _| {});
        ctx.flush().unwrap();
        assert_eq!(software.live_handles(), 1);
    }

    #[test]
    fn test_destroy_before_create_runs() {
        let (software, ctx) = context();
        let core = NodeCore::new(&ctx, NodeKind::RawOutput, ());

        // Park the queue so the create task cannot run yet.
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        ctx.queue().enqueue(move || {
            let _ = gate_rx.recv();
        });
        core.create(|_, _| panic!("create must not run after destroy"));
        core.destroy(false);
        gate_tx.send(()).unwrap();
        ctx.flush().unwrap();

        assert!(core.handle().is_null());
        assert_eq!(core.state(), NodeState::Destroyed);
        assert_eq!(software.live_handles(), 0);
        assert_eq!(ctx.queue().stats().panicked, 0);
    }

    #[test]
    fn test_settings_replayed_once_at_ready() {
        let (_, ctx) = context();
        let core = NodeCore::new(&ctx, NodeKind::View, Vec::<u32>::new());
        core.update(|s, bound| {
            assert!(bound.is_none());
            s.push(1);
        });
        core.update(|s, _| s.push(2));

        let replayed = Arc::new(Mutex::new(Vec::new()));
        let sink = replayed.clone();
        core.create(move |s, bound| {
            assert!(bound.handle.is_bound());
            sink.lock().extend(s.iter().copied());
        });
        core.wait_ready(Duration::from_secs(1)).unwrap();

        assert_eq!(*replayed.lock(), vec![1, 2]);
        assert!(core.update(|_, bound| bound.is_some()).unwrap());
    }

    #[test]
    fn test_update_after_destroy_is_noop() {
        let (_, ctx) = context();
        let core = NodeCore::new(&ctx, NodeKind::View, 0u32);
        core.destroy(true);
        assert!(core.update(|s, _| *s += 1).is_none());
        assert_eq!(core.read(|s| *s), 0);
    }

    #[test]
    fn test_wait_ready_after_destroy_fails() {
        let (_, ctx) = context();
        let core = NodeCore::new(&ctx, NodeKind::View, ());
        core.destroy(true);
        let err = core.wait_ready(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, GraphError::NotReady(_)));
    }

    #[test]
    fn test_failed_create_stays_pending() {
        let mut mock = MockNativeBackend::new();
        mock.expect_create()
            .times(1)
            .returning(|_| Err(GraphError::Native("out of memory".into())));
        let ctx = GpuContext::new(GraphConfig::default(), Arc::new(mock)).unwrap();

        let core = NodeCore::new(&ctx, NodeKind::Camera, ());
        core.create(|_, _| {});
        ctx.flush().unwrap();
        assert_eq!(core.state(), NodeState::Pending);
        assert!(core.wait_ready(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_destroy_twice_releases_once() {
        let mut mock = MockNativeBackend::new();
        mock.expect_create()
            .times(1)
            .returning(|_| Ok(NativeHandle(5)));
        mock.expect_destroy()
            .withf(|h| *h == NativeHandle(5))
            .times(1)
            .return_const(());
        let ctx = GpuContext::new(GraphConfig::default(), Arc::new(mock)).unwrap();

        let core = NodeCore::new(&ctx, NodeKind::View, ());
        core.create(|_, _| {});
        core.wait_ready(Duration::from_secs(1)).unwrap();
        core.destroy(true);
        core.destroy(true);
        core.destroy(false);
        ctx.flush().unwrap();
    }

    #[test]
    fn test_drop_releases_bound_handle() {
        let (software, ctx) = context();
        let core = NodeCore::new(&ctx, NodeKind::RawOutput, ());
        core.create(|_, _| {});
        core.wait_ready(Duration::from_secs(1)).unwrap();
        assert_eq!(software.live_handles(), 1);

        drop(core);
        ctx.flush().unwrap();
        assert_eq!(software.live_handles(), 0);
    }

    #[test]
    fn test_drop_after_destroy_releases_nothing_more() {
        let mut mock = MockNativeBackend::new();
        mock.expect_create()
            .times(1)
            .returning(|_| Ok(NativeHandle(6)));
        mock.expect_destroy().times(1).return_const(());
        let ctx = GpuContext::new(GraphConfig::default(), Arc::new(mock)).unwrap();

        let core = NodeCore::new(&ctx, NodeKind::View, ());
        core.create(|_, _| {});
        core.wait_ready(Duration::from_secs(1)).unwrap();
        core.destroy(true);
        drop(core);
        ctx.flush().unwrap();
    }

    #[test]
    fn test_drop_after_shutdown_releases_inline() {
        let (software, ctx) = context();
        let core = NodeCore::new(&ctx, NodeKind::View, ());
        core.create(|_, _| {});
        core.wait_ready(Duration::from_secs(1)).unwrap();

        ctx.shutdown();
        drop(core);
        assert_eq!(software.live_handles(), 0);
    }
}
