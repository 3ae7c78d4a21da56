//! Explicit processing context.
//!
//! One [`GpuContext`] is built at application start and handed to every node
//! constructor. It owns the dispatch queue, the native backend, the clock used
//! to stamp uploaded frames and the loaded configuration.

use crate::config::GraphConfig;
use crate::dispatch::DispatchQueue;
use crate::error::Result;
use crate::graph::{NodeId, NodeIdAllocator};
use crate::native::NativeBackend;
use std::sync::Arc;
use std::time::Instant;

pub struct GpuContext {
    queue: DispatchQueue,
    backend: Arc<dyn NativeBackend>,
    config: GraphConfig,
    epoch: Instant,
    ids: NodeIdAllocator,
}

impl GpuContext {
    /// Spawn the queue thread and wrap everything in a shared handle.
    pub fn new(config: GraphConfig, backend: Arc<dyn NativeBackend>) -> Result<Arc<Self>> {
        let queue = DispatchQueue::new(config.queue.thread_name.clone())?;
        tracing::info!("GPU context started on queue '{}'", queue.name());

        Ok(Arc::new(Self {
            queue,
            backend,
            config,
            epoch: Instant::now(),
            ids: NodeIdAllocator::new(),
        }))
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    pub fn backend(&self) -> &Arc<dyn NativeBackend> {
        &self.backend
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Milliseconds since the context was created. Monotonic.
    pub fn elapsed_ms(&self) -> i64 {
        i64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        self.ids.next()
    }

    /// Block until everything queued so far has run.
    pub fn flush(&self) -> Result<()> {
        self.queue.flush()
    }

    /// Drain the queue and stop its thread. Nodes still alive afterwards can
    /// no longer create, propagate or release native resources.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down GPU context");
        self.queue.shutdown();
    }
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("queue", &self.queue)
            .field("elapsed_ms", &self.elapsed_ms())
            .finish()
    }
}
