//! Serialized execution context bound to the GPU thread.
//!
//! A [`DispatchQueue`] owns one dedicated thread that drains a FIFO of boxed
//! tasks. All native resource lifecycle work and all frame propagation run on
//! it; other threads only enqueue.
//!
//! ```text
//! UI / camera threads ──enqueue──► [crossbeam FIFO] ──► queue thread ──► NativeBackend
//! ```
//!
//! # Guarantees
//!
//! - Tasks run in submission order. No priorities, no cancellation.
//! - `enqueue` from the queue thread itself runs the task inline.
//! - `enqueue` never blocks; `run_sync` does.
//! - A panicking task is logged and counted; the queue keeps running.
//!
//! The queue orders work, it does not lock it: a task that touches a native
//! handle must re-check that the handle is still bound when it runs.

use crate::error::{GraphError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

/// A unit of work for the queue thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

enum QueueMessage {
    Run(Task),
    Shutdown,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    executed: AtomicU64,
    inline: AtomicU64,
    panicked: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of queue activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks handed to `enqueue`
    pub submitted: u64,
    /// Tasks that ran to completion or panicked
    pub executed: u64,
    /// Tasks run inline because the caller was already on the queue thread
    pub inline: u64,
    /// Tasks that panicked
    pub panicked: u64,
    /// Tasks dropped because the queue was closed
    pub dropped: u64,
}

/// FIFO executor with a single dedicated thread.
pub struct DispatchQueue {
    name: String,
    tx: Sender<QueueMessage>,
    thread_id: ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    counters: Arc<Counters>,
}

impl DispatchQueue {
    /// Spawn the queue thread.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (tx, rx) = unbounded();
        let counters = Arc::new(Counters::default());

        let worker_counters = counters.clone();
        let worker_name = name.clone();
        let worker = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(&worker_name, rx, &worker_counters))?;

        Ok(Self {
            name,
            thread_id: worker.thread().id(),
            tx,
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
            counters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the caller is running on the queue thread.
    #[inline]
    pub fn is_current_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Schedule `task`. Runs it inline when already on the queue thread,
    /// otherwise appends it to the FIFO and returns immediately.
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        if self.is_current_thread() {
            self.counters.inline.fetch_add(1, Ordering::Relaxed);
            execute(Box::new(task), &self.counters);
            return;
        }

        if self.is_closed() || self.tx.send(QueueMessage::Run(Box::new(task))).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Dispatch queue '{}' is closed; task dropped", self.name);
        }
    }

    /// Run `f` on the queue thread and wait for its result.
    pub fn run_sync<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current_thread() {
            return Ok(f());
        }

        let (result_tx, result_rx) = bounded(1);
        self.enqueue(move || {
            let _ = result_tx.send(f());
        });
        // The sender is dropped without a value if the task was dropped or panicked.
        result_rx.recv().map_err(|_| GraphError::QueueClosed)
    }

    /// Wait until every task submitted before this call has run.
    pub fn flush(&self) -> Result<()> {
        self.run_sync(|| ())
    }

    /// Stop accepting work, drain what is queued and join the thread.
    ///
    /// Idempotent. Called from the queue thread itself, it signals the stop
    /// but does not join.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(QueueMessage::Shutdown);

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if self.is_current_thread() {
                tracing::debug!("Dispatch queue '{}' shut down from its own thread", self.name);
            } else if worker.join().is_err() {
                tracing::error!("Dispatch queue '{}' thread panicked", self.name);
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            executed: self.counters.executed.load(Ordering::Relaxed),
            inline: self.counters.inline.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop(name: &str, rx: Receiver<QueueMessage>, counters: &Counters) {
    tracing::info!("Dispatch queue '{}' started", name);

    while let Ok(message) = rx.recv() {
        match message {
            QueueMessage::Run(task) => execute(task, counters),
            QueueMessage::Shutdown => break,
        }
    }

    tracing::info!("Dispatch queue '{}' exiting", name);
}

fn execute(task: Task, counters: &Counters) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        counters.panicked.fetch_add(1, Ordering::Relaxed);
        tracing::error!("Dispatch task panicked");
    }
    counters.executed.fetch_add(1, Ordering::Relaxed);
}
