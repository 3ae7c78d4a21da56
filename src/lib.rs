//! # pixelgraph: real-time frame-processing graph
//!
//! Frames enter from a camera or from raw pixel buffers, pass through a chain
//! of filters and end at a display surface and/or raw-byte consumers. All
//! native resource work and every propagation pass run on one dedicated
//! dispatch thread, so the native layer never sees concurrent lifecycle calls.
//!
//! ## Architecture
//!
//! - **Dispatch**: a single named thread draining a crossbeam FIFO of tasks
//! - **Context**: an explicit [`GpuContext`] owning the queue, the native
//!   backend and the frame clock
//! - **Graph**: [`Source`](graph::Source) / [`Target`](graph::Target) nodes
//!   joined by ordered, non-owning fan-out edges
//! - **Native**: the [`NativeBackend`](native::NativeBackend) trait hides the
//!   pixel work behind opaque handles; [`SoftwareBackend`](native::SoftwareBackend)
//!   is the in-process implementation
//! - **Pipeline**: the beauty-camera graph and its UI slider mapping
//!
//! ## Configuration
//!
//! Settings are read from `pixelgraph.toml` in the platform config directory
//! under `dev.pixpark.pixelgraph` (see [`config`]).
//!
//! ## Example
//!
//! ```ignore
//! use pixelgraph::{
//!     config::GraphConfig,
//!     native::SoftwareBackend,
//!     pipeline::{BeautyPipeline, CameraPermission, Control},
//!     GpuContext,
//! };
//!
//! let (_, backend) = SoftwareBackend::shared();
//! let ctx = GpuContext::new(GraphConfig::load_or_default(), backend)?;
//! let pipeline = BeautyPipeline::start(&ctx, CameraPermission::Granted)?;
//!
//! pipeline.raw_output().set_i420_callback(|bytes, width, height, ts| {
//!     println!("{}x{} @{}ms: {} bytes", width, height, ts, bytes.len());
//! });
//! pipeline.on_progress_changed(Control::Smooth, 7)?;
//! pipeline.camera().upload_bytes(&pixels, 640, 480, 640 * 4)?;
//! ```

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod landmark;
pub mod native;
pub mod pipeline;

// Re-export commonly used types
pub use config::GraphConfig;
pub use context::GpuContext;
pub use error::{GraphError, Result, ResultExt};
pub use graph::{Frame, Node, NodeId, NodeState, ProceedSignal, Rotation, Source, Target};
pub use pipeline::{BeautyPipeline, CameraPermission, Control};
