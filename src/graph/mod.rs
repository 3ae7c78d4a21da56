//! The frame-processing graph.
//!
//! Nodes come in three capabilities:
//!
//! - [`Source`] only: raw input and camera nodes originate frames
//! - [`Source`] + [`Target`]: filters transform and forward
//! - [`Target`] only: raw output and view nodes consume frames
//!
//! Edges are non-owning and ordered; a pass walks them depth-first on the
//! dispatch queue thread.

pub mod edges;
pub mod frame;
pub mod id;
pub mod node;
pub mod nodes;

pub use edges::{would_create_cycle, Outputs};
pub use frame::{Frame, Rotation, RGBA_BYTES};
pub use id::{NodeId, NodeIdAllocator};
pub use node::{Bound, Node, NodeCore, NodeState, ProceedSignal, Source, Target};
pub use nodes::{CameraSource, Filter, RawInputSource, RawOutputTarget, ViewTarget};
