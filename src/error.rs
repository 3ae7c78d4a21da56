//! Error handling for pixelgraph
//!
//! This module defines the crate error type and a Result alias used by
//! every graph, queue and backend operation.

use crate::graph::NodeId;
use crate::native::FilterParam;
use thiserror::Error;

/// Main error type for pixelgraph operations
#[derive(Error, Debug)]
pub enum GraphError {
    /// A native backend call failed
    #[error("Native error: {0}")]
    Native(String),

    /// Pixel buffer does not match the declared geometry
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Adding the edge would close a cycle
    #[error("Edge {from} -> {to} would create a cycle")]
    CycleDetected { from: NodeId, to: NodeId },

    /// A node cannot target itself
    #[error("Cannot connect node {0} to itself")]
    SelfEdge(NodeId),

    /// The filter does not expose the requested knob
    #[error("Filter {node} does not support parameter {param:?}")]
    UnsupportedParameter { node: NodeId, param: FilterParam },

    /// Camera access was refused, nothing was built
    #[error("Camera permission denied")]
    PermissionDenied,

    /// The dispatch queue has been shut down
    #[error("Dispatch queue is closed")]
    QueueClosed,

    /// Timed out waiting for a node to become ready
    #[error("Node {0} did not become ready in time")]
    NotReady(NodeId),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<GraphError>,
    },
}

impl GraphError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        GraphError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for pixelgraph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
