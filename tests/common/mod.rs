//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod recorders;

use pixelgraph::native::SoftwareBackend;
use pixelgraph::{GpuContext, GraphConfig};
use std::sync::Arc;
use std::time::Duration;

/// How long tests wait for a node to become ready
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f32, b: f32, epsilon: f32) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// A context over a fresh software backend, with the backend kept for
/// inspection.
pub fn software_context() -> (Arc<SoftwareBackend>, Arc<GpuContext>) {
    software_context_with(GraphConfig::default())
}

pub fn software_context_with(config: GraphConfig) -> (Arc<SoftwareBackend>, Arc<GpuContext>) {
    let (software, backend) = SoftwareBackend::shared();
    let ctx = GpuContext::new(config, backend).expect("context");
    (software, ctx)
}

/// Block the queue thread until the returned sender is used or dropped.
pub fn park_queue(ctx: &GpuContext) -> crossbeam_channel::Sender<()> {
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
    ctx.queue().enqueue(move || {
        let _ = gate_rx.recv();
    });
    gate_tx
}
