//! Fan-out edges of a source.
//!
//! Edges are ordered, may repeat and do not own their targets. Iteration
//! always works on a snapshot so edges can be added or removed from any
//! thread while a pass is running on the queue.

use crate::error::{GraphError, Result};
use crate::graph::{Frame, NodeId, ProceedSignal, Target};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::{Arc, Weak};

struct Edge {
    to: NodeId,
    target: Weak<dyn Target>,
}

/// Ordered list of outgoing edges.
#[derive(Default)]
pub struct Outputs {
    edges: RwLock<Vec<Edge>>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an edge from `owner` to `target`.
    pub fn add(&self, owner: NodeId, target: &Arc<dyn Target>) -> Result<()> {
        let to = target.id();
        if to == owner {
            return Err(GraphError::SelfEdge(owner));
        }
        if would_create_cycle(owner, target) {
            return Err(GraphError::CycleDetected { from: owner, to });
        }

        self.edges.write().push(Edge {
            to,
            target: Arc::downgrade(target),
        });
        tracing::debug!("Added edge {} -> {}", owner, to);
        Ok(())
    }

    /// Remove the first edge pointing at `to`. Returns whether one was found.
    pub fn remove(&self, to: NodeId) -> bool {
        let mut edges = self.edges.write();
        match edges.iter().position(|e| e.to == to) {
            Some(idx) => {
                edges.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Target ids in edge order, including edges whose target is gone.
    pub fn ids(&self) -> Vec<NodeId> {
        self.edges.read().iter().map(|e| e.to).collect()
    }

    pub fn len(&self) -> usize {
        self.edges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.read().is_empty()
    }

    /// Live targets in edge order. Edges to dropped targets are pruned.
    pub fn snapshot(&self) -> Vec<Arc<dyn Target>> {
        let (live, dead) = {
            let edges = self.edges.read();
            let live: Vec<_> = edges.iter().filter_map(|e| e.target.upgrade()).collect();
            let dead = live.len() != edges.len();
            (live, dead)
        };

        if dead {
            let mut edges = self.edges.write();
            let before = edges.len();
            edges.retain(|e| e.target.strong_count() > 0);
            tracing::debug!("Pruned {} dead edge(s)", before - edges.len());
        }
        live
    }

    /// Hand one pass to every target, in order, depth-first.
    pub fn propagate(&self, frame: Option<&Frame>, signal: ProceedSignal) {
        let signal = ProceedSignal {
            has_output: signal.has_output && frame.is_some(),
            ..signal
        };
        for target in self.snapshot() {
            target.receive(frame, signal);
        }
    }
}

impl std::fmt::Debug for Outputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

/// Whether an edge `from -> to` would close a cycle, i.e. `from` is already
/// reachable from `to`.
pub fn would_create_cycle(from: NodeId, to: &Arc<dyn Target>) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![to.clone()];

    while let Some(current) = stack.pop() {
        if current.id() == from {
            return true;
        }
        if !visited.insert(current.id()) {
            continue;
        }
        stack.extend(current.downstream());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, NodeState};
    use crate::native::{NativeHandle, NodeKind};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::time::Duration;

    /// Minimal in-memory target for edge bookkeeping.
    struct Stub {
        id: NodeId,
        next: Outputs,
        seen: Mutex<Vec<Option<i64>>>,
    }

    impl Stub {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id: NodeId(id),
                next: Outputs::new(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Node for Stub {
        fn id(&self) -> NodeId {
            self.id
        }
        fn kind(&self) -> NodeKind {
            NodeKind::View
        }
        fn state(&self) -> NodeState {
            NodeState::Ready
        }
        fn handle(&self) -> NativeHandle {
            NativeHandle(1)
        }
        fn destroy(&self, _on_queue: bool) {}
        fn wait_ready(&self, _timeout: Duration) -> Result<NativeHandle> {
            Ok(NativeHandle(1))
        }
    }

    impl Target for Stub {
        fn receive(&self, input: Option<&Frame>, signal: ProceedSignal) {
            self.seen.lock().push(input.map(|f| f.timestamp));
            self.next.propagate(input, signal);
        }
        fn downstream(&self) -> Vec<Arc<dyn Target>> {
            self.next.snapshot()
        }
    }

    fn dyn_target(p: &Arc<Stub>) -> Arc<dyn Target> {
        p.clone()
    }

    #[test]
    fn test_edges_keep_insertion_order_and_duplicates() {
        let outputs = Outputs::new();
        let a = Stub::new(1);
        let b = Stub::new(2);
        outputs.add(NodeId(0), &dyn_target(&a)).unwrap();
        outputs.add(NodeId(0), &dyn_target(&b)).unwrap();
        outputs.add(NodeId(0), &dyn_target(&a)).unwrap();
        assert_eq!(outputs.ids(), vec![NodeId(1), NodeId(2), NodeId(1)]);

        assert!(outputs.remove(NodeId(1)));
        assert_eq!(outputs.ids(), vec![NodeId(2), NodeId(1)]);
        assert!(!outputs.remove(NodeId(9)));
    }

    #[test]
    fn test_self_edge_rejected() {
        let outputs = Outputs::new();
        let a = Stub::new(1);
        let err = outputs.add(NodeId(1), &dyn_target(&a)).unwrap_err();
        assert!(matches!(err, GraphError::SelfEdge(NodeId(1))));
        assert!(outputs.is_empty());
    }

    #[test]
    fn test_cycle_rejected() {
        // a -> b -> c, then c -> a must fail
        let a = Stub::new(1);
        let b = Stub::new(2);
        let c = Stub::new(3);
        a.next.add(a.id, &dyn_target(&b)).unwrap();
        b.next.add(b.id, &dyn_target(&c)).unwrap();

        let err = c.next.add(c.id, &dyn_target(&a)).unwrap_err();
        assert!(matches!(
            err,
            GraphError::CycleDetected {
                from: NodeId(3),
                to: NodeId(1)
            }
        ));
        // A diamond is fine
        a.next.add(a.id, &dyn_target(&c)).unwrap();
    }

    #[test]
    fn test_dead_edges_are_skipped_and_pruned() {
        let outputs = Outputs::new();
        let a = Stub::new(1);
        let b = Stub::new(2);
        outputs.add(NodeId(0), &dyn_target(&a)).unwrap();
        outputs.add(NodeId(0), &dyn_target(&b)).unwrap();
        drop(a);

        let live = outputs.snapshot();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id(), NodeId(2));
        assert_eq!(outputs.len(), 1);
    }

    #[test]
    fn test_propagate_is_depth_first_in_edge_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        struct Recorder {
            id: NodeId,
            order: Arc<Mutex<Vec<u64>>>,
            next: Outputs,
        }
        impl Node for Recorder {
            fn id(&self) -> NodeId {
                self.id
            }
            fn kind(&self) -> NodeKind {
                NodeKind::View
            }
            fn state(&self) -> NodeState {
                NodeState::Ready
            }
            fn handle(&self) -> NativeHandle {
                NativeHandle(1)
            }
            fn destroy(&self, _on_queue: bool) {}
            fn wait_ready(&self, _timeout: Duration) -> Result<NativeHandle> {
                Ok(NativeHandle(1))
            }
        }
        impl Target for Recorder {
            fn receive(&self, input: Option<&Frame>, signal: ProceedSignal) {
                self.order.lock().push(self.id.0);
                self.next.propagate(input, signal);
            }
        }

        let mk = |id| {
            Arc::new(Recorder {
                id: NodeId(id),
                order: order.clone(),
                next: Outputs::new(),
            })
        };
        let a = mk(1);
        let a_child = mk(11);
        let b = mk(2);
        let a_dyn: Arc<dyn Target> = a.clone();
        let b_dyn: Arc<dyn Target> = b.clone();
        let child_dyn: Arc<dyn Target> = a_child.clone();
        a.next.add(a.id, &child_dyn).unwrap();

        let root = Outputs::new();
        root.add(NodeId(0), &a_dyn).unwrap();
        root.add(NodeId(0), &b_dyn).unwrap();

        let frame = Frame::from_packed(vec![0; 4], 1, 1, 3).unwrap();
        root.propagate(Some(&frame), ProceedSignal::FRESH);
        assert_eq!(*order.lock(), vec![1, 11, 2]);
    }

    #[test]
    fn test_propagate_without_frame_clears_has_output() {
        let outputs = Outputs::new();
        let a = Stub::new(1);
        outputs.add(NodeId(0), &dyn_target(&a)).unwrap();
        outputs.propagate(None, ProceedSignal::FRESH);
        assert_eq!(*a.seen.lock(), vec![None]);
    }

    #[test]
    fn test_concurrent_add_remove_during_propagation() {
        let outputs = Arc::new(Outputs::new());
        let targets: Vec<_> = (1..=8).map(Stub::new).collect();
        let frame = Frame::from_packed(vec![0; 4], 1, 1, 0).unwrap();

        let writer = {
            let outputs = outputs.clone();
            let targets: Vec<Arc<dyn Target>> = targets.iter().map(dyn_target).collect();
            std::thread::spawn(move || {
                for round in 0..200 {
                    let t = &targets[round % targets.len()];
                    outputs.add(NodeId(0), t).unwrap();
                    if round % 3 == 0 {
                        outputs.remove(t.id());
                    }
                }
            })
        };
        for _ in 0..200 {
            outputs.propagate(Some(&frame), ProceedSignal::FRESH);
        }
        writer.join().unwrap();

        assert!(outputs.ids().iter().all(|id| (1..=8).contains(&id.0)));
        assert_eq!(outputs.snapshot().len(), outputs.len());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u64),
        Remove(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u64..6).prop_map(Op::Add),
            (1u64..6).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_edges_match_list_model(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let outputs = Outputs::new();
            let stubs: Vec<_> = (1..6).map(Stub::new).collect();
            let mut model: Vec<NodeId> = Vec::new();

            for op in ops {
                match op {
                    Op::Add(id) => {
                        let stub = &stubs[(id - 1) as usize];
                        outputs.add(NodeId(0), &dyn_target(stub)).unwrap();
                        model.push(NodeId(id));
                    }
                    Op::Remove(id) => {
                        let removed = outputs.remove(NodeId(id));
                        let pos = model.iter().position(|n| *n == NodeId(id));
                        prop_assert_eq!(removed, pos.is_some());
                        if let Some(pos) = pos {
                            model.remove(pos);
                        }
                    }
                }
            }

            prop_assert_eq!(outputs.ids(), model);
        }
    }
}
