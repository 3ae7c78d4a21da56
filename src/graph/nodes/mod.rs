//! Concrete graph nodes.

// Forwards `Node` to a `NodeCore` field. Defined ahead of the submodules
// so they can use it.
macro_rules! impl_node {
    ($ty:ty, $($core:ident).+) => {
        impl $crate::graph::Node for $ty {
            fn id(&self) -> $crate::graph::NodeId {
                self.$($core).+.id()
            }

            fn kind(&self) -> $crate::native::NodeKind {
                self.$($core).+.kind()
            }

            fn state(&self) -> $crate::graph::NodeState {
                self.$($core).+.state()
            }

            fn handle(&self) -> $crate::native::NativeHandle {
                self.$($core).+.handle()
            }

            fn destroy(&self, on_queue: bool) {
                self.$($core).+.destroy(on_queue)
            }

            fn wait_ready(
                &self,
                timeout: std::time::Duration,
            ) -> $crate::error::Result<$crate::native::NativeHandle> {
                self.$($core).+.wait_ready(timeout)
            }
        }
    };
}

pub mod filter;
pub mod raw_input;
pub mod raw_output;
pub mod view;

pub use filter::Filter;
pub use raw_input::{CameraSource, RawInputSource};
pub use raw_output::RawOutputTarget;
pub use view::{display_rect, ViewTarget};
