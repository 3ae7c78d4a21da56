//! Native layer seam.
//!
//! Every graph node owns exactly one [`NativeHandle`] into an implementation
//! of [`NativeBackend`]. The backend hides the actual pixel work (smoothing,
//! whitening, reshaping, blending, presentation) behind opaque handles.
//!
//! # Threading contract
//!
//! - `create`, `destroy`, `upload`, `take_output`, `process` and `render`
//!   are only called from the dispatch queue thread.
//! - `set_parameter`, `set_face_landmarks`, `set_rotation`,
//!   `set_raw_output_callback` and `configure_view` may be called from any
//!   thread while a processing pass is running. Implementations must make
//!   those writes atomic relative to a concurrent pass.
//!
//! [`SoftwareBackend`] is the in-process implementation used by the demo
//! binary and the tests.

pub mod convert;
pub mod software;

pub use software::{NativeCall, SoftwareBackend};

use crate::error::Result;
use crate::graph::{Frame, Rotation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque identifier of a native resource. Zero means unbound.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NativeHandle(pub u64);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_bound(self) -> bool {
        !self.is_null()
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "NativeHandle(NULL)")
        } else {
            write!(f, "NativeHandle({:#x})", self.0)
        }
    }
}

/// Built-in pixel transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    /// Skin smoothing and whitening
    BeautyFace,
    /// Face thinning and eye enlargement, driven by landmarks
    FaceReshape,
    /// Lip color blending, driven by landmarks
    Lipstick,
    /// Forwards its input unchanged
    Passthrough,
}

impl FilterKind {
    /// Whether this filter exposes the given knob.
    pub fn supports(self, param: FilterParam) -> bool {
        matches!(
            (self, param),
            (FilterKind::BeautyFace, FilterParam::SmoothLevel)
                | (FilterKind::BeautyFace, FilterParam::WhiteLevel)
                | (FilterKind::FaceReshape, FilterParam::ThinLevel)
                | (FilterKind::FaceReshape, FilterParam::BigeyeLevel)
                | (FilterKind::Lipstick, FilterParam::BlendLevel)
        )
    }

    /// Whether this filter consumes face landmarks.
    pub fn uses_landmarks(self) -> bool {
        matches!(self, FilterKind::FaceReshape | FilterKind::Lipstick)
    }

    pub fn name(self) -> &'static str {
        match self {
            FilterKind::BeautyFace => "BeautyFace",
            FilterKind::FaceReshape => "FaceReshape",
            FilterKind::Lipstick => "Lipstick",
            FilterKind::Passthrough => "Passthrough",
        }
    }
}

/// Tunable filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterParam {
    SmoothLevel,
    WhiteLevel,
    ThinLevel,
    BigeyeLevel,
    BlendLevel,
}

/// Which native constructor a node uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    RawInput,
    Camera,
    Filter(FilterKind),
    RawOutput,
    View,
}

impl NodeKind {
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::RawInput => "RawInput",
            NodeKind::Camera => "Camera",
            NodeKind::Filter(kind) => kind.name(),
            NodeKind::RawOutput => "RawOutput",
            NodeKind::View => "View",
        }
    }
}

/// Byte layout delivered to a raw output callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawFormat {
    /// Planar YUV 4:2:0
    I420,
    /// Packed RGBA
    Pixels,
}

/// Consumer of raw output bytes: `(bytes, width, height, timestamp_ms)`.
pub type RawOutputCallback = Arc<dyn Fn(&[u8], u32, u32, i64) + Send + Sync>;

/// How a frame is fitted into the display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FillMode {
    /// Stretch to fill the view; may distort the image
    Stretch,
    /// Letterbox, keeping the aspect ratio
    #[default]
    PreserveAspectRatio,
    /// Keep the aspect ratio and crop to fill the view
    PreserveAspectRatioAndFill,
}

/// Presentation settings for a display target.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewSettings {
    pub fill_mode: FillMode,
    pub mirror: bool,
    pub view_width: u32,
    pub view_height: u32,
}

/// The opaque native processing layer.
#[cfg_attr(test, mockall::automock)]
pub trait NativeBackend: Send + Sync {
    /// Allocate a resource. Returns a fresh nonzero handle.
    fn create(&self, kind: NodeKind) -> Result<NativeHandle>;

    /// Release a resource. Unknown handles are ignored.
    fn destroy(&self, handle: NativeHandle);

    /// Hand a frame to a source resource.
    fn upload(&self, handle: NativeHandle, frame: Frame) -> Result<()>;

    /// Pop the oldest processed frame of a source, if any.
    fn take_output(&self, handle: NativeHandle) -> Option<Frame>;

    /// Orientation applied to subsequent uploads.
    fn set_rotation(&self, handle: NativeHandle, rotation: Rotation);

    /// Run a filter over one input frame.
    fn process(&self, handle: NativeHandle, input: &Frame) -> Result<Frame>;

    fn set_parameter(&self, handle: NativeHandle, param: FilterParam, value: f32);

    fn set_face_landmarks(&self, handle: NativeHandle, landmarks: &[f32]);

    /// Bind (or clear, with `None`) one of the raw output callbacks.
    fn set_raw_output_callback(
        &self,
        handle: NativeHandle,
        format: RawFormat,
        callback: Option<RawOutputCallback>,
    );

    fn configure_view(&self, handle: NativeHandle, settings: ViewSettings);

    /// Consume a frame in a terminal resource (display or raw output).
    fn render(&self, handle: NativeHandle, input: &Frame) -> Result<()>;
}
