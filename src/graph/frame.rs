//! Video frame types.
//!
//! A [`Frame`] is the unit that travels along graph edges. Pixel data is
//! tightly packed RGBA behind an `Arc`, so fan-out to several targets
//! clones a pointer rather than the buffer.

use crate::error::{GraphError, Result};
use std::fmt;
use std::sync::Arc;

/// Bytes per RGBA pixel.
pub const RGBA_BYTES: usize = 4;

/// Orientation applied to a frame at upload time.
///
/// Discriminants are the integer codes used by callers of
/// `set_rotation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    NoRotation = 0,
    RotateLeft = 1,
    RotateRight = 2,
    FlipVertical = 3,
    FlipHorizontal = 4,
    RotateRightFlipVertical = 5,
    RotateRightFlipHorizontal = 6,
    Rotate180 = 7,
}

impl Rotation {
    /// Whether output width and height are swapped relative to the input.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Rotation::RotateLeft
                | Rotation::RotateRight
                | Rotation::RotateRightFlipVertical
                | Rotation::RotateRightFlipHorizontal
        )
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Rotation {
    type Error = GraphError;

    fn try_from(code: i32) -> Result<Self> {
        Ok(match code {
            0 => Rotation::NoRotation,
            1 => Rotation::RotateLeft,
            2 => Rotation::RotateRight,
            3 => Rotation::FlipVertical,
            4 => Rotation::FlipHorizontal,
            5 => Rotation::RotateRightFlipVertical,
            6 => Rotation::RotateRightFlipHorizontal,
            7 => Rotation::Rotate180,
            other => {
                return Err(GraphError::InvalidFrame(format!(
                    "unknown rotation code {}",
                    other
                )))
            }
        })
    }
}

/// A single RGBA video frame.
#[derive(Clone)]
pub struct Frame {
    /// Tightly packed RGBA pixels, `width * height * 4` bytes
    pub data: Arc<[u8]>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Orientation the native layer applied at upload
    pub rotation: Rotation,
    /// Milliseconds since the owning context started
    pub timestamp: i64,
}

impl Frame {
    /// Build a frame from a strided RGBA buffer, dropping row padding.
    ///
    /// `stride` is in bytes and must be at least `width * 4`.
    pub fn from_rgba(
        pixels: &[u8],
        width: u32,
        height: u32,
        stride: usize,
        timestamp: i64,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GraphError::InvalidFrame(format!(
                "empty frame {}x{}",
                width, height
            )));
        }
        let too_large = || {
            GraphError::InvalidFrame(format!(
                "{}x{} with stride {} does not fit in memory",
                width, height, stride
            ))
        };
        let row = (width as usize)
            .checked_mul(RGBA_BYTES)
            .ok_or_else(too_large)?;
        if stride < row {
            return Err(GraphError::InvalidFrame(format!(
                "stride {} smaller than row size {}",
                stride, row
            )));
        }
        row.checked_mul(height as usize).ok_or_else(too_large)?;
        let needed = stride
            .checked_mul(height as usize - 1)
            .and_then(|n| n.checked_add(row))
            .ok_or_else(too_large)?;
        if pixels.len() < needed {
            return Err(GraphError::InvalidFrame(format!(
                "buffer holds {} bytes, {}x{} with stride {} needs {}",
                pixels.len(),
                width,
                height,
                stride,
                needed
            )));
        }

        let data: Arc<[u8]> = if stride == row {
            Arc::from(&pixels[..row * height as usize])
        } else {
            let mut packed = Vec::with_capacity(row * height as usize);
            for y in 0..height as usize {
                packed.extend_from_slice(&pixels[y * stride..y * stride + row]);
            }
            Arc::from(packed)
        };

        Ok(Self {
            data,
            width,
            height,
            rotation: Rotation::NoRotation,
            timestamp,
        })
    }

    /// Wrap an already packed RGBA buffer.
    pub fn from_packed(data: Vec<u8>, width: u32, height: u32, timestamp: i64) -> Result<Self> {
        Self::from_rgba(&data, width, height, width as usize * RGBA_BYTES, timestamp)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation", &self.rotation)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .finish()
    }
}
