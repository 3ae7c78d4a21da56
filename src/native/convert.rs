//! Pixel layout conversions used by the software backend.
//!
//! - RGBA → I420 and back, BT.601 limited range, integer arithmetic
//! - RGBA rotation and flips for the eight [`Rotation`] modes
//!
//! Chroma planes are `ceil(w/2) x ceil(h/2)`; odd edges average only the
//! pixels that exist.

use crate::error::{GraphError, Result};
use crate::graph::Rotation;

/// Size in bytes of an I420 buffer for the given dimensions.
pub fn i420_len(width: u32, height: u32) -> usize {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    w * h + 2 * cw * ch
}

#[inline]
fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16) as u8
}

#[inline]
fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128) as u8
}

#[inline]
fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128) as u8
}

/// Convert packed RGBA to planar I420 (Y, then U, then V).
pub fn rgba_to_i420(rgba: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let mut out = vec![0u8; i420_len(width, height)];
    let (y_plane, uv) = out.split_at_mut(w * h);
    let (u_plane, v_plane) = uv.split_at_mut(cw * ch);

    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) * 4;
            y_plane[y * w + x] = luma(rgba[i] as i32, rgba[i + 1] as i32, rgba[i + 2] as i32);
        }
    }

    for cy in 0..ch {
        for cx in 0..cw {
            let (mut r, mut g, mut b, mut n) = (0i32, 0i32, 0i32, 0i32);
            for y in (cy * 2)..((cy * 2 + 2).min(h)) {
                for x in (cx * 2)..((cx * 2 + 2).min(w)) {
                    let i = (y * w + x) * 4;
                    r += rgba[i] as i32;
                    g += rgba[i + 1] as i32;
                    b += rgba[i + 2] as i32;
                    n += 1;
                }
            }
            let (r, g, b) = (r / n, g / n, b / n);
            u_plane[cy * cw + cx] = chroma_u(r, g, b);
            v_plane[cy * cw + cx] = chroma_v(r, g, b);
        }
    }

    out
}

/// Convert planar I420 back to packed RGBA with opaque alpha.
///
/// Fails with `InvalidFrame` if `i420` is shorter than [`i420_len`].
pub fn i420_to_rgba(i420: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let needed = i420_len(width, height);
    if i420.len() < needed {
        return Err(GraphError::InvalidFrame(format!(
            "I420 buffer holds {} bytes, {}x{} needs {}",
            i420.len(),
            width,
            height,
            needed
        )));
    }
    let y_plane = &i420[..w * h];
    let u_plane = &i420[w * h..w * h + cw * ch];
    let v_plane = &i420[w * h + cw * ch..needed];
    let mut out = vec![0u8; w * h * 4];

    for y in 0..h {
        for x in 0..w {
            let c = y_plane[y * w + x] as i32 - 16;
            let d = u_plane[(y / 2) * cw + x / 2] as i32 - 128;
            let e = v_plane[(y / 2) * cw + x / 2] as i32 - 128;
            let i = (y * w + x) * 4;
            out[i] = ((298 * c + 409 * e + 128) >> 8).clamp(0, 255) as u8;
            out[i + 1] = ((298 * c - 100 * d - 208 * e + 128) >> 8).clamp(0, 255) as u8;
            out[i + 2] = ((298 * c + 516 * d + 128) >> 8).clamp(0, 255) as u8;
            out[i + 3] = 255;
        }
    }

    Ok(out)
}

/// Rotate or flip a packed RGBA buffer. Returns the new buffer and its
/// dimensions.
pub fn rotate_rgba(rgba: &[u8], width: u32, height: u32, rotation: Rotation) -> (Vec<u8>, u32, u32) {
    if rotation == Rotation::NoRotation {
        return (rgba.to_vec(), width, height);
    }

    let (w, h) = (width as usize, height as usize);
    let (dw, dh) = if rotation.swaps_dimensions() { (h, w) } else { (w, h) };

    // Maps a destination coordinate to its source coordinate.
    let source = |x: usize, y: usize| -> (usize, usize) {
        match rotation {
            Rotation::NoRotation => (x, y),
            Rotation::RotateLeft => (w - 1 - y, x),
            Rotation::RotateRight => (y, h - 1 - x),
            Rotation::FlipVertical => (x, h - 1 - y),
            Rotation::FlipHorizontal => (w - 1 - x, y),
            Rotation::RotateRightFlipVertical => (w - 1 - y, h - 1 - x),
            Rotation::RotateRightFlipHorizontal => (y, x),
            Rotation::Rotate180 => (w - 1 - x, h - 1 - y),
        }
    };

    let mut out = vec![0u8; dw * dh * 4];
    for y in 0..dh {
        for x in 0..dw {
            let (sx, sy) = source(x, y);
            let s = (sy * w + sx) * 4;
            let d = (y * dw + x) * 4;
            out[d..d + 4].copy_from_slice(&rgba[s..s + 4]);
        }
    }

    (out, dw as u32, dh as u32)
}
