//! Test data builders for frames

/// Builder for RGBA test buffers
pub struct FrameBuilder {
    width: u32,
    height: u32,
    padding: usize,
    fill: [u8; 4],
}

impl FrameBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            padding: 0,
            fill: [0x80, 0x40, 0x20, 0xff],
        }
    }

    /// Extra bytes at the end of each row
    pub fn padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn fill(mut self, rgba: [u8; 4]) -> Self {
        self.fill = rgba;
        self
    }

    pub fn stride(&self) -> usize {
        self.width as usize * 4 + self.padding
    }

    /// Pixel buffer and its stride
    pub fn build(self) -> (Vec<u8>, usize) {
        let stride = self.stride();
        let mut buf = Vec::with_capacity(stride * self.height as usize);
        for _ in 0..self.height {
            for _ in 0..self.width {
                buf.extend_from_slice(&self.fill);
            }
            buf.resize(buf.len() + self.padding, 0);
        }
        (buf, stride)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_builder() {
        let (buf, stride) = FrameBuilder::new(3, 2).padding(4).build();
        assert_eq!(stride, 16);
        assert_eq!(buf.len(), 32);
        assert_eq!(&buf[0..4], &[0x80, 0x40, 0x20, 0xff]);
        assert_eq!(&buf[12..16], &[0, 0, 0, 0]);
    }
}
