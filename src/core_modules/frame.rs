// THEORY:
// A `FrameBuffer` is one captured camera frame: row-major RGBA bytes plus its
// dimensions. Construction is the single place where the `len == w * h * 4`
// invariant is checked, so everything downstream (sampler, calibration) can
// index rows and pixels without re-validating. A mismatched buffer is a caller
// bug and surfaces as `LaserError::InvalidFrame` rather than a silent skip.

use crate::core_modules::pixel::{CHANNELS, Pixel};
use crate::error::{LaserError, Result};

/// A validated RGBA frame. The sampler only borrows it for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(LaserError::EmptyFrame { width, height });
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(LaserError::InvalidFrame { expected, actual: data.len() });
        }
        Ok(Self { width, height, data })
    }

    /// An all-black, fully opaque frame.
    pub fn black(width: u32, height: u32) -> Result<Self> {
        let mut data = vec![0u8; width as usize * height as usize * CHANNELS];
        for px in data.chunks_exact_mut(CHANNELS) {
            px[3] = 255;
        }
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Number of pixels in the frame.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// The RGBA bytes of row `y`.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * CHANNELS;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Pixel::from(&self.data[i..i + CHANNELS])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Pixel) {
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        let bytes: [u8; CHANNELS] = pixel.into();
        self.data[i..i + CHANNELS].copy_from_slice(&bytes);
    }

    /// Iterates every pixel in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.data.chunks_exact(CHANNELS).map(Pixel::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_length() {
        let err = FrameBuffer::new(10, 10, vec![0u8; 399]).unwrap_err();
        match err {
            LaserError::InvalidFrame { expected, actual } => {
                assert_eq!(expected, 400);
                assert_eq!(actual, 399);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_dimensions() {
        assert!(matches!(
            FrameBuffer::new(0, 4, Vec::new()),
            Err(LaserError::EmptyFrame { .. })
        ));
    }

    #[test]
    fn set_and_read_pixel() {
        let mut frame = FrameBuffer::black(4, 3).unwrap();
        frame.set_pixel(2, 1, Pixel::rgb(1, 2, 3));
        assert_eq!(frame.pixel(2, 1), Pixel::rgb(1, 2, 3));
        assert_eq!(frame.row(1)[8..12], [1, 2, 3, 255]);
        assert_eq!(frame.pixels().filter(|p| p.green == 2).count(), 1);
    }
}
