use image::{ExtendedColorType, GrayImage, ImageEncoder};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame dimensions must be non-zero: {width}x{height}")]
    EmptyDimensions { width: u32, height: u32 },
    #[error("pixel buffer length {actual} does not match {width}x{height}")]
    PixelCount { width: u32, height: u32, actual: usize },
    #[error("png encoding failed: {0}")]
    Encode(String),
}

/// A still frame snapshotted from a camera stream.
///
/// Pixels are 8-bit grayscale, row-major, one byte per pixel. That is the
/// format the QR detector consumes directly; classifiers receive the same
/// frame and convert as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions { width, height });
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(FrameError::PixelCount {
                width,
                height,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A uniformly-filled frame. Handy for drivers that only need valid
    /// dimensions, not image content.
    pub fn filled(width: u32, height: u32, value: u8) -> Result<Self, FrameError> {
        Frame::new(width, height, vec![value; width as usize * height as usize])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub(crate) fn to_luma(&self) -> GrayImage {
        // Cannot fail: the constructor validated the buffer length.
        GrayImage::from_raw(self.width, self.height, self.pixels.clone())
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Encodes the frame as a PNG still image.
    pub fn encode_png(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = Vec::new();
        image::codecs::png::PngEncoder::new(&mut buf)
            .write_image(&self.pixels, self.width, self.height, ExtendedColorType::L8)
            .map_err(|source| FrameError::Encode(source.to_string()))?;
        Ok(buf)
    }
}
