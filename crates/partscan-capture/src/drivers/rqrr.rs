//! Pull-style QR decoding over still frames using rqrr.

use crate::frame::Frame;
use crate::traits::{DecodeError, QrDecoder};
use async_trait::async_trait;

/// Largest dimension fed into grid detection before downsampling kicks in.
/// Detection cost grows with area; QR finder patterns survive nearest
/// neighbour downsampling well.
const DEFAULT_MAX_DIM: u32 = 1024;

/// QR decoder backed by the `rqrr` grid detector.
///
/// One attempt per frame: prepares the luma image, detects candidate
/// grids, and returns the first payload that decodes to non-empty text.
#[derive(Debug, Clone)]
pub struct RqrrDecoder {
    max_dim: u32,
}

impl RqrrDecoder {
    pub fn new() -> Self {
        Self {
            max_dim: DEFAULT_MAX_DIM,
        }
    }

    /// Overrides the downsampling bound. `0` disables downsampling.
    pub fn with_max_dim(max_dim: u32) -> Self {
        Self { max_dim }
    }
}

impl Default for RqrrDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QrDecoder for RqrrDecoder {
    async fn decode(&self, frame: &Frame) -> Result<Option<String>, DecodeError> {
        let gray = frame.to_luma();
        let (w, h) = (gray.width(), gray.height());

        let gray = if self.max_dim > 0 && (w > self.max_dim || h > self.max_dim) {
            let factor = w.max(h) as f32 / self.max_dim as f32;
            // Extreme aspect ratios truncate the short side to zero
            // without the clamp.
            let new_w = ((w as f32 / factor) as u32).max(1);
            let new_h = ((h as f32 / factor) as u32).max(1);
            image::imageops::resize(&gray, new_w, new_h, image::imageops::FilterType::Nearest)
        } else {
            gray
        };

        let mut prepared = ::rqrr::PreparedImage::prepare(gray);
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_, content)) if !content.is_empty() => return Ok(Some(content)),
                // A detected grid that fails to decode is treated the same
                // as no code: keep scanning on later frames.
                Ok(_) | Err(_) => continue,
            }
        }
        Ok(None)
    }
}
