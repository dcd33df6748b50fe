//! Frame container and pixel-level helpers.
//!
//! Frames are tightly packed RGB8 buffers produced by a capture source.
//! They are ephemeral: the threaded stream keeps only the newest one, and
//! a slow consumer simply sees stale frames.

use std::time::Instant;

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Validity of the most recent capture attempt.
///
/// `Unknown` marks a frame delivered while the transport reported itself
/// degraded; consumers should treat it like `Valid` for display purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameValidity {
    Valid,
    Unknown,
    Invalid,
}

impl FrameValidity {
    pub fn is_usable(self) -> bool {
        !matches!(self, FrameValidity::Invalid)
    }
}

/// A timestamped RGB frame.
#[derive(Clone)]
pub struct Frame {
    /// Tightly packed RGB8, `width * height * 3` bytes.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic capture instant (staleness checks only, never exported).
    pub captured_at: Instant,
    /// Capture sequence number from the source.
    pub seq: u64,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, seq: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            captured_at: Instant::now(),
            seq,
        })
    }

    /// Rescale to the stated percentage of the original size.
    ///
    /// 100 is an identity pass-through; the frame is returned unchanged.
    pub fn rescaled(self, percent: u32) -> Frame {
        if percent == 100 || percent == 0 {
            return self;
        }
        let width = (self.width * percent / 100).max(1);
        let height = (self.height * percent / 100).max(1);
        self.resized(width, height)
    }

    /// Resample to an exact target size (triangle filter).
    pub fn resized(self, width: u32, height: u32) -> Frame {
        if width == self.width && height == self.height {
            return self;
        }
        let seq = self.seq;
        let captured_at = self.captured_at;
        let img = RgbImage::from_raw(self.width, self.height, self.pixels)
            .unwrap_or_else(|| RgbImage::new(1, 1));
        let resized =
            image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle);
        Frame {
            pixels: resized.into_raw(),
            width,
            height,
            captured_at,
            seq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(vec![value; (width * height * 3) as usize], width, height, 0).unwrap()
    }

    #[test]
    fn new_rejects_wrong_buffer_size() {
        assert!(Frame::new(vec![0u8; 10], 4, 4, 0).is_err());
        assert!(Frame::new(vec![0u8; 48], 4, 4, 0).is_ok());
    }

    #[test]
    fn rescale_halves_dimensions() {
        let frame = solid_frame(64, 32, 200);
        let scaled = frame.rescaled(50);
        assert_eq!((scaled.width, scaled.height), (32, 16));
        assert_eq!(scaled.pixels.len(), 32 * 16 * 3);
        assert!(scaled.pixels.iter().all(|&p| p == 200));
    }

    #[test]
    fn rescale_at_100_is_identity() {
        let frame = solid_frame(8, 8, 10);
        let same = frame.clone().rescaled(100);
        assert_eq!(same.pixels, frame.pixels);
    }
}
