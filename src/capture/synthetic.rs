//! Synthetic (`stub://`) frame source for tests and demos.

use std::time::Instant;

use anyhow::Result;

use super::{frame_interval, FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

/// Deterministic synthetic source.
///
/// Generates a slowly shifting gradient with a bright moving block, so
/// preview output and recordings visibly advance frame to frame.
pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            last_frame_at: None,
        }
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut pixels = vec![0u8; width * height * 3];

        let phase = (self.frame_count % 256) as usize;
        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) * 3;
                pixels[idx] = ((x + phase) % 256) as u8;
                pixels[idx + 1] = ((y + phase / 2) % 256) as u8;
                pixels[idx + 2] = 40;
            }
        }

        // Moving block simulating a subject walking across the scene.
        let block = (width / 8).max(1);
        let bx = (self.frame_count as usize * 3) % width.saturating_sub(block).max(1);
        let by = height / 3;
        for y in by..(by + block * 2).min(height) {
            for x in bx..(bx + block).min(width) {
                let idx = (y * width + x) * 3;
                pixels[idx] = 230;
                pixels[idx + 1] = 230;
                pixels[idx + 2] = 230;
            }
        }

        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        // Pace to the target FPS so the producer thread does not spin.
        if let Some(last) = self.last_frame_at {
            let min_interval = frame_interval(self.config.target_fps);
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                std::thread::sleep(min_interval - elapsed);
            }
        }
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        let pixels = self.generate_pixels();
        Frame::new(pixels, self.config.width, self.config.height, self.frame_count)
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
