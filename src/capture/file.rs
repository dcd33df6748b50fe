//! Canned-video frame source: local stills replayed at a target FPS.
//!
//! Accepts either a directory of JPEG/PNG stills (played in name order,
//! looping) or a single image (repeated). This is the canned-input path
//! used when no camera is attached.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;

use super::{frame_interval, FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

const STILL_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Local still-image frame source.
pub struct StillSource {
    config: SourceConfig,
    stills: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

impl StillSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(anyhow!("still source path is empty"));
        }
        Ok(Self {
            config,
            stills: Vec::new(),
            cursor: 0,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    fn scan(path: &Path) -> Result<Vec<PathBuf>> {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }
        let entries = std::fs::read_dir(path)
            .with_context(|| format!("read still directory {}", path.display()))?;
        let mut stills: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| STILL_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        stills.sort();
        if stills.is_empty() {
            return Err(anyhow!("no JPEG/PNG stills under {}", path.display()));
        }
        Ok(stills)
    }
}

impl FrameSource for StillSource {
    fn connect(&mut self) -> Result<()> {
        self.stills = Self::scan(Path::new(&self.config.url))?;
        log::info!(
            "StillSource: {} stills from {}",
            self.stills.len(),
            self.config.url
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.stills.is_empty() {
            return Err(anyhow!("still source not connected; call connect() first"));
        }

        // Pace playback to the target FPS.
        if let Some(last) = self.last_frame_at {
            let min_interval = frame_interval(self.config.target_fps);
            let elapsed = last.elapsed();
            if elapsed < min_interval {
                std::thread::sleep(min_interval - elapsed);
            }
        }

        let path = &self.stills[self.cursor];
        self.cursor = (self.cursor + 1) % self.stills.len();

        let img = image::open(path)
            .with_context(|| format!("decode still {}", path.display()))
            .map_err(|e| {
                self.last_error = Some(e.to_string());
                e
            })?;
        let (width, height) = img.dimensions();
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        self.last_error = None;
        Frame::new(img.into_rgb8().into_raw(), width, height, self.frame_count)
    }

    fn is_healthy(&self) -> bool {
        !self.stills.is_empty() && self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::tempdir;

    fn write_still(dir: &Path, name: &str, value: u8) {
        let img = RgbImage::from_pixel(8, 6, image::Rgb([value, value, value]));
        img.save(dir.join(name)).expect("write still");
    }

    #[test]
    fn still_source_loops_in_name_order() -> Result<()> {
        let dir = tempdir()?;
        write_still(dir.path(), "b.png", 200);
        write_still(dir.path(), "a.png", 50);

        let config = SourceConfig {
            url: dir.path().display().to_string(),
            target_fps: 0,
            width: 8,
            height: 6,
        };
        let mut source = StillSource::new(config)?;
        source.connect()?;

        let first = source.next_frame()?;
        let second = source.next_frame()?;
        let third = source.next_frame()?;
        assert_eq!(first.pixels[0], 50);
        assert_eq!(second.pixels[0], 200);
        // Loops back to the first still.
        assert_eq!(third.pixels[0], 50);
        Ok(())
    }

    #[test]
    fn connect_fails_on_empty_directory() -> Result<()> {
        let dir = tempdir()?;
        let config = SourceConfig {
            url: dir.path().display().to_string(),
            ..SourceConfig::default()
        };
        let mut source = StillSource::new(config)?;
        assert!(source.connect().is_err());
        Ok(())
    }
}
