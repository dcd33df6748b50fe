//! HTTP MJPEG / snapshot frame source.
//!
//! Network cameras that expose a multipart MJPEG stream or a single-JPEG
//! snapshot endpoint. The content type of the first response decides the
//! mode: `multipart/*` is parsed as a continuous stream, anything else is
//! re-fetched per frame.

use std::io::Read;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use url::Url;

use super::{frame_interval, health_grace, FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

enum Mode {
    /// Long-lived multipart stream; frames scanned out of the byte feed.
    Stream(JpegScanner),
    /// Snapshot endpoint; one HTTP round trip per frame.
    Snapshot,
}

/// HTTP MJPEG / snapshot source.
pub struct MjpegSource {
    config: SourceConfig,
    mode: Option<Mode>,
    connected_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    frame_count: u64,
    last_error: Option<String>,
}

impl MjpegSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse mjpeg url")?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported mjpeg scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        Ok(Self {
            config,
            mode: None,
            connected_at: None,
            last_frame_at: None,
            frame_count: 0,
            last_error: None,
        })
    }

    fn fetch_snapshot(url: &str) -> Result<Vec<u8>> {
        let response = ureq::get(url)
            .call()
            .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take((MAX_JPEG_BYTES + 1) as u64)
            .read_to_end(&mut bytes)
            .context("read jpeg snapshot")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty jpeg snapshot"));
        }
        if bytes.len() > MAX_JPEG_BYTES {
            return Err(anyhow!("jpeg snapshot exceeded {} bytes", MAX_JPEG_BYTES));
        }
        Ok(bytes)
    }

    fn decode(jpeg: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
        let img = image::load_from_memory(jpeg).context("decode jpeg frame")?;
        let (width, height) = img.dimensions();
        Ok((img.into_rgb8().into_raw(), width, height))
    }
}

impl FrameSource for MjpegSource {
    fn connect(&mut self) -> Result<()> {
        let response = ureq::get(&self.config.url)
            .call()
            .context("connect to mjpeg endpoint")?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        self.mode = if content_type.contains("multipart") {
            log::info!("MjpegSource: streaming from {}", self.config.url);
            Some(Mode::Stream(JpegScanner::new(response.into_reader())))
        } else {
            log::info!("MjpegSource: polling snapshots from {}", self.config.url);
            Some(Mode::Snapshot)
        };
        self.connected_at = Some(Instant::now());
        self.last_error = None;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let mode = self
            .mode
            .as_mut()
            .ok_or_else(|| anyhow!("mjpeg source not connected; call connect() first"))?;
        let min_interval = frame_interval(self.config.target_fps);

        loop {
            let jpeg = match mode {
                Mode::Stream(scanner) => scanner.next_jpeg(),
                Mode::Snapshot => Self::fetch_snapshot(&self.config.url),
            };
            let jpeg = match jpeg {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.last_error = Some(e.to_string());
                    return Err(e);
                }
            };

            // Decimate to the target rate; extra stream frames are dropped.
            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    if matches!(mode, Mode::Snapshot) {
                        std::thread::sleep(min_interval - now.duration_since(last));
                    } else {
                        continue;
                    }
                }
            }

            let (pixels, width, height) = Self::decode(&jpeg)?;
            self.frame_count += 1;
            self.last_frame_at = Some(Instant::now());
            return Frame::new(pixels, width, height, self.frame_count);
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= health_grace(self.config.target_fps)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

/// Scans complete JPEG images (SOI..EOI) out of a multipart byte stream.
struct JpegScanner {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl JpegScanner {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            // Cap the scan buffer; keep the tail so a marker split across
            // reads is not lost.
            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let drain_len = self.buffer.len() - JPEG_SOI.len();
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn find_jpeg(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == JPEG_SOI)?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == JPEG_EOI)
        .map(|p| start + 2 + p + 2)?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_jpeg_locates_marker_bounds() {
        let mut data = vec![0x01, 0x02];
        data.extend_from_slice(&JPEG_SOI);
        data.extend_from_slice(&[0xAA, 0xBB]);
        data.extend_from_slice(&JPEG_EOI);
        data.push(0x03);
        let (start, end) = find_jpeg(&data).expect("jpeg bounds");
        assert_eq!(start, 2);
        assert_eq!(end, data.len() - 1);
        assert_eq!(&data[start..start + 2], &JPEG_SOI);
        assert_eq!(&data[end - 2..end], &JPEG_EOI);
    }

    #[test]
    fn find_jpeg_requires_complete_image() {
        let mut data = Vec::new();
        data.extend_from_slice(&JPEG_SOI);
        data.extend_from_slice(&[0xAA; 16]);
        assert!(find_jpeg(&data).is_none());
    }

    #[test]
    fn scanner_extracts_consecutive_frames() -> Result<()> {
        let mut feed = Vec::new();
        for fill in [0x11u8, 0x22] {
            feed.extend_from_slice(&JPEG_SOI);
            feed.extend_from_slice(&[fill; 8]);
            feed.extend_from_slice(&JPEG_EOI);
        }
        let mut scanner = JpegScanner::new(Box::new(std::io::Cursor::new(feed)));
        let first = scanner.next_jpeg()?;
        let second = scanner.next_jpeg()?;
        assert_eq!(first[2], 0x11);
        assert_eq!(second[2], 0x22);
        Ok(())
    }

    #[test]
    fn new_rejects_non_http_scheme() {
        let config = SourceConfig {
            url: "rtsp://camera".to_string(),
            ..SourceConfig::default()
        };
        assert!(MjpegSource::new(config).is_err());
    }
}
