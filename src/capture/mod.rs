//! Frame capture sources and the threaded stream helper.
//!
//! Sources behind a common trait:
//! - `stub://` synthetic frames (tests, demos, CI)
//! - HTTP MJPEG / JPEG snapshot endpoints (network cameras)
//! - Local still directories or single images replayed as canned video
//! - V4L2 devices (feature: capture-v4l2)
//!
//! Machine-vision SDK cameras stay external; the network source covers
//! their role in deployments where the vendor stack is unavailable.
//!
//! All sources produce `Frame` instances and decimate to a target FPS.
//! Acquisition errors surface as `Result`; the threaded stream degrades
//! them to a frame-validity flag, best-effort, with no retry policy.

use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub mod file;
pub mod mjpeg;
pub mod stream;
pub mod synthetic;
#[cfg(feature = "capture-v4l2")]
pub mod v4l2;

pub use file::StillSource;
pub use mjpeg::MjpegSource;
pub use stream::{PreviewSink, StreamConfig, VideoStream};
pub use synthetic::SyntheticSource;
#[cfg(feature = "capture-v4l2")]
pub use v4l2::V4l2Source;

/// Capture source configuration shared by all transports.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Source locator: `stub://name`, `http(s)://...`, a still directory
    /// or image path, or a `/dev/video*` node.
    pub url: String,
    /// Target frame rate; sources decimate to this.
    pub target_fps: u32,
    /// Preferred capture width.
    pub width: u32,
    /// Preferred capture height.
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 24,
            width: 1280,
            height: 720,
        }
    }
}

/// Statistics reported by a capture source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A camera or canned-video frame producer.
pub trait FrameSource: Send {
    /// Open the transport. Must be called before `next_frame`.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame, blocking until one is available.
    fn next_frame(&mut self) -> Result<Frame>;

    /// True while the source is delivering frames at a plausible rate.
    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Open a source by locator scheme.
pub fn open_source(config: SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    if config.url.starts_with("http://") || config.url.starts_with("https://") {
        return Ok(Box::new(MjpegSource::new(config)?));
    }
    if config.url.starts_with("/dev/") || config.url.starts_with("v4l2://") {
        #[cfg(feature = "capture-v4l2")]
        {
            return Ok(Box::new(V4l2Source::new(config)?));
        }
        #[cfg(not(feature = "capture-v4l2"))]
        {
            return Err(anyhow!(
                "source '{}' requires the capture-v4l2 feature",
                config.url
            ));
        }
    }
    if config.url.contains("://") {
        return Err(anyhow!("unsupported source scheme in '{}'", config.url));
    }
    Ok(Box::new(StillSource::new(config)?))
}

/// Minimum spacing between frames at the target FPS.
pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

/// How long a source may go without a frame before it reads as unhealthy.
pub(crate) fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}
