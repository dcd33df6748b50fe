//! Threaded capture helper.
//!
//! A producer thread drains the source as fast as it delivers, keeping
//! only the newest frame behind a mutex, so readers always get the most
//! recent capture instead of a backlog. An optional consumer thread
//! composites the annotation overlay onto the live frame and emits it as
//! a preview JPEG and/or an AVI recording.
//!
//! Source errors degrade to `FrameValidity::Invalid` on the shared state;
//! the producer keeps retrying rather than tearing the stream down.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use super::{frame_interval, FrameSource};
use crate::annotate::Overlay;
use crate::frame::{Frame, FrameValidity};
use crate::record::{encode_jpeg, AviWriter};

const ERROR_BACKOFF: Duration = Duration::from_millis(200);

/// Stream behavior knobs.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Downscale applied to every captured frame (percent, 100 = none).
    pub scale_percent: u32,
    /// Rate at which the preview/recording consumer emits frames.
    pub consume_fps: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            scale_percent: 100,
            consume_fps: 24,
        }
    }
}

/// Preview/recording outputs for the consumer thread.
pub struct PreviewSink {
    /// Destination for the live preview JPEG, replaced atomically.
    pub preview_path: Option<PathBuf>,
    /// Downscale target for the preview JPEG only.
    pub preview_size: Option<(u32, u32)>,
    /// Video recording; finished when the stream stops.
    pub video: Option<AviWriter>,
}

struct Shared {
    frame: Option<Frame>,
    validity: FrameValidity,
    overlay: Overlay,
}

/// Always-fresh frame feed over a capture source.
pub struct VideoStream {
    shared: Arc<Mutex<Shared>>,
    stop: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
    consumer: Option<JoinHandle<()>>,
    width: u32,
    height: u32,
    consume_fps: u32,
}

impl VideoStream {
    /// Connect the source, capture one frame to learn the processed
    /// geometry, and start the producer thread.
    pub fn start(mut source: Box<dyn FrameSource>, config: StreamConfig) -> Result<Self> {
        source.connect().context("connect capture source")?;
        let first = source
            .next_frame()
            .context("capture initial frame")?
            .rescaled(config.scale_percent);
        let (width, height) = (first.width, first.height);

        let shared = Arc::new(Mutex::new(Shared {
            frame: Some(first),
            validity: FrameValidity::Valid,
            overlay: Overlay::new(width, height),
        }));
        let stop = Arc::new(AtomicBool::new(false));

        let producer = {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            let scale = config.scale_percent;
            std::thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    match source.next_frame() {
                        Ok(frame) => {
                            let frame = frame.rescaled(scale);
                            // A frame from a degraded transport may be
                            // stale or torn; flag it rather than trust it.
                            let validity = if source.is_healthy() {
                                FrameValidity::Valid
                            } else {
                                FrameValidity::Unknown
                            };
                            if let Ok(mut state) = shared.lock() {
                                state.frame = Some(frame);
                                state.validity = validity;
                            }
                        }
                        Err(err) => {
                            log::warn!("frame capture failed: {:#}", err);
                            if let Ok(mut state) = shared.lock() {
                                state.validity = FrameValidity::Invalid;
                            }
                            std::thread::sleep(ERROR_BACKOFF);
                        }
                    }
                }
                log::debug!(
                    "capture producer stopped after {} frames",
                    source.stats().frames_captured
                );
            })
        };

        Ok(Self {
            shared,
            stop,
            producer: Some(producer),
            consumer: None,
            width,
            height,
            consume_fps: config.consume_fps,
        })
    }

    /// Start the preview/recording consumer thread.
    pub fn start_preview(&mut self, mut sink: PreviewSink) -> Result<()> {
        if self.consumer.is_some() {
            return Err(anyhow!("preview consumer already running"));
        }
        let shared = Arc::clone(&self.shared);
        let stop = Arc::clone(&self.stop);
        let interval = frame_interval(self.consume_fps.max(1));

        let handle = std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let snapshot = shared.lock().ok().and_then(|state| {
                    if !state.validity.is_usable() {
                        return None;
                    }
                    state
                        .frame
                        .clone()
                        .map(|frame| (frame, state.overlay.clone()))
                });

                if let Some((frame, overlay)) = snapshot {
                    let composited = overlay.blend_over(&frame);
                    if let Some(path) = &sink.preview_path {
                        if let Err(err) = write_preview(path, &composited, sink.preview_size) {
                            log::warn!("preview write failed: {:#}", err);
                        }
                    }
                    if let Some(video) = sink.video.as_mut() {
                        let appended = encode_jpeg(&composited)
                            .and_then(|jpeg| video.write_frame(&jpeg));
                        if let Err(err) = appended {
                            log::warn!("video frame write failed: {:#}", err);
                        }
                    }
                }
                std::thread::sleep(interval);
            }
            if let Some(video) = sink.video.take() {
                let frames = video.frame_count();
                match video.finish() {
                    Ok(()) => log::info!("recording finished, {} frames", frames),
                    Err(err) => log::warn!("failed to finalize recording: {:#}", err),
                }
            }
        });
        self.consumer = Some(handle);
        Ok(())
    }

    /// Latest validity flag and frame, if any.
    pub fn read(&self) -> (FrameValidity, Option<Frame>) {
        match self.shared.lock() {
            Ok(state) => (state.validity, state.frame.clone()),
            Err(_) => (FrameValidity::Invalid, None),
        }
    }

    /// Mutate the annotation overlay under the stream lock.
    pub fn with_overlay<F: FnOnce(&mut Overlay)>(&self, f: F) {
        if let Ok(mut state) = self.shared.lock() {
            f(&mut state.overlay);
        }
    }

    /// Replace the overlay wholesale.
    pub fn set_overlay(&self, overlay: Overlay) {
        if let Ok(mut state) = self.shared.lock() {
            state.overlay = overlay;
        }
    }

    /// Post-scale frame geometry.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Signal both threads and wait for them to exit.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                log::warn!("capture producer panicked");
            }
        }
        if let Some(handle) = self.consumer.take() {
            if handle.join().is_err() {
                log::warn!("preview consumer panicked");
            }
        }
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn write_preview(path: &PathBuf, frame: &Frame, size: Option<(u32, u32)>) -> Result<()> {
    let frame = match size {
        Some((w, h)) => frame.clone().resized(w, h),
        None => frame.clone(),
    };
    let jpeg = encode_jpeg(&frame)?;
    // Write-then-rename so readers never observe a partial JPEG.
    let tmp = path.with_extension("jpg.tmp");
    std::fs::write(&tmp, &jpeg).with_context(|| format!("write preview {}", tmp.display()))?;
    std::fs::rename(&tmp, path).context("publish preview")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{SourceConfig, SourceStats, SyntheticSource};
    use tempfile::tempdir;

    /// Delivers frames but always reports a degraded transport.
    struct DegradedSource {
        frames: u64,
    }

    impl FrameSource for DegradedSource {
        fn connect(&mut self) -> Result<()> {
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Frame> {
            self.frames += 1;
            std::thread::sleep(Duration::from_millis(5));
            Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, self.frames)
        }

        fn is_healthy(&self) -> bool {
            false
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.frames,
                source: "degraded".to_string(),
            }
        }
    }

    fn stream(scale_percent: u32) -> VideoStream {
        let source = SyntheticSource::new(SourceConfig {
            url: "stub://test".to_string(),
            target_fps: 0,
            width: 64,
            height: 48,
        });
        VideoStream::start(
            Box::new(source),
            StreamConfig {
                scale_percent,
                consume_fps: 30,
            },
        )
        .expect("start stream")
    }

    #[test]
    fn stream_scales_and_serves_fresh_frames() {
        let mut stream = stream(50);
        assert_eq!(stream.dimensions(), (32, 24));
        std::thread::sleep(Duration::from_millis(50));
        let (validity, frame) = stream.read();
        assert!(validity.is_usable());
        let frame = frame.expect("frame available");
        assert_eq!((frame.width, frame.height), (32, 24));
        stream.stop();
        assert!(stream.is_stopped());
    }

    #[test]
    fn preview_and_recording_emit_files() {
        let dir = tempdir().expect("tempdir");
        let preview = dir.path().join("preview.jpg");
        let video_path = dir.path().join("out.avi");

        let mut stream = stream(100);
        let video = AviWriter::new(&video_path, 64, 48, 30).expect("avi writer");
        stream
            .start_preview(PreviewSink {
                preview_path: Some(preview.clone()),
                preview_size: Some((32, 24)),
                video: Some(video),
            })
            .expect("start preview");

        std::thread::sleep(Duration::from_millis(200));
        stream.stop();

        assert!(preview.exists());
        let avi = std::fs::read(&video_path).expect("read avi");
        assert_eq!(&avi[0..4], b"RIFF");
        assert!(avi.windows(4).any(|w| w == b"idx1"));
    }

    #[test]
    fn degraded_source_frames_read_as_unknown() {
        let source = DegradedSource { frames: 0 };
        let mut stream =
            VideoStream::start(Box::new(source), StreamConfig::default()).expect("start stream");
        std::thread::sleep(Duration::from_millis(50));
        let (validity, frame) = stream.read();
        assert_eq!(validity, FrameValidity::Unknown);
        // Still usable for display, just not trusted as complete.
        assert!(validity.is_usable());
        assert!(frame.is_some());
        stream.stop();
    }

    #[test]
    fn overlay_updates_apply_under_lock() {
        let mut stream = stream(100);
        stream.with_overlay(|overlay| overlay.draw_circle(10, 10, 3, [255, 0, 0]));
        let (_, frame) = stream.read();
        assert!(frame.is_some());
        stream.stop();
    }
}
