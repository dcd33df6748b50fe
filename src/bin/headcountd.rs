//! headcountd - people counting daemon
//!
//! This daemon:
//! 1. Streams frames from the configured capture source
//! 2. Runs pose estimation on a fixed cadence
//! 3. Counts detected vs suspected people per cycle
//! 4. Annotates a live overlay (keypoints, count banner, wait bar)
//! 5. Pushes counts and periodic stills to the realtime database

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use headcount::annotate::inferring_overlay;
use headcount::clock::WallClock;
use headcount::config::CounterConfig;
use headcount::ui;
use headcount::record::{
    ensure_output_dir, image_file_name, save_annotated_image, AviWriter,
};
use headcount::remote::{HttpRealtimeDb, ImageRecord, ImageStatus, PeopleField, StatusStore};
use headcount::{
    count_people, open_source, person_color, Overlay, PoseBackend, PreviewSink, SourceConfig,
    StreamConfig, VideoStream, ALERT_COLOR, BANNER_COLOR,
};

/// Wait-phase poll granularity.
const WAIT_TICK: Duration = Duration::from_millis(50);
/// Spacing between wait-phase status lines in the log.
const STATUS_INTERVAL: Duration = Duration::from_secs(15);
/// Backoff after an unusable frame before retrying inference.
const RETRY_DELAY: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = CounterConfig::load()?;
    log::info!(
        "headcountd starting: source={} scale={}% backend={} interval={}s remote={}",
        cfg.source.url,
        cfg.source.scale_percent,
        cfg.inference.backend,
        cfg.inference.interval.as_secs(),
        cfg.remote.enabled,
    );
    if cfg.inference.debug {
        log::info!("debug mode: tight cadence, remote pushes disabled");
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            log::info!("shutdown requested");
            stop.store(true, Ordering::Relaxed);
        })
        .context("install ctrl-c handler")?;
    }

    let source = open_source(SourceConfig {
        url: cfg.source.url.clone(),
        target_fps: cfg.source.target_fps,
        width: cfg.source.width,
        height: cfg.source.height,
    })?;
    let mut stream = VideoStream::start(
        source,
        StreamConfig {
            scale_percent: cfg.source.scale_percent,
            consume_fps: cfg.source.target_fps,
        },
    )?;
    let (width, height) = stream.dimensions();
    log::info!("capture running at {}x{}", width, height);

    stream.with_overlay(|overlay| {
        overlay.clear();
        overlay.draw_text_centered("INITIALISING", ALERT_COLOR, 2);
    });

    if cfg.preview.enabled || cfg.record.video {
        let video = if cfg.record.video {
            Some(AviWriter::new(
                &cfg.record.video_path,
                width,
                height,
                cfg.source.target_fps,
            )?)
        } else {
            None
        };
        stream.start_preview(PreviewSink {
            preview_path: cfg.preview.enabled.then(|| cfg.preview.path.clone()),
            preview_size: Some((cfg.preview.width, cfg.preview.height)),
            video,
        })?;
    }

    let backend = build_backend(&cfg, width, height)?;
    {
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("pose backend poisoned"))?;
        log::info!("warming up pose backend '{}'", guard.name());
        guard.warm_up()?;
    }

    let clock = WallClock::new(cfg.remote.time_endpoint.clone(), cfg.remote.utc_offset_hours)?;
    let store = match (&cfg.remote.enabled, &cfg.remote.base_url) {
        (true, Some(base_url)) => Some(HttpRealtimeDb::new(base_url)?),
        _ => None,
    };
    if cfg.record.images {
        ensure_output_dir(&cfg.record.image_dir);
    }

    // No timestamps yet, so the first loop pass infers and records
    // immediately instead of waiting out a full interval.
    let mut last_inference: Option<Instant> = None;
    let mut last_image: Option<Instant> = None;
    let started = Instant::now();
    let mut last_status = Instant::now();

    while !stop.load(Ordering::Relaxed) && !stream.is_stopped() {
        let inference_due = last_inference
            .map_or(true, |at| at.elapsed() >= cfg.inference.interval);

        if inference_due {
            let image_due = cfg.record.images
                && last_image.map_or(true, |at| at.elapsed() >= cfg.record.image_interval);
            match run_cycle(&cfg, &stream, &backend, &clock, store.as_ref(), image_due) {
                Ok(CycleOutcome::Done { image_saved }) => {
                    last_inference = Some(Instant::now());
                    if image_saved {
                        last_image = Some(Instant::now());
                    }
                }
                Ok(CycleOutcome::NoFrame) => {
                    log::warn!("no usable frame, retrying shortly");
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(err) => {
                    log::warn!("inference cycle failed: {:#}", err);
                    last_inference = Some(Instant::now());
                }
            }
            continue;
        }

        // Wait phase: grow the progress bar toward the next inference.
        if let Some(at) = last_inference {
            let fraction =
                at.elapsed().as_secs_f32() / cfg.inference.interval.as_secs_f32().max(0.001);
            stream.with_overlay(|overlay| overlay.draw_wait_bar(fraction, BANNER_COLOR, 4));
            if last_status.elapsed() >= STATUS_INTERVAL {
                let (validity, _) = stream.read();
                log::info!(
                    "{}",
                    ui::status_line(
                        at.elapsed(),
                        cfg.inference.interval,
                        started.elapsed(),
                        validity,
                    )
                );
                last_status = Instant::now();
            }
        }
        std::thread::sleep(WAIT_TICK);
    }

    stream.stop();
    log::info!("headcountd stopped");
    Ok(())
}

enum CycleOutcome {
    Done { image_saved: bool },
    NoFrame,
}

fn run_cycle(
    cfg: &CounterConfig,
    stream: &VideoStream,
    backend: &Arc<Mutex<dyn PoseBackend>>,
    clock: &WallClock,
    store: Option<&HttpRealtimeDb>,
    image_due: bool,
) -> Result<CycleOutcome> {
    let (validity, frame) = stream.read();
    let Some(frame) = frame else {
        return Ok(CycleOutcome::NoFrame);
    };
    if !validity.is_usable() {
        return Ok(CycleOutcome::NoFrame);
    }

    // Model runs can take seconds; show a banner instead of the previous
    // cycle's stale overlay. Replaced by the fresh overlay below.
    stream.set_overlay(inferring_overlay(frame.width, frame.height));

    let estimate = {
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("pose backend poisoned"))?;
        guard
            .estimate(&frame.pixels, frame.width, frame.height)
            .context("pose estimation")?
    };
    let (summary, per_person) = count_people(&estimate, cfg.inference.point_threshold);

    // Redraw the overlay from scratch for this cycle.
    let mut overlay = Overlay::new(frame.width, frame.height);
    let total = estimate.people.len();
    for (index, person) in estimate.people.iter().enumerate() {
        let color = person_color(index, total);
        for keypoint in &person.keypoints {
            if keypoint.is_detected() {
                overlay.draw_circle(keypoint.x as i64, keypoint.y as i64, 3, color);
            }
        }
    }
    overlay.draw_text(
        10,
        10,
        &format!("People Count: {}", summary.detected),
        BANNER_COLOR,
        2,
    );
    stream.set_overlay(overlay.clone());

    log::info!(
        "counted {} people ({} suspected, keypoints {:?})",
        summary.detected,
        summary.suspected,
        per_person,
    );

    let stamp = clock.now_stamp();
    if let Some(store) = store {
        let people = PeopleField::Count(summary.detected as i64);
        if let Err(err) = store.update_count(&cfg.remote.device_name, &stamp, &people) {
            log::warn!("count push failed: {:#}", err);
        }
    }

    let mut image_saved = false;
    if image_due {
        let name = image_file_name(&stamp.date, &stamp.time, summary.detected, summary.suspected);
        let annotated = overlay.blend_over(&frame);
        match save_annotated_image(&cfg.record.image_dir, &name, &annotated) {
            Ok(path) => {
                log::info!("captured still {}", path.display());
                image_saved = true;
                if let Some(store) = store {
                    let record = ImageRecord {
                        date: stamp.date.clone(),
                        time: stamp.time.clone(),
                        image_status: ImageStatus::Available,
                        image_file_name: name,
                    };
                    if let Err(err) = store.update_image_record(&cfg.remote.device_name, &record) {
                        log::warn!("image record push failed: {:#}", err);
                    }
                }
            }
            Err(err) => log::warn!("still capture failed: {:#}", err),
        }
    }

    Ok(CycleOutcome::Done { image_saved })
}

fn build_backend(
    cfg: &CounterConfig,
    width: u32,
    height: u32,
) -> Result<Arc<Mutex<dyn PoseBackend>>> {
    let mut registry = headcount::BackendRegistry::new();
    registry.register(headcount::pose::StubBackend::new());

    #[cfg(feature = "pose-tract")]
    if let Some(model_path) = &cfg.inference.model_path {
        registry.register(headcount::pose::TractBackend::new(model_path, width, height)?);
    }
    #[cfg(not(feature = "pose-tract"))]
    {
        let _ = (width, height);
        if cfg.inference.backend == "tract" {
            return Err(anyhow!(
                "backend 'tract' requires building with the pose-tract feature"
            ));
        }
    }

    registry
        .set_default(&cfg.inference.backend)
        .with_context(|| format!("registered pose backends: {}", registry.list().join(", ")))?;
    registry
        .default_backend()
        .ok_or_else(|| anyhow!("no pose backend registered"))
}
