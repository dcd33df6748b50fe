//! Daemon configuration.
//!
//! Loaded from an optional JSON file named by `HEADCOUNT_CONFIG`, with
//! environment overrides applied on top and every field defaulted so a
//! bare binary runs against the synthetic source.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pose::KEYPOINTS_PER_PERSON;

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 24;
const DEFAULT_SOURCE_WIDTH: u32 = 1280;
const DEFAULT_SOURCE_HEIGHT: u32 = 720;
const DEFAULT_SCALE_PERCENT: u32 = 100;
const DEFAULT_PREVIEW_PATH: &str = "preview.jpg";
const DEFAULT_PREVIEW_WIDTH: u32 = 512;
const DEFAULT_PREVIEW_HEIGHT: u32 = 384;
const DEFAULT_IMAGE_INTERVAL_SECS: u64 = 1800;
const DEFAULT_IMAGE_DIR: &str = "captured_images";
const DEFAULT_VIDEO_PATH: &str = "output.avi";
const DEFAULT_INFERENCE_INTERVAL_SECS: u64 = 120;
const DEFAULT_POINT_THRESHOLD: usize = 5;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_DEBUG_IMAGE_DIR: &str = "captured_debug_images";
const DEFAULT_DEVICE_NAME: &str = "people-counter";
const DEFAULT_UTC_OFFSET_HOURS: i32 = 8;
/// Debug runs infer every few seconds instead of minutes.
const DEBUG_INTERVAL_SECS: u64 = 5;
/// Capture rate when nothing consumes live frames.
const IDLE_FPS: u32 = 1;

#[derive(Debug, Deserialize, Default)]
struct CounterConfigFile {
    source: Option<SourceConfigFile>,
    preview: Option<PreviewConfigFile>,
    record: Option<RecordConfigFile>,
    inference: Option<InferenceConfigFile>,
    remote: Option<RemoteConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    scale_percent: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PreviewConfigFile {
    enabled: Option<bool>,
    path: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordConfigFile {
    images: Option<bool>,
    image_interval_secs: Option<u64>,
    image_dir: Option<PathBuf>,
    video: Option<bool>,
    video_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    interval_secs: Option<u64>,
    point_threshold: Option<usize>,
    backend: Option<String>,
    model_path: Option<PathBuf>,
    debug: Option<bool>,
    debug_image_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct RemoteConfigFile {
    enabled: Option<bool>,
    base_url: Option<String>,
    device_name: Option<String>,
    time_endpoint: Option<String>,
    utc_offset_hours: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub source: SourceSettings,
    pub preview: PreviewSettings,
    pub record: RecordSettings,
    pub inference: InferenceSettings,
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub scale_percent: u32,
}

#[derive(Debug, Clone)]
pub struct PreviewSettings {
    pub enabled: bool,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct RecordSettings {
    pub images: bool,
    pub image_interval: Duration,
    pub image_dir: PathBuf,
    pub video: bool,
    pub video_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub interval: Duration,
    pub point_threshold: usize,
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub debug: bool,
    pub debug_image_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub device_name: String,
    pub time_endpoint: Option<String>,
    pub utc_offset_hours: i32,
}

impl CounterConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("HEADCOUNT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Self {
        let source = SourceSettings {
            url: file
                .source
                .as_ref()
                .and_then(|source| source.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: file
                .source
                .as_ref()
                .and_then(|source| source.target_fps)
                .unwrap_or(DEFAULT_SOURCE_FPS),
            width: file
                .source
                .as_ref()
                .and_then(|source| source.width)
                .unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: file
                .source
                .as_ref()
                .and_then(|source| source.height)
                .unwrap_or(DEFAULT_SOURCE_HEIGHT),
            scale_percent: file
                .source
                .as_ref()
                .and_then(|source| source.scale_percent)
                .unwrap_or(DEFAULT_SCALE_PERCENT),
        };
        let preview = PreviewSettings {
            enabled: file
                .preview
                .as_ref()
                .and_then(|preview| preview.enabled)
                .unwrap_or(false),
            path: file
                .preview
                .as_ref()
                .and_then(|preview| preview.path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PREVIEW_PATH)),
            width: file
                .preview
                .as_ref()
                .and_then(|preview| preview.width)
                .unwrap_or(DEFAULT_PREVIEW_WIDTH),
            height: file
                .preview
                .as_ref()
                .and_then(|preview| preview.height)
                .unwrap_or(DEFAULT_PREVIEW_HEIGHT),
        };
        let record = RecordSettings {
            images: file
                .record
                .as_ref()
                .and_then(|record| record.images)
                .unwrap_or(true),
            image_interval: Duration::from_secs(
                file.record
                    .as_ref()
                    .and_then(|record| record.image_interval_secs)
                    .unwrap_or(DEFAULT_IMAGE_INTERVAL_SECS),
            ),
            image_dir: file
                .record
                .as_ref()
                .and_then(|record| record.image_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR)),
            video: file
                .record
                .as_ref()
                .and_then(|record| record.video)
                .unwrap_or(false),
            video_path: file
                .record
                .as_ref()
                .and_then(|record| record.video_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_VIDEO_PATH)),
        };
        let inference = InferenceSettings {
            interval: Duration::from_secs(
                file.inference
                    .as_ref()
                    .and_then(|inference| inference.interval_secs)
                    .unwrap_or(DEFAULT_INFERENCE_INTERVAL_SECS),
            ),
            point_threshold: file
                .inference
                .as_ref()
                .and_then(|inference| inference.point_threshold)
                .unwrap_or(DEFAULT_POINT_THRESHOLD),
            backend: file
                .inference
                .as_ref()
                .and_then(|inference| inference.backend.clone())
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: file
                .inference
                .as_ref()
                .and_then(|inference| inference.model_path.clone()),
            debug: file
                .inference
                .as_ref()
                .and_then(|inference| inference.debug)
                .unwrap_or(false),
            debug_image_dir: file
                .inference
                .as_ref()
                .and_then(|inference| inference.debug_image_dir.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEBUG_IMAGE_DIR)),
        };
        let remote = RemoteSettings {
            enabled: file
                .remote
                .as_ref()
                .and_then(|remote| remote.enabled)
                .unwrap_or(false),
            base_url: file.remote.as_ref().and_then(|remote| remote.base_url.clone()),
            device_name: file
                .remote
                .as_ref()
                .and_then(|remote| remote.device_name.clone())
                .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string()),
            time_endpoint: file
                .remote
                .as_ref()
                .and_then(|remote| remote.time_endpoint.clone()),
            utc_offset_hours: file
                .remote
                .and_then(|remote| remote.utc_offset_hours)
                .unwrap_or(DEFAULT_UTC_OFFSET_HOURS),
        };
        Self {
            source,
            preview,
            record,
            inference,
            remote,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("HEADCOUNT_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(name) = std::env::var("HEADCOUNT_DEVICE_NAME") {
            if !name.trim().is_empty() {
                self.remote.device_name = name;
            }
        }
        if let Ok(url) = std::env::var("HEADCOUNT_DB_URL") {
            if !url.trim().is_empty() {
                self.remote.base_url = Some(url);
                self.remote.enabled = true;
            }
        }
        if let Ok(scale) = std::env::var("HEADCOUNT_SCALE_PERCENT") {
            let percent: u32 = scale
                .parse()
                .map_err(|_| anyhow!("HEADCOUNT_SCALE_PERCENT must be an integer percentage"))?;
            self.source.scale_percent = percent;
        }
        if let Ok(debug) = std::env::var("HEADCOUNT_DEBUG") {
            self.inference.debug = matches!(debug.trim(), "1" | "true" | "yes");
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.scale_percent == 0 || self.source.scale_percent > 100 {
            return Err(anyhow!("scale_percent must be within 1..=100"));
        }
        if self.inference.point_threshold == 0
            || self.inference.point_threshold > KEYPOINTS_PER_PERSON
        {
            return Err(anyhow!(
                "point_threshold must be within 1..={}",
                KEYPOINTS_PER_PERSON
            ));
        }
        match self.inference.backend.as_str() {
            "stub" => {}
            "tract" => {
                if self.inference.model_path.is_none() {
                    return Err(anyhow!("tract backend requires inference.model_path"));
                }
            }
            other => return Err(anyhow!("unknown pose backend '{}'", other)),
        }
        if self.remote.enabled && self.remote.base_url.is_none() {
            return Err(anyhow!("remote.enabled requires remote.base_url"));
        }

        // Debug runs are short interactive sessions: tight cadence,
        // separate image directory, no remote pushes.
        if self.inference.debug {
            self.inference.interval = Duration::from_secs(DEBUG_INTERVAL_SECS);
            self.record.image_interval = Duration::from_secs(DEBUG_INTERVAL_SECS);
            self.record.image_dir = self.inference.debug_image_dir.clone();
            self.remote.enabled = false;
        }

        // With no preview or recording consumer there is no reason to
        // capture at full rate.
        if !self.preview.enabled && !self.record.video {
            self.source.target_fps = self.source.target_fps.min(IDLE_FPS);
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
