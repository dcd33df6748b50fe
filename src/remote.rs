//! Realtime-database client and status schema.
//!
//! Each device owns one document keyed by its name, updated over a
//! Firebase-style REST surface: `PATCH {base}/{device}.json` merges
//! fields, `GET {base}/.json` returns the whole tree. The `people` field
//! is a count while fresh and a sentinel string once the logger has
//! consumed it, so a stalled counter is visible as `WAITING` aging into
//! the log instead of a repeated stale number.

use std::collections::BTreeMap;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Sentinel written by the logger after consuming a count.
pub const PEOPLE_WAITING: &str = "WAITING";
/// Sentinel written when a device never replaced the previous sentinel.
pub const PEOPLE_FAILED: &str = "FAILED";

const CONNECTIVITY_PROBE: &str = "8.8.8.8:53";
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(3);
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Wall-clock stamp split into date and time strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedTime {
    pub date: String,
    pub time: String,
}

/// Lifecycle of the most recent captured still.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    /// Fresh still the logger has not yet recorded.
    Available,
    /// Recorded by the logger.
    Pulled,
    /// No fresh still since the last logger cycle.
    Waiting,
}

/// The `people` field: a live count or a logger sentinel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeopleField {
    Count(i64),
    Status(String),
}

impl PeopleField {
    pub fn waiting() -> Self {
        PeopleField::Status(PEOPLE_WAITING.to_string())
    }

    pub fn failed() -> Self {
        PeopleField::Status(PEOPLE_FAILED.to_string())
    }
}

impl std::fmt::Display for PeopleField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeopleField::Count(n) => write!(f, "{}", n),
            PeopleField::Status(s) => write!(f, "{}", s),
        }
    }
}

/// Metadata for the most recent captured still.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub date: String,
    pub time: String,
    pub image_status: ImageStatus,
    pub image_file_name: String,
}

/// One device's document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_by_device: Option<StampedTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub people: Option<PeopleField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_image_captured: Option<ImageRecord>,
}

/// Full database tree as seen by the logger.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub logger_time: Option<StampedTime>,
    pub devices: BTreeMap<String, DeviceStatus>,
}

impl Snapshot {
    /// Parse the raw tree. Malformed device entries are skipped with a
    /// warning rather than failing the whole fetch.
    pub fn from_value(value: serde_json::Value) -> Snapshot {
        let mut snapshot = Snapshot::default();
        let serde_json::Value::Object(map) = value else {
            return snapshot;
        };
        for (key, entry) in map {
            if key == "logger_time" {
                match serde_json::from_value(entry) {
                    Ok(stamp) => snapshot.logger_time = Some(stamp),
                    Err(err) => log::warn!("malformed logger_time entry: {}", err),
                }
                continue;
            }
            match serde_json::from_value(entry) {
                Ok(status) => {
                    snapshot.devices.insert(key, status);
                }
                Err(err) => log::warn!("skipping malformed device entry '{}': {}", key, err),
            }
        }
        snapshot
    }
}

/// Store for device status documents.
pub trait StatusStore: Send {
    /// Push a fresh count with the device heartbeat stamp.
    fn update_count(&self, device: &str, stamp: &StampedTime, people: &PeopleField) -> Result<()>;

    /// Overwrite the `people` field only (logger sentinel reset).
    fn reset_people(&self, device: &str, people: &PeopleField) -> Result<()>;

    /// Publish a freshly captured still's metadata.
    fn update_image_record(&self, device: &str, record: &ImageRecord) -> Result<()>;

    /// Overwrite the image status and file name (logger consumption).
    fn reset_image_status(&self, device: &str, status: ImageStatus, file_name: &str) -> Result<()>;

    /// Stamp the logger's own heartbeat at the tree root.
    fn update_logger_time(&self, stamp: &StampedTime) -> Result<()>;

    fn fetch_snapshot(&self) -> Result<Snapshot>;
}

/// REST client for a Firebase-style realtime database.
pub struct HttpRealtimeDb {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpRealtimeDb {
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url).context("parse realtime db url")?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(anyhow!("unsupported realtime db scheme '{}'", other)),
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        })
    }

    fn patch(&self, path: &str, body: serde_json::Value) -> Result<()> {
        let url = format!("{}/{}.json", self.base_url, path);
        self.agent
            .request("PATCH", &url)
            .send_json(body)
            .with_context(|| format!("patch {}", url))?;
        Ok(())
    }
}

impl StatusStore for HttpRealtimeDb {
    fn update_count(&self, device: &str, stamp: &StampedTime, people: &PeopleField) -> Result<()> {
        self.patch(
            device,
            serde_json::json!({
                "last_update_by_device": stamp,
                "people": people,
            }),
        )
    }

    fn reset_people(&self, device: &str, people: &PeopleField) -> Result<()> {
        self.patch(device, serde_json::json!({ "people": people }))
    }

    fn update_image_record(&self, device: &str, record: &ImageRecord) -> Result<()> {
        self.patch(device, serde_json::json!({ "last_image_captured": record }))
    }

    fn reset_image_status(&self, device: &str, status: ImageStatus, file_name: &str) -> Result<()> {
        self.patch(
            &format!("{}/last_image_captured", device),
            serde_json::json!({
                "image_status": status,
                "image_file_name": file_name,
            }),
        )
    }

    fn update_logger_time(&self, stamp: &StampedTime) -> Result<()> {
        let url = format!("{}/.json", self.base_url);
        self.agent
            .request("PATCH", &url)
            .send_json(serde_json::json!({ "logger_time": stamp }))
            .with_context(|| format!("patch {}", url))?;
        Ok(())
    }

    fn fetch_snapshot(&self) -> Result<Snapshot> {
        let url = format!("{}/.json", self.base_url);
        let value: serde_json::Value = self
            .agent
            .get(&url)
            .call()
            .with_context(|| format!("fetch {}", url))?
            .into_json()
            .context("decode snapshot json")?;
        Ok(Snapshot::from_value(value))
    }
}

/// In-memory store for tests and offline runs.
#[derive(Default)]
pub struct InMemoryStatusDb {
    state: Mutex<Snapshot>,
}

impl InMemoryStatusDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_device<F: FnOnce(&mut DeviceStatus)>(&self, device: &str, f: F) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("status store poisoned"))?;
        f(state.devices.entry(device.to_string()).or_default());
        Ok(())
    }
}

impl StatusStore for InMemoryStatusDb {
    fn update_count(&self, device: &str, stamp: &StampedTime, people: &PeopleField) -> Result<()> {
        self.with_device(device, |status| {
            status.last_update_by_device = Some(stamp.clone());
            status.people = Some(people.clone());
        })
    }

    fn reset_people(&self, device: &str, people: &PeopleField) -> Result<()> {
        self.with_device(device, |status| status.people = Some(people.clone()))
    }

    fn update_image_record(&self, device: &str, record: &ImageRecord) -> Result<()> {
        self.with_device(device, |status| {
            status.last_image_captured = Some(record.clone())
        })
    }

    fn reset_image_status(&self, device: &str, status: ImageStatus, file_name: &str) -> Result<()> {
        self.with_device(device, |entry| {
            if let Some(record) = entry.last_image_captured.as_mut() {
                record.image_status = status;
                record.image_file_name = file_name.to_string();
            } else {
                entry.last_image_captured = Some(ImageRecord {
                    date: String::new(),
                    time: String::new(),
                    image_status: status,
                    image_file_name: file_name.to_string(),
                });
            }
        })
    }

    fn update_logger_time(&self, stamp: &StampedTime) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("status store poisoned"))?;
        state.logger_time = Some(stamp.clone());
        Ok(())
    }

    fn fetch_snapshot(&self) -> Result<Snapshot> {
        self.state
            .lock()
            .map(|state| state.clone())
            .map_err(|_| anyhow!("status store poisoned"))
    }
}

/// True when a public DNS endpoint accepts a TCP connection.
pub fn internet_reachable() -> bool {
    let Ok(addr) = CONNECTIVITY_PROBE.parse::<SocketAddr>() else {
        return false;
    };
    TcpStream::connect_timeout(&addr, CONNECTIVITY_TIMEOUT).is_ok()
}

/// Run `op` until it succeeds, gating each attempt on connectivity.
///
/// Returns `None` only when the stop flag is raised.
pub fn with_retry<T, F>(stop: &AtomicBool, what: &str, mut op: F) -> Option<T>
where
    F: FnMut() -> Result<T>,
{
    loop {
        if stop.load(Ordering::Relaxed) {
            return None;
        }
        if !internet_reachable() {
            log::warn!("{}: no internet connectivity, retrying", what);
            std::thread::sleep(RETRY_DELAY);
            continue;
        }
        match op() {
            Ok(value) => return Some(value),
            Err(err) => {
                log::warn!("{} failed: {:#}, retrying", what, err);
                std::thread::sleep(RETRY_DELAY);
            }
        }
    }
}
