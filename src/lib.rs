//! Pose-estimation people counter.
//!
//! A capture daemon watches a camera, runs a pose-estimation model on a
//! fixed cadence, counts the people it finds, annotates a live overlay,
//! and pushes the count plus periodic stills to a realtime database. A
//! companion logger polls that database and appends one CSV row per
//! cycle, resetting consumed fields to sentinels so stalls are visible
//! in the log.

pub mod annotate;
pub mod capture;
pub mod clock;
pub mod config;
pub mod count;
pub mod frame;
pub mod logger;
pub mod pose;
pub mod record;
pub mod remote;
pub mod ui;

pub use annotate::{Overlay, ALERT_COLOR, BANNER_COLOR};
pub use capture::{open_source, FrameSource, PreviewSink, SourceConfig, StreamConfig, VideoStream};
pub use config::CounterConfig;
pub use count::{count_people, person_color, CountSummary};
pub use frame::{Frame, FrameValidity};
pub use pose::{BackendRegistry, PoseBackend, PoseEstimate, KEYPOINTS_PER_PERSON};
pub use remote::{PeopleField, Snapshot, StampedTime, StatusStore};
