//! Pose model consumption.
//!
//! The pose-estimation network is an external, already-trained model.
//! This module only wraps it: result types for grouped keypoints, the
//! `PoseBackend` trait, a stub backend for tests/demo, an optional
//! tract-onnx backend (feature `pose-tract`), and a registry for
//! selecting a backend by name.

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::PoseBackend;
pub use backends::StubBackend;
#[cfg(feature = "pose-tract")]
pub use backends::TractBackend;
pub use registry::BackendRegistry;
pub use result::{Keypoint, PersonPose, PoseEstimate, KEYPOINTS_PER_PERSON};
