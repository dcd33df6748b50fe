pub mod stub;

#[cfg(feature = "pose-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "pose-tract")]
pub use tract::TractBackend;
