use anyhow::Result;

use crate::pose::result::PoseEstimate;

/// Pose estimation backend trait.
///
/// The neural network itself is an external dependency; backends wrap an
/// already-trained model (or a synthetic stand-in) behind a uniform
/// surface. Implementations must treat the pixel slice as read-only and
/// ephemeral, and must not perform network I/O during `estimate`.
pub trait PoseBackend: Send {
    /// Backend identifier used for registry selection.
    fn name(&self) -> &'static str;

    /// Run pose estimation on an RGB frame.
    ///
    /// `pixels` is tightly packed RGB8, `width * height * 3` bytes.
    fn estimate(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<PoseEstimate>;

    /// Optional warm-up hook (model load verification, first-run JIT).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
