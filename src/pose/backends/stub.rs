use anyhow::Result;

use crate::pose::backend::PoseBackend;
use crate::pose::result::{Keypoint, PersonPose, PoseEstimate, KEYPOINTS_PER_PERSON};

/// Stub backend for testing and `stub://` demo deployments.
///
/// Produces deterministic synthetic poses: either a fixed roster of
/// per-person keypoint counts, or a single fully-visible person derived
/// from nothing but the frame dimensions.
pub struct StubBackend {
    keypoint_counts: Vec<usize>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            keypoint_counts: vec![KEYPOINTS_PER_PERSON],
        }
    }

    /// Fix the roster: one entry per synthetic person, giving how many of
    /// that person's keypoints are placed.
    pub fn with_keypoint_counts(counts: Vec<usize>) -> Self {
        Self {
            keypoint_counts: counts,
        }
    }

    fn synthesize_person(index: usize, visible: usize, width: u32, height: u32) -> PersonPose {
        let mut pose = PersonPose::default();
        let visible = visible.min(KEYPOINTS_PER_PERSON);
        // Spread people across the frame, keypoints in a vertical strip.
        let cx = ((index as f32 + 1.0) / (index as f32 + 2.0)) * width as f32 * 0.5 + 1.0;
        for (slot, kp) in pose.keypoints.iter_mut().take(visible).enumerate() {
            let cy = (slot as f32 + 1.0) / (KEYPOINTS_PER_PERSON as f32 + 1.0) * height as f32;
            *kp = Keypoint {
                x: cx,
                y: cy.max(1.0),
                confidence: 0.9,
            };
        }
        pose
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn estimate(&mut self, _pixels: &[u8], width: u32, height: u32) -> Result<PoseEstimate> {
        let people = self
            .keypoint_counts
            .iter()
            .enumerate()
            .map(|(index, &visible)| Self::synthesize_person(index, visible, width, height))
            .collect();
        Ok(PoseEstimate { people })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_honors_keypoint_roster() -> Result<()> {
        let mut backend = StubBackend::with_keypoint_counts(vec![17, 3]);
        let estimate = backend.estimate(&[], 640, 480)?;
        assert_eq!(estimate.people.len(), 2);
        assert_eq!(estimate.people[0].detected_keypoints(), 17);
        assert_eq!(estimate.people[1].detected_keypoints(), 3);
        Ok(())
    }

    #[test]
    fn stub_keypoints_stay_inside_frame() -> Result<()> {
        let mut backend = StubBackend::new();
        let estimate = backend.estimate(&[], 320, 240)?;
        for person in &estimate.people {
            for kp in person.keypoints.iter().filter(|kp| kp.is_detected()) {
                assert!(kp.x > 0.0 && kp.x < 320.0);
                assert!(kp.y > 0.0 && kp.y <= 240.0);
            }
        }
        Ok(())
    }
}
