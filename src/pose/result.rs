/// Number of body keypoints the pose model reports per person.
pub const KEYPOINTS_PER_PERSON: usize = 17;

/// A detected body landmark in image coordinates.
///
/// A keypoint with both coordinates at zero is treated as "not detected";
/// this matches the model convention where unassigned landmarks stay at
/// the origin.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

impl Keypoint {
    /// True when the model actually placed this landmark.
    pub fn is_detected(&self) -> bool {
        self.x != 0.0 || self.y != 0.0
    }
}

/// One grouped pose: a fixed-size set of keypoints belonging to one person.
#[derive(Clone, Debug)]
pub struct PersonPose {
    pub keypoints: [Keypoint; KEYPOINTS_PER_PERSON],
}

impl Default for PersonPose {
    fn default() -> Self {
        Self {
            keypoints: [Keypoint::default(); KEYPOINTS_PER_PERSON],
        }
    }
}

impl PersonPose {
    /// Number of keypoints the model placed for this person.
    pub fn detected_keypoints(&self) -> usize {
        self.keypoints.iter().filter(|kp| kp.is_detected()).count()
    }
}

/// Result of running pose estimation on one frame.
#[derive(Clone, Debug, Default)]
pub struct PoseEstimate {
    pub people: Vec<PersonPose>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_keypoint_is_not_detected() {
        assert!(!Keypoint::default().is_detected());
        let kp = Keypoint {
            x: 12.0,
            y: 0.0,
            confidence: 0.4,
        };
        assert!(kp.is_detected());
    }

    #[test]
    fn detected_keypoints_counts_nonzero_landmarks() {
        let mut pose = PersonPose::default();
        assert_eq!(pose.detected_keypoints(), 0);
        pose.keypoints[0] = Keypoint {
            x: 4.0,
            y: 8.0,
            confidence: 0.9,
        };
        pose.keypoints[5] = Keypoint {
            x: 0.0,
            y: 2.0,
            confidence: 0.7,
        };
        assert_eq!(pose.detected_keypoints(), 2);
    }
}
