//! People counting over grouped pose keypoints.
//!
//! A person whose pose carries at least `point_threshold` placed keypoints
//! counts as detected; everyone below the bar is only suspected. Suspected
//! people still get annotated, and the split is carried through filenames
//! and logs.

use crate::annotate::Rgb;
use crate::pose::PoseEstimate;

/// Detected/suspected split for one inference cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountSummary {
    /// People at or above the keypoint threshold.
    pub detected: usize,
    /// People below the threshold.
    pub suspected: usize,
}

impl CountSummary {
    pub fn total(&self) -> usize {
        self.detected + self.suspected
    }
}

/// Count people against the keypoint threshold.
///
/// Returns the summary plus per-person keypoint counts (index-aligned with
/// `estimate.people`) for annotation.
pub fn count_people(estimate: &PoseEstimate, point_threshold: usize) -> (CountSummary, Vec<usize>) {
    let mut summary = CountSummary::default();
    let mut per_person = Vec::with_capacity(estimate.people.len());
    for person in &estimate.people {
        let points = person.detected_keypoints();
        if points >= point_threshold {
            summary.detected += 1;
        } else {
            summary.suspected += 1;
        }
        per_person.push(points);
    }
    (summary, per_person)
}

/// Color for person `index` out of `total` detected poses.
///
/// Cycles through five channel patterns, with the intensity stepping down
/// per person so adjacent poses stay distinguishable: 10 units per person
/// for small crowds, spread across the full range for large ones.
pub fn person_color(index: usize, total: usize) -> Rgb {
    let step = if total <= 25 {
        10 * index
    } else {
        (255 / total.max(1)) * index
    };
    let value = 255u8.saturating_sub(step.min(255) as u8);
    match index % 5 {
        0 => [value, 0, 0],
        1 => [0, value, 0],
        2 => [0, value, value],
        3 => [value, value, 0],
        _ => [value, 0, value],
    }
}
