//! Vision collaborator interface.
//!
//! The camera pipeline lives outside this crate. It hands over a solved field
//! pose, how old the frame is, and how much to trust it.

use swerve_estimation::{StdDevs, VisionMeasurement};

/// A source of field-pose observations, polled once per tick.
pub trait VisionSource: Send {
    /// Whether a usable observation is available this tick.
    fn has_observation(&mut self) -> bool;

    /// The observation, if any. Only called after `has_observation` returned `true`.
    fn measurement(&mut self) -> Option<VisionMeasurement>;
}

/// A robot without cameras.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVision;

impl VisionSource for NoVision {
    fn has_observation(&mut self) -> bool {
        false
    }

    fn measurement(&mut self) -> Option<VisionMeasurement> {
        None
    }
}

/// Distance and tag-count based trust model for tag-solving pipelines.
///
/// Multi-tag solves start from a tighter base than single-tag ones, both grow
/// with the square of the average tag distance, and a lone tag past
/// `max_single_tag_distance` is not trusted at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionTrust {
    /// Base deviation when one tag is visible.
    pub single_tag: StdDevs,
    /// Base deviation when several tags are visible.
    pub multi_tag: StdDevs,
    /// Beyond this average distance (m) a single-tag solve is discarded.
    pub max_single_tag_distance: f64,
    /// Distance (m²) at which the base deviation has doubled.
    pub distance_scale: f64,
}

impl Default for VisionTrust {
    fn default() -> Self {
        VisionTrust {
            single_tag: StdDevs::new(4.0, 4.0, 8.0),
            multi_tag: StdDevs::new(0.5, 0.5, 1.0),
            max_single_tag_distance: 4.0,
            distance_scale: 30.0,
        }
    }
}

impl VisionTrust {
    /// Standard deviations for a solve over `tag_count` tags at
    /// `average_distance` meters.
    pub fn std_devs(&self, average_distance: f64, tag_count: usize) -> StdDevs {
        let base = match tag_count {
            0 => return StdDevs::unknown(),
            1 if average_distance > self.max_single_tag_distance => return StdDevs::unknown(),
            1 => self.single_tag,
            _ => self.multi_tag,
        };
        let scale = 1.0 + average_distance * average_distance / self.distance_scale;
        StdDevs::new(base.x * scale, base.y * scale, base.theta * scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_no_vision_never_reports() {
        let mut vision = NoVision;
        assert!(!vision.has_observation());
        assert!(vision.measurement().is_none());
    }

    #[test]
    fn test_trust_without_tags_is_unknown() {
        assert_eq!(VisionTrust::default().std_devs(1.0, 0), StdDevs::unknown());
    }

    #[test]
    fn test_trust_far_single_tag_is_unknown() {
        assert_eq!(VisionTrust::default().std_devs(5.0, 1), StdDevs::unknown());
    }

    #[test]
    fn test_trust_more_tags_is_tighter() {
        let trust = VisionTrust::default();
        let single = trust.std_devs(2.0, 1);
        let multi = trust.std_devs(2.0, 3);
        assert!(multi.x < single.x);
        assert!(multi.theta < single.theta);
    }

    #[test]
    fn test_trust_grows_with_distance() {
        let trust = VisionTrust::default();
        let near = trust.std_devs(0.0, 2);
        let far = trust.std_devs(3.0, 2);
        assert!((near.x - 0.5).abs() < EPSILON);
        assert!((far.x - 0.5 * (1.0 + 9.0 / 30.0)).abs() < EPSILON);
    }
}
