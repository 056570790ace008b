//! Vision observations and the uncertainty attached to them.

use swerve_kinematics::Pose;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;

/// Per-component standard deviations of a pose: x and y in meters, heading in
/// radians. `f64::INFINITY` means "no information" for that component.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StdDevs {
    /// Standard deviation of x (m).
    pub x: f64,
    /// Standard deviation of y (m).
    pub y: f64,
    /// Standard deviation of heading (rad).
    pub theta: f64,
}

impl StdDevs {
    /// Construct standard deviations.
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        StdDevs { x, y, theta }
    }

    /// Standard deviations that carry no information at all.
    pub const fn unknown() -> Self {
        StdDevs::new(f64::INFINITY, f64::INFINITY, f64::INFINITY)
    }

    /// Components as `[x, y, theta]`.
    pub const fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.theta]
    }

    /// Rejects negative and NaN components. Infinity is accepted.
    pub fn validate(&self) -> Result<(), EstimatorError> {
        if self.as_array().iter().any(|s| s.is_nan() || *s < 0.0) {
            return Err(EstimatorError::InvalidStdDev("must be non-negative"));
        }
        Ok(())
    }
}

impl Default for StdDevs {
    fn default() -> Self {
        StdDevs::new(0.1, 0.1, 0.1)
    }
}

/// A pose observed by an external vision pipeline.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionMeasurement {
    /// Field-relative pose the camera solved for.
    pub pose: Pose,
    /// How long before the current tick the frame was captured (s).
    pub latency: f64,
    /// Uncertainty reported by the pipeline.
    pub std_devs: StdDevs,
}

impl VisionMeasurement {
    /// Construct a vision measurement.
    pub const fn new(pose: Pose, latency: f64, std_devs: StdDevs) -> Self {
        VisionMeasurement {
            pose,
            latency,
            std_devs,
        }
    }
}
