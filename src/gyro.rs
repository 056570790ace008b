//! Heading sources.

use swerve_kinematics::normalize_angle;

/// Interface to a yaw gyroscope.
pub trait GyroHardware {
    /// Accumulated yaw (rad), counter-clockwise positive. May exceed one turn.
    fn yaw(&mut self) -> f64;
}

/// Placeholder for controllers built without a real gyro type.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGyroHardware;

impl GyroHardware for NoGyroHardware {
    fn yaw(&mut self) -> f64 {
        0.0
    }
}

/// Where the chassis heading comes from. Picked once at construction.
#[derive(Debug)]
pub enum GyroSource<G: GyroHardware = NoGyroHardware> {
    /// A physical sensor.
    Real(G),
    /// No sensor fitted: heading is always zero and the pose estimate leans
    /// on vision for rotation.
    Null,
}

impl<G: GyroHardware> GyroSource<G> {
    /// Raw accumulated yaw (rad).
    pub fn yaw(&mut self) -> f64 {
        match self {
            GyroSource::Real(gyro) => gyro.yaw(),
            GyroSource::Null => 0.0,
        }
    }

    /// Yaw wrapped to `[-PI, PI)`.
    pub fn heading(&mut self) -> f64 {
        normalize_angle(self.yaw())
    }

    /// `true` for the null source.
    pub fn is_null(&self) -> bool {
        matches!(self, GyroSource::Null)
    }
}
