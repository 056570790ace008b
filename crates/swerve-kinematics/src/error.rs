#![warn(missing_docs)]

//! Error types for the kinematics library.
//!
//! This module defines error types that can occur while building the swerve
//! geometry or running kinematic calculations.

use core::fmt;

/// Errors that can occur in kinematic calculations.
#[derive(Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// Error for a wheel location that is not a finite number.
    InvalidWheelLocation(&'static str),
    /// Error for two modules mounted at the same point.
    /// This variant is returned when any pair of wheel locations coincide.
    CoincidentModules(&'static str),
    /// Error for modules mounted on a single line.
    /// This variant is returned when all four wheel locations are collinear.
    CollinearModules(&'static str),
    /// Error for a time delta that is zero or negative.
    /// This variant is returned when discretizing over a non-positive period.
    NonPositiveTimeDelta(&'static str),
    /// Error for a maximum module speed that is not positive.
    InvalidMaxSpeed(&'static str),
}

impl fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinematicsError::InvalidWheelLocation(msg) => write!(f, "Invalid wheel location: {}", msg),
            KinematicsError::CoincidentModules(msg) => write!(f, "Coincident modules: {}", msg),
            KinematicsError::CollinearModules(msg) => write!(f, "Collinear modules: {}", msg),
            KinematicsError::NonPositiveTimeDelta(msg) => write!(f, "Non-positive time delta: {}", msg),
            KinematicsError::InvalidMaxSpeed(msg) => write!(f, "Invalid max speed: {}", msg),
        }
    }
}

impl core::error::Error for KinematicsError {}
