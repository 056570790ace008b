#![warn(missing_docs)]
//! Pose estimation for a swerve chassis.
//!
//! [`PoseEstimator`] dead-reckons from module odometers and the gyro every tick
//! and folds in vision fixes at the time they were captured, replaying the
//! odometry recorded since then on top of the corrected point.

pub mod error;
pub mod estimator;
pub mod measurement;

pub use error::EstimatorError;
pub use estimator::{CorrectionOutcome, EstimatorConfig, PoseEstimator};
pub use measurement::{StdDevs, VisionMeasurement};
