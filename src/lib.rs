//! Swerve-drive chassis control: four independently steered wheel modules,
//! a gyro, and a camera fused into one field pose.
//!
//! [`ChassisController`] is the entry point. Kinematics live in
//! `swerve-kinematics` and the estimator in `swerve-estimation`; both are
//! re-exported here.

pub mod bus;
pub mod config;
pub mod controller;
pub mod error;
pub mod gyro;
pub mod module;
pub mod telemetry;
pub mod vision;

pub use config::{Settings, load_settings};
pub use controller::{ChassisController, LOCK_ANGLES};
pub use error::DriveError;
pub use gyro::{GyroHardware, GyroSource};
pub use module::{Corner, ModuleHardware, WheelModule};
pub use swerve_estimation as estimation;
pub use swerve_kinematics as kinematics;
pub use telemetry::{TelemetryFrame, TelemetrySink};
pub use vision::{VisionSource, VisionTrust};
