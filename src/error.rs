use swerve_estimation::EstimatorError;
use swerve_kinematics::KinematicsError;
use thiserror::Error;

/// Errors raised while building or configuring the drive.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("kinematics: {0}")]
    Kinematics(#[from] KinematicsError),
    #[error("pose estimator: {0}")]
    Estimator(#[from] EstimatorError),
    #[error("configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("invalid setting `{0}`: {1}")]
    InvalidSetting(&'static str, &'static str),
}
