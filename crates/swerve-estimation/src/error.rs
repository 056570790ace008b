//! This module defines the error types used by the `swerve-estimation` crate.

#![warn(missing_docs)]

/// Error type for pose estimation.
///
/// Stale or missing vision data is not an error; these variants only cover
/// inputs that can never be valid.
#[derive(Debug, Clone, PartialEq)]
pub enum EstimatorError {
    /// Error for a standard deviation that is negative or NaN.
    InvalidStdDev(&'static str),
    /// Error for a capture latency that is negative or not a number.
    InvalidLatency(&'static str),
    /// Error for a history window that is not positive.
    InvalidHistoryWindow(&'static str),
}

impl core::fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EstimatorError::InvalidStdDev(msg) => write!(f, "Invalid standard deviation: {}", msg),
            EstimatorError::InvalidLatency(msg) => write!(f, "Invalid capture latency: {}", msg),
            EstimatorError::InvalidHistoryWindow(msg) => {
                write!(f, "Invalid history window: {}", msg)
            }
        }
    }
}

impl core::error::Error for EstimatorError {}
