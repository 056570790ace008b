//! Odometry integration and latency-compensated vision correction.

use std::collections::VecDeque;

use swerve_kinematics::{
    MODULE_COUNT, ModulePosition, Pose, SwerveKinematics, Twist, angle_difference, normalize_angle,
};
use tracing::{debug, info, warn};

use crate::error::EstimatorError;
use crate::measurement::{StdDevs, VisionMeasurement};

/// Tuning for [`PoseEstimator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    /// How much the odometry estimate is trusted. Smaller values make vision
    /// corrections pull less.
    pub state_std_devs: StdDevs,
    /// How far back (s) vision fixes may land. Older fixes are dropped.
    pub history_window: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            state_std_devs: StdDevs::default(),
            history_window: 1.5,
        }
    }
}

/// What [`PoseEstimator::correct`] did with a measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorrectionOutcome {
    /// The fix was blended in at its capture time and later odometry replayed.
    Applied {
        /// Estimator time (s) the fix was inserted at.
        capture_time: f64,
    },
    /// The fix predates the retained history and was ignored.
    Stale {
        /// Estimator time (s) the fix claims to come from.
        capture_time: f64,
    },
}

/// One odometry step: the pose reached at `timestamp` and the body-frame twist
/// that led there from the previous entry.
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    timestamp: f64,
    twist: Twist,
    pose: Pose,
}

/// Fused pose estimate for a swerve chassis.
///
/// The heading tracks the gyro plus an offset. The offset is fixed at reset and
/// moved only by vision corrections, so the gyro never needs to be zeroed.
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    kinematics: SwerveKinematics,
    /// Squared odometry standard deviations.
    q: [f64; 3],
    history_window: f64,
    pose: Pose,
    heading_offset: f64,
    last_gyro: f64,
    last_positions: [ModulePosition; MODULE_COUNT],
    history: VecDeque<Snapshot>,
}

impl PoseEstimator {
    /// Creates an estimator tracking from `initial_pose`.
    ///
    /// # Arguments
    ///
    /// * `kinematics`: Geometry used to turn odometer deltas into chassis motion.
    /// * `config`: Odometry trust and history length.
    /// * `gyro_heading`: Raw gyro reading at `timestamp` (rad).
    /// * `positions`: Module odometer readings at `timestamp`.
    /// * `initial_pose`: Where the chassis is.
    /// * `timestamp`: Estimator time (s).
    ///
    /// # Errors
    ///
    /// Returns `Err(EstimatorError::InvalidStdDev)` for negative or NaN state std devs.
    /// Returns `Err(EstimatorError::InvalidHistoryWindow)` if the window is not positive.
    pub fn new(
        kinematics: SwerveKinematics,
        config: EstimatorConfig,
        gyro_heading: f64,
        positions: [ModulePosition; MODULE_COUNT],
        initial_pose: Pose,
        timestamp: f64,
    ) -> Result<Self, EstimatorError> {
        config.state_std_devs.validate()?;
        if !(config.history_window > 0.0) {
            return Err(EstimatorError::InvalidHistoryWindow("must be positive"));
        }

        let mut estimator = PoseEstimator {
            kinematics,
            q: config.state_std_devs.as_array().map(|s| s * s),
            history_window: config.history_window,
            pose: initial_pose,
            heading_offset: 0.0,
            last_gyro: gyro_heading,
            last_positions: positions,
            history: VecDeque::new(),
        };
        estimator.reset(gyro_heading, positions, initial_pose, timestamp);
        Ok(estimator)
    }

    /// The current best estimate.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Time (s) of the most recent update.
    pub fn timestamp(&self) -> f64 {
        self.history.back().map_or(0.0, |s| s.timestamp)
    }

    /// Number of retained odometry snapshots.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Field heading the estimator derives from a raw gyro reading.
    pub fn field_heading(&self, gyro_heading: f64) -> f64 {
        normalize_angle(gyro_heading + self.heading_offset)
    }

    /// Discards history and sets the estimate to exactly `pose`.
    pub fn reset(
        &mut self,
        gyro_heading: f64,
        positions: [ModulePosition; MODULE_COUNT],
        pose: Pose,
        timestamp: f64,
    ) {
        self.pose = pose;
        self.heading_offset = angle_difference(pose.theta, gyro_heading);
        self.last_gyro = gyro_heading;
        self.last_positions = positions;
        self.history.clear();
        self.history.push_back(Snapshot {
            timestamp,
            twist: Twist::default(),
            pose,
        });
        info!(%pose, gyro_heading, timestamp, "Pose estimator reset");
    }

    /// Dead-reckons one tick from odometer deltas and the gyro.
    ///
    /// A module whose odometer went backwards contributes no motion, and its
    /// last good reading is kept so a later recovery is not counted as travel.
    ///
    /// # Returns
    ///
    /// The updated estimate.
    pub fn integrate(
        &mut self,
        timestamp: f64,
        gyro_heading: f64,
        positions: [ModulePosition; MODULE_COUNT],
    ) -> Pose {
        let mut deltas = [ModulePosition::default(); MODULE_COUNT];
        let mut accepted = positions;
        for (module, (delta, (now, before))) in deltas
            .iter_mut()
            .zip(accepted.iter_mut().zip(&self.last_positions))
            .enumerate()
        {
            let distance = now.distance - before.distance;
            if distance < 0.0 || distance.is_nan() {
                warn!(module, delta = distance, "Odometer regression, ignoring module for this tick");
                *now = ModulePosition::new(before.distance, now.angle);
                *delta = ModulePosition::new(0.0, now.angle);
            } else {
                *delta = ModulePosition::new(distance, now.angle);
            }
        }

        let heading = self.field_heading(gyro_heading);
        let mut twist = self.kinematics.to_twist(&deltas);
        twist.dtheta = angle_difference(heading, self.pose.theta);

        let mut pose = self.pose.exp(twist);
        pose.theta = heading;

        self.pose = pose;
        self.last_gyro = gyro_heading;
        self.last_positions = accepted;

        let timestamp = match self.history.back() {
            Some(last) if timestamp < last.timestamp => {
                warn!(timestamp, last = last.timestamp, "Odometry timestamp went backwards, clamping");
                last.timestamp
            }
            _ => timestamp,
        };
        self.history.push_back(Snapshot {
            timestamp,
            twist,
            pose,
        });
        self.prune(timestamp);

        debug!(%pose, %twist, timestamp, "Integrated odometry");
        pose
    }

    /// Blends a vision fix into the estimate at the time it was captured.
    ///
    /// The estimate at capture time is interpolated from history, moved toward
    /// the fix per component by a gain that falls as the fix's standard
    /// deviation grows, and every odometry step after the capture is replayed
    /// from the corrected point.
    ///
    /// # Errors
    ///
    /// Returns `Err(EstimatorError::InvalidStdDev)` for negative or NaN std devs.
    /// Returns `Err(EstimatorError::InvalidLatency)` for negative or NaN latency.
    pub fn correct(
        &mut self,
        measurement: &VisionMeasurement,
    ) -> Result<CorrectionOutcome, EstimatorError> {
        measurement.std_devs.validate()?;
        if measurement.latency.is_nan() || measurement.latency < 0.0 {
            return Err(EstimatorError::InvalidLatency("must be non-negative"));
        }

        let capture_time = self.timestamp() - measurement.latency;
        let oldest = self.history.front().map_or(f64::INFINITY, |s| s.timestamp);
        if capture_time < oldest {
            warn!(capture_time, oldest, "Vision measurement older than pose history, dropping");
            return Ok(CorrectionOutcome::Stale { capture_time });
        }

        // Last snapshot at or before the capture time.
        let k = self
            .history
            .iter()
            .rposition(|s| s.timestamp <= capture_time)
            .unwrap_or(0);

        let (sample, replay_from) = if capture_time == self.history[k].timestamp
            || k + 1 == self.history.len()
        {
            (self.history[k].pose, k)
        } else {
            let before = self.history[k];
            let after = self.history[k + 1];
            let frac = (capture_time - before.timestamp) / (after.timestamp - before.timestamp);
            let sample = before.pose.interpolate(&after.pose, frac);
            self.history[k + 1].twist = after.twist.scaled(1.0 - frac);
            self.history.insert(
                k + 1,
                Snapshot {
                    timestamp: capture_time,
                    twist: after.twist.scaled(frac),
                    pose: sample,
                },
            );
            (sample, k + 1)
        };

        let corrected = self.blend(sample, measurement);
        self.history[replay_from].pose = corrected;
        for i in (replay_from + 1)..self.history.len() {
            let previous = self.history[i - 1].pose;
            self.history[i].pose = previous.exp(self.history[i].twist);
        }

        if let Some(last) = self.history.back() {
            self.pose = last.pose;
        }
        self.heading_offset = angle_difference(self.pose.theta, self.last_gyro);

        debug!(
            %sample,
            %corrected,
            measured = %measurement.pose,
            capture_time,
            pose = %self.pose,
            "Applied vision correction"
        );
        Ok(CorrectionOutcome::Applied { capture_time })
    }

    /// Moves `sample` toward the measurement component by component.
    fn blend(&self, sample: Pose, measurement: &VisionMeasurement) -> Pose {
        let r = measurement.std_devs.as_array().map(|s| s * s);
        let k: [f64; 3] = core::array::from_fn(|i| gain(self.q[i], r[i]));
        let m = measurement.pose;
        Pose::new(
            sample.x + k[0] * (m.x - sample.x),
            sample.y + k[1] * (m.y - sample.y),
            normalize_angle(sample.theta + k[2] * angle_difference(m.theta, sample.theta)),
        )
    }

    /// Drops snapshots older than the history window, always keeping the newest.
    fn prune(&mut self, now: f64) {
        while self.history.len() > 1
            && self
                .history
                .front()
                .is_some_and(|s| s.timestamp < now - self.history_window)
        {
            self.history.pop_front();
        }
    }
}

/// Steady-state gain for state variance `q` and measurement variance `r`:
/// `q / (q + sqrt(q r))`. It is 1 for a perfect measurement and 0 for an
/// uninformative one or a perfectly trusted state.
fn gain(q: f64, r: f64) -> f64 {
    if q <= 0.0 || r.is_infinite() {
        0.0
    } else {
        q / (q + (q * r).sqrt())
    }
}
