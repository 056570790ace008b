#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` library for 2D swerve-drive robot kinematics."]
#![doc = ""]
#![doc = "This crate provides structures and functions for robot poses, twists, chassis"]
#![doc = "and module states, and the forward and inverse kinematics of a four-module"]
#![doc = "independently steered chassis."]

use core::f64::consts::PI;
use core::fmt;
use libm::{atan2, cos, fabs, hypot, sin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod error;
pub mod swerve;

pub use error::KinematicsError;
pub use swerve::{MODULE_COUNT, SwerveKinematics};

/// Below this magnitude an angle is treated as zero by the series expansions
/// in [`Pose::exp`] and [`Pose::log`].
const SMALL_ANGLE: f64 = 1e-9;

/// Normalize an angle to be within `[-PI, PI)`.
///
/// Angles at `PI` will be normalized to `-PI`.
///
/// # Arguments
///
/// * `angle`: The angle in radians to normalize.
///
/// # Returns
///
/// The normalized angle in radians.
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle % (2.0 * PI);
    if a >= PI {
        a - 2.0 * PI
    } else if a < -PI {
        a + 2.0 * PI
    } else {
        a
    }
}

/// Shortest signed rotation that takes `from` onto `to`, in `[-PI, PI)`.
///
/// Angular differences must always go through this function rather than raw
/// subtraction, since both inputs wrap.
pub fn angle_difference(to: f64, from: f64) -> f64 {
    normalize_angle(to - from)
}

/// A 2‑D pose `(x, y, θ)` in meters and radians (θ measured counter‑clockwise
/// from the x‑axis in the world frame).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// World‑frame x position (m).
    pub x: f64,
    /// World‑frame y position (m).
    pub y: f64,
    /// Heading (rad), normalized to `[-PI, PI)`.
    pub theta: f64,
}

impl Pose {
    /// Construct a new pose.
    ///
    /// # Arguments
    ///
    /// * `x`: World-frame x position in meters.
    /// * `y`: World-frame y position in meters.
    /// * `theta`: Heading in radians.
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose { x, y, theta }
    }

    /// Normalize an angle to be within `[-PI, PI)`.
    ///
    /// Kept on `Pose` for callers that think of the heading as part of the pose;
    /// it is the same function as [`normalize_angle`].
    pub fn normalize_angle(angle: f64) -> f64 {
        normalize_angle(angle)
    }

    /// The translational part of the pose.
    pub const fn translation(&self) -> Translation {
        Translation::new(self.x, self.y)
    }

    /// Expresses `self` in the frame of `origin`.
    pub fn relative_to(&self, origin: &Pose) -> Pose {
        let dx = self.x - origin.x;
        let dy = self.y - origin.y;
        let (s, c) = (sin(origin.theta), cos(origin.theta));
        Pose {
            x: dx * c + dy * s,
            y: -dx * s + dy * c,
            theta: angle_difference(self.theta, origin.theta),
        }
    }

    /// Applies a body-frame twist to the pose, following the constant-curvature
    /// arc the twist describes.
    ///
    /// # Arguments
    ///
    /// * `twist`: Displacement expressed in the robot frame at `self`.
    ///
    /// # Returns
    ///
    /// The pose reached at the end of the arc. The heading is normalized.
    pub fn exp(&self, twist: Twist) -> Pose {
        let dtheta = twist.dtheta;
        let (s, c) = if fabs(dtheta) < SMALL_ANGLE {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin(dtheta) / dtheta, (1.0 - cos(dtheta)) / dtheta)
        };

        // Chord of the arc in the starting body frame.
        let tx = twist.dx * s - twist.dy * c;
        let ty = twist.dx * c + twist.dy * s;

        let (st, ct) = (sin(self.theta), cos(self.theta));
        Pose {
            x: self.x + tx * ct - ty * st,
            y: self.y + tx * st + ty * ct,
            theta: normalize_angle(self.theta + dtheta),
        }
    }

    /// Returns the twist that carries `self` onto `end` along a single arc.
    ///
    /// This is the inverse of [`Pose::exp`]: `p.exp(p.log(&q)) == q` within
    /// floating-point tolerance.
    pub fn log(&self, end: &Pose) -> Twist {
        let rel = end.relative_to(self);
        let dtheta = rel.theta;
        let half_dtheta = dtheta / 2.0;
        let cos_minus_one = cos(dtheta) - 1.0;

        let half_theta_by_tan = if fabs(cos_minus_one) < SMALL_ANGLE {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half_dtheta * sin(dtheta)) / cos_minus_one
        };

        Twist {
            dx: rel.x * half_theta_by_tan + rel.y * half_dtheta,
            dy: rel.y * half_theta_by_tan - rel.x * half_dtheta,
            dtheta,
        }
    }

    /// Interpolates along the arc from `self` to `end`.
    ///
    /// # Arguments
    ///
    /// * `end`: The pose reached at `t = 1`.
    /// * `t`: Interpolation parameter, clamped to `[0, 1]`.
    pub fn interpolate(&self, end: &Pose, t: f64) -> Pose {
        if t <= 0.0 {
            *self
        } else if t >= 1.0 {
            *end
        } else {
            self.exp(self.log(end).scaled(t))
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x: {:.2}, y: {:.2}, θ: {:.2} rad)", self.x, self.y, self.theta)
    }
}

/// A 2‑D offset in meters, used for wheel mounting locations.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Translation {
    /// Forward offset (m).
    pub x: f64,
    /// Leftward offset (m).
    pub y: f64,
}

impl Translation {
    /// Construct a new translation.
    pub const fn new(x: f64, y: f64) -> Self {
        Translation { x, y }
    }

    /// Euclidean length.
    pub fn norm(&self) -> f64 {
        hypot(self.x, self.y)
    }

    /// Direction of the vector in radians.
    pub fn angle(&self) -> f64 {
        atan2(self.y, self.x)
    }

    /// Rotates the vector counter-clockwise by `theta` radians.
    pub fn rotate_by(&self, theta: f64) -> Translation {
        let (s, c) = (sin(theta), cos(theta));
        Translation::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }

    /// Component-wise difference `self - other`.
    pub fn minus(&self, other: &Translation) -> Translation {
        Translation::new(self.x - other.x, self.y - other.y)
    }

    /// 2‑D cross product (z component of `self × other`).
    pub fn cross(&self, other: &Translation) -> f64 {
        self.x * other.y - self.y * other.x
    }
}

/// A displacement expressed in the robot base frame: how far the chassis moved
/// forward and sideways, and how much it turned, over one step.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    /// Forward displacement (m).
    pub dx: f64,
    /// Leftward displacement (m).
    pub dy: f64,
    /// Rotation (rad), counter-clockwise positive.
    pub dtheta: f64,
}

impl Twist {
    /// Construct a new twist.
    ///
    /// # Arguments
    ///
    /// * `dx`: Displacement along the robot's x-axis (m).
    /// * `dy`: Displacement along the robot's y-axis (m).
    /// * `dtheta`: Rotation about the robot's z-axis (rad).
    pub const fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Twist { dx, dy, dtheta }
    }

    /// Scales every component by `k`.
    pub fn scaled(&self, k: f64) -> Twist {
        Twist::new(self.dx * k, self.dy * k, self.dtheta * k)
    }
}

impl fmt::Display for Twist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(dx: {:.3} m, dy: {:.3} m, dθ: {:.3} rad)", self.dx, self.dy, self.dtheta)
    }
}

/// Linear and angular chassis velocities.
/// These represent the overall motion of the robot's chassis, in the body frame
/// unless stated otherwise.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisSpeeds {
    /// Forward velocity (m/s).
    pub vx: f64,
    /// Leftward velocity (m/s).
    pub vy: f64,
    /// Angular velocity (rad/s), counter-clockwise positive.
    pub omega: f64,
}

impl ChassisSpeeds {
    /// Construct chassis speeds.
    ///
    /// # Arguments
    ///
    /// * `vx`: Forward velocity (m/s).
    /// * `vy`: Leftward velocity (m/s).
    /// * `omega`: Angular velocity (rad/s).
    pub const fn new(vx: f64, vy: f64, omega: f64) -> Self {
        ChassisSpeeds { vx, vy, omega }
    }

    /// Converts a field-relative velocity into the robot body frame.
    ///
    /// # Arguments
    ///
    /// * `vx`: Velocity along the field x-axis (m/s).
    /// * `vy`: Velocity along the field y-axis (m/s).
    /// * `omega`: Angular velocity (rad/s).
    /// * `heading`: Current robot heading in the field frame (rad).
    pub fn from_field_relative(vx: f64, vy: f64, omega: f64, heading: f64) -> Self {
        let body = Translation::new(vx, vy).rotate_by(-heading);
        ChassisSpeeds::new(body.x, body.y, omega)
    }

    /// Returns `true` when every component is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0 && self.omega == 0.0
    }

    /// Corrects a velocity that will be held constant for one control period.
    ///
    /// Holding a translating-and-rotating command fixed for `dt` sweeps the
    /// chassis along an arc instead of the intended straight-line displacement.
    /// This finds the constant twist whose arc ends exactly at the pose the
    /// command asks for after `dt`.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::NonPositiveTimeDelta)` if `dt` is not positive.
    pub fn discretize(self, dt: f64) -> Result<Self, KinematicsError> {
        if !(dt > 0.0) {
            return Err(KinematicsError::NonPositiveTimeDelta("must be positive"));
        }
        let desired = Pose::new(self.vx * dt, self.vy * dt, self.omega * dt);
        let twist = Pose::default().log(&desired);
        Ok(ChassisSpeeds::new(twist.dx / dt, twist.dy / dt, twist.dtheta / dt))
    }
}

impl fmt::Display for ChassisSpeeds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(vx: {:.2} m/s, vy: {:.2} m/s, ω: {:.2} rad/s)", self.vx, self.vy, self.omega)
    }
}

/// Instantaneous state of one wheel module: signed wheel speed and steer angle.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModuleState {
    /// Wheel surface speed (m/s). Negative only as the result of [`ModuleState::optimize`].
    pub speed: f64,
    /// Steer angle (rad).
    pub angle: f64,
}

impl ModuleState {
    /// Construct a module state.
    pub const fn new(speed: f64, angle: f64) -> Self {
        ModuleState { speed, angle }
    }

    /// Picks between `(angle, speed)` and `(angle + PI, -speed)`, whichever needs
    /// less steering from `current_angle`.
    ///
    /// The result never requires more than `PI / 2` of rotation. At exactly
    /// `PI / 2` the forward solution is kept.
    pub fn optimize(self, current_angle: f64) -> ModuleState {
        let delta = angle_difference(self.angle, current_angle);
        if fabs(delta) > PI / 2.0 {
            ModuleState::new(-self.speed, normalize_angle(self.angle + PI))
        } else {
            ModuleState::new(self.speed, normalize_angle(self.angle))
        }
    }

    /// The wheel velocity as a body-frame vector.
    pub fn velocity(&self) -> Translation {
        Translation::new(self.speed * cos(self.angle), self.speed * sin(self.angle))
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(v: {:.2} m/s, ∠ {:.2} rad)", self.speed, self.angle)
    }
}

/// Cumulative odometer reading of one module.
///
/// `distance` never decreases between resets. The direction of travel is
/// carried by `angle`, which points the way the wheel contact patch moved.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModulePosition {
    /// Total distance rolled (m).
    pub distance: f64,
    /// Direction of travel (rad).
    pub angle: f64,
}

impl ModulePosition {
    /// Construct a module position.
    pub const fn new(distance: f64, angle: f64) -> Self {
        ModulePosition { distance, angle }
    }
}

impl fmt::Display for ModulePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(d: {:.3} m, ∠ {:.2} rad)", self.distance, self.angle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-6;

    fn assert_pose_near(a: Pose, b: Pose) {
        assert!((a.x - b.x).abs() < EPSILON, "x: {} vs {}", a.x, b.x);
        assert!((a.y - b.y).abs() < EPSILON, "y: {} vs {}", a.y, b.y);
        assert!(angle_difference(a.theta, b.theta).abs() < EPSILON, "θ: {} vs {}", a.theta, b.theta);
    }

    #[test]
    fn test_angle_normalization() {
        assert!((normalize_angle(0.0) - 0.0).abs() < EPSILON);
        assert!((normalize_angle(PI) - (-PI)).abs() < EPSILON); // PI maps to -PI for [-PI, PI)
        assert!((normalize_angle(3.0 * PI) - (-PI)).abs() < EPSILON);
        assert!((normalize_angle(2.5 * PI) - 0.5 * PI).abs() < EPSILON);
        assert!((normalize_angle(-2.5 * PI) - -0.5 * PI).abs() < EPSILON);
        assert!((Pose::normalize_angle(-3.0 * PI) - -PI).abs() < EPSILON);
    }

    #[test]
    fn test_angle_difference_wraps() {
        // 170° to -170° is a 20° turn, not 340°.
        let d = angle_difference((-170.0f64).to_radians(), 170.0f64.to_radians());
        assert!((d - 20.0f64.to_radians()).abs() < EPSILON);
        let d = angle_difference(170.0f64.to_radians(), (-170.0f64).to_radians());
        assert!((d + 20.0f64.to_radians()).abs() < EPSILON);
    }

    #[test]
    fn test_exp_straight_line() {
        let start = Pose::new(1.0, 1.0, PI / 2.0);
        let end = start.exp(Twist::new(2.0, 0.0, 0.0));
        assert_pose_near(end, Pose::new(1.0, 3.0, PI / 2.0));
    }

    #[test]
    fn test_exp_quarter_circle() {
        // Quarter circle of radius 1 to the left.
        let end = Pose::default().exp(Twist::new(PI / 2.0, 0.0, PI / 2.0));
        assert_pose_near(end, Pose::new(1.0, 1.0, PI / 2.0));
    }

    #[test]
    fn test_log_inverts_exp() {
        let start = Pose::new(-0.3, 2.0, 0.7);
        let twist = Twist::new(0.4, -0.2, 1.1);
        let end = start.exp(twist);
        let recovered = start.log(&end);
        assert!((recovered.dx - twist.dx).abs() < EPSILON);
        assert!((recovered.dy - twist.dy).abs() < EPSILON);
        assert!((recovered.dtheta - twist.dtheta).abs() < EPSILON);
    }

    #[test]
    fn test_interpolate_endpoints_and_midpoint() {
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(2.0, 0.0, 0.0);
        assert_eq!(a.interpolate(&b, -1.0), a);
        assert_eq!(a.interpolate(&b, 2.0), b);
        assert_pose_near(a.interpolate(&b, 0.5), Pose::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_field_relative_conversion() {
        // Facing +y: a field +x command is a rightward (negative y) body command.
        let speeds = ChassisSpeeds::from_field_relative(1.0, 0.0, 0.3, PI / 2.0);
        assert!(speeds.vx.abs() < EPSILON);
        assert!((speeds.vy + 1.0).abs() < EPSILON);
        assert!((speeds.omega - 0.3).abs() < EPSILON);
    }

    #[test]
    fn test_discretize_pure_translation_unchanged() {
        let speeds = ChassisSpeeds::new(1.5, -0.5, 0.0).discretize(0.02).unwrap();
        assert!((speeds.vx - 1.5).abs() < EPSILON);
        assert!((speeds.vy + 0.5).abs() < EPSILON);
        assert!(speeds.omega.abs() < EPSILON);
    }

    #[test]
    fn test_discretize_reaches_commanded_pose() {
        let dt = 0.02;
        let command = ChassisSpeeds::new(3.0, 1.0, 6.0);
        let corrected = command.discretize(dt).unwrap();
        let reached = Pose::default().exp(Twist::new(
            corrected.vx * dt,
            corrected.vy * dt,
            corrected.omega * dt,
        ));
        assert_pose_near(reached, Pose::new(command.vx * dt, command.vy * dt, command.omega * dt));
        // The correction actually changed the translation.
        assert!((corrected.vy - command.vy).abs() > 1e-4);
    }

    #[test]
    fn test_discretize_rejects_non_positive_dt() {
        let result = ChassisSpeeds::new(1.0, 0.0, 0.0).discretize(0.0);
        assert!(matches!(result, Err(KinematicsError::NonPositiveTimeDelta(_))));
        let result = ChassisSpeeds::new(1.0, 0.0, 0.0).discretize(-0.02);
        assert!(matches!(result, Err(KinematicsError::NonPositiveTimeDelta(_))));
    }

    #[test]
    fn test_optimize_flips_large_turns() {
        let state = ModuleState::new(2.0, PI).optimize(0.0);
        assert!((state.speed + 2.0).abs() < EPSILON);
        assert!(state.angle.abs() < EPSILON);

        let state = ModuleState::new(1.0, 100.0f64.to_radians()).optimize(0.0);
        assert!((state.speed + 1.0).abs() < EPSILON);
        assert!((state.angle - (-80.0f64).to_radians()).abs() < EPSILON);
    }

    #[test]
    fn test_optimize_keeps_small_turns_and_ties() {
        let state = ModuleState::new(1.0, 30.0f64.to_radians()).optimize(0.0);
        assert!((state.speed - 1.0).abs() < EPSILON);
        assert!((state.angle - 30.0f64.to_radians()).abs() < EPSILON);

        // Exactly 90° either way keeps the forward solution.
        let state = ModuleState::new(1.0, PI / 2.0).optimize(0.0);
        assert!((state.speed - 1.0).abs() < EPSILON);
        let state = ModuleState::new(1.0, 0.0).optimize(PI / 2.0);
        assert!((state.speed - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_optimize_bound_holds_across_inputs() {
        for target_deg in (-360..=360).step_by(7) {
            for current_deg in (-360..=360).step_by(11) {
                let current = (current_deg as f64).to_radians();
                let state = ModuleState::new(1.0, (target_deg as f64).to_radians()).optimize(current);
                let turn = angle_difference(state.angle, current).abs();
                assert!(turn <= PI / 2.0 + EPSILON, "{} -> {} turned {}", current_deg, target_deg, turn);
            }
        }
    }

    #[test]
    fn test_display() {
        let pose = Pose::new(1.0, 2.0, 0.5);
        assert_eq!(format!("{}", pose), "(x: 1.00, y: 2.00, θ: 0.50 rad)");
        let speeds = ChassisSpeeds::new(1.0, 0.0, 0.25);
        assert!(format!("{}", speeds).contains("vx: 1.00"));
    }
}
