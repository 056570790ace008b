//! Four-module swerve kinematics.
//!
//! Inverse kinematics turns one chassis velocity into a speed and steer angle
//! per module. Forward kinematics recovers the chassis velocity (or an odometry
//! twist) from module measurements as the least-squares fit over all four
//! modules.

use libm::{fabs, hypot};

use crate::error::KinematicsError;
use crate::{ChassisSpeeds, ModulePosition, ModuleState, Translation, Twist};

/// Number of modules on the chassis.
pub const MODULE_COUNT: usize = 4;

/// Locations closer than this (m) count as the same point.
const GEOMETRY_TOLERANCE: f64 = 1e-9;

/// Swerve‑drive kinematics helper.
///
/// Holds the fixed wheel mounting offsets from the chassis center together with
/// the precomputed normal-equation inverse used by forward kinematics. All
/// methods are pure functions of that geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwerveKinematics {
    /// Wheel contact point offsets (m), in front-left, front-right, back-left,
    /// back-right order.
    locations: [Translation; MODULE_COUNT],
    /// `(AᵀA)⁻¹` for the stacked per-module velocity equations.
    normal_inverse: [[f64; 3]; 3],
}

impl SwerveKinematics {
    /// Construct the kinematics for a fixed set of wheel locations.
    ///
    /// # Arguments
    ///
    /// * `locations`: Offsets of each module's contact point from the chassis
    ///   center, in front-left, front-right, back-left, back-right order.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidWheelLocation)` if any coordinate is not finite.
    /// Returns `Err(KinematicsError::CoincidentModules)` if two locations coincide.
    /// Returns `Err(KinematicsError::CollinearModules)` if all locations lie on one line.
    pub fn new(locations: [Translation; MODULE_COUNT]) -> Result<Self, KinematicsError> {
        if locations.iter().any(|l| !l.x.is_finite() || !l.y.is_finite()) {
            return Err(KinematicsError::InvalidWheelLocation("must be finite"));
        }

        for i in 0..MODULE_COUNT {
            for j in (i + 1)..MODULE_COUNT {
                if locations[i].minus(&locations[j]).norm() < GEOMETRY_TOLERANCE {
                    return Err(KinematicsError::CoincidentModules(
                        "every module needs its own mounting point",
                    ));
                }
            }
        }

        let mut spread: f64 = 0.0;
        for i in 0..MODULE_COUNT {
            for j in (i + 1)..MODULE_COUNT {
                for k in (j + 1)..MODULE_COUNT {
                    let a = locations[j].minus(&locations[i]);
                    let b = locations[k].minus(&locations[i]);
                    spread = spread.max(fabs(a.cross(&b)));
                }
            }
        }
        if spread < GEOMETRY_TOLERANCE {
            return Err(KinematicsError::CollinearModules(
                "modules must not lie on a single line",
            ));
        }

        Ok(SwerveKinematics {
            locations,
            normal_inverse: normal_inverse(&locations),
        })
    }

    /// Returns the wheel locations.
    pub fn locations(&self) -> &[Translation; MODULE_COUNT] {
        &self.locations
    }

    /// Calculates the module states needed to achieve the given chassis speeds.
    /// This is the inverse kinematics problem.
    ///
    /// Each module's velocity is the chassis linear velocity plus `ω × r`, where
    /// `r` is the module's location. The state's speed is the magnitude of that
    /// vector and its angle the direction. A module asked for zero velocity gets
    /// angle zero; callers holding a previous angle should keep it instead.
    ///
    /// # Arguments
    ///
    /// * `speeds`: The desired body-frame chassis velocity.
    pub fn to_module_states(&self, speeds: ChassisSpeeds) -> [ModuleState; MODULE_COUNT] {
        self.locations.map(|r| {
            let v = Translation::new(speeds.vx - speeds.omega * r.y, speeds.vy + speeds.omega * r.x);
            let speed = v.norm();
            let angle = if speed > 0.0 { v.angle() } else { 0.0 };
            ModuleState::new(speed, angle)
        })
    }

    /// Calculates the chassis velocity that best explains the given module
    /// states. This is the forward kinematics problem.
    ///
    /// # Arguments
    ///
    /// * `states`: Measured or commanded module states.
    pub fn to_chassis_speeds(&self, states: &[ModuleState; MODULE_COUNT]) -> ChassisSpeeds {
        let (vx, vy, omega) = self.solve(&states.map(|s| s.velocity()));
        ChassisSpeeds::new(vx, vy, omega)
    }

    /// Calculates the body-frame displacement of the chassis from per-module
    /// distance deltas.
    ///
    /// # Arguments
    ///
    /// * `deltas`: For each module, the distance rolled since the last update
    ///   and the direction it rolled in.
    pub fn to_twist(&self, deltas: &[ModulePosition; MODULE_COUNT]) -> Twist {
        let displacement = deltas.map(|d| ModuleState::new(d.distance, d.angle).velocity());
        let (dx, dy, dtheta) = self.solve(&displacement);
        Twist::new(dx, dy, dtheta)
    }

    /// Scales all module speeds down uniformly when any exceeds `max_speed`.
    ///
    /// Angles are untouched, so the chassis keeps its direction of travel and
    /// its ratio of translation to rotation.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidMaxSpeed)` if `max_speed` is not positive.
    pub fn desaturate(
        states: &mut [ModuleState; MODULE_COUNT],
        max_speed: f64,
    ) -> Result<(), KinematicsError> {
        if !(max_speed > 0.0) {
            return Err(KinematicsError::InvalidMaxSpeed("must be positive"));
        }
        let fastest = states.iter().map(|s| fabs(s.speed)).fold(0.0, f64::max);
        if fastest > max_speed {
            let scale = max_speed / fastest;
            for state in states.iter_mut() {
                state.speed *= scale;
            }
        }
        Ok(())
    }

    /// Least-squares `(vx, vy, ω)` for per-module body-frame vectors.
    fn solve(&self, vectors: &[Translation; MODULE_COUNT]) -> (f64, f64, f64) {
        // Aᵀb for rows [1, 0, -y] · u = v.x and [0, 1, x] · u = v.y.
        let mut atb = [0.0; 3];
        for (r, v) in self.locations.iter().zip(vectors) {
            atb[0] += v.x;
            atb[1] += v.y;
            atb[2] += r.x * v.y - r.y * v.x;
        }
        let m = &self.normal_inverse;
        let apply = |row: &[f64; 3]| row[0] * atb[0] + row[1] * atb[1] + row[2] * atb[2];
        (apply(&m[0]), apply(&m[1]), apply(&m[2]))
    }
}

/// Inverse of `AᵀA` for the stacked module equations. Only called on geometry
/// that passed the coincidence and collinearity checks, so the matrix is
/// non-singular.
fn normal_inverse(locations: &[Translation; MODULE_COUNT]) -> [[f64; 3]; 3] {
    let n = MODULE_COUNT as f64;
    let sx: f64 = locations.iter().map(|l| l.x).sum();
    let sy: f64 = locations.iter().map(|l| l.y).sum();
    let sr: f64 = locations.iter().map(|l| l.x * l.x + l.y * l.y).sum();

    let a = [[n, 0.0, -sy], [0.0, n, sx], [-sy, sx, sr]];

    let cof = |r0: usize, r1: usize, c0: usize, c1: usize| a[r0][c0] * a[r1][c1] - a[r0][c1] * a[r1][c0];
    let adj = [
        [cof(1, 2, 1, 2), -cof(0, 2, 1, 2), cof(0, 1, 1, 2)],
        [-cof(1, 2, 0, 2), cof(0, 2, 0, 2), -cof(0, 1, 0, 2)],
        [cof(1, 2, 0, 1), -cof(0, 2, 0, 1), cof(0, 1, 0, 1)],
    ];
    let det = a[0][0] * adj[0][0] + a[0][1] * adj[1][0] + a[0][2] * adj[2][0];

    let mut inv = [[0.0; 3]; 3];
    for (i, row) in adj.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            inv[i][j] = value / det;
        }
    }
    inv
}

impl core::fmt::Display for SwerveKinematics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let [fl, fr, bl, br] = self.locations;
        write!(
            f,
            "SwerveKinematics (FL: ({:.2}, {:.2}), FR: ({:.2}, {:.2}), BL: ({:.2}, {:.2}), BR: ({:.2}, {:.2}), span: {:.2} m)",
            fl.x,
            fl.y,
            fr.x,
            fr.y,
            bl.x,
            bl.y,
            br.x,
            br.y,
            hypot(fl.x - br.x, fl.y - br.y)
        )
    }
}
