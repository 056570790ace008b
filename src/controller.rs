//! The swerve subsystem: turns chassis commands into module targets and keeps
//! the fused pose estimate current.

use std::f64::consts::FRAC_PI_4;

use swerve_estimation::{CorrectionOutcome, PoseEstimator};
use swerve_kinematics::{
    ChassisSpeeds, MODULE_COUNT, ModulePosition, ModuleState, Pose, SwerveKinematics,
};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::DriveError;
use crate::gyro::{GyroHardware, GyroSource, NoGyroHardware};
use crate::module::{Corner, ModuleHardware, NoHardware, WheelModule};
use crate::telemetry::{TelemetryFrame, TelemetrySink};
use crate::vision::VisionSource;

/// Module angles that form an X, FL, FR, BL, BR.
pub const LOCK_ANGLES: [f64; MODULE_COUNT] = [FRAC_PI_4, -FRAC_PI_4, -FRAC_PI_4, FRAC_PI_4];

/// Four swerve modules, a gyro, a camera, and the pose estimator, driven once
/// per fixed period by [`ChassisController::tick`].
pub struct ChassisController<H: ModuleHardware = NoHardware, G: GyroHardware = NoGyroHardware> {
    kinematics: SwerveKinematics,
    modules: [WheelModule<H>; MODULE_COUNT],
    gyro: GyroSource<G>,
    estimator: PoseEstimator,
    vision: Box<dyn VisionSource>,
    sink: Box<dyn TelemetrySink>,
    period: f64,
    max_speed: f64,
    desaturate: bool,
    time: f64,
    locked: bool,
}

impl<H: ModuleHardware, G: GyroHardware> ChassisController<H, G> {
    /// Builds the subsystem. The estimate starts at the origin facing the
    /// current gyro heading.
    ///
    /// # Errors
    ///
    /// Fails on invalid drive settings, degenerate wheel geometry, or invalid
    /// estimator tuning.
    pub fn new(
        settings: &Settings,
        mut modules: [WheelModule<H>; MODULE_COUNT],
        mut gyro: GyroSource<G>,
        vision: Box<dyn VisionSource>,
        sink: Box<dyn TelemetrySink>,
    ) -> Result<Self, DriveError> {
        settings.drive.validate()?;
        let kinematics = settings.drive.kinematics()?;

        for (module, corner) in modules.iter().zip(Corner::ALL) {
            if module.corner() != corner {
                return Err(DriveError::InvalidSetting(
                    "modules",
                    "must be ordered front-left, front-right, back-left, back-right",
                ));
            }
        }

        let heading = gyro.heading();
        let positions = modules.each_mut().map(|m| m.position());
        let estimator = PoseEstimator::new(
            kinematics,
            settings.estimator.to_config(),
            heading,
            positions,
            Pose::new(0.0, 0.0, heading),
            0.0,
        )?;

        info!(%kinematics, gyro_null = gyro.is_null(), "[Swerve] Initializing");

        Ok(ChassisController {
            kinematics,
            modules,
            gyro,
            estimator,
            vision,
            sink,
            period: settings.drive.period_s,
            max_speed: settings.drive.max_speed_mps,
            desaturate: settings.drive.desaturate,
            time: 0.0,
            locked: false,
        })
    }

    /// Drives from a field-relative command.
    ///
    /// # Arguments
    ///
    /// * `forward`: Velocity along the field x-axis (m/s).
    /// * `strafe`: Velocity to the right of the field x-axis (m/s).
    /// * `turn`: Counter-clockwise rotation rate (rad/s).
    /// * `open_loop`: Drive motors open loop (teleop) instead of velocity loop.
    pub fn drive(&mut self, forward: f64, strafe: f64, turn: f64, open_loop: bool) {
        let heading = self.heading();
        let speeds = ChassisSpeeds::from_field_relative(forward, -strafe, turn, heading);
        self.set_chassis_speeds(speeds, open_loop);
    }

    /// Drives from a body-relative velocity.
    pub fn set_chassis_speeds(&mut self, speeds: ChassisSpeeds, open_loop: bool) {
        // The period was validated at construction.
        let speeds = speeds.discretize(self.period).unwrap_or(speeds);

        let mut states = if speeds.is_zero() {
            // Park with wheels where they are instead of snapping to zero.
            self.modules
                .each_mut()
                .map(|m| ModuleState::new(0.0, m.state().angle))
        } else {
            self.kinematics.to_module_states(speeds)
        };

        if self.desaturate {
            if let Err(e) = SwerveKinematics::desaturate(&mut states, self.max_speed) {
                warn!(error = %e, "Skipping desaturation");
            }
        }

        for (state, module) in states.iter_mut().zip(self.modules.iter_mut()) {
            *state = state.optimize(module.state().angle);
        }

        self.set_module_states(states, open_loop);
        self.locked = false;
    }

    /// Sends targets straight to the modules, FL, FR, BL, BR.
    pub fn set_module_states(&mut self, states: [ModuleState; MODULE_COUNT], open_loop: bool) {
        for (module, state) in self.modules.iter_mut().zip(states) {
            module.set_target(state, open_loop);
        }
    }

    /// Stops and turns the wheels into an X so the chassis resists pushing.
    /// Holds until the next drive command.
    pub fn lock_modules(&mut self) {
        self.set_module_states(LOCK_ANGLES.map(|angle| ModuleState::new(0.0, angle)), false);
        self.locked = true;
        debug!("Modules locked");
    }

    /// Whether the X lock is in effect.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Runs one control period: advances simulated modules, integrates
    /// odometry, applies any vision fix, and publishes telemetry.
    pub fn tick(&mut self) -> Pose {
        for module in self.modules.iter_mut() {
            module.simulate(self.period);
        }
        self.time += self.period;

        let heading = self.gyro.heading();
        let positions = self.module_positions();
        let mut pose = self.estimator.integrate(self.time, heading, positions);

        if self.vision.has_observation() {
            if let Some(measurement) = self.vision.measurement() {
                match self.estimator.correct(&measurement) {
                    Ok(CorrectionOutcome::Applied { capture_time }) => {
                        pose = self.estimator.pose();
                        debug!(capture_time, %pose, "Vision correction applied");
                    }
                    Ok(CorrectionOutcome::Stale { .. }) => {}
                    Err(e) => warn!(error = %e, "Rejected vision measurement"),
                }
            }
        }

        let frame = TelemetryFrame {
            timestamp: self.time,
            pose,
            module_states: self.module_states(),
            module_targets: self.module_targets(),
            chassis_speeds: self.chassis_speeds(),
            locked: self.locked,
        };
        self.sink.publish(&frame);

        pose
    }

    /// Reseeds the estimator exactly.
    ///
    /// # Arguments
    ///
    /// * `gyro_heading`: Gyro reading the new pose corresponds to (rad).
    /// * `positions`: Odometer readings the new pose corresponds to.
    /// * `pose`: Where the chassis is.
    pub fn reset_odometry(
        &mut self,
        gyro_heading: f64,
        positions: [ModulePosition; MODULE_COUNT],
        pose: Pose,
    ) {
        self.estimator.reset(gyro_heading, positions, pose, self.time);
    }

    /// Reseeds the estimator at `pose` using the current sensor readings.
    pub fn reset_pose(&mut self, pose: Pose) {
        let heading = self.gyro.heading();
        let positions = self.module_positions();
        self.reset_odometry(heading, positions, pose);
    }

    /// Current fused pose.
    pub fn pose(&self) -> Pose {
        self.estimator.pose()
    }

    /// Field heading (rad): the gyro reading carried through the estimator's
    /// offset from the last reset or vision fix.
    pub fn heading(&mut self) -> f64 {
        let raw = self.gyro.heading();
        self.estimator.field_heading(raw)
    }

    /// Raw gyro yaw (rad).
    pub fn gyro_yaw(&mut self) -> f64 {
        self.gyro.yaw()
    }

    /// Measured module states, FL, FR, BL, BR.
    pub fn module_states(&mut self) -> [ModuleState; MODULE_COUNT] {
        self.modules.each_mut().map(|m| m.state())
    }

    /// Odometer readings, FL, FR, BL, BR.
    pub fn module_positions(&mut self) -> [ModulePosition; MODULE_COUNT] {
        self.modules.each_mut().map(|m| m.position())
    }

    /// Last commanded module states, FL, FR, BL, BR.
    pub fn module_targets(&self) -> [ModuleState; MODULE_COUNT] {
        self.modules.each_ref().map(|m| m.target())
    }

    /// Chassis velocity from the measured module states.
    pub fn chassis_speeds(&mut self) -> ChassisSpeeds {
        let states = self.module_states();
        self.kinematics.to_chassis_speeds(&states)
    }

    /// Controller time (s), advanced by one period per tick.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Wheel geometry the controller was built with.
    pub fn kinematics(&self) -> &SwerveKinematics {
        &self.kinematics
    }
}

impl<G: GyroHardware> ChassisController<NoHardware, G> {
    /// Four simulated modules with the given heading source.
    ///
    /// # Errors
    ///
    /// As [`ChassisController::new`], and also on invalid simulation settings.
    pub fn simulated_with_gyro(
        settings: &Settings,
        gyro: GyroSource<G>,
        vision: Box<dyn VisionSource>,
        sink: Box<dyn TelemetrySink>,
    ) -> Result<Self, DriveError> {
        settings.simulation.validate()?;
        let config = settings.simulation.module_config(settings.drive.max_speed_mps);
        let modules = Corner::ALL.map(|corner| WheelModule::simulated(corner, config));
        ChassisController::new(settings, modules, gyro, vision, sink)
    }
}

impl ChassisController {
    /// Four simulated modules and no gyro, as used off-robot.
    pub fn simulated(
        settings: &Settings,
        vision: Box<dyn VisionSource>,
        sink: Box<dyn TelemetrySink>,
    ) -> Result<Self, DriveError> {
        ChassisController::simulated_with_gyro(settings, GyroSource::Null, vision, sink)
    }

    /// No hardware at all. Commands are accepted and nothing moves.
    pub fn null(settings: &Settings, sink: Box<dyn TelemetrySink>) -> Result<Self, DriveError> {
        let modules = Corner::ALL.map(WheelModule::null);
        ChassisController::new(
            settings,
            modules,
            GyroSource::Null,
            Box::new(crate::vision::NoVision),
            sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{NullSink, SnapshotSink, snapshot};
    use crate::vision::NoVision;
    use std::f64::consts::PI;
    use swerve_estimation::{StdDevs, VisionMeasurement};
    use swerve_kinematics::angle_difference;

    const EPSILON: f64 = 1e-6;

    fn sim() -> ChassisController {
        ChassisController::simulated(&Settings::default(), Box::new(NoVision), Box::new(NullSink))
            .unwrap()
    }

    /// Camera that always reports the same fix.
    struct FixedCamera(VisionMeasurement);

    impl VisionSource for FixedCamera {
        fn has_observation(&mut self) -> bool {
            true
        }
        fn measurement(&mut self) -> Option<VisionMeasurement> {
            Some(self.0)
        }
    }

    struct FixedGyro(f64);

    impl GyroHardware for FixedGyro {
        fn yaw(&mut self) -> f64 {
            self.0
        }
    }

    #[test]
    fn test_drive_forward_all_modules_agree() {
        let mut controller = sim();
        controller.drive(1.0, 0.0, 0.0, true);
        for target in controller.module_targets() {
            assert!((target.speed - 1.0).abs() < EPSILON);
            assert!(target.angle.abs() < EPSILON);
        }
    }

    #[test]
    fn test_strafe_right_is_negative_y() {
        let mut controller = sim();
        controller.drive(0.0, 1.0, 0.0, true);
        for (target, state) in controller.module_targets().iter().zip(controller.module_states()) {
            // Wheels start at 0 rad, so -90° is reached without flipping.
            assert!((target.speed - 1.0).abs() < EPSILON);
            assert!((target.angle + PI / 2.0).abs() < EPSILON);
            assert_eq!(state.angle, 0.0);
        }
    }

    #[test]
    fn test_field_relative_uses_heading() {
        let settings = Settings::default();
        let config = settings.simulation.module_config(settings.drive.max_speed_mps);
        let modules = Corner::ALL.map(|c| WheelModule::<NoHardware>::simulated(c, config));
        let mut controller = ChassisController::new(
            &settings,
            modules,
            GyroSource::Real(FixedGyro(PI / 2.0)),
            Box::new(NoVision),
            Box::new(NullSink),
        )
        .unwrap();
        assert!((controller.pose().theta - PI / 2.0).abs() < EPSILON);

        // Facing field +y, a field-forward command is body-rightward.
        controller.drive(1.0, 0.0, 0.0, true);
        for target in controller.module_targets() {
            assert!((target.speed - 1.0).abs() < EPSILON);
            assert!((target.angle + PI / 2.0).abs() < EPSILON);
        }
    }

    #[test]
    fn test_steering_never_exceeds_quarter_turn() {
        let mut controller = sim();
        let commands = [
            (1.0, 0.0, 0.0),
            (-1.0, 0.0, 0.0),
            (0.0, -1.0, 2.0),
            (0.3, 0.4, -3.0),
            (-1.0, 1.0, 0.0),
        ];
        for (forward, strafe, turn) in commands {
            let before = controller.module_states();
            controller.drive(forward, strafe, turn, false);
            for (target, state) in controller.module_targets().iter().zip(before) {
                assert!(angle_difference(target.angle, state.angle).abs() <= PI / 2.0 + EPSILON);
            }
            for _ in 0..25 {
                controller.tick();
            }
        }
    }

    #[test]
    fn test_reverse_from_start_flips_speed() {
        let mut controller = sim();
        controller.drive(-1.0, 0.0, 0.0, false);
        for target in controller.module_targets() {
            assert!((target.speed + 1.0).abs() < EPSILON);
            assert!(target.angle.abs() < EPSILON);
        }
    }

    #[test]
    fn test_lock_pattern_overrides_prior_command() {
        let mut controller = sim();
        controller.drive(0.5, -2.0, 1.0, true);
        for _ in 0..10 {
            controller.tick();
        }
        controller.lock_modules();
        assert!(controller.is_locked());
        let targets = controller.module_targets();
        let expected = [45.0f64, -45.0, -45.0, 45.0].map(f64::to_radians);
        for (target, angle) in targets.iter().zip(expected) {
            assert_eq!(target.speed, 0.0);
            assert!((target.angle - angle).abs() < EPSILON);
        }

        controller.drive(1.0, 0.0, 0.0, true);
        assert!(!controller.is_locked());
    }

    #[test]
    fn test_zero_command_holds_module_angles() {
        let mut controller = sim();
        controller.drive(0.0, 1.0, 0.0, false);
        for _ in 0..50 {
            controller.tick();
        }
        let angles = controller.module_states().map(|s| s.angle);
        controller.set_chassis_speeds(ChassisSpeeds::default(), false);
        for (target, angle) in controller.module_targets().iter().zip(angles) {
            assert_eq!(target.speed, 0.0);
            assert!((target.angle - angle).abs() < EPSILON);
        }
    }

    #[test]
    fn test_desaturation_caps_module_speed() {
        let mut controller = sim();
        controller.set_chassis_speeds(ChassisSpeeds::new(4.0, 0.0, 10.0), false);
        let fastest = controller
            .module_targets()
            .iter()
            .map(|s| s.speed.abs())
            .fold(0.0, f64::max);
        assert!((fastest - 4.5).abs() < EPSILON);
    }

    #[test]
    fn test_ticks_move_pose_forward() {
        let mut controller = sim();
        controller.drive(1.0, 0.0, 0.0, false);
        for _ in 0..100 {
            controller.tick();
        }
        let pose = controller.pose();
        // 2 s at up to 1 m/s, less the drive spin-up.
        assert!(pose.x > 1.8 && pose.x < 2.0, "x = {}", pose.x);
        assert!(pose.y.abs() < EPSILON);
        assert!((controller.time() - 2.0).abs() < EPSILON);

        let speeds = controller.chassis_speeds();
        assert!((speeds.vx - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_stationary_ticks_do_not_drift() {
        let mut controller = sim();
        let start = Pose::new(2.0, 1.0, 0.5);
        controller.reset_pose(start);
        for _ in 0..200 {
            controller.tick();
        }
        let pose = controller.pose();
        assert_eq!(pose.x, start.x);
        assert_eq!(pose.y, start.y);
        assert!((pose.theta - start.theta).abs() < EPSILON);
    }

    #[test]
    fn test_reset_odometry_is_exact() {
        let mut controller = sim();
        controller.drive(1.0, 0.0, 0.5, false);
        for _ in 0..20 {
            controller.tick();
        }
        let target = Pose::new(-4.0, 3.0, 1.25);
        let positions = controller.module_positions();
        controller.reset_odometry(0.0, positions, target);
        assert_eq!(controller.pose(), target);
        // Null gyro reads 0, so the field heading is exactly the reset heading.
        assert!((controller.heading() - 1.25).abs() < EPSILON);
    }

    #[test]
    fn test_vision_corrects_pose_each_tick() {
        let fix = VisionMeasurement::new(Pose::new(1.0, -1.0, 0.0), 0.0, StdDevs::new(0.0, 0.0, 0.0));
        let mut controller =
            ChassisController::simulated(&Settings::default(), Box::new(FixedCamera(fix)), Box::new(NullSink))
                .unwrap();
        let pose = controller.tick();
        assert!((pose.x - 1.0).abs() < EPSILON);
        assert!((pose.y + 1.0).abs() < EPSILON);
        assert_eq!(controller.pose(), pose);
    }

    #[test]
    fn test_invalid_vision_is_ignored() {
        let fix = VisionMeasurement::new(Pose::new(1.0, -1.0, 0.0), -1.0, StdDevs::default());
        let mut controller =
            ChassisController::simulated(&Settings::default(), Box::new(FixedCamera(fix)), Box::new(NullSink))
                .unwrap();
        let pose = controller.tick();
        assert_eq!(pose, Pose::default());
    }

    #[test]
    fn test_tick_publishes_frame() {
        let sink = SnapshotSink::default();
        let board = sink.board();
        let mut controller =
            ChassisController::simulated(&Settings::default(), Box::new(NoVision), Box::new(sink)).unwrap();
        controller.lock_modules();
        controller.tick();
        let frame = snapshot(&board);
        assert!((frame.timestamp - 0.02).abs() < EPSILON);
        assert!(frame.locked);
        assert_eq!(frame.module_targets[1], ModuleState::new(0.0, -FRAC_PI_4));
    }

    #[test]
    fn test_null_hardware_stays_put() {
        let mut controller = ChassisController::null(&Settings::default(), Box::new(NullSink)).unwrap();
        controller.drive(2.0, 1.0, 1.0, true);
        for _ in 0..50 {
            controller.tick();
        }
        assert_eq!(controller.pose(), Pose::default());
        assert_eq!(controller.module_states(), [ModuleState::default(); MODULE_COUNT]);
        assert_eq!(controller.chassis_speeds(), ChassisSpeeds::default());
    }

    #[test]
    fn test_rejects_misordered_modules() {
        let modules = [Corner::FrontRight, Corner::FrontLeft, Corner::BackLeft, Corner::BackRight]
            .map(WheelModule::<NoHardware>::null);
        let result = ChassisController::new(
            &Settings::default(),
            modules,
            GyroSource::<NoGyroHardware>::Null,
            Box::new(NoVision),
            Box::new(NullSink),
        );
        assert!(matches!(result, Err(DriveError::InvalidSetting("modules", _))));
    }

    #[test]
    fn test_rejects_unstable_simulation() {
        let mut settings = Settings::default();
        settings.simulation.drive_time_constant_s = -0.05;
        let result = ChassisController::simulated(&settings, Box::new(NoVision), Box::new(NullSink));
        assert!(matches!(
            result,
            Err(DriveError::InvalidSetting("simulation.drive_time_constant_s", _))
        ));
    }

    #[test]
    fn test_simulated_with_gyro_follows_heading() {
        let mut controller = ChassisController::simulated_with_gyro(
            &Settings::default(),
            GyroSource::Real(FixedGyro(-1.0)),
            Box::new(NoVision),
            Box::new(NullSink),
        )
        .unwrap();
        assert!((controller.heading() + 1.0).abs() < EPSILON);
        assert!((controller.tick().theta + 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_rejects_degenerate_geometry() {
        let mut settings = Settings::default();
        settings.drive.wheel_locations = [[0.0, 0.0]; 4];
        let result = ChassisController::simulated(&settings, Box::new(NoVision), Box::new(NullSink));
        assert!(matches!(result, Err(DriveError::Kinematics(_))));
    }
}
