//! Wheel modules: one drive motor and one steer motor per corner.
//!
//! The backend is picked once when the module is built and never changes:
//! real motor controllers, a first-order simulation, or nothing at all.

use std::f64::consts::PI;
use std::fmt;

use swerve_kinematics::{ModulePosition, ModuleState, angle_difference, normalize_angle};

/// Chassis corner a module is mounted at. The discriminant is the module's
/// index in every four-element array in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    /// Front left.
    FrontLeft = 0,
    /// Front right.
    FrontRight = 1,
    /// Back left.
    BackLeft = 2,
    /// Back right.
    BackRight = 3,
}

impl Corner {
    /// All corners in array order.
    pub const ALL: [Corner; 4] = [
        Corner::FrontLeft,
        Corner::FrontRight,
        Corner::BackLeft,
        Corner::BackRight,
    ];

    /// Position of this corner in module arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Corner::FrontLeft => "Front Left",
            Corner::FrontRight => "Front Right",
            Corner::BackLeft => "Back Left",
            Corner::BackRight => "Back Right",
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Interface to one module's motor controllers.
///
/// The closed loops (drive velocity, steer position) run on the controllers
/// themselves; this trait only sends setpoints and reads telemetry back.
pub trait ModuleHardware {
    /// Drive motor output as a fraction of full power, `-1.0..=1.0`.
    fn set_drive_output(&mut self, fraction: f64);

    /// Drive velocity setpoint (m/s) for the controller's velocity loop.
    fn set_drive_velocity(&mut self, velocity: f64);

    /// Steer position setpoint (rad). Continuous: values outside `[-PI, PI)`
    /// mean the controller should keep turning the same way rather than wrap.
    fn set_steer_angle(&mut self, angle: f64);

    /// Signed drive encoder distance (m).
    fn drive_distance(&mut self) -> f64;

    /// Signed drive wheel surface speed (m/s).
    fn drive_velocity(&mut self) -> f64;

    /// Absolute steer angle (rad), unwrapped or wrapped.
    fn steer_angle(&mut self) -> f64;
}

/// Placeholder hardware for controllers that only ever hold simulated or null
/// modules. Every call is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHardware;

impl ModuleHardware for NoHardware {
    fn set_drive_output(&mut self, _fraction: f64) {}
    fn set_drive_velocity(&mut self, _velocity: f64) {}
    fn set_steer_angle(&mut self, _angle: f64) {}
    fn drive_distance(&mut self) -> f64 {
        0.0
    }
    fn drive_velocity(&mut self) -> f64 {
        0.0
    }
    fn steer_angle(&mut self) -> f64 {
        0.0
    }
}

/// Parameters of the simulated module model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimModuleConfig {
    /// Free speed of the drive (m/s); open-loop output 1.0 reaches it.
    pub max_speed: f64,
    /// First-order time constant of the drive velocity (s).
    pub drive_time_constant: f64,
    /// First-order time constant of the steer position (s).
    pub steer_time_constant: f64,
    /// Fastest the steer can turn (rad/s).
    pub max_steer_rate: f64,
}

impl Default for SimModuleConfig {
    fn default() -> Self {
        SimModuleConfig {
            max_speed: 4.5,
            drive_time_constant: 0.05,
            steer_time_constant: 0.02,
            max_steer_rate: 4.0 * PI,
        }
    }
}

/// Module backed by real motor controllers.
#[derive(Debug)]
pub struct RealModule<H: ModuleHardware> {
    hardware: H,
    last_encoder: f64,
    odometer: f64,
    travel_angle: f64,
}

impl<H: ModuleHardware> RealModule<H> {
    fn new(mut hardware: H) -> Self {
        let last_encoder = hardware.drive_distance();
        let travel_angle = normalize_angle(hardware.steer_angle());
        RealModule {
            hardware,
            last_encoder,
            odometer: 0.0,
            travel_angle,
        }
    }

    fn apply(&mut self, target: ModuleState, open_loop: bool, max_speed: f64) {
        let current = self.hardware.steer_angle();
        self.hardware
            .set_steer_angle(current + angle_difference(target.angle, current));
        if open_loop {
            self.hardware
                .set_drive_output((target.speed / max_speed).clamp(-1.0, 1.0));
        } else {
            self.hardware.set_drive_velocity(target.speed);
        }
    }

    fn state(&mut self) -> ModuleState {
        ModuleState::new(
            self.hardware.drive_velocity(),
            normalize_angle(self.hardware.steer_angle()),
        )
    }

    /// Folds the signed encoder into an odometer plus direction of travel.
    fn position(&mut self) -> ModulePosition {
        let encoder = self.hardware.drive_distance();
        let angle = normalize_angle(self.hardware.steer_angle());
        let delta = encoder - self.last_encoder;
        self.last_encoder = encoder;
        if delta != 0.0 {
            self.odometer += delta.abs();
            self.travel_angle = if delta > 0.0 {
                angle
            } else {
                normalize_angle(angle + PI)
            };
        }
        ModulePosition::new(self.odometer, self.travel_angle)
    }
}

/// First-order model of a module used in simulation and replay.
#[derive(Debug, Clone)]
pub struct SimModule {
    config: SimModuleConfig,
    goal: ModuleState,
    open_loop: bool,
    velocity: f64,
    angle: f64,
    odometer: f64,
    travel_angle: f64,
}

impl SimModule {
    fn new(config: SimModuleConfig) -> Self {
        SimModule {
            config,
            goal: ModuleState::default(),
            open_loop: false,
            velocity: 0.0,
            angle: 0.0,
            odometer: 0.0,
            travel_angle: 0.0,
        }
    }

    /// Advances the model by `dt` seconds toward the last command.
    fn step(&mut self, dt: f64) {
        let steer_error = angle_difference(self.goal.angle, self.angle);
        let steer_alpha = 1.0 - (-dt / self.config.steer_time_constant).exp();
        let max_turn = self.config.max_steer_rate * dt;
        self.angle = normalize_angle(self.angle + (steer_error * steer_alpha).clamp(-max_turn, max_turn));

        let goal_velocity = if self.open_loop {
            (self.goal.speed / self.config.max_speed).clamp(-1.0, 1.0) * self.config.max_speed
        } else {
            self.goal.speed
        };
        let drive_alpha = 1.0 - (-dt / self.config.drive_time_constant).exp();
        self.velocity += (goal_velocity - self.velocity) * drive_alpha;

        self.odometer += self.velocity.abs() * dt;
        self.travel_angle = if self.velocity < 0.0 {
            normalize_angle(self.angle + PI)
        } else {
            self.angle
        };
    }
}

/// Which backend a [`WheelModule`] drives.
#[derive(Debug)]
pub enum ModuleBackend<H: ModuleHardware> {
    /// Motor controllers on the robot.
    Real(RealModule<H>),
    /// Simulated model.
    Simulated(SimModule),
    /// No module fitted. Reports zeros and ignores commands.
    Null,
}

/// One swerve module.
#[derive(Debug)]
pub struct WheelModule<H: ModuleHardware = NoHardware> {
    corner: Corner,
    max_speed: f64,
    target: ModuleState,
    backend: ModuleBackend<H>,
}

impl<H: ModuleHardware> WheelModule<H> {
    /// A module driven by real motor controllers.
    ///
    /// `max_speed` (m/s) scales open-loop commands to motor output.
    pub fn real(corner: Corner, hardware: H, max_speed: f64) -> Self {
        WheelModule {
            corner,
            max_speed,
            target: ModuleState::default(),
            backend: ModuleBackend::Real(RealModule::new(hardware)),
        }
    }

    /// A simulated module.
    pub fn simulated(corner: Corner, config: SimModuleConfig) -> Self {
        WheelModule {
            corner,
            max_speed: config.max_speed,
            target: ModuleState::default(),
            backend: ModuleBackend::Simulated(SimModule::new(config)),
        }
    }

    /// An absent module.
    pub fn null(corner: Corner) -> Self {
        WheelModule {
            corner,
            max_speed: 1.0,
            target: ModuleState::default(),
            backend: ModuleBackend::Null,
        }
    }

    /// Where the module is mounted.
    pub fn corner(&self) -> Corner {
        self.corner
    }

    /// Backend this module was built with.
    pub fn backend(&self) -> &ModuleBackend<H> {
        &self.backend
    }

    /// Commands a speed and steer angle.
    ///
    /// With `open_loop` the drive gets an output proportional to
    /// `speed / max_speed`; otherwise the velocity loop tracks `speed`. The
    /// steer always turns the short way to `angle`.
    pub fn set_target(&mut self, target: ModuleState, open_loop: bool) {
        self.target = target;
        match &mut self.backend {
            ModuleBackend::Real(module) => module.apply(target, open_loop, self.max_speed),
            ModuleBackend::Simulated(module) => {
                module.goal = target;
                module.open_loop = open_loop;
            }
            ModuleBackend::Null => {}
        }
    }

    /// Last commanded state.
    pub fn target(&self) -> ModuleState {
        self.target
    }

    /// Measured speed and steer angle.
    pub fn state(&mut self) -> ModuleState {
        match &mut self.backend {
            ModuleBackend::Real(module) => module.state(),
            ModuleBackend::Simulated(module) => ModuleState::new(module.velocity, module.angle),
            ModuleBackend::Null => ModuleState::default(),
        }
    }

    /// Odometer reading and direction of travel.
    pub fn position(&mut self) -> ModulePosition {
        match &mut self.backend {
            ModuleBackend::Real(module) => module.position(),
            ModuleBackend::Simulated(module) => {
                ModulePosition::new(module.odometer, module.travel_angle)
            }
            ModuleBackend::Null => ModulePosition::default(),
        }
    }

    /// Advances a simulated module by `dt` seconds. Other backends ignore it.
    pub fn simulate(&mut self, dt: f64) {
        if let ModuleBackend::Simulated(module) = &mut self.backend {
            module.step(dt);
        }
    }
}
