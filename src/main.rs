use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spin_sleep::SpinSleeper;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::{self, EnvFilter};

use swerve_drive::bus::Topic;
use swerve_drive::config::{Settings, load_settings};
use swerve_drive::controller::ChassisController;
use swerve_drive::estimation::VisionMeasurement;
use swerve_drive::gyro::{GyroHardware, GyroSource};
use swerve_drive::kinematics::{MODULE_COUNT, ModulePosition, ModuleState, Pose, SwerveKinematics};
use swerve_drive::module::{Corner, NoHardware, WheelModule};
use swerve_drive::telemetry::{
    Blackboard, SnapshotSink, TelemetryFrame, TelemetrySink, TopicSink, snapshot,
};
use swerve_drive::vision::{VisionSource, VisionTrust};

/// Operator input held for a stretch of the demo.
#[derive(Debug, Clone, Copy)]
enum Command {
    Drive { forward: f64, strafe: f64, turn: f64 },
    Lock,
}

/// `(start time (s), command)`, in order.
const SCRIPT: [(f64, Command); 5] = [
    (0.0, Command::Drive { forward: 1.5, strafe: 0.0, turn: 0.0 }),
    (3.0, Command::Drive { forward: 0.0, strafe: 1.0, turn: 0.0 }),
    (5.0, Command::Drive { forward: 1.0, strafe: -0.5, turn: 1.0 }),
    (8.0, Command::Drive { forward: 0.0, strafe: 0.0, turn: -2.0 }),
    (10.0, Command::Lock),
];

fn command_at(time: f64) -> Command {
    SCRIPT
        .iter()
        .rev()
        .find(|(start, _)| time >= *start)
        .map_or(Command::Lock, |(_, command)| *command)
}

/// How far back the simulated sensors can look (s).
const TRUTH_WINDOW: f64 = 2.0;

/// Where the chassis really is: `(time, pose)`, oldest first.
#[derive(Debug, Default)]
struct Truth {
    history: VecDeque<(f64, Pose)>,
}

type SharedTruth = Arc<RwLock<Truth>>;

impl Truth {
    fn record(&mut self, time: f64, pose: Pose) {
        self.history.push_back((time, pose));
        while self
            .history
            .front()
            .is_some_and(|(t, _)| time - *t > TRUTH_WINDOW)
        {
            self.history.pop_front();
        }
    }

    fn latest(&self) -> (f64, Pose) {
        self.history.back().copied().unwrap_or_default()
    }

    /// Pose at `time`, interpolated between recorded ticks.
    fn at(&self, time: f64) -> Option<Pose> {
        let after = self.history.iter().position(|(t, _)| *t >= time)?;
        let (t1, p1) = self.history[after];
        if after == 0 {
            return (t1 == time).then_some(p1);
        }
        let (t0, p0) = self.history[after - 1];
        Some(p0.interpolate(&p1, (time - t0) / (t1 - t0)))
    }
}

/// The chassis as it actually moves. Runs the same module model as the
/// controller, plus wheel slip the odometers never see.
struct World {
    kinematics: SwerveKinematics,
    modules: [WheelModule; MODULE_COUNT],
    last_positions: [ModulePosition; MODULE_COUNT],
    pose: Pose,
    period: f64,
    slip: f64,
    rng: StdRng,
    truth: SharedTruth,
}

impl World {
    fn new(settings: &Settings, truth: SharedTruth) -> anyhow::Result<Self> {
        settings.simulation.validate()?;
        let kinematics = settings.drive.kinematics()?;
        let config = settings.simulation.module_config(settings.drive.max_speed_mps);
        let mut modules = Corner::ALL.map(|corner| WheelModule::simulated(corner, config));
        let last_positions = modules.each_mut().map(|m| m.position());
        truth.write().record(0.0, Pose::default());

        Ok(World {
            kinematics,
            modules,
            last_positions,
            pose: Pose::default(),
            period: settings.drive.period_s,
            slip: settings.simulation.wheel_slip,
            rng: StdRng::from_os_rng(),
            truth,
        })
    }

    /// Moves the chassis one period under `targets` and records where it ends up.
    fn step(&mut self, time: f64, targets: [ModuleState; MODULE_COUNT], open_loop: bool) -> Pose {
        for (module, target) in self.modules.iter_mut().zip(targets) {
            module.set_target(target, open_loop);
            module.simulate(self.period);
        }

        let positions = self.modules.each_mut().map(|m| m.position());
        let mut deltas = [ModulePosition::default(); MODULE_COUNT];
        for (delta, (now, before)) in deltas
            .iter_mut()
            .zip(positions.iter().zip(&self.last_positions))
        {
            let slip = 1.0 + self.rng.random_range(-self.slip..=self.slip);
            *delta = ModulePosition::new((now.distance - before.distance) * slip, now.angle);
        }
        self.last_positions = positions;

        self.pose = self.pose.exp(self.kinematics.to_twist(&deltas));
        self.truth.write().record(time, self.pose);
        self.pose
    }
}

/// Reports the true heading plus a constant drift.
struct SimulatedGyro {
    truth: SharedTruth,
    drift: f64,
}

impl GyroHardware for SimulatedGyro {
    fn yaw(&mut self) -> f64 {
        let (time, pose) = self.truth.read().latest();
        pose.theta + self.drift * time
    }
}

/// Pretend tag camera: sees the true pose as it was one latency ago, jittered.
struct SimulatedCamera {
    truth: SharedTruth,
    rng: StdRng,
    trust: VisionTrust,
    /// Control ticks between camera frames.
    frame_ticks: u32,
    latency: f64,
    noise: f64,
    ticks_since_frame: u32,
}

impl SimulatedCamera {
    fn new(truth: SharedTruth, settings: &Settings) -> Self {
        SimulatedCamera {
            truth,
            rng: StdRng::from_os_rng(),
            trust: VisionTrust::default(),
            frame_ticks: (settings.simulation.vision_period_s / settings.drive.period_s)
                .round()
                .max(1.0) as u32,
            latency: settings.simulation.vision_latency_s,
            noise: settings.simulation.vision_noise_m,
            ticks_since_frame: 0,
        }
    }
}

impl VisionSource for SimulatedCamera {
    fn has_observation(&mut self) -> bool {
        self.ticks_since_frame += 1;
        if self.ticks_since_frame < self.frame_ticks {
            return false;
        }
        self.ticks_since_frame = 0;
        true
    }

    fn measurement(&mut self) -> Option<VisionMeasurement> {
        let tags = self.rng.random_range(0..=3usize);
        if tags == 0 {
            return None;
        }
        let seen = {
            let truth = self.truth.read();
            let (now, _) = truth.latest();
            truth.at(now - self.latency)
        }?;
        let distance = self.rng.random_range(1.0..5.0);
        let pose = Pose::new(
            seen.x + self.rng.random_range(-self.noise..=self.noise),
            seen.y + self.rng.random_range(-self.noise..=self.noise),
            seen.theta + self.rng.random_range(-self.noise..=self.noise),
        );
        Some(VisionMeasurement::new(
            pose,
            self.latency,
            self.trust.std_devs(distance, tags),
        ))
    }
}

type DemoController = ChassisController<NoHardware, SimulatedGyro>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Swerve drive demo started.");
    let settings = load_settings()?;

    let telemetry: Topic<TelemetryFrame> = Topic::new(16);
    let telemetry_rx = telemetry.subscribe();
    let board: Blackboard = Arc::default();

    let truth: SharedTruth = Arc::default();
    let world = World::new(&settings, Arc::clone(&truth))?;
    let gyro = SimulatedGyro {
        truth: Arc::clone(&truth),
        drift: settings.simulation.gyro_drift_rps,
    };
    let camera = SimulatedCamera::new(Arc::clone(&truth), &settings);

    let sinks: Vec<Box<dyn TelemetrySink>> = vec![
        Box::new(TopicSink::new(telemetry)),
        Box::new(SnapshotSink::new(Arc::clone(&board))),
    ];
    let controller = ChassisController::simulated_with_gyro(
        &settings,
        GyroSource::Real(gyro),
        Box::new(camera),
        Box::new(sinks),
    )?;

    let logger = tokio::spawn(telemetry_task(telemetry_rx));
    let control = tokio::task::spawn_blocking(move || control_loop(controller, world, &settings));

    let (control, logger) = tokio::join!(control, logger);
    let actual = control?;
    logger??;

    let estimate = snapshot(&board).pose;
    info!(
        %estimate,
        %actual,
        error_m = estimate.translation().minus(&actual.translation()).norm(),
        "Swerve drive demo finished."
    );
    Ok(())
}

/// Fixed-rate control loop. Returns where the chassis really ended up.
fn control_loop(mut controller: DemoController, mut world: World, settings: &Settings) -> Pose {
    info!("Control thread started.");
    let sleeper = SpinSleeper::new(100_000);
    let period = Duration::from_secs_f64(settings.drive.period_s);
    let ticks = (settings.simulation.duration_s / settings.drive.period_s).ceil() as u64;
    let log_every = (1.0 / settings.drive.period_s).round().max(1.0) as u64;

    let mut actual = world.pose;
    for tick in 0..ticks {
        let started = Instant::now();

        let open_loop = match command_at(controller.time()) {
            Command::Drive { forward, strafe, turn } => {
                controller.drive(forward, strafe, turn, true);
                true
            }
            Command::Lock => {
                if !controller.is_locked() {
                    controller.lock_modules();
                }
                false
            }
        };
        actual = world.step(
            controller.time() + settings.drive.period_s,
            controller.module_targets(),
            open_loop,
        );
        let estimate = controller.tick();

        if tick % log_every == 0 {
            debug!(%actual, %estimate, "Ground truth");
        }

        let elapsed = started.elapsed();
        if elapsed > period {
            warn!(?elapsed, ?period, "Control tick overran its period");
        } else {
            sleeper.sleep(period - elapsed);
        }
    }
    actual
}

/// Logs telemetry about once a second until the controller goes away.
async fn telemetry_task(
    mut rx: broadcast::Receiver<Arc<TelemetryFrame>>,
) -> anyhow::Result<()> {
    info!("Telemetry task started.");
    let mut last_logged = f64::NEG_INFINITY;
    loop {
        match rx.recv().await {
            Ok(frame) => {
                if frame.timestamp - last_logged >= 1.0 {
                    last_logged = frame.timestamp;
                    info!(
                        t = frame.timestamp,
                        pose = %frame.pose,
                        speeds = %frame.chassis_speeds,
                        locked = frame.locked,
                        "Chassis"
                    );
                }
                debug!(targets = ?frame.module_targets, "Module targets");
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Telemetry task lagging, frames dropped");
            }
            Err(RecvError::Closed) => {
                info!("Telemetry topic closed.");
                return Ok(());
            }
        }
    }
}
