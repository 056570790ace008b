use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::f64::consts::PI;
use tracing::{error, info};

use swerve_estimation::{EstimatorConfig, StdDevs};
use swerve_kinematics::{SwerveKinematics, Translation};

use crate::error::DriveError;
use crate::module::SimModuleConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Top-level settings. Every field has a default, so a missing file or
/// section still yields a usable configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub drive: DriveSettings,
    pub estimator: EstimatorSettings,
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriveSettings {
    pub period_s: f64,
    pub max_speed_mps: f64,
    /// Scale all module speeds down together when one would exceed `max_speed_mps`.
    pub desaturate: bool,
    /// FL, FR, BL, BR contact points `[x, y]` (m).
    pub wheel_locations: [[f64; 2]; 4],
}

impl Default for DriveSettings {
    fn default() -> Self {
        let half = 0.2921; // 23" square module pattern
        DriveSettings {
            period_s: 0.020,
            max_speed_mps: 4.5,
            desaturate: true,
            wheel_locations: [[half, half], [half, -half], [-half, half], [-half, -half]],
        }
    }
}

impl DriveSettings {
    /// Builds the kinematics, rejecting degenerate geometry.
    pub fn kinematics(&self) -> Result<SwerveKinematics, DriveError> {
        Ok(SwerveKinematics::new(
            self.wheel_locations.map(|[x, y]| Translation::new(x, y)),
        )?)
    }

    pub fn validate(&self) -> Result<(), DriveError> {
        if !(self.period_s > 0.0) {
            return Err(DriveError::InvalidSetting("drive.period_s", "must be positive"));
        }
        if !(self.max_speed_mps > 0.0) {
            return Err(DriveError::InvalidSetting("drive.max_speed_mps", "must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EstimatorSettings {
    /// Odometry trust `[x (m), y (m), heading (rad)]`.
    pub state_std_devs: [f64; 3],
    pub history_window_s: f64,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        EstimatorSettings {
            state_std_devs: [0.1, 0.1, 0.1],
            history_window_s: 1.5,
        }
    }
}

impl EstimatorSettings {
    pub fn to_config(&self) -> EstimatorConfig {
        let [x, y, theta] = self.state_std_devs;
        EstimatorConfig {
            state_std_devs: StdDevs::new(x, y, theta),
            history_window: self.history_window_s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub drive_time_constant_s: f64,
    pub steer_time_constant_s: f64,
    pub max_steer_rate_rps: f64,
    /// How long the demo binary drives for (s).
    pub duration_s: f64,
    /// Time between simulated camera frames (s).
    pub vision_period_s: f64,
    pub vision_latency_s: f64,
    /// Half-width of the uniform noise added to camera positions (m).
    pub vision_noise_m: f64,
    /// Half-width of the per-tick wheel slip, as a fraction of travel.
    pub wheel_slip: f64,
    /// Constant gyro drift (rad/s).
    pub gyro_drift_rps: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            drive_time_constant_s: 0.05,
            steer_time_constant_s: 0.02,
            max_steer_rate_rps: 4.0 * PI,
            duration_s: 12.0,
            vision_period_s: 0.1,
            vision_latency_s: 0.035,
            vision_noise_m: 0.05,
            wheel_slip: 0.05,
            gyro_drift_rps: 0.005,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<(), DriveError> {
        if !(self.drive_time_constant_s > 0.0) {
            return Err(DriveError::InvalidSetting(
                "simulation.drive_time_constant_s",
                "must be positive",
            ));
        }
        if !(self.steer_time_constant_s > 0.0) {
            return Err(DriveError::InvalidSetting(
                "simulation.steer_time_constant_s",
                "must be positive",
            ));
        }
        if !(self.max_steer_rate_rps > 0.0) {
            return Err(DriveError::InvalidSetting("simulation.max_steer_rate_rps", "must be positive"));
        }
        if !(self.vision_period_s > 0.0) {
            return Err(DriveError::InvalidSetting("simulation.vision_period_s", "must be positive"));
        }
        if !(self.duration_s >= 0.0) {
            return Err(DriveError::InvalidSetting("simulation.duration_s", "must not be negative"));
        }
        if !(self.vision_latency_s >= 0.0) {
            return Err(DriveError::InvalidSetting("simulation.vision_latency_s", "must not be negative"));
        }
        if !(self.vision_noise_m >= 0.0) {
            return Err(DriveError::InvalidSetting("simulation.vision_noise_m", "must not be negative"));
        }
        if !(0.0..1.0).contains(&self.wheel_slip) {
            return Err(DriveError::InvalidSetting("simulation.wheel_slip", "must be in [0, 1)"));
        }
        if !self.gyro_drift_rps.is_finite() {
            return Err(DriveError::InvalidSetting("simulation.gyro_drift_rps", "must be finite"));
        }
        Ok(())
    }

    pub fn module_config(&self, max_speed: f64) -> SimModuleConfig {
        SimModuleConfig {
            max_speed,
            drive_time_constant: self.drive_time_constant_s,
            steer_time_constant: self.steer_time_constant_s,
            max_steer_rate: self.max_steer_rate_rps,
        }
    }
}

/// Loads `config/default.toml` (if present) with `SWERVE__SECTION__KEY`
/// environment overrides on top.
pub fn load_settings() -> Result<Settings, DriveError> {
    info!("Attempting to load configuration from {}", DEFAULT_CONFIG_PATH);

    let settings = Config::builder()
        .add_source(File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(false))
        .add_source(Environment::with_prefix("SWERVE").separator("__"))
        .build()
        .and_then(|config| config.try_deserialize::<Settings>());

    match settings {
        Ok(settings) => {
            info!("Successfully loaded configuration: {:?}", settings);
            Ok(settings)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e.into())
        }
    }
}

/// Parses settings from TOML text.
pub fn parse_settings(toml: &str) -> Result<Settings, DriveError> {
    let settings = Config::builder()
        .add_source(File::from_str(toml, FileFormat::Toml))
        .build()?
        .try_deserialize::<Settings>()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let settings = parse_settings("").unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.drive.validate().is_ok());
        assert!(settings.drive.kinematics().is_ok());
    }

    #[test]
    fn test_partial_section_overrides() {
        let settings = parse_settings(
            r#"
            [drive]
            period_s = 0.01
            wheel_locations = [[0.5, 0.25], [0.5, -0.25], [-0.5, 0.25], [-0.5, -0.25]]

            [estimator]
            state_std_devs = [0.05, 0.05, 0.01]
            "#,
        )
        .unwrap();
        assert_eq!(settings.drive.period_s, 0.01);
        assert_eq!(settings.drive.max_speed_mps, 4.5);
        assert_eq!(settings.drive.wheel_locations[1], [0.5, -0.25]);
        let estimator = settings.estimator.to_config();
        assert_eq!(estimator.state_std_devs, StdDevs::new(0.05, 0.05, 0.01));
        assert_eq!(estimator.history_window, 1.5);
    }

    #[test]
    fn test_collinear_geometry_rejected() {
        let settings = parse_settings(
            r#"
            [drive]
            wheel_locations = [[-0.6, 0.0], [-0.2, 0.0], [0.2, 0.0], [0.6, 0.0]]
            "#,
        )
        .unwrap();
        assert!(matches!(settings.drive.kinematics(), Err(DriveError::Kinematics(_))));
    }

    #[test]
    fn test_invalid_period_rejected() {
        let drive = DriveSettings {
            period_s: 0.0,
            ..DriveSettings::default()
        };
        assert!(matches!(drive.validate(), Err(DriveError::InvalidSetting("drive.period_s", _))));
    }

    #[test]
    fn test_invalid_simulation_rejected() {
        assert!(SimulationSettings::default().validate().is_ok());

        let negative = SimulationSettings {
            drive_time_constant_s: -0.05,
            ..SimulationSettings::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(DriveError::InvalidSetting("simulation.drive_time_constant_s", _))
        ));

        let nan = SimulationSettings {
            steer_time_constant_s: f64::NAN,
            ..SimulationSettings::default()
        };
        assert!(matches!(
            nan.validate(),
            Err(DriveError::InvalidSetting("simulation.steer_time_constant_s", _))
        ));

        let slip = SimulationSettings {
            wheel_slip: 1.0,
            ..SimulationSettings::default()
        };
        assert!(matches!(slip.validate(), Err(DriveError::InvalidSetting("simulation.wheel_slip", _))));
    }

    #[test]
    fn test_module_config_from_simulation() {
        let config = SimulationSettings::default().module_config(3.0);
        assert_eq!(config.max_speed, 3.0);
        assert_eq!(config.drive_time_constant, 0.05);
    }

    #[test]
    fn test_malformed_toml_is_error() {
        assert!(matches!(parse_settings("[drive\nperiod_s = "), Err(DriveError::Config(_))));
    }
}
