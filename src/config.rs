// Timeouts, topics, drivebase settings
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "drivebase/cmd"; // commands
pub const TOPIC_STATE: &str = "drivebase/state"; // pose, velocities, follower
pub const TOPIC_HEALTH: &str = "drivebase/state/health"; // health status

// How long a drivebase waits for its heading sensor before going degraded
pub const DEFAULT_GYRO_WARMUP: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for '{param}': {reason}")]
    Invalid { param: String, reason: String },

    #[error("missing parameter '{param}'")]
    Missing { param: String },
}

impl ConfigError {
    pub(crate) fn invalid(param: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            param: param.to_string(),
            reason: reason.into(),
        }
    }
}

fn require_positive(param: &str, value: f64) -> Result<(), ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::invalid(param, format!("must be > 0, got {value}")));
    }
    Ok(())
}

fn require_samples(param: &str, value: usize) -> Result<(), ConfigError> {
    if value < 2 {
        return Err(ConfigError::invalid(param, format!("need at least 2 samples, got {value}")));
    }
    Ok(())
}

mod defaults {
    pub fn scrub() -> f64 {
        1.0
    }
    pub fn samples() -> usize {
        2
    }
    /// Acceleration needs three samples in the window
    pub fn linear_samples() -> usize {
        3
    }
    pub fn enabled() -> bool {
        true
    }
    pub fn ramsete_b() -> f64 {
        2.0
    }
    pub fn ramsete_zeta() -> f64 {
        0.7
    }
    pub fn gyro_warmup_secs() -> f64 {
        super::DEFAULT_GYRO_WARMUP.as_secs_f64()
    }
    pub fn phys_min() -> f64 {
        -180.0
    }
    pub fn phys_max() -> f64 {
        180.0
    }
}

/// Gains for a plain PID loop
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidGains {
    #[serde(default)]
    pub kp: f64,
    #[serde(default)]
    pub ki: f64,
    #[serde(default)]
    pub kd: f64,
    #[serde(default)]
    pub kf: f64,
    /// Output clamp, both or neither
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Integrator clamp
    #[serde(default)]
    pub imax: Option<f64>,
}

impl PidGains {
    pub fn p(kp: f64) -> Self {
        Self {
            kp,
            ..Self::default()
        }
    }

    pub fn validate(&self, param: &str) -> Result<(), ConfigError> {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) if lo > hi => {
                Err(ConfigError::invalid(param, format!("min {lo} above max {hi}")))
            }
            (Some(_), None) | (None, Some(_)) => {
                Err(ConfigError::invalid(param, "min and max must be given together"))
            }
            _ => Ok(()),
        }
    }
}

/// Feed-forward plus PD gains for trajectory following
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidaGains {
    #[serde(default)]
    pub kv: f64,
    #[serde(default)]
    pub ka: f64,
    #[serde(default)]
    pub kp: f64,
    #[serde(default)]
    pub kd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RamseteGains {
    #[serde(default = "defaults::ramsete_b")]
    pub b: f64,
    #[serde(default = "defaults::ramsete_zeta")]
    pub zeta: f64,
}

impl Default for RamseteGains {
    fn default() -> Self {
        Self {
            b: defaults::ramsete_b(),
            zeta: defaults::ramsete_zeta(),
        }
    }
}

impl RamseteGains {
    pub fn validate(&self, param: &str) -> Result<(), ConfigError> {
        require_positive(&format!("{param}.b"), self.b)?;
        if !(self.zeta > 0.0 && self.zeta < 1.0) {
            return Err(ConfigError::invalid(
                &format!("{param}.zeta"),
                format!("must be in (0, 1), got {}", self.zeta),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TankFollowerConfig {
    #[serde(default)]
    pub left: PidaGains,
    #[serde(default)]
    pub right: PidaGains,
    #[serde(default)]
    pub angle_correction: PidGains,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TankRamseteConfig {
    #[serde(default = "defaults::ramsete_b")]
    pub b: f64,
    #[serde(default = "defaults::ramsete_zeta")]
    pub zeta: f64,
    /// Velocity loops turning wheel-speed targets into power
    #[serde(default)]
    pub left: PidGains,
    #[serde(default)]
    pub right: PidGains,
}

impl Default for TankRamseteConfig {
    fn default() -> Self {
        Self {
            b: defaults::ramsete_b(),
            zeta: defaults::ramsete_zeta(),
            left: PidGains::default(),
            right: PidGains::default(),
        }
    }
}

impl TankRamseteConfig {
    pub fn gains(&self) -> RamseteGains {
        RamseteGains {
            b: self.b,
            zeta: self.zeta,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankConfig {
    pub width: f64,
    #[serde(default = "defaults::scrub")]
    pub scrub: f64,
    pub inches_per_tick: f64,
    #[serde(default = "defaults::linear_samples")]
    pub linear_samples: usize,
    #[serde(default = "defaults::samples")]
    pub angular_samples: usize,
    /// Wheel speed at full power
    pub max_velocity: f64,
    #[serde(default)]
    pub follower: TankFollowerConfig,
    #[serde(default)]
    pub ramsete: TankRamseteConfig,
}

impl Default for TankConfig {
    fn default() -> Self {
        Self {
            width: 24.0,
            scrub: 1.0,
            inches_per_tick: 0.01,
            linear_samples: 3,
            angular_samples: 2,
            max_velocity: 120.0,
            follower: TankFollowerConfig {
                left: PidaGains {
                    kv: 1.0 / 120.0,
                    ka: 0.0,
                    kp: 0.05,
                    kd: 0.0,
                },
                right: PidaGains {
                    kv: 1.0 / 120.0,
                    ka: 0.0,
                    kp: 0.05,
                    kd: 0.0,
                },
                angle_correction: PidGains::p(0.01),
            },
            ramsete: TankRamseteConfig {
                b: defaults::ramsete_b(),
                zeta: defaults::ramsete_zeta(),
                left: PidGains {
                    kf: 1.0 / 120.0,
                    kp: 0.005,
                    ..PidGains::default()
                },
                right: PidGains {
                    kf: 1.0 / 120.0,
                    kp: 0.005,
                    ..PidGains::default()
                },
            },
        }
    }
}

impl TankConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("tank.width", self.width)?;
        require_positive("tank.scrub", self.scrub)?;
        require_positive("tank.inches_per_tick", self.inches_per_tick)?;
        require_positive("tank.max_velocity", self.max_velocity)?;
        require_samples("tank.linear_samples", self.linear_samples)?;
        require_samples("tank.angular_samples", self.angular_samples)?;
        self.follower.angle_correction.validate("tank.follower.angle_correction")?;
        self.ramsete.gains().validate("tank.ramsete")?;
        self.ramsete.left.validate("tank.ramsete.left")?;
        self.ramsete.right.validate("tank.ramsete.right")?;
        Ok(())
    }
}

/// Absolute encoder calibration: raw range, physical range and one reference pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub raw_min: f64,
    pub raw_max: f64,
    #[serde(default = "defaults::phys_min")]
    pub phys_min: f64,
    #[serde(default = "defaults::phys_max")]
    pub phys_max: f64,
    #[serde(default)]
    pub raw_ref: Option<f64>,
    #[serde(default)]
    pub phys_ref: Option<f64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            raw_min: 0.0,
            raw_max: 4096.0,
            phys_min: defaults::phys_min(),
            phys_max: defaults::phys_max(),
            raw_ref: None,
            phys_ref: None,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self, param: &str) -> Result<(), ConfigError> {
        if self.raw_min == self.raw_max {
            return Err(ConfigError::invalid(
                &format!("{param}.raw_min"),
                "raw_min and raw_max must differ",
            ));
        }
        if self.phys_min == self.phys_max {
            return Err(ConfigError::invalid(
                &format!("{param}.phys_min"),
                "phys_min and phys_max must differ",
            ));
        }
        if self.raw_ref.is_some() != self.phys_ref.is_some() {
            return Err(ConfigError::invalid(
                &format!("{param}.raw_ref"),
                "raw_ref and phys_ref must be given together",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleConfig {
    #[serde(default)]
    pub steer: PidGains,
    #[serde(default)]
    pub drive: PidGains,
    #[serde(default)]
    pub encoder: CalibrationConfig,
}

impl ModuleConfig {
    pub fn validate(&self, param: &str) -> Result<(), ConfigError> {
        self.steer.validate(&format!("{param}.steer"))?;
        self.drive.validate(&format!("{param}.drive"))?;
        self.encoder.validate(&format!("{param}.encoder"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SwerveModulesConfig {
    pub fl: ModuleConfig,
    pub fr: ModuleConfig,
    pub bl: ModuleConfig,
    pub br: ModuleConfig,
}

impl SwerveModulesConfig {
    /// Module configs in FL, FR, BL, BR order
    pub fn as_array(&self) -> [&ModuleConfig; 4] {
        [&self.fl, &self.fr, &self.bl, &self.br]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwerveConfig {
    pub width: f64,
    pub length: f64,
    pub max_speed: f64,
    pub inches_per_tick: f64,
    #[serde(default = "defaults::linear_samples")]
    pub linear_samples: usize,
    #[serde(default = "defaults::samples")]
    pub angular_samples: usize,
    #[serde(default)]
    pub look_ahead: f64,
    #[serde(default = "defaults::enabled")]
    pub mirror: bool,
    #[serde(default = "defaults::enabled")]
    pub scale: bool,
    #[serde(default)]
    pub ramsete: RamseteGains,
    pub modules: SwerveModulesConfig,
}

impl Default for SwerveConfig {
    fn default() -> Self {
        let module = ModuleConfig {
            steer: PidGains {
                kp: 0.02,
                min: Some(-1.0),
                max: Some(1.0),
                ..PidGains::default()
            },
            drive: PidGains {
                kf: 1.0 / 120.0,
                kp: 0.005,
                min: Some(-1.0),
                max: Some(1.0),
                ..PidGains::default()
            },
            encoder: CalibrationConfig::default(),
        };
        Self {
            width: 22.0,
            length: 22.0,
            max_speed: 120.0,
            inches_per_tick: 0.01,
            linear_samples: 3,
            angular_samples: 2,
            look_ahead: 12.0,
            mirror: true,
            scale: true,
            ramsete: RamseteGains::default(),
            modules: SwerveModulesConfig {
                fl: module,
                fr: module,
                bl: module,
                br: module,
            },
        }
    }
}

impl SwerveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("swerve.width", self.width)?;
        require_positive("swerve.length", self.length)?;
        require_positive("swerve.max_speed", self.max_speed)?;
        require_positive("swerve.inches_per_tick", self.inches_per_tick)?;
        require_samples("swerve.linear_samples", self.linear_samples)?;
        require_samples("swerve.angular_samples", self.angular_samples)?;
        if !(self.look_ahead >= 0.0) {
            return Err(ConfigError::invalid(
                "swerve.look_ahead",
                format!("must be >= 0, got {}", self.look_ahead),
            ));
        }
        self.ramsete.validate("swerve.ramsete")?;
        for (name, module) in ["fl", "fr", "bl", "br"]
            .iter()
            .zip(self.modules.as_array())
        {
            module.validate(&format!("swerve.modules.{name}"))?;
        }
        Ok(())
    }
}

/// Drivebase geometry the runtime runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    Tank,
    Swerve,
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Flavor::Tank => write!(f, "tank"),
            Flavor::Swerve => write!(f, "swerve"),
        }
    }
}

/// Top-level settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSettings {
    #[serde(default)]
    pub tank: Option<TankConfig>,
    #[serde(default)]
    pub swerve: Option<SwerveConfig>,
    #[serde(default = "defaults::gyro_warmup_secs")]
    pub gyro_warmup_secs: f64,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            tank: None,
            swerve: None,
            gyro_warmup_secs: defaults::gyro_warmup_secs(),
        }
    }
}

impl RobotSettings {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let settings: RobotSettings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(tank) = &self.tank {
            tank.validate()?;
        }
        if let Some(swerve) = &self.swerve {
            swerve.validate()?;
        }
        if !(self.gyro_warmup_secs >= 0.0) {
            return Err(ConfigError::invalid(
                "gyro_warmup_secs",
                format!("must be >= 0, got {}", self.gyro_warmup_secs),
            ));
        }
        Ok(())
    }

    pub fn gyro_warmup(&self) -> Duration {
        Duration::from_secs_f64(self.gyro_warmup_secs)
    }

    /// The flavor a settings file describes; swerve wins when both are present
    pub fn flavor(&self) -> Option<Flavor> {
        if self.swerve.is_some() {
            Some(Flavor::Swerve)
        } else if self.tank.is_some() {
            Some(Flavor::Tank)
        } else {
            None
        }
    }

    pub fn require_tank(&self) -> Result<&TankConfig, ConfigError> {
        self.tank.as_ref().ok_or_else(|| ConfigError::Missing {
            param: "tank".to_string(),
        })
    }

    pub fn require_swerve(&self) -> Result<&SwerveConfig, ConfigError> {
        self.swerve.as_ref().ok_or_else(|| ConfigError::Missing {
            param: "swerve".to_string(),
        })
    }
}
