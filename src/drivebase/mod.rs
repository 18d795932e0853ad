// Drivebase aggregates: tank and swerve
//
// A drivebase owns its motors, sensors and estimators. Each control tick the
// owner calls update(dt) to sense and estimate, lets the active follower
// decide, then the drivebase's set_* calls command the hardware.

pub mod swerve;
pub mod swerve_module;
pub mod tank;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::config::ConfigError;
use crate::hw::{HeadingSource, MotorError, NeutralMode};

pub use swerve::{SwerveDrivebase, SwerveHardware};
pub use swerve_module::{ModuleHardware, SwerveModule};
pub use tank::{TankDrivebase, TankHardware};

#[derive(Debug, thiserror::Error)]
pub enum DrivebaseError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Motor(#[from] MotorError),

    #[error("{side} side has no position source (motor or encoder)")]
    NoPositionSource { side: &'static str },

    #[error("invalid swerve module index {0}")]
    InvalidModule(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopType {
    Autonomous,
    Teleop,
    Test,
    Disabled,
}

/// Neutral mode to apply on entering each loop type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeutralPolicy {
    pub autonomous: NeutralMode,
    pub teleop: NeutralMode,
    pub disabled: NeutralMode,
}

impl Default for NeutralPolicy {
    fn default() -> Self {
        Self {
            autonomous: NeutralMode::Brake,
            teleop: NeutralMode::Brake,
            disabled: NeutralMode::Coast,
        }
    }
}

impl NeutralPolicy {
    pub fn mode_for(&self, loop_type: LoopType) -> NeutralMode {
        match loop_type {
            LoopType::Autonomous => self.autonomous,
            LoopType::Teleop => self.teleop,
            LoopType::Test | LoopType::Disabled => self.disabled,
        }
    }
}

/// Poll `gyro` until it reports connected or `warmup` runs out.
/// Returns false when the sensor never came up.
pub fn wait_for_heading(gyro: &dyn HeadingSource, warmup: Duration) -> bool {
    let start = Instant::now();
    loop {
        if gyro.is_connected() {
            info!("heading sensor ready after {:?}", start.elapsed());
            return true;
        }
        let elapsed = start.elapsed();
        if elapsed >= warmup {
            error!("heading sensor not connected after {:?} - path following disabled", warmup);
            return false;
        }
        std::thread::sleep((warmup - elapsed).min(Duration::from_millis(10)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::sim::SimGyro;

    #[test]
    fn test_neutral_policy_defaults() {
        let policy = NeutralPolicy::default();
        assert_eq!(policy.mode_for(LoopType::Autonomous), NeutralMode::Brake);
        assert_eq!(policy.mode_for(LoopType::Teleop), NeutralMode::Brake);
        assert_eq!(policy.mode_for(LoopType::Test), NeutralMode::Coast);
        assert_eq!(policy.mode_for(LoopType::Disabled), NeutralMode::Coast);
    }

    #[test]
    fn test_wait_for_heading_ready() {
        let (gyro, handle) = SimGyro::new();
        handle.ready_after_polls(3);
        assert!(wait_for_heading(&gyro, Duration::from_secs(3)));
    }

    #[test]
    fn test_wait_for_heading_times_out() {
        let (gyro, handle) = SimGyro::new();
        handle.set_connected(false);
        let start = Instant::now();
        assert!(!wait_for_heading(&gyro, Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
