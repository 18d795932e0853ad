// Hardware capabilities used by the drivebases
//
// A device implements the subset of capabilities it really has. Asking for a
// missing one through the require_* helpers is a BadRequest, not a panic.

pub mod group;
pub mod sim;

use serde::{Deserialize, Serialize};

use crate::config::PidGains;

pub use group::MotorGroup;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MotorError {
    /// The device cannot do what was asked
    #[error("motor '{motor}': bad request: {reason}")]
    BadRequest { motor: String, reason: String },

    /// The device should be able to, but this attempt failed
    #[error("motor '{motor}': request failed: {reason}")]
    RequestFailed { motor: String, reason: String },
}

impl MotorError {
    pub fn bad_request(motor: &str, reason: impl Into<String>) -> Self {
        Self::BadRequest {
            motor: motor.to_string(),
            reason: reason.into(),
        }
    }

    pub fn request_failed(motor: &str, reason: impl Into<String>) -> Self {
        Self::RequestFailed {
            motor: motor.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MotorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeutralMode {
    Brake,
    Coast,
}

/// Open-loop output, power in [-1, 1]
pub trait PowerSink {
    fn set_power(&mut self, power: f64) -> Result<()>;
    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<()>;
}

pub trait PositionSource {
    fn position_ticks(&self) -> Result<i64>;
    fn reset_encoder(&mut self) -> Result<()>;
}

/// Closed loop running on the controller itself
pub trait OnboardPid {
    fn set_pid(&mut self, gains: &PidGains) -> Result<()>;
    fn set_target(&mut self, target: f64) -> Result<()>;
    fn stop_pid(&mut self) -> Result<()>;
}

pub trait Followable {
    fn follow(&mut self, leader: &dyn MotorController, inverted: bool) -> Result<()>;
}

pub trait MotorController: PowerSink {
    fn name(&self) -> &str;

    /// Device family; a group only holds one family
    fn type_name(&self) -> &str;

    fn position(&self) -> Option<&dyn PositionSource> {
        None
    }

    fn position_mut(&mut self) -> Option<&mut dyn PositionSource> {
        None
    }

    fn onboard_pid(&mut self) -> Option<&mut dyn OnboardPid> {
        None
    }

    fn followable(&mut self) -> Option<&mut dyn Followable> {
        None
    }

    fn has_position(&self) -> bool {
        self.position().is_some()
    }
}

pub fn require_position(motor: &dyn MotorController) -> Result<&dyn PositionSource> {
    let name = motor.name();
    motor
        .position()
        .ok_or_else(|| MotorError::bad_request(name, "no position feedback"))
}

pub fn require_position_mut(motor: &mut dyn MotorController) -> Result<&mut dyn PositionSource> {
    let name = motor.name().to_string();
    motor
        .position_mut()
        .ok_or_else(|| MotorError::bad_request(&name, "no position feedback"))
}

pub fn require_onboard_pid(motor: &mut dyn MotorController) -> Result<&mut dyn OnboardPid> {
    let name = motor.name().to_string();
    motor
        .onboard_pid()
        .ok_or_else(|| MotorError::bad_request(&name, "no onboard PID"))
}

pub fn require_followable(motor: &mut dyn MotorController) -> Result<&mut dyn Followable> {
    let name = motor.name().to_string();
    motor
        .followable()
        .ok_or_else(|| MotorError::bad_request(&name, "cannot follow another motor"))
}

/// Gyro or IMU
pub trait HeadingSource {
    fn is_connected(&self) -> bool;
    /// Heading in (-180, 180], counter-clockwise positive
    fn yaw_degrees(&self) -> f64;
    /// Unwrapped heading since the last reset
    fn total_angle_degrees(&self) -> f64;
    fn reset(&mut self);
}

/// Quadrature encoder not attached to a motor controller
pub trait TickEncoder {
    fn ticks(&self) -> i64;
    fn reset(&mut self);
}

/// Absolute angle sensor, raw units
pub trait AbsoluteSensor {
    fn raw(&self) -> f64;
}
