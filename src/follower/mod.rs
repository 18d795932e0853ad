// Path followers and timed drive actions
//
// A follower is started once against a drivebase, then ticked once per loop
// between the drivebase's update() and run(). It only commands the drivebase
// through its public set_* calls.

pub mod angle_power;
pub mod direction_rotate;
pub mod pure_pursuit;
pub mod ramsete;
pub mod segment;
pub mod swerve_path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::path::PathError;

pub use angle_power::AnglePower;
pub use direction_rotate::DirectionRotate;
pub use pure_pursuit::SwervePurePursuit;
pub use ramsete::{SwerveRamsete, TankRamsete};
pub use segment::TankPathFollower;
pub use swerve_path::SwervePathFollower;

#[derive(Debug, thiserror::Error)]
pub enum FollowerError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{follower}: heading sensor unavailable, refusing to start")]
    Degraded { follower: String },

    #[error("{follower}: {reason}")]
    BadInput { follower: String, reason: String },

    #[error("{follower}: already running")]
    AlreadyRunning { follower: String },
}

impl FollowerError {
    pub(crate) fn bad_input(follower: &str, reason: impl Into<String>) -> Self {
        Self::BadInput {
            follower: follower.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowerState {
    #[default]
    Init,
    Running,
    Done,
    Cancelled,
}

pub trait Follower<D> {
    fn name(&self) -> &str;

    fn state(&self) -> FollowerState;

    /// Check inputs and take the drivebase's starting state. On error the
    /// follower stays where it was.
    fn start(&mut self, db: &mut D) -> Result<(), FollowerError>;

    /// One control step of `dt` seconds
    fn tick(&mut self, db: &mut D, dt: f64);

    /// Stop following. Only a running follower reacts; the zero command
    /// goes out on the next tick.
    fn cancel(&mut self);

    fn is_done(&self) -> bool {
        matches!(self.state(), FollowerState::Done | FollowerState::Cancelled)
    }
}

/// State machine shared by every follower
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Lifecycle {
    state: FollowerState,
    stop_pending: bool,
}

impl Lifecycle {
    pub fn state(&self) -> FollowerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == FollowerState::Running
    }

    /// Guard for start(): a running follower cannot be restarted
    pub fn check_startable(&self, follower: &str) -> Result<(), FollowerError> {
        if self.is_running() {
            return Err(FollowerError::AlreadyRunning {
                follower: follower.to_string(),
            });
        }
        Ok(())
    }

    pub fn begin(&mut self) {
        self.state = FollowerState::Running;
        self.stop_pending = false;
    }

    pub fn finish(&mut self) {
        if self.is_running() {
            self.state = FollowerState::Done;
        }
    }

    pub fn cancel(&mut self) {
        if self.is_running() {
            self.state = FollowerState::Cancelled;
            self.stop_pending = true;
        }
    }

    /// True once after a cancel, on the tick that must send the zero command
    pub fn take_stop(&mut self) -> bool {
        std::mem::take(&mut self.stop_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_before_start_is_noop() {
        let mut life = Lifecycle::default();
        life.cancel();
        assert_eq!(life.state(), FollowerState::Init);
        assert!(!life.take_stop());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut life = Lifecycle::default();
        life.begin();
        life.cancel();
        let once = life;
        life.cancel();
        assert_eq!(life, once);
        assert!(life.take_stop());
        assert!(!life.take_stop());
        assert_eq!(life.state(), FollowerState::Cancelled);
    }

    #[test]
    fn test_cancel_after_done_is_noop() {
        let mut life = Lifecycle::default();
        life.begin();
        life.finish();
        life.cancel();
        assert_eq!(life.state(), FollowerState::Done);
        assert!(!life.take_stop());
    }

    #[test]
    fn test_running_follower_cannot_restart() {
        let mut life = Lifecycle::default();
        life.check_startable("x").unwrap();
        life.begin();
        assert!(matches!(
            life.check_startable("x"),
            Err(FollowerError::AlreadyRunning { .. })
        ));
    }
}
