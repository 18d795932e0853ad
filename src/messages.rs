// Message types for the runtime

use serde::{Deserialize, Serialize};

use crate::drivebase::LoopType;
use crate::follower::FollowerState;
use crate::geometry::Pose2d;
use crate::path::Path;

/// Which follower drives a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowerKind {
    /// Tank, sample by sample
    Segment,
    /// Tank or swerve, chassis-center tracking
    Ramsete,
    /// Swerve, chassis path with look-ahead
    PurePursuit,
    /// Swerve, one sampled track per module
    SwervePath,
}

// Command from teleop/scripts -> runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DriveCommand {
    /// Open loop, field-relative in/s and deg/s. Kept alive by the watchdog.
    ChassisSpeeds { dx: f64, dy: f64, dtheta: f64 },

    /// Open loop, tank only. Kept alive by the watchdog.
    TankPower { left: f64, right: f64 },

    FollowPath {
        follower: FollowerKind,
        path: Path,
        #[serde(default)]
        reverse: bool,
        /// Overrides the configured look-ahead for pure pursuit
        #[serde(default)]
        look_ahead: Option<f64>,
    },

    /// Swerve only: hold a translation and rotation, optionally for a time
    DirectionRotate {
        dx: f64,
        dy: f64,
        dtheta: f64,
        #[serde(default)]
        duration: Option<f64>,
    },

    /// Swerve only: all modules at one angle, fixed drive power
    AnglePower { angle: f64, power: f64, duration: f64 },

    Cancel,

    Mode { loop_type: LoopType },
}

impl DriveCommand {
    pub fn label(&self) -> &'static str {
        match self {
            DriveCommand::ChassisSpeeds { .. } => "chassis_speeds",
            DriveCommand::TankPower { .. } => "tank_power",
            DriveCommand::FollowPath { .. } => "follow_path",
            DriveCommand::DirectionRotate { .. } => "direction_rotate",
            DriveCommand::AnglePower { .. } => "angle_power",
            DriveCommand::Cancel => "cancel",
            DriveCommand::Mode { .. } => "mode",
        }
    }

    /// Open-loop commands expire under the watchdog
    pub fn is_open_loop(&self) -> bool {
        matches!(self, DriveCommand::ChassisSpeeds { .. } | DriveCommand::TankPower { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowerStatus {
    pub name: String,
    pub state: FollowerState,
}

// State published by runtime every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrivebaseState {
    pub pose: Pose2d,
    /// in/s
    pub velocity: f64,
    /// deg/s
    pub angular_velocity: f64,
    pub total_angle: f64,
    pub degraded: bool,
    #[serde(default)]
    pub follower: Option<FollowerStatus>,
    /// Per-module "speed @ angle" lines, empty on tank
    #[serde(default)]
    pub modules: Vec<String>,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Degraded,
}
