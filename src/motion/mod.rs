// Motion core: estimation, kinematics and control loops
//
// Provides:
// - Speedometer and encoder mapping for raw sensor streams
// - Tank and swerve odometry
// - Tank and swerve kinematics
// - PID / feed-forward and Ramsete controllers

pub mod encoder_mapper;
pub mod pid;
pub mod position_tracker;
pub mod ramsete;
pub mod speedometer;
pub mod swerve_kinematics;
pub mod swerve_odometry;
pub mod tank_kinematics;

pub use encoder_mapper::EncoderMapper;
pub use pid::{PidCtrl, PidaCtrl};
pub use position_tracker::PositionTracker;
pub use ramsete::{ChassisCommand, RamseteController};
pub use speedometer::Speedometer;
pub use swerve_kinematics::{MODULE_COUNT, ModuleId, ModuleState, SwerveKinematics};
pub use swerve_odometry::{ModulePosition, SwerveOdometry};
pub use tank_kinematics::{TankKinematics, TankVelocities};
