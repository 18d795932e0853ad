// 50 Hz drive loop with watchdog
// Open-loop commands (chassis speeds, tank power) must keep arriving: once the
// latest one is older than the timeout the drivebase is stopped. Followers run
// on their own once started and are not subject to the watchdog.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{
    CMD_TIMEOUT, ConfigError, Flavor, LOOP_HZ, RobotSettings, SwerveConfig, TOPIC_CMD_DRIVE, TOPIC_HEALTH,
    TOPIC_STATE, TankConfig,
};
use crate::drivebase::{DrivebaseError, SwerveDrivebase, SwerveHardware, TankDrivebase, TankHardware};
use crate::follower::{
    AnglePower, DirectionRotate, Follower, FollowerError, FollowerState, SwervePathFollower, SwervePurePursuit,
    SwerveRamsete, TankPathFollower, TankRamsete,
};
use crate::geometry::{Translation2d, Twist2d};
use crate::hw::sim::{SwervePlant, TankPlant};
use crate::messages::{DriveCommand, DrivebaseState, FollowerKind, FollowerStatus, RuntimeHealth};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Drivebase(#[from] DrivebaseError),

    #[error(transparent)]
    Follower(#[from] FollowerError),

    #[error("'{command}' is not supported on a {flavor} drivebase")]
    Unsupported { command: String, flavor: Flavor },

    #[error("bad '{command}' command: {reason}")]
    BadCommand { command: String, reason: String },
}

impl RuntimeError {
    fn unsupported(cmd: &DriveCommand, flavor: Flavor) -> Self {
        Self::Unsupported {
            command: cmd.label().to_string(),
            flavor,
        }
    }
}

fn status<D>(follower: Option<&dyn Follower<D>>) -> Option<FollowerStatus> {
    follower.map(|f| FollowerStatus {
        name: f.name().to_string(),
        state: f.state(),
    })
}

fn is_running<D>(follower: Option<&dyn Follower<D>>) -> bool {
    follower.is_some_and(|f| f.state() == FollowerState::Running)
}

/// Tank drivebase on simulated devices
struct TankRobot {
    cfg: TankConfig,
    db: TankDrivebase,
    plant: TankPlant,
    follower: Option<Box<dyn Follower<TankDrivebase>>>,
}

impl TankRobot {
    fn new(cfg: TankConfig, warmup: Duration) -> Result<Self, RuntimeError> {
        let (hw, rig) = TankHardware::simulated();
        let db = TankDrivebase::new(&cfg, hw, warmup)?;
        Ok(Self {
            plant: TankPlant::new(rig, &cfg),
            cfg,
            db,
            follower: None,
        })
    }

    fn follower_for(&self, cmd: DriveCommand) -> Result<Box<dyn Follower<TankDrivebase>>, RuntimeError> {
        match cmd {
            DriveCommand::FollowPath {
                follower: FollowerKind::Segment,
                path,
                reverse,
                ..
            } => Ok(Box::new(TankPathFollower::new(path, &self.cfg.follower, reverse))),
            DriveCommand::FollowPath {
                follower: FollowerKind::Ramsete,
                path,
                ..
            } => Ok(Box::new(TankRamsete::new(path, &self.cfg.ramsete))),
            other => Err(RuntimeError::unsupported(&other, Flavor::Tank)),
        }
    }

    fn step(&mut self, open_loop: Option<&DriveCommand>, dt: f64) {
        self.plant.step(dt);
        self.db.update(dt);

        if let Some(follower) = self.follower.as_mut() {
            follower.tick(&mut self.db, dt);
            if follower.state() == FollowerState::Running {
                return;
            }
        }

        match open_loop {
            Some(DriveCommand::ChassisSpeeds { dx, dtheta, .. }) => {
                let wheels = self.db.inverse_kinematics(&Twist2d::new(*dx, 0.0, *dtheta));
                let max = self.cfg.max_velocity;
                self.db
                    .set_power((wheels.left / max).clamp(-1.0, 1.0), (wheels.right / max).clamp(-1.0, 1.0));
            }
            Some(DriveCommand::TankPower { left, right }) => {
                self.db.set_power(left.clamp(-1.0, 1.0), right.clamp(-1.0, 1.0));
            }
            _ => self.db.stop(),
        }
    }

    fn state(&self) -> DrivebaseState {
        DrivebaseState {
            pose: self.db.pose(),
            velocity: self.db.velocity(),
            angular_velocity: self.db.angular_velocity(),
            total_angle: self.db.total_angle(),
            degraded: self.db.is_degraded(),
            follower: status(self.follower.as_deref()),
            modules: Vec::new(),
        }
    }
}

/// Swerve drivebase on simulated devices
struct SwerveRobot {
    cfg: SwerveConfig,
    db: SwerveDrivebase,
    plant: SwervePlant,
    follower: Option<Box<dyn Follower<SwerveDrivebase>>>,
}

impl SwerveRobot {
    fn new(cfg: SwerveConfig, warmup: Duration) -> Result<Self, RuntimeError> {
        let (hw, rig) = SwerveHardware::simulated(&cfg)?;
        let db = SwerveDrivebase::new(&cfg, hw, warmup)?;
        Ok(Self {
            plant: SwervePlant::new(rig, &cfg)?,
            cfg,
            db,
            follower: None,
        })
    }

    fn follower_for(&self, cmd: DriveCommand) -> Result<Box<dyn Follower<SwerveDrivebase>>, RuntimeError> {
        match cmd {
            DriveCommand::FollowPath {
                follower: FollowerKind::PurePursuit,
                path,
                look_ahead,
                ..
            } => Ok(Box::new(SwervePurePursuit::new(
                path,
                look_ahead.unwrap_or(self.cfg.look_ahead),
            ))),
            DriveCommand::FollowPath {
                follower: FollowerKind::Ramsete,
                path,
                ..
            } => Ok(Box::new(SwerveRamsete::new(path, self.cfg.ramsete))),
            DriveCommand::FollowPath {
                follower: FollowerKind::SwervePath,
                path,
                ..
            } => Ok(Box::new(SwervePathFollower::new(path))),
            DriveCommand::DirectionRotate { dx, dy, dtheta, duration } => Ok(Box::new(DirectionRotate::new(
                Translation2d::new(dx, dy),
                dtheta,
                duration,
            ))),
            DriveCommand::AnglePower { angle, power, duration } => {
                Ok(Box::new(AnglePower::new(angle, power, duration)))
            }
            other => Err(RuntimeError::unsupported(&other, Flavor::Swerve)),
        }
    }

    fn step(&mut self, open_loop: Option<&DriveCommand>, dt: f64) {
        self.plant.step(dt);
        self.db.update(dt);

        let following = match self.follower.as_mut() {
            Some(follower) => {
                follower.tick(&mut self.db, dt);
                follower.state() == FollowerState::Running
            }
            None => false,
        };

        if !following {
            match open_loop {
                Some(DriveCommand::ChassisSpeeds { dx, dy, dtheta }) => {
                    self.db.set_chassis_speeds(&Twist2d::new(*dx, *dy, *dtheta));
                }
                _ => self.db.stop(),
            }
        }
        self.db.run(dt);
    }

    fn state(&self) -> DrivebaseState {
        DrivebaseState {
            pose: self.db.pose(),
            velocity: self.db.velocity(),
            angular_velocity: self.db.angular_velocity(),
            total_angle: self.db.total_angle(),
            degraded: self.db.is_degraded(),
            follower: status(self.follower.as_deref()),
            modules: self.db.status(),
        }
    }
}

enum Robot {
    Tank(TankRobot),
    Swerve(SwerveRobot),
}

pub struct Runtime {
    robot: Robot,
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(flavor: Flavor, settings: &RobotSettings) -> Result<Self, RuntimeError> {
        let warmup = settings.gyro_warmup();
        let robot = match flavor {
            Flavor::Tank => Robot::Tank(TankRobot::new(settings.tank.clone().unwrap_or_default(), warmup)?),
            Flavor::Swerve => Robot::Swerve(SwerveRobot::new(settings.swerve.clone().unwrap_or_default(), warmup)?),
        };
        Ok(Self {
            robot,
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        })
    }

    pub fn flavor(&self) -> Flavor {
        match self.robot {
            Robot::Tank(_) => Flavor::Tank,
            Robot::Swerve(_) => Flavor::Swerve,
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    fn is_degraded(&self) -> bool {
        match &self.robot {
            Robot::Tank(r) => r.db.is_degraded(),
            Robot::Swerve(r) => r.db.is_degraded(),
        }
    }

    fn is_following(&self) -> bool {
        match &self.robot {
            Robot::Tank(r) => is_running(r.follower.as_deref()),
            Robot::Swerve(r) => is_running(r.follower.as_deref()),
        }
    }

    fn cancel_follower(&mut self) {
        match &mut self.robot {
            Robot::Tank(r) => r.follower.iter_mut().for_each(|f| f.cancel()),
            Robot::Swerve(r) => r.follower.iter_mut().for_each(|f| f.cancel()),
        }
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: DriveCommand) -> Result<(), RuntimeError> {
        if cmd.is_open_loop() {
            debug!("Received command: {:?}", &cmd);
        } else {
            info!("Received command: {}", cmd.label());
        }

        match cmd {
            DriveCommand::ChassisSpeeds { dx, dy, dtheta } => {
                if !Twist2d::new(dx, dy, dtheta).is_finite() {
                    return Err(RuntimeError::BadCommand {
                        command: cmd.label().to_string(),
                        reason: "non-finite speeds".to_string(),
                    });
                }
                self.take_open_loop(cmd);
            }
            DriveCommand::TankPower { left, right } => {
                if self.flavor() != Flavor::Tank {
                    return Err(RuntimeError::unsupported(&cmd, self.flavor()));
                }
                if !(left.is_finite() && right.is_finite()) {
                    return Err(RuntimeError::BadCommand {
                        command: cmd.label().to_string(),
                        reason: "non-finite power".to_string(),
                    });
                }
                self.take_open_loop(cmd);
            }
            DriveCommand::Cancel => {
                self.cancel_follower();
                self.latest_cmd = None;
            }
            DriveCommand::Mode { loop_type } => match &mut self.robot {
                Robot::Tank(r) => r.db.init(loop_type),
                Robot::Swerve(r) => r.db.init(loop_type),
            },
            cmd => {
                self.start_follower(cmd)?;
                self.latest_cmd = None;
            }
        }
        Ok(())
    }

    fn take_open_loop(&mut self, cmd: DriveCommand) {
        if self.is_following() {
            info!("Open-loop command overrides the running follower");
            self.cancel_follower();
        }
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Build and start a follower; the old one keeps running if this fails
    fn start_follower(&mut self, cmd: DriveCommand) -> Result<(), RuntimeError> {
        match &mut self.robot {
            Robot::Tank(r) => {
                let mut follower = r.follower_for(cmd)?;
                follower.start(&mut r.db)?;
                r.follower = Some(follower);
            }
            Robot::Swerve(r) => {
                let mut follower = r.follower_for(cmd)?;
                follower.start(&mut r.db)?;
                r.follower = Some(follower);
            }
        }
        Ok(())
    }

    /// One loop iteration of `dt` seconds, watchdog included
    pub fn tick(&mut self, dt: f64) -> DrivebaseState {
        let cmd_age = self.cmd_received_at.elapsed();
        let fresh = self.latest_cmd.is_some() && cmd_age <= CMD_TIMEOUT;
        let open_loop = if fresh { self.latest_cmd.as_ref() } else { None };

        match &mut self.robot {
            Robot::Tank(r) => r.step(open_loop, dt),
            Robot::Swerve(r) => r.step(open_loop, dt),
        }

        let health = if self.is_degraded() {
            RuntimeHealth::Degraded
        } else if fresh || self.is_following() {
            RuntimeHealth::Ok
        } else {
            RuntimeHealth::CmdStale
        };
        if health == RuntimeHealth::CmdStale && self.health == RuntimeHealth::Ok && self.latest_cmd.is_some() {
            // Watchdog triggered - stop the robot
            warn!("Command stale ({:?} old), stopping robot", cmd_age);
        }
        self.health = health;
        self.state()
    }

    pub fn state(&self) -> DrivebaseState {
        match &self.robot {
            Robot::Tank(r) => r.state(),
            Robot::Swerve(r) => r.state(),
        }
    }
}

/// Serve `runtime` over zenoh. The runtime is built beforehand since its
/// heading warmup blocks.
pub async fn run(mut runtime: Runtime) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Drivebase ready: {}", runtime.flavor());

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let pub_state = session.declare_publisher(TOPIC_STATE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let dt = 1.0 / LOOP_HZ as f64;
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_DRIVE);
    info!("Publishing to: {}, {}", TOPIC_STATE, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking)
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => {
                    if let Err(e) = runtime.on_command(cmd) {
                        warn!("Command rejected: {}", e);
                    }
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Sense, follow or apply the open-loop command (includes watchdog logic)
        let state = runtime.tick(dt);

        // 3. Publish state
        let state_json = serde_json::to_string(&state)?;
        pub_state.put(state_json).await?;

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::assert_close;
    use crate::path::tests::{straight_chassis, straight_tank};

    const DT: f64 = 0.02;

    fn settings() -> RobotSettings {
        RobotSettings {
            gyro_warmup_secs: 0.0,
            ..RobotSettings::default()
        }
    }

    fn tank_power(rt: &Runtime) -> (f64, f64) {
        match &rt.robot {
            Robot::Tank(r) => (r.db.left_power(), r.db.right_power()),
            Robot::Swerve(_) => panic!("not a tank"),
        }
    }

    #[test]
    fn test_starts_stale() {
        let mut rt = Runtime::new(Flavor::Tank, &settings()).unwrap();
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        rt.tick(DT);
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        assert_eq!(tank_power(&rt), (0.0, 0.0));
    }

    #[test]
    fn test_open_loop_then_watchdog_stops() {
        let mut rt = Runtime::new(Flavor::Tank, &settings()).unwrap();
        rt.on_command(DriveCommand::TankPower { left: 0.5, right: 0.25 })
            .unwrap();
        rt.tick(DT);
        assert_eq!(rt.health(), RuntimeHealth::Ok);
        assert_eq!(tank_power(&rt), (0.5, 0.25));

        rt.cmd_received_at = Instant::now() - CMD_TIMEOUT - Duration::from_millis(1);
        rt.tick(DT);
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        assert_eq!(tank_power(&rt), (0.0, 0.0));
    }

    #[test]
    fn test_tank_chassis_speeds_drive_forward() {
        let mut rt = Runtime::new(Flavor::Tank, &settings()).unwrap();
        rt.on_command(DriveCommand::ChassisSpeeds {
            dx: 60.0,
            dy: 0.0,
            dtheta: 0.0,
        })
        .unwrap();
        for _ in 0..10 {
            rt.tick(DT);
        }
        let (left, right) = tank_power(&rt);
        assert_close(left, 0.5, 1e-12);
        assert_close(right, 0.5, 1e-12);
        assert!(rt.state().pose.x > 0.0);
    }

    #[test]
    fn test_rejects_wrong_flavor_commands() {
        let mut rt = Runtime::new(Flavor::Swerve, &settings()).unwrap();
        let err = rt
            .on_command(DriveCommand::TankPower { left: 0.1, right: 0.1 })
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Unsupported { flavor: Flavor::Swerve, .. }));

        let mut rt = Runtime::new(Flavor::Tank, &settings()).unwrap();
        let err = rt
            .on_command(DriveCommand::AnglePower {
                angle: 0.0,
                power: 0.5,
                duration: 1.0,
            })
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Unsupported { flavor: Flavor::Tank, .. }));
    }

    #[test]
    fn test_swerve_pure_pursuit_runs_to_done() {
        let mut rt = Runtime::new(Flavor::Swerve, &settings()).unwrap();
        rt.tick(DT);
        rt.on_command(DriveCommand::FollowPath {
            follower: FollowerKind::PurePursuit,
            path: straight_chassis(10.0, 5.0, DT),
            reverse: false,
            look_ahead: None,
        })
        .unwrap();

        let mut state = rt.state();
        for _ in 0..500 {
            state = rt.tick(DT);
            if state.follower.as_ref().is_some_and(|f| f.state == FollowerState::Done) {
                break;
            }
            assert_eq!(rt.health(), RuntimeHealth::Ok);
        }
        let follower = state.follower.unwrap();
        assert_eq!(follower.name, "straight");
        assert_eq!(follower.state, FollowerState::Done);
        assert_close(state.pose.x, 10.0, 0.5);
        assert_eq!(state.modules.len(), 4);
    }

    #[test]
    fn test_cancel_stops_tank_follower() {
        let mut rt = Runtime::new(Flavor::Tank, &settings()).unwrap();
        rt.tick(DT);
        rt.on_command(DriveCommand::FollowPath {
            follower: FollowerKind::Segment,
            path: straight_tank(48.0, 24.0, DT, 12.0),
            reverse: false,
            look_ahead: None,
        })
        .unwrap();
        rt.tick(DT);
        assert!(tank_power(&rt).0 > 0.0);

        rt.on_command(DriveCommand::Cancel).unwrap();
        let state = rt.tick(DT);
        assert_eq!(state.follower.unwrap().state, FollowerState::Cancelled);
        assert_eq!(tank_power(&rt), (0.0, 0.0));
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_open_loop_overrides_follower() {
        let mut rt = Runtime::new(Flavor::Tank, &settings()).unwrap();
        rt.tick(DT);
        rt.on_command(DriveCommand::FollowPath {
            follower: FollowerKind::Ramsete,
            path: straight_tank(48.0, 24.0, DT, 12.0),
            reverse: false,
            look_ahead: None,
        })
        .unwrap();
        rt.tick(DT);
        rt.on_command(DriveCommand::TankPower { left: -0.2, right: 0.2 })
            .unwrap();
        let state = rt.tick(DT);
        assert_eq!(state.follower.unwrap().state, FollowerState::Cancelled);
        assert_eq!(tank_power(&rt), (-0.2, 0.2));
    }

    #[test]
    fn test_failed_start_keeps_previous_follower() {
        let mut rt = Runtime::new(Flavor::Swerve, &settings()).unwrap();
        rt.tick(DT);
        rt.on_command(DriveCommand::AnglePower {
            angle: 0.0,
            power: 0.2,
            duration: 5.0,
        })
        .unwrap();
        let err = rt
            .on_command(DriveCommand::AnglePower {
                angle: 0.0,
                power: 2.0,
                duration: 5.0,
            })
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Follower(FollowerError::BadInput { .. })));
        let state = rt.tick(DT);
        assert_eq!(state.follower.unwrap().state, FollowerState::Running);
    }
}
