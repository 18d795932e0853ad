// Ramsete trajectory tracking for tank and swerve
use tracing::{debug, error, info};

use super::{Follower, FollowerError, FollowerState, Lifecycle};
use crate::config::{PidGains, RamseteGains, TankRamseteConfig};
use crate::drivebase::{SwerveDrivebase, TankDrivebase};
use crate::geometry::{METERS_PER_INCH, Pose2d, Translation2d, Twist2d, shortest_arc_degrees};
use crate::motion::{PidCtrl, RamseteController};
use crate::path::{Path, PathError};

fn to_meters(pose: &Pose2d) -> Pose2d {
    Pose2d::new(pose.x * METERS_PER_INCH, pose.y * METERS_PER_INCH, pose.heading)
}

/// Path timing and the controller shared by both drive flavors
struct Tracker {
    path: Path,
    ctrl: RamseteController,
    elapsed: f64,
}

impl Tracker {
    fn new(path: Path, gains: RamseteGains) -> Self {
        Self {
            path,
            ctrl: RamseteController::new(gains.b, gains.zeta),
            elapsed: 0.0,
        }
    }

    fn finished(&self) -> bool {
        // half a period of slack so float drift cannot skip the last sample
        self.elapsed > self.path.duration() + self.path.period() / 2.0
    }

    /// Corrected forward speed (in/s) and rotation (deg/s) for `pose`
    fn step(&mut self, pose: &Pose2d, dt: f64) -> Result<(f64, f64), PathError> {
        let period = self.path.period();
        let reference = self.path.center_at_time(self.elapsed)?;
        let omega_ref = if self.elapsed >= period {
            let prev = self.path.center_at_time(self.elapsed - period)?;
            shortest_arc_degrees(prev.heading, reference.heading) / period
        } else {
            0.0
        };

        let cmd = self.ctrl.calculate(
            &to_meters(pose),
            &to_meters(&reference.pose()),
            reference.velocity * METERS_PER_INCH,
            omega_ref.to_radians(),
        );
        debug!(
            "ramsete '{}' t {:.2}: ref ({:.2}, {:.2}, {:.1}) v {:.2} -> v {:.3} m/s w {:.3} rad/s",
            self.path.name(),
            self.elapsed,
            reference.x,
            reference.y,
            reference.heading,
            reference.velocity,
            cmd.v,
            cmd.omega
        );
        self.elapsed += dt;
        Ok((cmd.v / METERS_PER_INCH, cmd.omega.to_degrees()))
    }
}

pub struct TankRamsete {
    tracker: Tracker,
    left_pid: PidCtrl,
    right_pid: PidCtrl,
    life: Lifecycle,
}

impl TankRamsete {
    pub fn new(path: Path, cfg: &TankRamseteConfig) -> Self {
        Self {
            tracker: Tracker::new(path, cfg.gains()),
            left_pid: PidCtrl::new(cfg.left, false),
            right_pid: PidCtrl::new(cfg.right, false),
            life: Lifecycle::default(),
        }
    }

    pub fn with_velocity_gains(mut self, left: PidGains, right: PidGains) -> Self {
        self.left_pid = PidCtrl::new(left, false);
        self.right_pid = PidCtrl::new(right, false);
        self
    }
}

impl Follower<TankDrivebase> for TankRamsete {
    fn name(&self) -> &str {
        self.tracker.path.name()
    }

    fn state(&self) -> FollowerState {
        self.life.state()
    }

    fn start(&mut self, db: &mut TankDrivebase) -> Result<(), FollowerError> {
        self.life.check_startable(self.name())?;
        self.tracker.path.validate()?;
        RamseteGains {
            b: self.tracker.ctrl.b(),
            zeta: self.tracker.ctrl.zeta(),
        }
        .validate("ramsete")?;
        if db.is_degraded() {
            return Err(FollowerError::Degraded {
                follower: self.name().to_string(),
            });
        }

        db.set_pose(self.tracker.path.start_pose()?);
        self.tracker.elapsed = 0.0;
        self.left_pid.reset();
        self.right_pid.reset();
        self.life.begin();
        info!("tank ramsete '{}' started", self.name());
        Ok(())
    }

    fn tick(&mut self, db: &mut TankDrivebase, dt: f64) {
        if self.life.take_stop() {
            db.stop();
            return;
        }
        if !self.life.is_running() {
            return;
        }
        if self.tracker.finished() {
            db.stop();
            self.life.finish();
            info!("tank ramsete '{}' done", self.name());
            return;
        }

        let (v, omega) = match self.tracker.step(&db.pose(), dt) {
            Ok(cmd) => cmd,
            Err(e) => {
                error!("tank ramsete '{}': {}", self.name(), e);
                db.stop();
                self.life.finish();
                return;
            }
        };
        let wheels = db.inverse_kinematics(&Twist2d::new(v, 0.0, omega));
        let left = self.left_pid.output(wheels.left, db.left_velocity(), dt);
        let right = self.right_pid.output(wheels.right, db.right_velocity(), dt);
        db.set_power(left, right);
    }

    fn cancel(&mut self) {
        self.life.cancel();
    }
}

pub struct SwerveRamsete {
    tracker: Tracker,
    life: Lifecycle,
}

impl SwerveRamsete {
    pub fn new(path: Path, gains: RamseteGains) -> Self {
        Self {
            tracker: Tracker::new(path, gains),
            life: Lifecycle::default(),
        }
    }
}

impl Follower<SwerveDrivebase> for SwerveRamsete {
    fn name(&self) -> &str {
        self.tracker.path.name()
    }

    fn state(&self) -> FollowerState {
        self.life.state()
    }

    fn start(&mut self, db: &mut SwerveDrivebase) -> Result<(), FollowerError> {
        self.life.check_startable(self.name())?;
        self.tracker.path.validate()?;
        RamseteGains {
            b: self.tracker.ctrl.b(),
            zeta: self.tracker.ctrl.zeta(),
        }
        .validate("ramsete")?;
        if db.is_degraded() {
            return Err(FollowerError::Degraded {
                follower: self.name().to_string(),
            });
        }

        db.reset_odometry(self.tracker.path.start_pose()?);
        self.tracker.elapsed = 0.0;
        self.life.begin();
        info!("swerve ramsete '{}' started", self.name());
        Ok(())
    }

    fn tick(&mut self, db: &mut SwerveDrivebase, dt: f64) {
        if self.life.take_stop() {
            db.stop();
            return;
        }
        if !self.life.is_running() {
            return;
        }
        if self.tracker.finished() {
            db.stop();
            self.life.finish();
            info!("swerve ramsete '{}' done", self.name());
            return;
        }

        let pose = db.pose();
        let (v, omega) = match self.tracker.step(&pose, dt) {
            Ok(cmd) => cmd,
            Err(e) => {
                error!("swerve ramsete '{}': {}", self.name(), e);
                db.stop();
                self.life.finish();
                return;
            }
        };
        // robot-frame forward speed into the field frame
        let field = Translation2d::from_polar(v, pose.heading);
        db.set_chassis_speeds(&Twist2d::new(field.x, field.y, omega));
    }

    fn cancel(&mut self) {
        self.life.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivebase::swerve::tests as swerve_rig;
    use crate::drivebase::tank::tests as tank_rig;
    use crate::geometry::assert_close;
    use crate::hw::sim::TankPlant;
    use crate::motion::MODULE_COUNT;
    use crate::path::tests::{straight_chassis, straight_tank};

    #[test]
    fn test_swerve_on_reference_commands_reference_speed() {
        let (mut db, _) = swerve_rig::build(&swerve_rig::test_config());
        db.update(0.02);
        let mut follower = SwerveRamsete::new(straight_chassis(10.0, 5.0, 0.02), RamseteGains::default());
        follower.start(&mut db).unwrap();
        follower.tick(&mut db, 0.02);
        for module in db.modules() {
            assert_close(module.target_angle().unwrap(), 0.0, 1e-9);
            assert_close(module.target_speed().unwrap(), 5.0, 1e-9);
        }
    }

    #[test]
    fn test_swerve_follows_straight_path_to_end() {
        let (mut db, rig) = swerve_rig::build(&swerve_rig::test_config());
        let mut dist = [0.0; MODULE_COUNT];
        db.update(0.02);
        let mut follower = SwerveRamsete::new(straight_chassis(10.0, 5.0, 0.02), RamseteGains::default());
        follower.start(&mut db).unwrap();
        for _ in 0..200 {
            if follower.is_done() {
                break;
            }
            follower.tick(&mut db, 0.02);
            swerve_rig::track_targets(&db, &rig, &mut dist, 0.02);
            db.update(0.02);
        }
        assert_eq!(follower.state(), FollowerState::Done);
        assert_close(db.pose().x, 10.0, 0.2);
        assert_close(db.pose().y, 0.0, 1e-6);
        assert!(db.modules().iter().all(|m| !m.has_targets()));
    }

    #[test]
    fn test_tank_follows_straight_path() {
        let cfg = tank_rig::test_config();
        let (mut db, rig) = tank_rig::build(&cfg);
        let mut plant = TankPlant::new(rig, &cfg);
        let path = straight_tank(48.0, 24.0, 0.02, 1.0);
        let mut follower = TankRamsete::new(path, &cfg.ramsete);
        db.update(0.02);
        follower.start(&mut db).unwrap();
        assert_close(db.pose().y, 0.0, 1e-12);
        for _ in 0..300 {
            if follower.is_done() {
                break;
            }
            follower.tick(&mut db, 0.02);
            plant.step(0.02);
            db.update(0.02);
        }
        assert_eq!(follower.state(), FollowerState::Done);
        assert_close(db.pose().x, 48.0, 1.5);
        assert_close(db.pose().y, 0.0, 0.5);
        assert_eq!(db.left_power(), 0.0);
        assert_eq!(db.right_power(), 0.0);
    }

    #[test]
    fn test_tank_right_loop_uses_right_speed() {
        let cfg = tank_rig::test_config();
        let (mut db, rig) = tank_rig::build(&cfg);
        let p_only = PidGains::p(0.01);
        let mut follower =
            TankRamsete::new(straight_tank(48.0, 24.0, 0.02, 1.0), &cfg.ramsete).with_velocity_gains(p_only, p_only);
        db.update(0.02);
        follower.start(&mut db).unwrap();
        // left wheel races ahead, right wheel stalled
        rig.left.add_ticks(2000);
        db.update(0.02);
        follower.tick(&mut db, 0.02);
        assert!(db.left_power() < 0.0);
        assert!(db.right_power() > 0.0);
    }

    #[test]
    fn test_degraded_tank_refuses() {
        let cfg = tank_rig::test_config();
        let (hw, rig) = crate::drivebase::TankHardware::simulated();
        rig.gyro.set_connected(false);
        let mut db = TankDrivebase::new(&cfg, hw, std::time::Duration::from_millis(20)).unwrap();
        let mut follower = TankRamsete::new(straight_tank(48.0, 24.0, 0.02, 1.0), &cfg.ramsete);
        assert!(matches!(follower.start(&mut db), Err(FollowerError::Degraded { .. })));
        assert_eq!(follower.state(), FollowerState::Init);
    }

    #[test]
    fn test_cancel_stops_on_next_tick() {
        let cfg = tank_rig::test_config();
        let (mut db, _) = tank_rig::build(&cfg);
        let mut follower = TankRamsete::new(straight_tank(48.0, 24.0, 0.02, 1.0), &cfg.ramsete);
        db.update(0.02);
        follower.start(&mut db).unwrap();
        follower.tick(&mut db, 0.02);
        assert!(db.left_power() > 0.0);
        follower.cancel();
        follower.cancel();
        assert_eq!(follower.state(), FollowerState::Cancelled);
        follower.tick(&mut db, 0.02);
        assert_eq!(db.left_power(), 0.0);
        assert_eq!(db.right_power(), 0.0);
    }
}
