// Open-loop: steer every module to one angle and drive at fixed power
use tracing::info;

use super::{Follower, FollowerError, FollowerState, Lifecycle};
use crate::drivebase::SwerveDrivebase;

pub struct AnglePower {
    angle: f64,
    power: f64,
    duration: f64,
    elapsed: f64,
    life: Lifecycle,
}

impl AnglePower {
    /// `angle` in degrees (robot frame), `power` in [-1, 1], `duration` in seconds
    pub fn new(angle: f64, power: f64, duration: f64) -> Self {
        Self {
            angle,
            power,
            duration,
            elapsed: 0.0,
            life: Lifecycle::default(),
        }
    }
}

impl Follower<SwerveDrivebase> for AnglePower {
    fn name(&self) -> &str {
        "angle-power"
    }

    fn state(&self) -> FollowerState {
        self.life.state()
    }

    fn start(&mut self, db: &mut SwerveDrivebase) -> Result<(), FollowerError> {
        self.life.check_startable(self.name())?;
        if !self.angle.is_finite() {
            return Err(FollowerError::bad_input(self.name(), "non-finite angle"));
        }
        if !(self.power.is_finite() && self.power.abs() <= 1.0) {
            return Err(FollowerError::bad_input(
                self.name(),
                format!("power must be in [-1, 1], got {}", self.power),
            ));
        }
        if !(self.duration.is_finite() && self.duration > 0.0) {
            return Err(FollowerError::bad_input(
                self.name(),
                format!("duration must be > 0, got {}", self.duration),
            ));
        }

        db.set_angle(self.angle);
        db.set_drive_power(self.power);
        self.elapsed = 0.0;
        self.life.begin();
        info!(
            "angle-power started: {:.2} deg at {:.2} for {:.2}s",
            self.angle, self.power, self.duration
        );
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
        self.elapsed += dt;
        if self.elapsed >= self.duration {
            db.stop();
            self.life.finish();
            info!("angle-power done");
        }
    }

    fn cancel(&mut self) {
        self.life.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivebase::swerve::tests::{build, test_config};
    use crate::geometry::assert_close;

    #[test]
    fn test_holds_angle_and_power_then_stops() {
        let (mut db, rig) = build(&test_config());
        db.update(0.02);
        let mut follower = AnglePower::new(45.0, 0.3, 0.1);
        follower.start(&mut db).unwrap();
        for module in db.modules() {
            assert_close(module.target_angle().unwrap(), 45.0, 1e-12);
            assert_eq!(module.target_speed(), None);
        }
        let mut ticks = 0;
        while !follower.is_done() && ticks < 20 {
            follower.tick(&mut db, 0.02);
            db.run(0.02);
            ticks += 1;
            if !follower.is_done() {
                assert_eq!(rig.modules[2].drive.power(), 0.3);
            }
        }
        assert_eq!(follower.state(), FollowerState::Done);
        assert!((5..=6).contains(&ticks));
        assert!(rig.modules.iter().all(|m| m.drive.power() == 0.0));
        assert!(db.modules().iter().all(|m| !m.has_targets()));
    }

    #[test]
    fn test_rejects_bad_power_and_duration() {
        let (mut db, rig) = build(&test_config());
        let mut follower = AnglePower::new(0.0, 1.5, 1.0);
        assert!(matches!(follower.start(&mut db), Err(FollowerError::BadInput { .. })));
        let mut follower = AnglePower::new(0.0, 0.5, -1.0);
        assert!(matches!(follower.start(&mut db), Err(FollowerError::BadInput { .. })));
        assert_eq!(follower.state(), FollowerState::Init);
        assert_eq!(rig.modules[0].drive.power(), 0.0);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (mut db, rig) = build(&test_config());
        let mut follower = AnglePower::new(0.0, 0.5, 10.0);
        follower.start(&mut db).unwrap();
        follower.cancel();
        follower.cancel();
        assert_eq!(rig.modules[0].drive.power(), 0.5);
        follower.tick(&mut db, 0.02);
        follower.cancel();
        assert_eq!(follower.state(), FollowerState::Cancelled);
        assert_eq!(rig.modules[0].drive.power(), 0.0);
    }
}
