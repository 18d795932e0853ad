// Per-wheel sampled path on a swerve drivebase
use tracing::{debug, info};

use super::{Follower, FollowerError, FollowerState, Lifecycle};
use crate::drivebase::SwerveDrivebase;
use crate::motion::{MODULE_COUNT, ModuleState};
use crate::path::{Path, PathKind, WheelGroup};

const GROUPS: [WheelGroup; MODULE_COUNT] = [
    WheelGroup::FrontLeft,
    WheelGroup::FrontRight,
    WheelGroup::BackLeft,
    WheelGroup::BackRight,
];

/// Each module steers to its own sample's heading at the sample's velocity.
/// Works without a heading sensor since nothing here is field-relative.
pub struct SwervePathFollower {
    path: Path,
    index: usize,
    life: Lifecycle,
}

impl SwervePathFollower {
    pub fn new(path: Path) -> Self {
        Self {
            path,
            index: 0,
            life: Lifecycle::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn states(&self, index: usize) -> Option<[ModuleState; MODULE_COUNT]> {
        let mut states = [ModuleState::default(); MODULE_COUNT];
        for (state, group) in states.iter_mut().zip(GROUPS) {
            let s = self.path.sample(group, index).ok()?;
            *state = ModuleState::new(s.heading, s.velocity);
        }
        Some(states)
    }
}

impl Follower<SwerveDrivebase> for SwervePathFollower {
    fn name(&self) -> &str {
        self.path.name()
    }

    fn state(&self) -> FollowerState {
        self.life.state()
    }

    fn start(&mut self, _db: &mut SwerveDrivebase) -> Result<(), FollowerError> {
        self.life.check_startable(self.name())?;
        self.path.require_kind(PathKind::Swerve)?;
        self.path.validate()?;
        self.index = 0;
        self.life.begin();
        info!("swerve path '{}' started, {} samples", self.name(), self.path.len());
        Ok(())
    }

    fn tick(&mut self, db: &mut SwerveDrivebase, _dt: f64) {
        if self.life.take_stop() {
            db.stop();
            return;
        }
        if !self.life.is_running() {
            return;
        }

        match self.states(self.index) {
            Some(states) => {
                debug!(
                    "swerve path '{}' [{}]: fl {:.2} @ {:.2}",
                    self.path.name(),
                    self.index,
                    states[0].speed,
                    states[0].angle
                );
                db.set_targets(&states);
                self.index += 1;
            }
            None => {
                db.stop();
                self.life.finish();
                info!("swerve path '{}' done", self.name());
            }
        }
    }

    fn cancel(&mut self) {
        self.life.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivebase::swerve::tests::{build, test_config, track_targets};
    use crate::geometry::assert_close;
    use crate::path::PathSample;
    use crate::path::tests::straight_chassis;

    fn track(heading: f64, velocity: f64, count: usize) -> Vec<PathSample> {
        (0..count)
            .map(|i| PathSample {
                t: i as f64 * 0.02,
                heading,
                velocity,
                ..PathSample::default()
            })
            .collect()
    }

    fn crab(count: usize) -> Path {
        Path::Swerve {
            name: "crab".into(),
            period: 0.02,
            fl: track(90.0, 4.0, count),
            fr: track(90.0, 4.0, count),
            bl: track(90.0, 4.0, count),
            br: track(90.0, 4.0, count),
        }
    }

    #[test]
    fn test_each_module_gets_its_own_sample() {
        let (mut db, _) = build(&test_config());
        let path = Path::Swerve {
            name: "mixed".into(),
            period: 0.02,
            fl: track(10.0, 1.0, 3),
            fr: track(20.0, 2.0, 3),
            bl: track(30.0, 3.0, 3),
            br: track(40.0, 4.0, 3),
        };
        let mut follower = SwervePathFollower::new(path);
        db.update(0.02);
        follower.start(&mut db).unwrap();
        follower.tick(&mut db, 0.02);
        for (i, module) in db.modules().iter().enumerate() {
            assert_close(module.target_angle().unwrap(), 10.0 * (i + 1) as f64, 1e-9);
            assert_close(module.target_speed().unwrap(), (i + 1) as f64, 1e-9);
        }
    }

    #[test]
    fn test_crab_walk_then_stop() {
        let (mut db, rig) = build(&test_config());
        let mut follower = SwervePathFollower::new(crab(50));
        let mut dist = [0.0; MODULE_COUNT];
        db.update(0.02);
        follower.start(&mut db).unwrap();
        for _ in 0..100 {
            if follower.is_done() {
                break;
            }
            follower.tick(&mut db, 0.02);
            track_targets(&db, &rig, &mut dist, 0.02);
            db.update(0.02);
        }
        assert_eq!(follower.state(), FollowerState::Done);
        assert_eq!(follower.index(), 50);
        // 50 ticks at 4 in/s straight left
        assert_close(db.pose().y, 4.0, 0.01);
        assert_close(db.pose().x, 0.0, 1e-6);
        assert!(db.modules().iter().all(|m| !m.has_targets()));
        assert!(rig.modules.iter().all(|m| m.drive.power() == 0.0));
    }

    #[test]
    fn test_runs_without_heading_sensor() {
        let cfg = test_config();
        let (hw, rig) = crate::drivebase::SwerveHardware::simulated(&cfg).unwrap();
        rig.gyro.set_connected(false);
        let mut db = SwerveDrivebase::new(&cfg, hw, std::time::Duration::from_millis(20)).unwrap();
        assert!(db.is_degraded());
        let mut follower = SwervePathFollower::new(crab(5));
        follower.start(&mut db).unwrap();
        assert_eq!(follower.state(), FollowerState::Running);
    }

    #[test]
    fn test_rejects_chassis_path() {
        let (mut db, _) = build(&test_config());
        let mut follower = SwervePathFollower::new(straight_chassis(10.0, 5.0, 0.02));
        assert!(matches!(follower.start(&mut db), Err(FollowerError::Path(_))));
        assert_eq!(follower.state(), FollowerState::Init);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (mut db, rig) = build(&test_config());
        let mut follower = SwervePathFollower::new(crab(50));
        db.update(0.02);
        follower.start(&mut db).unwrap();
        follower.tick(&mut db, 0.02);
        db.run(0.02);
        follower.cancel();
        follower.cancel();
        follower.tick(&mut db, 0.02);
        assert_eq!(follower.state(), FollowerState::Cancelled);
        assert_eq!(follower.index(), 1);
        assert!(db.modules().iter().all(|m| !m.has_targets()));
        assert_eq!(rig.modules[0].drive.power(), 0.0);
    }
}
