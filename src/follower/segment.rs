// Sample-by-sample tank path follower
//
// One path sample per tick: feed-forward plus position feedback on each
// side, with a heading correction split across both.
use tracing::{debug, info};

use super::{Follower, FollowerError, FollowerState, Lifecycle};
use crate::config::TankFollowerConfig;
use crate::drivebase::TankDrivebase;
use crate::geometry::normalize_angle_degrees;
use crate::motion::{PidCtrl, PidaCtrl};
use crate::path::{Path, PathKind, PathSample, WheelGroup};

pub struct TankPathFollower {
    path: Path,
    reverse: bool,
    left: PidaCtrl,
    right: PidaCtrl,
    angle: PidCtrl,
    index: usize,
    left_start: f64,
    right_start: f64,
    start_angle: f64,
    target_start: f64,
    life: Lifecycle,
}

impl TankPathFollower {
    /// `reverse` drives the path backwards with the sides swapped
    pub fn new(path: Path, cfg: &TankFollowerConfig, reverse: bool) -> Self {
        Self {
            path,
            reverse,
            left: PidaCtrl::new(cfg.left),
            right: PidaCtrl::new(cfg.right),
            angle: PidCtrl::new(cfg.angle_correction, true),
            index: 0,
            left_start: 0.0,
            right_start: 0.0,
            start_angle: 0.0,
            target_start: 0.0,
            life: Lifecycle::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn segments(&self, index: usize) -> Option<(PathSample, PathSample)> {
        let left = self.path.sample(WheelGroup::Left, index).ok()?;
        let right = self.path.sample(WheelGroup::Right, index).ok()?;
        if self.reverse {
            Some((right.reversed(), left.reversed()))
        } else {
            Some((left, right))
        }
    }
}

impl Follower<TankDrivebase> for TankPathFollower {
    fn name(&self) -> &str {
        self.path.name()
    }

    fn state(&self) -> FollowerState {
        self.life.state()
    }

    fn start(&mut self, db: &mut TankDrivebase) -> Result<(), FollowerError> {
        self.life.check_startable(self.name())?;
        self.path.require_kind(PathKind::Tank)?;
        self.path.validate()?;
        self.angle.gains().validate("angle_correction")?;
        if db.is_degraded() {
            return Err(FollowerError::Degraded {
                follower: self.name().to_string(),
            });
        }

        self.left_start = db.left_distance();
        self.right_start = db.right_distance();
        self.start_angle = db.angle();
        self.target_start = self.path.sample(WheelGroup::Left, 0)?.heading;
        db.set_pose(self.path.start_pose()?);

        self.left.reset();
        self.right.reset();
        self.angle.reset();
        self.index = 0;
        self.life.begin();
        info!(
            "tank follower '{}' started, {} samples{}",
            self.name(),
            self.path.len(),
            if self.reverse { ", reversed" } else { "" }
        );
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

        if let Some((lseg, rseg)) = self.segments(self.index) {
            let ldist = db.left_distance() - self.left_start;
            let rdist = db.right_distance() - self.right_start;

            let mut lout = self
                .left
                .output(lseg.acceleration, lseg.velocity, lseg.position, ldist, db.left_velocity());
            let mut rout = self
                .right
                .output(rseg.acceleration, rseg.velocity, rseg.position, rdist, db.right_velocity());

            let target = normalize_angle_degrees(lseg.heading - self.target_start);
            let actual = normalize_angle_degrees(db.angle() - self.start_angle);
            let correction = self.angle.output(target, actual, dt);
            lout -= correction;
            rout += correction;

            debug!(
                "tank follower '{}' [{}]: l {:.2}/{:.2} r {:.2}/{:.2} head {:.2}/{:.2} -> {:.3} {:.3}",
                self.path.name(),
                self.index,
                lseg.position,
                ldist,
                rseg.position,
                rdist,
                target,
                actual,
                lout,
                rout
            );
            db.set_power(lout, rout);
        }

        self.index += 1;
        if self.index >= self.path.len() {
            db.set_power(0.0, 0.0);
            self.life.finish();
            info!("tank follower '{}' done", self.name());
        }
    }

    fn cancel(&mut self) {
        self.life.cancel();
    }
}
