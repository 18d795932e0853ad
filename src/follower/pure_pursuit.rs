// Pure pursuit on a swerve drivebase
use tracing::{debug, info};

use super::{Follower, FollowerError, FollowerState, Lifecycle};
use crate::drivebase::SwerveDrivebase;
use crate::geometry::{Pose2d, Translation2d, lerp};
use crate::motion::{MODULE_COUNT, ModuleState};
use crate::path::{Path, PathKind, PathSample, WheelGroup};

/// Distance to the path end, from the robot or from its closest path point,
/// under which a terminal follower is done
pub const END_TOLERANCE: f64 = 0.1;

/// Point on the path nearest the robot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    pub segment: usize,
    pub param: f64,
    pub point: Translation2d,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAhead {
    pub point: Translation2d,
    /// The look-ahead ran past the path end and was clamped to it
    pub terminal: bool,
}

/// Nearest point over every segment, `param` clamped to [0, 1]. Ties go to
/// the lowest segment index.
pub fn closest_point(samples: &[PathSample], pos: Translation2d) -> Option<ClosestPoint> {
    let first = samples.first()?;
    if samples.len() == 1 {
        return Some(ClosestPoint {
            segment: 0,
            param: 0.0,
            point: first.translation(),
        });
    }

    let mut best: Option<(f64, ClosestPoint)> = None;
    for (i, pair) in samples.windows(2).enumerate() {
        let p0 = pair[0].translation();
        let d = pair[1].translation() - p0;
        let len2 = d.dot(d);
        let param = if len2 > 0.0 {
            ((pos - p0).dot(d) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let point = p0 + d * param;
        let dist = point.distance(pos);
        if best.is_none_or(|(b, _)| dist < b) {
            best = Some((
                dist,
                ClosestPoint {
                    segment: i,
                    param,
                    point,
                },
            ));
        }
    }
    best.map(|(_, cp)| cp)
}

/// Walk `distance` along the path from `from`
pub fn look_ahead(samples: &[PathSample], from: &ClosestPoint, distance: f64) -> Option<LookAhead> {
    let last = samples.last()?.translation();
    let mut remaining = distance;
    let mut start = from.point;
    for pair in samples.iter().skip(from.segment).skip(1) {
        let end = pair.translation();
        let seg_len = start.distance(end);
        if remaining <= seg_len {
            let point = if seg_len > 0.0 {
                start + (end - start) * (remaining / seg_len)
            } else {
                start
            };
            return Some(LookAhead {
                point,
                terminal: false,
            });
        }
        remaining -= seg_len;
        start = end;
    }
    Some(LookAhead {
        point: last,
        terminal: true,
    })
}

pub struct SwervePurePursuit {
    path: Path,
    look_ahead: f64,
    life: Lifecycle,
}

impl SwervePurePursuit {
    /// `path` must be a chassis path; `look_ahead` is in path units
    pub fn new(path: Path, look_ahead: f64) -> Self {
        Self {
            path,
            look_ahead,
            life: Lifecycle::default(),
        }
    }

    fn samples(&self) -> &[PathSample] {
        self.path.group(WheelGroup::Main).unwrap_or(&[])
    }

    fn command(&self, pose: &Pose2d) -> Option<(ClosestPoint, LookAhead, ModuleState)> {
        let samples = self.samples();
        let closest = closest_point(samples, pose.translation())?;
        let look = look_ahead(samples, &closest, self.look_ahead)?;

        let seg = closest.segment;
        let velocity = match (samples.get(seg), samples.get(seg + 1)) {
            (Some(a), Some(b)) => lerp(a.velocity, b.velocity, closest.param),
            (Some(a), None) => a.velocity,
            _ => 0.0,
        };

        let robot = (look.point - pose.translation()).rotate_by(-pose.heading);
        Some((closest, look, ModuleState::new(robot.angle_degrees(), velocity)))
    }
}

impl Follower<SwerveDrivebase> for SwervePurePursuit {
    fn name(&self) -> &str {
        self.path.name()
    }

    fn state(&self) -> FollowerState {
        self.life.state()
    }

    fn start(&mut self, db: &mut SwerveDrivebase) -> Result<(), FollowerError> {
        self.life.check_startable(self.name())?;
        self.path.require_kind(PathKind::Chassis)?;
        self.path.validate()?;
        if !(self.look_ahead >= 0.0) || !self.look_ahead.is_finite() {
            return Err(FollowerError::bad_input(
                self.name(),
                format!("look-ahead must be >= 0, got {}", self.look_ahead),
            ));
        }
        if db.is_degraded() {
            return Err(FollowerError::Degraded {
                follower: self.name().to_string(),
            });
        }

        db.reset_odometry(self.path.start_pose()?);
        self.life.begin();
        info!("pure pursuit '{}' started, look-ahead {}", self.name(), self.look_ahead);
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

        let pose = db.pose();
        let Some((closest, look, state)) = self.command(&pose) else {
            db.stop();
            self.life.finish();
            return;
        };

        // the closest point pins to the end once the robot reaches or passes it
        let end = self.samples().last().map_or(look.point, |s| s.translation());
        let at_end = pose.translation().distance(end) < END_TOLERANCE || closest.point.distance(end) < END_TOLERANCE;
        if look.terminal && at_end {
            db.stop();
            self.life.finish();
            info!("pure pursuit '{}' done at ({:.2}, {:.2})", self.name(), pose.x, pose.y);
            return;
        }

        debug!(
            "pure pursuit '{}': look ({:.2}, {:.2}) terminal {} -> {:.2} @ {:.2}",
            self.path.name(),
            look.point.x,
            look.point.y,
            look.terminal,
            state.speed,
            state.angle
        );
        db.set_targets(&[state; MODULE_COUNT]);
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

    fn sample(x: f64, y: f64, velocity: f64) -> PathSample {
        PathSample {
            x,
            y,
            velocity,
            ..PathSample::default()
        }
    }

    fn line(to: f64, velocity: f64) -> Path {
        Path::Chassis {
            name: "line".into(),
            period: 0.02,
            main: vec![sample(0.0, 0.0, velocity), sample(to, 0.0, velocity)],
        }
    }

    #[test]
    fn test_closest_point_clamped_and_lowest_index() {
        let samples = [sample(0.0, 0.0, 0.0), sample(4.0, 0.0, 0.0), sample(4.0, 4.0, 0.0)];
        let cp = closest_point(&samples, Translation2d::new(-3.0, 1.0)).unwrap();
        assert_eq!(cp.segment, 0);
        assert_eq!(cp.param, 0.0);

        // equidistant from both segments, at their shared corner
        let cp = closest_point(&samples, Translation2d::new(5.0, -1.0)).unwrap();
        assert_eq!(cp.segment, 0);
        assert_close(cp.point.x, 4.0, 1e-12);

        let cp = closest_point(&samples, Translation2d::new(5.0, 2.0)).unwrap();
        assert_eq!(cp.segment, 1);
        assert_close(cp.param, 0.5, 1e-12);
    }

    #[test]
    fn test_look_ahead_turns_corner_and_clamps() {
        let samples = [sample(0.0, 0.0, 0.0), sample(4.0, 0.0, 0.0), sample(4.0, 4.0, 0.0)];
        let cp = closest_point(&samples, Translation2d::new(3.0, 0.0)).unwrap();
        let la = look_ahead(&samples, &cp, 2.0).unwrap();
        assert!(!la.terminal);
        assert_close(la.point.x, 4.0, 1e-12);
        assert_close(la.point.y, 1.0, 1e-12);

        let la = look_ahead(&samples, &cp, 10.0).unwrap();
        assert!(la.terminal);
        assert_eq!(la.point, Translation2d::new(4.0, 4.0));
    }

    #[test]
    fn test_straight_path_first_command_then_done() {
        let (mut db, rig) = build(&test_config());
        let mut pp = SwervePurePursuit::new(line(10.0, 5.0), 2.0);
        db.update(0.02);
        pp.start(&mut db).unwrap();
        pp.tick(&mut db, 0.02);
        for module in db.modules() {
            assert_close(module.target_angle().unwrap(), 0.0, 1e-9);
            assert_close(module.target_speed().unwrap(), 5.0, 1e-9);
        }

        let mut dist = [0.0; MODULE_COUNT];
        for _ in 0..400 {
            if pp.is_done() {
                break;
            }
            track_targets(&db, &rig, &mut dist, 0.02);
            db.update(0.02);
            pp.tick(&mut db, 0.02);
        }
        assert_eq!(pp.state(), FollowerState::Done);
        assert_close(db.pose().x, 10.0, END_TOLERANCE);
        for (module, handles) in db.modules().iter().zip(rig.modules.iter()) {
            assert!(!module.has_targets());
            assert_eq!(handles.drive.power(), 0.0);
        }
    }

    fn run_to_end(velocity: f64) -> (SwerveDrivebase, SwervePurePursuit) {
        let (mut db, rig) = build(&test_config());
        let mut pp = SwervePurePursuit::new(line(10.0, velocity), 2.0);
        db.update(0.02);
        pp.start(&mut db).unwrap();
        pp.tick(&mut db, 0.02);
        let mut dist = [0.0; MODULE_COUNT];
        for _ in 0..2000 {
            if pp.is_done() {
                break;
            }
            track_targets(&db, &rig, &mut dist, 0.02);
            db.update(0.02);
            pp.tick(&mut db, 0.02);
        }
        (db, pp)
    }

    #[test]
    fn test_finishes_when_steps_overshoot_end() {
        for velocity in [13.0, 17.0, 23.0, 27.0, 37.0, 43.0] {
            let (db, pp) = run_to_end(velocity);
            assert_eq!(pp.state(), FollowerState::Done, "at {velocity} in/s");
            assert_close(db.pose().x, 10.0, velocity * 0.02 + 1e-6);
            assert!(db.modules().iter().all(|m| !m.has_targets()));
        }
    }

    #[test]
    fn test_done_when_already_past_end() {
        let (mut db, rig) = build(&test_config());
        let mut pp = SwervePurePursuit::new(line(10.0, 13.0), 2.0);
        db.update(0.02);
        pp.start(&mut db).unwrap();
        db.reset_odometry(Pose2d::new(12.5, 0.3, 0.0));
        pp.tick(&mut db, 0.02);
        assert_eq!(pp.state(), FollowerState::Done);
        assert_eq!(rig.modules[0].drive.power(), 0.0);
    }

    #[test]
    fn test_done_within_one_tick_of_terminal_at_end() {
        let (mut db, rig) = build(&test_config());
        let mut pp = SwervePurePursuit::new(line(0.05, 3.0), 2.0);
        db.update(0.02);
        pp.start(&mut db).unwrap();
        pp.tick(&mut db, 0.02);
        assert!(pp.is_done());
        assert_eq!(rig.modules[0].drive.power(), 0.0);
        assert!(db.modules().iter().all(|m| m.target_speed().is_none()));
    }

    #[test]
    fn test_steers_toward_offset_path() {
        let (mut db, _) = build(&test_config());
        let path = Path::Chassis {
            name: "offset".into(),
            period: 0.02,
            main: vec![sample(0.0, 0.0, 2.0), sample(0.0, 10.0, 2.0)],
        };
        let mut pp = SwervePurePursuit::new(path, 2.0);
        db.update(0.02);
        pp.start(&mut db).unwrap();
        pp.tick(&mut db, 0.02);
        // look-ahead point is straight left of the robot
        let fl = db.module(crate::motion::ModuleId::FrontLeft);
        assert_close(fl.target_angle().unwrap(), 90.0, 1e-9);
        assert_close(fl.target_speed().unwrap(), 2.0, 1e-12);
    }

    #[test]
    fn test_bad_inputs_refuse_to_start() {
        let (mut db, _) = build(&test_config());
        let empty = Path::Chassis {
            name: "empty".into(),
            period: 0.02,
            main: vec![],
        };
        let mut pp = SwervePurePursuit::new(empty, 2.0);
        assert!(pp.start(&mut db).is_err());
        assert_eq!(pp.state(), FollowerState::Init);

        let mut pp = SwervePurePursuit::new(line(10.0, 1.0), -1.0);
        assert!(matches!(pp.start(&mut db), Err(FollowerError::BadInput { .. })));

        let tank = Path::Tank {
            name: "tank".into(),
            period: 0.02,
            left: vec![sample(0.0, 0.0, 0.0)],
            right: vec![sample(0.0, 0.0, 0.0)],
        };
        let mut pp = SwervePurePursuit::new(tank, 2.0);
        assert!(matches!(pp.start(&mut db), Err(FollowerError::Path(_))));
    }

    #[test]
    fn test_cancel_twice_same_state() {
        let (mut db, rig) = build(&test_config());
        let mut pp = SwervePurePursuit::new(line(10.0, 5.0), 2.0);
        db.update(0.02);
        pp.start(&mut db).unwrap();
        pp.tick(&mut db, 0.02);
        db.run(0.02);
        pp.cancel();
        pp.cancel();
        assert_eq!(pp.state(), FollowerState::Cancelled);
        pp.tick(&mut db, 0.02);
        assert_eq!(rig.modules[0].drive.power(), 0.0);
        assert!(db.modules().iter().all(|m| !m.has_targets()));
        pp.cancel();
        assert_eq!(pp.state(), FollowerState::Cancelled);
    }
}
