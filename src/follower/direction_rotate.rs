// Hold a field-relative translation and rotation rate on a swerve drivebase
use tracing::{debug, info};

use super::{Follower, FollowerError, FollowerState, Lifecycle};
use crate::drivebase::SwerveDrivebase;
use crate::geometry::{Translation2d, Twist2d, shortest_arc_degrees};
use crate::motion::ModuleState;

/// Heading drift in degrees that forces the module targets to be recomputed
pub const HEADING_THRESHOLD: f64 = 0.5;

/// Below this every component of the command counts as zero
pub const NEAR_ZERO: f64 = 0.005;

pub struct DirectionRotate {
    translation: Translation2d,
    rotation: f64,
    duration: Option<f64>,
    elapsed: f64,
    last_heading: f64,
    dirty: bool,
    life: Lifecycle,
}

impl DirectionRotate {
    /// `translation` in in/s (field frame), `rotation` in deg/s, `duration`
    /// in seconds or `None` to hold until cancelled
    pub fn new(translation: Translation2d, rotation: f64, duration: Option<f64>) -> Self {
        Self {
            translation,
            rotation,
            duration,
            elapsed: 0.0,
            last_heading: 0.0,
            dirty: true,
            life: Lifecycle::default(),
        }
    }

    /// Retarget in place; takes effect on the next tick
    pub fn update_targets(&mut self, translation: Translation2d, rotation: f64) {
        if translation != self.translation || rotation != self.rotation {
            self.translation = translation;
            self.rotation = rotation;
            self.dirty = true;
        }
    }

    fn twist(&self) -> Twist2d {
        Twist2d::new(self.translation.x, self.translation.y, self.rotation)
    }

    fn is_near_zero(&self) -> bool {
        self.translation.x.abs() < NEAR_ZERO && self.translation.y.abs() < NEAR_ZERO && self.rotation.abs() < NEAR_ZERO
    }
}

impl Follower<SwerveDrivebase> for DirectionRotate {
    fn name(&self) -> &str {
        "direction-rotate"
    }

    fn state(&self) -> FollowerState {
        self.life.state()
    }

    fn start(&mut self, db: &mut SwerveDrivebase) -> Result<(), FollowerError> {
        self.life.check_startable(self.name())?;
        if !self.twist().is_finite() {
            return Err(FollowerError::bad_input(self.name(), "non-finite translation or rotation"));
        }
        if let Some(d) = self.duration
            && !(d.is_finite() && d > 0.0)
        {
            return Err(FollowerError::bad_input(self.name(), format!("duration must be > 0, got {d}")));
        }
        if db.is_degraded() {
            return Err(FollowerError::Degraded {
                follower: self.name().to_string(),
            });
        }

        self.elapsed = 0.0;
        self.last_heading = db.angle();
        self.dirty = true;
        self.life.begin();
        info!(
            "direction-rotate started: ({:.2}, {:.2}) rot {:.2} for {:?}",
            self.translation.x, self.translation.y, self.rotation, self.duration
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
        if self.duration.is_some_and(|d| self.elapsed >= d) {
            db.stop();
            self.life.finish();
            info!("direction-rotate done after {:.2}s", self.elapsed);
            return;
        }

        let heading = db.angle();
        if self.dirty || shortest_arc_degrees(self.last_heading, heading).abs() > HEADING_THRESHOLD {
            debug!("direction-rotate: retarget at heading {:.2}", heading);
            if self.is_near_zero() {
                let hold = db.module_angles().map(|a| ModuleState::new(a, 0.0));
                db.set_targets(&hold);
            } else {
                db.set_chassis_speeds(&self.twist());
            }
            self.last_heading = heading;
            self.dirty = false;
        }
        self.elapsed += dt;
    }

    fn cancel(&mut self) {
        self.life.cancel();
    }
}
