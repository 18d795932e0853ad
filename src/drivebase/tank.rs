// Tank drivebase: two motor groups, encoders, gyro, odometry
use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use super::{DrivebaseError, LoopType, NeutralPolicy, wait_for_heading};
use crate::config::TankConfig;
use crate::geometry::{Pose2d, Twist2d, normalize_angle_degrees};
use crate::hw::sim::{SimGyro, SimMotor, SimMotorKind, TankRig};
use crate::hw::{HeadingSource, MotorController, TickEncoder};
use crate::motion::{PositionTracker, Speedometer, TankKinematics, TankVelocities};

/// Devices a tank drivebase is built from. The encoders are only read when
/// the motors have no position feedback of their own.
pub struct TankHardware {
    pub left: Box<dyn MotorController>,
    pub right: Box<dyn MotorController>,
    pub left_encoder: Option<Box<dyn TickEncoder>>,
    pub right_encoder: Option<Box<dyn TickEncoder>>,
    pub gyro: Box<dyn HeadingSource>,
}

impl TankHardware {
    /// Smart simulated motors and gyro, plus the handles that drive them
    pub fn simulated() -> (Self, TankRig) {
        let (left, lh) = SimMotor::new("left", SimMotorKind::Smart);
        let (right, rh) = SimMotor::new("right", SimMotorKind::Smart);
        let (gyro, gh) = SimGyro::new();
        (
            Self {
                left: Box::new(left),
                right: Box::new(right),
                left_encoder: None,
                right_encoder: None,
                gyro: Box::new(gyro),
            },
            TankRig {
                left: lh,
                right: rh,
                gyro: gh,
            },
        )
    }
}

pub struct TankDrivebase {
    left: Box<dyn MotorController>,
    right: Box<dyn MotorController>,
    left_encoder: Option<Box<dyn TickEncoder>>,
    right_encoder: Option<Box<dyn TickEncoder>>,
    // None once the heading sensor failed its warmup
    gyro: Option<Box<dyn HeadingSource>>,

    tracker: PositionTracker,
    kinematics: TankKinematics,
    angular: Speedometer,
    left_linear: Speedometer,
    right_linear: Speedometer,
    inches_per_tick: f64,

    ticks_left: i64,
    ticks_right: i64,
    dist_l: f64,
    dist_r: f64,
    last_dist_l: f64,
    last_dist_r: f64,
    total_angle: f64,

    left_power: f64,
    right_power: f64,
    neutral: NeutralPolicy,
    trips: HashMap<String, f64>,
}

impl TankDrivebase {
    pub fn new(cfg: &TankConfig, hw: TankHardware, gyro_warmup: Duration) -> Result<Self, DrivebaseError> {
        cfg.validate()?;

        let motors_have_position = hw.left.has_position() && hw.right.has_position();
        if !motors_have_position {
            if hw.left_encoder.is_none() {
                return Err(DrivebaseError::NoPositionSource { side: "left" });
            }
            if hw.right_encoder.is_none() {
                return Err(DrivebaseError::NoPositionSource { side: "right" });
            }
        }

        let gyro = if wait_for_heading(hw.gyro.as_ref(), gyro_warmup) {
            Some(hw.gyro)
        } else {
            None
        };

        Ok(Self {
            left: hw.left,
            right: hw.right,
            left_encoder: hw.left_encoder,
            right_encoder: hw.right_encoder,
            gyro,
            tracker: PositionTracker::new(cfg.width, cfg.scrub),
            kinematics: TankKinematics::new(cfg.width, cfg.scrub),
            angular: Speedometer::new("angles", cfg.angular_samples, true),
            left_linear: Speedometer::new("left", cfg.linear_samples, false),
            right_linear: Speedometer::new("right", cfg.linear_samples, false),
            inches_per_tick: cfg.inches_per_tick,
            ticks_left: 0,
            ticks_right: 0,
            dist_l: 0.0,
            dist_r: 0.0,
            last_dist_l: 0.0,
            last_dist_r: 0.0,
            total_angle: 0.0,
            left_power: 0.0,
            right_power: 0.0,
            neutral: NeutralPolicy::default(),
            trips: HashMap::new(),
        })
    }

    pub fn with_neutral_policy(mut self, policy: NeutralPolicy) -> Self {
        self.neutral = policy;
        self
    }

    /// True when the heading sensor is missing; path following refuses to start
    pub fn is_degraded(&self) -> bool {
        self.gyro.is_none()
    }

    pub fn has_heading(&self) -> bool {
        self.gyro.is_some()
    }

    fn read_ticks(&mut self) {
        if self.left.has_position() && self.right.has_position() {
            let left = self.left.position().map(|p| p.position_ticks());
            let right = self.right.position().map(|p| p.position_ticks());
            match left {
                Some(Ok(t)) => self.ticks_left = t,
                Some(Err(e)) => warn!("tankdrive: left position read failed: {}", e),
                None => {}
            }
            match right {
                Some(Ok(t)) => self.ticks_right = t,
                Some(Err(e)) => warn!("tankdrive: right position read failed: {}", e),
                None => {}
            }
        } else {
            if let Some(enc) = &self.left_encoder {
                self.ticks_left = enc.ticks();
            }
            if let Some(enc) = &self.right_encoder {
                self.ticks_right = enc.ticks();
            }
        }
    }

    /// Sense and estimate for one tick of length `dt` seconds
    pub fn update(&mut self, dt: f64) {
        self.read_ticks();
        self.dist_l = self.ticks_left as f64 * self.inches_per_tick;
        self.dist_r = self.ticks_right as f64 * self.inches_per_tick;
        let dl = self.dist_l - self.last_dist_l;
        let dr = self.dist_r - self.last_dist_r;

        let heading = match &self.gyro {
            Some(gyro) => {
                let yaw = gyro.yaw_degrees();
                self.angular.update(dt, yaw);
                self.total_angle = gyro.total_angle_degrees();
                yaw
            }
            None => {
                // dead-reckon heading from the wheels
                let dtheta = ((dr - dl) / self.kinematics.effective_width()).to_degrees();
                self.total_angle += dtheta;
                normalize_angle_degrees(self.tracker.pose().heading + dtheta)
            }
        };

        self.tracker.update(dl, dr, heading);
        self.left_linear.update(dt, self.dist_l);
        self.right_linear.update(dt, self.dist_r);

        self.last_dist_l = self.dist_l;
        self.last_dist_r = self.dist_r;

        debug!(
            "tankdrive: ldist {:.3} rdist {:.3} pose ({:.3}, {:.3}, {:.2})",
            self.dist_l,
            self.dist_r,
            self.tracker.pose().x,
            self.tracker.pose().y,
            self.tracker.pose().heading
        );
    }

    /// Write both sides; a failing side is logged and the other still written
    pub fn set_power(&mut self, left: f64, right: f64) {
        self.left_power = left;
        self.right_power = right;
        if let Err(e) = self.left.set_power(left) {
            warn!("tankdrive: cannot set left power: {}", e);
        }
        if let Err(e) = self.right.set_power(right) {
            warn!("tankdrive: cannot set right power: {}", e);
        }
    }

    pub fn stop(&mut self) {
        self.set_power(0.0, 0.0);
    }

    /// Apply the neutral mode for a newly entered loop type
    pub fn init(&mut self, loop_type: LoopType) {
        let mode = self.neutral.mode_for(loop_type);
        for motor in [&mut self.left, &mut self.right] {
            if let Err(e) = motor.set_neutral_mode(mode) {
                warn!("tankdrive: cannot set neutral mode {:?}: {}", mode, e);
            }
        }
    }

    pub fn inverse_kinematics(&self, twist: &Twist2d) -> TankVelocities {
        self.kinematics.inverse(twist)
    }

    pub fn kinematics(&self) -> &TankKinematics {
        &self.kinematics
    }

    pub fn start_trip(&mut self, name: &str) {
        self.trips.insert(name.to_string(), self.distance());
    }

    /// Distance covered since `start_trip(name)`, None for an unknown trip
    pub fn trip_distance(&self, name: &str) -> Option<f64> {
        self.trips.get(name).map(|start| self.distance() - start)
    }

    pub fn pose(&self) -> Pose2d {
        self.tracker.pose()
    }

    pub fn set_pose(&mut self, pose: Pose2d) {
        self.tracker.set_pose(pose);
    }

    pub fn width(&self) -> f64 {
        self.tracker.width()
    }

    pub fn scrub(&self) -> f64 {
        self.tracker.scrub()
    }

    pub fn left_ticks(&self) -> i64 {
        self.ticks_left
    }

    pub fn right_ticks(&self) -> i64 {
        self.ticks_right
    }

    pub fn left_distance(&self) -> f64 {
        self.dist_l
    }

    pub fn right_distance(&self) -> f64 {
        self.dist_r
    }

    pub fn distance(&self) -> f64 {
        (self.dist_l + self.dist_r) / 2.0
    }

    pub fn left_velocity(&self) -> f64 {
        self.left_linear.velocity()
    }

    pub fn right_velocity(&self) -> f64 {
        self.right_linear.velocity()
    }

    pub fn velocity(&self) -> f64 {
        (self.left_velocity() + self.right_velocity()) / 2.0
    }

    pub fn left_acceleration(&self) -> f64 {
        self.left_linear.acceleration()
    }

    pub fn right_acceleration(&self) -> f64 {
        self.right_linear.acceleration()
    }

    pub fn acceleration(&self) -> f64 {
        (self.left_acceleration() + self.right_acceleration()) / 2.0
    }

    /// Heading in (-180, 180]
    pub fn angle(&self) -> f64 {
        if self.gyro.is_some() {
            normalize_angle_degrees(self.angular.distance())
        } else {
            self.tracker.pose().heading
        }
    }

    pub fn angular_velocity(&self) -> f64 {
        self.angular.velocity()
    }

    /// Net rotation since start, not wrapped
    pub fn total_angle(&self) -> f64 {
        self.total_angle
    }

    pub fn left_power(&self) -> f64 {
        self.left_power
    }

    pub fn right_power(&self) -> f64 {
        self.right_power
    }
}
