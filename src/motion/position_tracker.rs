// Differential-drive dead reckoning
use crate::geometry::Pose2d;

const STRAIGHT_EPSILON: f64 = 1e-6;

/// Integrates per-side distance deltas along an exact arc. Heading is taken
/// from the gyro reading each update rather than integrated.
#[derive(Debug, Clone)]
pub struct PositionTracker {
    pose: Pose2d,
    width: f64,
    scrub: f64,
}

impl PositionTracker {
    pub fn new(width: f64, scrub: f64) -> Self {
        Self {
            pose: Pose2d::default(),
            width,
            scrub,
        }
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    pub fn set_pose(&mut self, pose: Pose2d) {
        self.pose = Pose2d::new(pose.x, pose.y, pose.heading);
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn scrub(&self) -> f64 {
        self.scrub
    }

    pub fn update(&mut self, dleft: f64, dright: f64, heading_deg: f64) {
        let theta = self.pose.heading.to_radians();
        let (x, y) = if (dleft - dright).abs() < STRAIGHT_EPSILON {
            let d = (dleft + dright) / 2.0;
            let (s, c) = theta.sin_cos();
            (self.pose.x + d * c, self.pose.y + d * s)
        } else {
            let r = self.width * (dleft + dright) / (2.0 * (dright - dleft));
            let w = (dright - dleft) / self.width;
            (
                self.pose.x + r * ((theta + w).sin() - theta.sin()),
                self.pose.y - r * ((theta + w).cos() - theta.cos()),
            )
        };
        self.pose = Pose2d::new(x, y, heading_deg);
    }
}
