// Planar geometry shared by the motion core
//
// Linear units are whatever the settings file uses (inches on the robots this
// was written for). Angles are degrees unless a name says otherwise.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

pub const METERS_PER_INCH: f64 = 0.0254;

/// Wrap an angle in degrees into (-180, 180]
pub fn normalize_angle_degrees(angle: f64) -> f64 {
    let mut a = angle % 360.0;
    if a <= -180.0 {
        a += 360.0;
    } else if a > 180.0 {
        a -= 360.0;
    }
    a
}

/// Signed shortest-arc difference `to - from`, in (-180, 180]
pub fn shortest_arc_degrees(from: f64, to: f64) -> f64 {
    normalize_angle_degrees(to - from)
}

/// sin(x) / x with the removable singularity filled in
pub fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        1.0 - x * x / 6.0
    } else {
        x.sin() / x
    }
}

pub fn lerp(a: f64, b: f64, pcnt: f64) -> f64 {
    a + (b - a) * pcnt
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation2d {
    pub x: f64,
    pub y: f64,
}

impl Translation2d {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Vector of length `norm` pointing at `angle_deg`
    pub fn from_polar(norm: f64, angle_deg: f64) -> Self {
        let (s, c) = angle_deg.to_radians().sin_cos();
        Self::new(norm * c, norm * s)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Self) -> f64 {
        (self - other).norm()
    }

    /// Heading of the vector in degrees, (-180, 180]
    pub fn angle_degrees(self) -> f64 {
        normalize_angle_degrees(self.y.atan2(self.x).to_degrees())
    }

    /// Rotate counter-clockwise by `angle_deg`
    pub fn rotate_by(self, angle_deg: f64) -> Self {
        let (s, c) = angle_deg.to_radians().sin_cos();
        Self::new(self.x * c - self.y * s, self.x * s + self.y * c)
    }
}

impl Add for Translation2d {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Translation2d {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Translation2d {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

impl Mul<f64> for Translation2d {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Translation2d {
    type Output = Self;
    fn div(self, rhs: f64) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

/// Field-frame pose. `heading` is degrees and kept in (-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2d {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose2d {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading: normalize_angle_degrees(heading),
        }
    }

    pub fn translation(&self) -> Translation2d {
        Translation2d::new(self.x, self.y)
    }

    /// Express `self` in the frame of `origin` (the `⊖` operator)
    pub fn relative_to(&self, origin: &Pose2d) -> Pose2d {
        let delta = (self.translation() - origin.translation()).rotate_by(-origin.heading);
        Pose2d::new(delta.x, delta.y, self.heading - origin.heading)
    }

    /// Linear interpolation; heading follows the shortest arc
    pub fn interpolate(&self, other: &Pose2d, pcnt: f64) -> Pose2d {
        Pose2d::new(
            lerp(self.x, other.x, pcnt),
            lerp(self.y, other.y, pcnt),
            self.heading + shortest_arc_degrees(self.heading, other.heading) * pcnt,
        )
    }
}

/// Instantaneous motion in the robot frame. `dtheta` is degrees per second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

impl Twist2d {
    pub fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self { dx, dy, dtheta }
    }

    pub fn is_finite(&self) -> bool {
        self.dx.is_finite() && self.dy.is_finite() && self.dtheta.is_finite()
    }
}

#[cfg(test)]
pub(crate) fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual} (tolerance {tol})"
    );
}
