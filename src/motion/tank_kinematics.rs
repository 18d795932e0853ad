// Tank (differential) kinematics
// Converts a chassis twist into left/right wheel velocities and back.

use crate::geometry::Twist2d;

const EPSILON: f64 = 1e-9;

/// Wheel velocities for the two sides of a tank drive
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TankVelocities {
    pub left: f64,
    pub right: f64,
}

impl TankVelocities {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TankKinematics {
    width: f64,
    scrub: f64,
}

impl TankKinematics {
    pub fn new(width: f64, scrub: f64) -> Self {
        Self { width, scrub }
    }

    /// Track width after scrub compensation
    pub fn effective_width(&self) -> f64 {
        self.width / self.scrub
    }

    /// Convert a chassis twist to wheel velocities
    ///
    /// # Arguments
    /// * `twist` - `dx` forward velocity, `dtheta` in deg/s (positive = counter-clockwise).
    ///   `dy` is ignored, a tank cannot strafe.
    pub fn inverse(&self, twist: &Twist2d) -> TankVelocities {
        let omega = twist.dtheta.to_radians();
        if omega.abs() < EPSILON {
            return TankVelocities::new(twist.dx, twist.dx);
        }
        let delta_v = self.effective_width() * omega / 2.0;
        TankVelocities::new(twist.dx - delta_v, twist.dx + delta_v)
    }

    /// Convert wheel velocities back to a chassis twist (`dy` is always 0)
    pub fn forward(&self, wheels: &TankVelocities) -> Twist2d {
        let dx = (wheels.left + wheels.right) / 2.0;
        let omega = (wheels.right - wheels.left) / self.effective_width();
        Twist2d::new(dx, 0.0, omega.to_degrees())
    }
}
