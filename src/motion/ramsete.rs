// Ramsete nonlinear trajectory tracker
use crate::geometry::{Pose2d, sinc};

/// Chassis velocity command: `v` forward, `omega` in rad/s
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisCommand {
    pub v: f64,
    pub omega: f64,
}

/// Two-parameter tracker. `b` (> 0) acts like a proportional term, `zeta`
/// in (0, 1) like damping. Gains assume meters and radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RamseteController {
    b: f64,
    zeta: f64,
}

impl RamseteController {
    pub fn new(b: f64, zeta: f64) -> Self {
        Self { b, zeta }
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    pub fn zeta(&self) -> f64 {
        self.zeta
    }

    /// # Arguments
    /// * `current` / `reference` - field poses, headings in degrees
    /// * `v_ref` - reference forward velocity
    /// * `omega_ref` - reference angular velocity in rad/s
    pub fn calculate(&self, current: &Pose2d, reference: &Pose2d, v_ref: f64, omega_ref: f64) -> ChassisCommand {
        let error = reference.relative_to(current);
        let ex = error.x;
        let ey = error.y;
        let etheta = error.heading.to_radians();

        let k = 2.0 * self.zeta * (omega_ref * omega_ref + self.b * v_ref * v_ref).sqrt();

        ChassisCommand {
            v: v_ref * etheta.cos() + k * ex,
            omega: omega_ref + k * etheta + self.b * v_ref * sinc(etheta) * ey,
        }
    }
}
