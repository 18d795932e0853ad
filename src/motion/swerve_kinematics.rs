// Swerve kinematics
// Chassis (vx, vy, omega) <-> per-module (angle, speed) for a four module base.
//
// Module positions, robot frame with +x forward and +y left:
//   FL (+L/2, +W/2)   FR (+L/2, -W/2)
//   BL (-L/2, +W/2)   BR (-L/2, -W/2)

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

use crate::geometry::{Translation2d, Twist2d, normalize_angle_degrees};

pub const MODULE_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleId {
    FrontLeft = 0,
    FrontRight = 1,
    BackLeft = 2,
    BackRight = 3,
}

impl ModuleId {
    pub const ALL: [ModuleId; MODULE_COUNT] = [
        ModuleId::FrontLeft,
        ModuleId::FrontRight,
        ModuleId::BackLeft,
        ModuleId::BackRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn short_name(self) -> &'static str {
        match self {
            ModuleId::FrontLeft => "fl",
            ModuleId::FrontRight => "fr",
            ModuleId::BackLeft => "bl",
            ModuleId::BackRight => "br",
        }
    }
}

/// Target or measured state of one module. `angle` is degrees in (-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleState {
    pub angle: f64,
    pub speed: f64,
}

impl ModuleState {
    pub fn new(angle: f64, speed: f64) -> Self {
        Self {
            angle: normalize_angle_degrees(angle),
            speed,
        }
    }

    pub fn as_vector(&self) -> Translation2d {
        Translation2d::from_polar(self.speed, self.angle)
    }

    /// Flip to the opposite angle with negated speed when the target is more
    /// than 90 degrees away from `current_angle`
    pub fn mirrored_toward(&self, current_angle: f64) -> ModuleState {
        let delta = normalize_angle_degrees(self.angle - current_angle).abs();
        if delta > 90.0 {
            ModuleState::new(self.angle + 180.0, -self.speed)
        } else {
            *self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwerveKinematics {
    width: f64,
    length: f64,
    phi: f64,
    circumference: f64,
    max_speed: f64,
    mirror: bool,
    scale: bool,
}

impl SwerveKinematics {
    pub fn new(width: f64, length: f64, max_speed: f64) -> Self {
        Self {
            width,
            length,
            phi: length.atan2(width).to_degrees(),
            // mean-radius approximation of the turning circle
            circumference: PI * (length + width) / 2.0,
            max_speed,
            mirror: true,
            scale: true,
        }
    }

    pub fn with_mirror(mut self, mirror: bool) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Base angle of the rotation vectors, atan2(L, W) in degrees
    pub fn phi(&self) -> f64 {
        self.phi
    }

    pub fn circumference(&self) -> f64 {
        self.circumference
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn mirror_enabled(&self) -> bool {
        self.mirror
    }

    /// Direction of a module's contribution to a counter-clockwise spin
    pub fn rotation_direction(&self, id: ModuleId) -> f64 {
        match id {
            ModuleId::FrontRight => self.phi,
            ModuleId::FrontLeft => 180.0 - self.phi,
            ModuleId::BackRight => -self.phi,
            ModuleId::BackLeft => -(180.0 - self.phi),
        }
    }

    /// Linear module speed produced by a spin of `omega` deg/s
    fn rotation_speed(&self, omega: f64) -> f64 {
        omega / 360.0 * self.circumference / 2.0
    }

    /// Per-module velocity vectors before saturation and mirroring.
    /// The twist translation is field-relative; it is rotated by `-heading`.
    pub fn module_vectors(&self, twist: &Twist2d, heading: f64) -> [Translation2d; MODULE_COUNT] {
        let translation = Translation2d::new(twist.dx, twist.dy).rotate_by(-heading);
        let spin = self.rotation_speed(twist.dtheta);
        ModuleId::ALL.map(|id| {
            translation + Translation2d::from_polar(spin, self.rotation_direction(id))
        })
    }

    /// Twist to module targets.
    ///
    /// # Arguments
    /// * `twist` - field-relative `dx`, `dy` and `dtheta` in deg/s
    /// * `heading` - current robot heading in degrees
    /// * `current_angles` - measured module angles, indexed by [`ModuleId`]
    pub fn inverse(
        &self,
        twist: &Twist2d,
        heading: f64,
        current_angles: &[f64; MODULE_COUNT],
    ) -> [ModuleState; MODULE_COUNT] {
        // a module with no velocity keeps its current angle
        let vectors = self.module_vectors(twist, heading);
        let mut states: [ModuleState; MODULE_COUNT] = std::array::from_fn(|i| {
            let speed = vectors[i].norm();
            if speed > 0.0 {
                ModuleState::new(vectors[i].angle_degrees(), speed)
            } else {
                ModuleState::new(current_angles[i], 0.0)
            }
        });

        if self.scale {
            if let Some(factor) = desaturate(&mut states, self.max_speed) {
                debug!("swerve: scaled module speeds down by {:.3}", factor);
            }
        }

        if self.mirror {
            for (i, state) in states.iter_mut().enumerate() {
                let mirrored = state.mirrored_toward(current_angles[i]);
                if mirrored != *state {
                    debug!(
                        "swerve: mirrored module {} from {:.2} @ {:.2} to {:.2} @ {:.2}",
                        i, state.speed, state.angle, mirrored.speed, mirrored.angle
                    );
                    *state = mirrored;
                }
            }
        }

        states
    }

    /// Module states to a twist with field-relative translation
    pub fn forward(&self, states: &[ModuleState; MODULE_COUNT], heading: f64) -> Twist2d {
        let vectors = (*states).map(|s| s.as_vector());
        let translation = vectors
            .iter()
            .fold(Translation2d::ZERO, |acc, v| acc + *v)
            / MODULE_COUNT as f64;

        let spin = ModuleId::ALL
            .iter()
            .map(|&id| {
                let dir = Translation2d::from_polar(1.0, self.rotation_direction(id));
                (vectors[id.index()] - translation).dot(dir)
            })
            .sum::<f64>()
            / MODULE_COUNT as f64;

        let field = translation.rotate_by(heading);
        Twist2d::new(field.x, field.y, spin * 720.0 / self.circumference)
    }
}

/// Uniformly scale speeds so none exceeds `max_speed`. Returns the divisor
/// when scaling happened.
pub fn desaturate(states: &mut [ModuleState; MODULE_COUNT], max_speed: f64) -> Option<f64> {
    let fastest = states.iter().map(|s| s.speed.abs()).fold(0.0, f64::max);
    if fastest <= max_speed || max_speed <= 0.0 {
        return None;
    }
    let factor = fastest / max_speed;
    for state in states.iter_mut() {
        state.speed /= factor;
    }
    Some(factor)
}
