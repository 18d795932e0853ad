// PID and feed-forward controllers
use crate::config::{PidGains, PidaGains};
use crate::geometry::normalize_angle_degrees;

/// PID with optional target feed-forward, output clamp and integrator clamp.
/// In angle mode the error is taken on the shortest arc.
#[derive(Debug, Clone)]
pub struct PidCtrl {
    gains: PidGains,
    angle: bool,
    integral: f64,
    last_error: Option<f64>,
    p_part: f64,
    i_part: f64,
    d_part: f64,
    f_part: f64,
}

impl PidCtrl {
    pub fn new(gains: PidGains, angle: bool) -> Self {
        Self {
            gains,
            angle,
            integral: 0.0,
            last_error: None,
            p_part: 0.0,
            i_part: 0.0,
            d_part: 0.0,
            f_part: 0.0,
        }
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    pub fn output(&mut self, target: f64, current: f64, dt: f64) -> f64 {
        let error = if self.angle {
            normalize_angle_degrees(target - current)
        } else {
            target - current
        };

        if dt > 0.0 {
            self.integral += error * dt;
            if let Some(imax) = self.gains.imax {
                self.integral = self.integral.clamp(-imax.abs(), imax.abs());
            }
        }

        let derivative = match self.last_error {
            Some(last) if dt > 0.0 => (error - last) / dt,
            _ => 0.0,
        };
        self.last_error = Some(error);

        self.p_part = self.gains.kp * error;
        self.i_part = self.gains.ki * self.integral;
        self.d_part = self.gains.kd * derivative;
        self.f_part = self.gains.kf * target;

        let out = self.p_part + self.i_part + self.d_part + self.f_part;
        match (self.gains.min, self.gains.max) {
            (Some(lo), Some(hi)) => out.clamp(lo, hi),
            _ => out,
        }
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
    }

    pub fn last_error(&self) -> f64 {
        self.last_error.unwrap_or(0.0)
    }

    pub fn parts(&self) -> (f64, f64, f64, f64) {
        (self.p_part, self.i_part, self.d_part, self.f_part)
    }
}

/// Trajectory follower output:
/// `kv*v + ka*a + kp*(p - p_measured) + kd*(v - v_measured)`
#[derive(Debug, Clone)]
pub struct PidaCtrl {
    gains: PidaGains,
    last_error: f64,
    v_part: f64,
    a_part: f64,
    p_part: f64,
    d_part: f64,
}

impl PidaCtrl {
    pub fn new(gains: PidaGains) -> Self {
        Self {
            gains,
            last_error: 0.0,
            v_part: 0.0,
            a_part: 0.0,
            p_part: 0.0,
            d_part: 0.0,
        }
    }

    pub fn output(&mut self, accel: f64, vel: f64, pos: f64, measured_pos: f64, measured_vel: f64) -> f64 {
        let error = pos - measured_pos;
        self.last_error = error;
        self.v_part = self.gains.kv * vel;
        self.a_part = self.gains.ka * accel;
        self.p_part = self.gains.kp * error;
        self.d_part = self.gains.kd * (vel - measured_vel);
        self.v_part + self.a_part + self.p_part + self.d_part
    }

    pub fn reset(&mut self) {
        self.last_error = 0.0;
    }

    pub fn last_error(&self) -> f64 {
        self.last_error
    }

    /// (v, a, p, d) contributions of the last output
    pub fn parts(&self) -> (f64, f64, f64, f64) {
        (self.v_part, self.a_part, self.p_part, self.d_part)
    }
}
