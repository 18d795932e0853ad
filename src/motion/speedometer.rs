// Rolling velocity / acceleration estimate from distance samples
use std::collections::VecDeque;

use crate::geometry::normalize_angle_degrees;

/// Keeps the last `samples` (dt, distance) pairs.
///
/// In angular mode the input is a heading in degrees; each step is taken on
/// the shortest arc so `distance()` is a continuous, unwrapped total.
#[derive(Debug, Clone)]
pub struct Speedometer {
    name: String,
    samples: usize,
    angular: bool,
    dts: VecDeque<f64>,
    distances: VecDeque<f64>,
    last_raw: Option<f64>,
}

impl Speedometer {
    /// `samples` below 2 is raised to 2.
    pub fn new(name: impl Into<String>, samples: usize, angular: bool) -> Self {
        let samples = samples.max(2);
        Self {
            name: name.into(),
            samples,
            angular,
            dts: VecDeque::with_capacity(samples),
            distances: VecDeque::with_capacity(samples),
            last_raw: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    /// Append a sample taken `dt` seconds after the previous one. Samples
    /// with `dt <= 0` are dropped.
    pub fn update(&mut self, dt: f64, value: f64) {
        if !(dt > 0.0) || !value.is_finite() {
            return;
        }

        let distance = match (self.angular, self.last_raw, self.distances.back()) {
            (true, Some(prev), Some(&total)) => total + normalize_angle_degrees(value - prev),
            _ => value,
        };
        self.last_raw = Some(value);

        if self.distances.len() == self.samples {
            self.distances.pop_front();
            self.dts.pop_front();
        }
        self.distances.push_back(distance);
        self.dts.push_back(dt);
    }

    /// Latest distance; unwrapped in angular mode
    pub fn distance(&self) -> f64 {
        self.distances.back().copied().unwrap_or(0.0)
    }

    /// Slope between the two most recent samples
    pub fn velocity(&self) -> f64 {
        let n = self.distances.len();
        if n < 2 {
            return 0.0;
        }
        (self.distances[n - 1] - self.distances[n - 2]) / self.dts[n - 1]
    }

    /// Second difference over the three most recent samples; zero while the
    /// window holds fewer than three
    pub fn acceleration(&self) -> f64 {
        let n = self.distances.len();
        if n < 3 {
            return 0.0;
        }
        let v1 = (self.distances[n - 1] - self.distances[n - 2]) / self.dts[n - 1];
        let v0 = (self.distances[n - 2] - self.distances[n - 3]) / self.dts[n - 2];
        (v1 - v0) / self.dts[n - 1]
    }

    pub fn reset(&mut self) {
        self.dts.clear();
        self.distances.clear();
        self.last_raw = None;
    }
}
