// Raw sensor units <-> physical units
use crate::config::{CalibrationConfig, ConfigError};

/// Linear map between a raw range and a physical range, zeroed by one
/// reference pair. Angular maps wrap on both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderMapper {
    raw_min: f64,
    raw_max: f64,
    phys_min: f64,
    phys_max: f64,
    k: f64,
    raw_ref: f64,
    phys_ref: f64,
    angular: bool,
}

// Wrap into (lo, hi]
fn wrap_upper(value: f64, lo: f64, hi: f64) -> f64 {
    let span = hi - lo;
    let mut r = (value - lo) % span;
    if r <= 0.0 {
        r += span;
    }
    lo + r
}

// Wrap into [lo, hi)
fn wrap_lower(value: f64, lo: f64, hi: f64) -> f64 {
    let span = hi - lo;
    let r = (value - lo).rem_euclid(span);
    // rem_euclid can round up to span itself
    if r >= span { lo } else { lo + r }
}

impl EncoderMapper {
    pub fn new(
        raw_min: f64,
        raw_max: f64,
        phys_min: f64,
        phys_max: f64,
        angular: bool,
    ) -> Result<Self, ConfigError> {
        if raw_min == raw_max || !(raw_max - raw_min).is_finite() {
            return Err(ConfigError::invalid(
                "raw_min",
                format!("degenerate raw range [{raw_min}, {raw_max}]"),
            ));
        }
        if phys_min == phys_max || !(phys_max - phys_min).is_finite() {
            return Err(ConfigError::invalid(
                "phys_min",
                format!("degenerate physical range [{phys_min}, {phys_max}]"),
            ));
        }
        Ok(Self {
            raw_min: raw_min.min(raw_max),
            raw_max: raw_min.max(raw_max),
            phys_min: phys_min.min(phys_max),
            phys_max: phys_min.max(phys_max),
            k: (phys_max - phys_min) / (raw_max - raw_min),
            raw_ref: raw_min,
            phys_ref: phys_min,
            angular,
        })
    }

    pub fn from_config(cfg: &CalibrationConfig, angular: bool) -> Result<Self, ConfigError> {
        let mut mapper = Self::new(cfg.raw_min, cfg.raw_max, cfg.phys_min, cfg.phys_max, angular)?;
        if let (Some(raw), Some(phys)) = (cfg.raw_ref, cfg.phys_ref) {
            mapper.calibrate(raw, phys);
        }
        Ok(mapper)
    }

    /// Pin `raw` to read as `phys`
    pub fn calibrate(&mut self, raw: f64, phys: f64) {
        self.raw_ref = raw;
        self.phys_ref = phys;
    }

    pub fn to_physical(&self, raw: f64) -> f64 {
        let phys = self.phys_ref + (raw - self.raw_ref) * self.k;
        if self.angular {
            wrap_upper(phys, self.phys_min, self.phys_max)
        } else {
            phys
        }
    }

    pub fn to_raw(&self, phys: f64) -> f64 {
        let raw = self.raw_ref + (phys - self.phys_ref) / self.k;
        if self.angular {
            wrap_lower(raw, self.raw_min, self.raw_max)
        } else {
            raw
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::assert_close;

    #[test]
    fn test_linear_map() {
        let m = EncoderMapper::new(0.0, 5.0, 0.0, 100.0, false).unwrap();
        assert_close(m.to_physical(2.5), 50.0, 1e-12);
        assert_close(m.to_raw(25.0), 1.25, 1e-12);
    }

    #[test]
    fn test_degenerate_range_rejected() {
        assert!(EncoderMapper::new(3.0, 3.0, -180.0, 180.0, true).is_err());
    }

    #[test]
    fn test_calibration_shifts_zero() {
        let mut m = EncoderMapper::new(0.0, 4096.0, -180.0, 180.0, true).unwrap();
        m.calibrate(1024.0, 0.0);
        assert_close(m.to_physical(1024.0), 0.0, 1e-9);
        assert_close(m.to_physical(2048.0), 90.0, 1e-9);
        // 1024 ticks below the reference wraps around
        assert_close(m.to_physical(0.0), -90.0, 1e-9);
        assert_close(m.to_physical(3072.0), 180.0, 1e-9);
    }

    #[test]
    fn test_angular_output_in_range() {
        let mut m = EncoderMapper::new(0.0, 4096.0, -180.0, 180.0, true).unwrap();
        m.calibrate(3000.0, 45.0);
        let mut raw = 0.0;
        while raw <= 4096.0 {
            let a = m.to_physical(raw);
            assert!(a > -180.0 && a <= 180.0, "{raw} -> {a}");
            raw += 13.0;
        }
    }

    #[test]
    fn test_round_trip_linear() {
        let mut m = EncoderMapper::new(-100.0, 900.0, 0.0, 36.0, false).unwrap();
        m.calibrate(100.0, 3.0);
        let mut r = -100.0;
        while r <= 900.0 {
            assert_close(m.to_raw(m.to_physical(r)), r, 1e-9);
            r += 7.5;
        }
        assert_close(m.to_raw(m.to_physical(900.0)), 900.0, 1e-9);
    }

    #[test]
    fn test_round_trip_angular() {
        let mut m = EncoderMapper::new(0.0, 4096.0, -180.0, 180.0, true).unwrap();
        m.calibrate(1500.0, -30.0);
        let mut r = 0.0;
        while r < 4096.0 {
            let back = m.to_raw(m.to_physical(r));
            // raw_max and raw_min name the same angle
            let diff = (back - r).abs().min(4096.0 - (back - r).abs());
            assert!(diff < 1e-6, "{r} -> {back}");
            r += 11.0;
        }
    }

    #[test]
    fn test_inverted_physical_range() {
        let m = EncoderMapper::new(0.0, 10.0, 10.0, 0.0, false).unwrap();
        assert_close(m.to_physical(0.0), 10.0, 1e-12);
        assert_close(m.to_physical(10.0), 0.0, 1e-12);
    }
}
