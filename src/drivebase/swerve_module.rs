// One steerable, driven wheel of a swerve drivebase
use tracing::warn;

use super::DrivebaseError;
use crate::config::ModuleConfig;
use crate::hw::{AbsoluteSensor, MotorController, NeutralMode};
use crate::motion::{EncoderMapper, ModuleId, ModuleState, PidCtrl, Speedometer};

/// Devices of one swerve module
pub struct ModuleHardware {
    pub steer: Box<dyn MotorController>,
    pub drive: Box<dyn MotorController>,
    pub encoder: Box<dyn AbsoluteSensor>,
}

/// Steer and drive loops closed on the roboRIO side: the angle PID works on
/// the shortest arc, the velocity PID on the wheel speedometer. Either target
/// can be set or cleared on its own.
pub struct SwerveModule {
    id: ModuleId,
    steer: Box<dyn MotorController>,
    drive: Box<dyn MotorController>,
    encoder: Box<dyn AbsoluteSensor>,
    mapper: EncoderMapper,
    angle_pid: PidCtrl,
    drive_pid: PidCtrl,
    linear: Speedometer,
    inches_per_tick: f64,
    mirror: bool,

    angle: f64,
    ticks: i64,
    distance: f64,
    target_angle: Option<f64>,
    target_speed: Option<f64>,
    steer_power: f64,
    drive_power: f64,
}

impl SwerveModule {
    pub fn new(
        id: ModuleId,
        cfg: &ModuleConfig,
        hw: ModuleHardware,
        inches_per_tick: f64,
        samples: usize,
        mirror: bool,
    ) -> Result<Self, DrivebaseError> {
        cfg.validate(id.short_name())?;
        if !hw.drive.has_position() {
            return Err(DrivebaseError::NoPositionSource { side: id.short_name() });
        }
        let mapper = EncoderMapper::from_config(&cfg.encoder, true)?;
        let angle = mapper.to_physical(hw.encoder.raw());

        Ok(Self {
            id,
            steer: hw.steer,
            drive: hw.drive,
            encoder: hw.encoder,
            mapper,
            angle_pid: PidCtrl::new(cfg.steer, true),
            drive_pid: PidCtrl::new(cfg.drive, false),
            linear: Speedometer::new(id.short_name(), samples, false),
            inches_per_tick,
            mirror,
            angle,
            ticks: 0,
            distance: 0.0,
            target_angle: None,
            target_speed: None,
            steer_power: 0.0,
            drive_power: 0.0,
        })
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Read the angle sensor and drive encoder
    pub fn compute_state(&mut self, dt: f64) {
        self.angle = self.mapper.to_physical(self.encoder.raw());
        match self.drive.position().map(|p| p.position_ticks()) {
            Some(Ok(ticks)) => self.ticks = ticks,
            Some(Err(e)) => warn!("swerve {}: drive position read failed: {}", self.id.short_name(), e),
            None => {}
        }
        self.distance = self.ticks as f64 * self.inches_per_tick;
        self.linear.update(dt, self.distance);
    }

    /// Close whichever loops have a target
    pub fn run(&mut self, dt: f64) {
        if let Some(target) = self.target_angle {
            let out = self.angle_pid.output(target, self.angle, dt);
            self.write_steer(out);
        }
        if let Some(target) = self.target_speed {
            let out = self.drive_pid.output(target, self.linear.velocity(), dt);
            self.write_drive(out);
        }
    }

    /// Set both targets, flipping to the nearer equivalent angle when
    /// mirroring is on
    pub fn set_targets(&mut self, state: ModuleState) {
        let state = if self.mirror {
            state.mirrored_toward(self.angle)
        } else {
            state
        };
        self.target_angle = Some(state.angle);
        self.target_speed = Some(state.speed);
    }

    pub fn set_angle(&mut self, angle: f64) {
        self.target_angle = Some(ModuleState::new(angle, 0.0).angle);
    }

    pub fn set_velocity(&mut self, speed: f64) {
        self.target_speed = Some(speed);
    }

    pub fn clear_targets(&mut self) {
        self.target_angle = None;
        self.target_speed = None;
        self.angle_pid.reset();
        self.drive_pid.reset();
    }

    /// Open-loop drive only; the steer target stays
    pub fn set_drive_power(&mut self, power: f64) {
        self.target_speed = None;
        self.drive_pid.reset();
        self.write_drive(power);
    }

    /// Open-loop on both motors, clears both targets
    pub fn set_power(&mut self, steer: f64, drive: f64) {
        self.clear_targets();
        self.write_steer(steer);
        self.write_drive(drive);
    }

    pub fn set_neutral_mode(&mut self, mode: NeutralMode) {
        for motor in [&mut self.steer, &mut self.drive] {
            if let Err(e) = motor.set_neutral_mode(mode) {
                warn!("swerve {}: cannot set neutral mode {:?}: {}", self.id.short_name(), mode, e);
            }
        }
    }

    fn write_steer(&mut self, power: f64) {
        self.steer_power = power;
        if let Err(e) = self.steer.set_power(power) {
            warn!("swerve {}: cannot set steer power: {}", self.id.short_name(), e);
        }
    }

    fn write_drive(&mut self, power: f64) {
        self.drive_power = power;
        if let Err(e) = self.drive.set_power(power) {
            warn!("swerve {}: cannot set drive power: {}", self.id.short_name(), e);
        }
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn velocity(&self) -> f64 {
        self.linear.velocity()
    }

    pub fn acceleration(&self) -> f64 {
        self.linear.acceleration()
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn ticks(&self) -> i64 {
        self.ticks
    }

    pub fn target_angle(&self) -> Option<f64> {
        self.target_angle
    }

    pub fn target_speed(&self) -> Option<f64> {
        self.target_speed
    }

    pub fn has_targets(&self) -> bool {
        self.target_angle.is_some() || self.target_speed.is_some()
    }

    pub fn steer_power(&self) -> f64 {
        self.steer_power
    }

    pub fn drive_power(&self) -> f64 {
        self.drive_power
    }

    /// "velocity @ angle", with " t: velocity @ angle" when both targets are set
    pub fn status(&self) -> String {
        let mut s = format!("{:.2} @ {:.2}", self.velocity(), self.angle);
        if let (Some(angle), Some(speed)) = (self.target_angle, self.target_speed) {
            s.push_str(&format!(" t: {:.2} @ {:.2}", speed, angle));
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CalibrationConfig, PidGains};
    use crate::geometry::{assert_close, normalize_angle_degrees};
    use crate::hw::sim::{SimAbsoluteSensor, SimMotor, SimMotorHandle, SimMotorKind};
    use std::cell::Cell;
    use std::rc::Rc;

    struct Handles {
        steer: SimMotorHandle,
        drive: SimMotorHandle,
        raw: Rc<Cell<f64>>,
    }

    fn module_config() -> ModuleConfig {
        ModuleConfig {
            steer: PidGains {
                min: Some(-1.0),
                max: Some(1.0),
                ..PidGains::p(0.02)
            },
            drive: PidGains {
                kf: 0.01,
                ..PidGains::default()
            },
            // one raw unit per degree
            encoder: CalibrationConfig {
                raw_min: 0.0,
                raw_max: 360.0,
                phys_min: -180.0,
                phys_max: 180.0,
                raw_ref: Some(180.0),
                phys_ref: Some(0.0),
            },
        }
    }

    fn build(raw: f64) -> (SwerveModule, Handles) {
        let (steer, sh) = SimMotor::new("fl-steer", SimMotorKind::PowerOnly);
        let (drive, dh) = SimMotor::new("fl-drive", SimMotorKind::Smart);
        let (enc, cell) = SimAbsoluteSensor::new(raw);
        let hw = ModuleHardware {
            steer: Box::new(steer),
            drive: Box::new(drive),
            encoder: Box::new(enc),
        };
        let module = SwerveModule::new(ModuleId::FrontLeft, &module_config(), hw, 0.01, 2, true).unwrap();
        (
            module,
            Handles {
                steer: sh,
                drive: dh,
                raw: cell,
            },
        )
    }

    #[test]
    fn test_angle_from_absolute_sensor() {
        let (mut m, h) = build(180.0);
        assert_close(m.angle(), 0.0, 1e-9);
        h.raw.set(270.0);
        m.compute_state(0.02);
        assert_close(m.angle(), 90.0, 1e-9);
    }

    #[test]
    fn test_targets_never_more_than_quarter_turn_away() {
        for current in [-170.0, -90.0, 0.0, 45.0, 135.0, 180.0] {
            for target in [-179.0, -120.0, -45.0, 0.0, 60.0, 100.0, 175.0] {
                let (mut m, h) = build(0.0);
                h.raw.set(current + 180.0);
                m.compute_state(0.02);
                m.set_targets(ModuleState::new(target, 10.0));
                let stored = m.target_angle().unwrap();
                assert!(normalize_angle_degrees(stored - m.angle()).abs() <= 90.0 + 1e-9);
                let speed = m.target_speed().unwrap();
                assert_close(speed.abs(), 10.0, 1e-12);
            }
        }
    }

    #[test]
    fn test_angle_pid_turns_shortest_way() {
        let (mut m, h) = build(180.0 + 170.0);
        m.compute_state(0.02);
        m.set_angle(-170.0);
        m.run(0.02);
        // 170 -> -170 is +20 degrees across the seam
        assert!(h.steer.power() > 0.0);
        assert_close(h.steer.power(), 0.4, 1e-9);
        assert_eq!(h.drive.power(), 0.0);
    }

    #[test]
    fn test_velocity_loop_drives_drive_motor() {
        let (mut m, h) = build(180.0);
        m.compute_state(0.02);
        m.set_velocity(50.0);
        m.run(0.02);
        assert_close(h.drive.power(), 0.5, 1e-9);
        assert_eq!(h.steer.power(), 0.0);
    }

    #[test]
    fn test_wheel_speed_from_drive_ticks() {
        let (mut m, h) = build(180.0);
        m.compute_state(0.02);
        h.drive.set_ticks(100);
        m.compute_state(0.02);
        assert_close(m.distance(), 1.0, 1e-12);
        assert_close(m.velocity(), 50.0, 1e-9);
    }

    #[test]
    fn test_open_loop_clears_targets() {
        let (mut m, h) = build(180.0);
        m.set_targets(ModuleState::new(10.0, 5.0));
        assert!(m.has_targets());
        m.set_power(0.2, -0.3);
        assert!(!m.has_targets());
        assert_eq!(h.steer.power(), 0.2);
        assert_eq!(h.drive.power(), -0.3);
    }

    #[test]
    fn test_status_format() {
        let (mut m, _) = build(180.0 + 12.5);
        m.compute_state(0.02);
        assert_eq!(m.status(), "0.00 @ 12.50");
        m.set_targets(ModuleState::new(30.0, 4.0));
        assert_eq!(m.status(), "0.00 @ 12.50 t: 4.00 @ 30.00");
    }

    #[test]
    fn test_drive_without_position_rejected() {
        let (steer, _) = SimMotor::new("s", SimMotorKind::PowerOnly);
        let (drive, _) = SimMotor::new("d", SimMotorKind::PowerOnly);
        let (enc, _) = SimAbsoluteSensor::new(0.0);
        let hw = ModuleHardware {
            steer: Box::new(steer),
            drive: Box::new(drive),
            encoder: Box::new(enc),
        };
        let err = SwerveModule::new(ModuleId::BackRight, &module_config(), hw, 0.01, 2, true)
            .err()
            .unwrap();
        assert!(matches!(err, DrivebaseError::NoPositionSource { .. }));
    }
}
