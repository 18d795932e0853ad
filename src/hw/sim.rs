// Simulated devices
//
// Each device shares its state with a cloneable handle so a test (or the
// runtime's plant model) can inject readings and failures and observe what
// was commanded.

use std::cell::Cell;
use std::rc::Rc;

use super::{
    AbsoluteSensor, Followable, HeadingSource, MotorController, MotorError, NeutralMode, OnboardPid,
    PositionSource, PowerSink, Result, TickEncoder,
};
use crate::config::{PidGains, SwerveConfig, TankConfig};
use crate::geometry::normalize_angle_degrees;
use crate::motion::{EncoderMapper, MODULE_COUNT, ModuleState, SwerveKinematics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimMotorKind {
    /// Position feedback, onboard PID, can follow
    Smart,
    /// Position feedback only
    Encoded,
    /// Power and neutral mode only
    PowerOnly,
}

impl SimMotorKind {
    fn type_name(self) -> &'static str {
        match self {
            SimMotorKind::Smart => "sim-smart",
            SimMotorKind::Encoded => "sim-encoded",
            SimMotorKind::PowerOnly => "sim-power",
        }
    }
}

#[derive(Debug, Default)]
struct MotorState {
    power: Cell<f64>,
    neutral: Cell<Option<NeutralMode>>,
    ticks: Cell<i64>,
    failures: Cell<u32>,
    pid_target: Cell<Option<f64>>,
    leader: Cell<Option<bool>>,
}

#[derive(Debug, Clone)]
pub struct SimMotorHandle(Rc<MotorState>);

impl SimMotorHandle {
    pub fn power(&self) -> f64 {
        self.0.power.get()
    }

    pub fn neutral_mode(&self) -> Option<NeutralMode> {
        self.0.neutral.get()
    }

    pub fn ticks(&self) -> i64 {
        self.0.ticks.get()
    }

    pub fn set_ticks(&self, ticks: i64) {
        self.0.ticks.set(ticks);
    }

    pub fn add_ticks(&self, delta: i64) {
        self.0.ticks.set(self.0.ticks.get() + delta);
    }

    /// Make the next `count` commands fail as transients
    pub fn fail_next(&self, count: u32) {
        self.0.failures.set(count);
    }

    pub fn pid_target(&self) -> Option<f64> {
        self.0.pid_target.get()
    }

    /// `Some(inverted)` once the motor follows a leader
    pub fn following(&self) -> Option<bool> {
        self.0.leader.get()
    }
}

#[derive(Debug)]
pub struct SimMotor {
    name: String,
    kind: SimMotorKind,
    state: Rc<MotorState>,
}

impl SimMotor {
    pub fn new(name: &str, kind: SimMotorKind) -> (Self, SimMotorHandle) {
        let state = Rc::new(MotorState::default());
        let motor = Self {
            name: name.to_string(),
            kind,
            state: Rc::clone(&state),
        };
        (motor, SimMotorHandle(state))
    }

    fn check_transient(&self) -> Result<()> {
        let left = self.state.failures.get();
        if left > 0 {
            self.state.failures.set(left - 1);
            return Err(MotorError::request_failed(&self.name, "simulated bus timeout"));
        }
        Ok(())
    }
}

impl PowerSink for SimMotor {
    fn set_power(&mut self, power: f64) -> Result<()> {
        self.check_transient()?;
        if !power.is_finite() {
            return Err(MotorError::bad_request(&self.name, format!("power {power} is not finite")));
        }
        self.state.power.set(power.clamp(-1.0, 1.0));
        self.state.pid_target.set(None);
        Ok(())
    }

    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<()> {
        self.check_transient()?;
        self.state.neutral.set(Some(mode));
        Ok(())
    }
}

impl PositionSource for SimMotor {
    fn position_ticks(&self) -> Result<i64> {
        Ok(self.state.ticks.get())
    }

    fn reset_encoder(&mut self) -> Result<()> {
        self.check_transient()?;
        self.state.ticks.set(0);
        Ok(())
    }
}

impl OnboardPid for SimMotor {
    fn set_pid(&mut self, _gains: &PidGains) -> Result<()> {
        self.check_transient()
    }

    fn set_target(&mut self, target: f64) -> Result<()> {
        self.check_transient()?;
        self.state.pid_target.set(Some(target));
        Ok(())
    }

    fn stop_pid(&mut self) -> Result<()> {
        self.state.pid_target.set(None);
        Ok(())
    }
}

impl Followable for SimMotor {
    fn follow(&mut self, leader: &dyn MotorController, inverted: bool) -> Result<()> {
        if leader.type_name() != self.type_name() {
            return Err(MotorError::bad_request(
                &self.name,
                format!("cannot follow '{}' of type {}", leader.name(), leader.type_name()),
            ));
        }
        self.state.leader.set(Some(inverted));
        Ok(())
    }
}

impl MotorController for SimMotor {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    fn position(&self) -> Option<&dyn PositionSource> {
        match self.kind {
            SimMotorKind::Smart | SimMotorKind::Encoded => Some(self),
            SimMotorKind::PowerOnly => None,
        }
    }

    fn position_mut(&mut self) -> Option<&mut dyn PositionSource> {
        match self.kind {
            SimMotorKind::Smart | SimMotorKind::Encoded => Some(self),
            SimMotorKind::PowerOnly => None,
        }
    }

    fn onboard_pid(&mut self) -> Option<&mut dyn OnboardPid> {
        match self.kind {
            SimMotorKind::Smart => Some(self),
            _ => None,
        }
    }

    fn followable(&mut self) -> Option<&mut dyn Followable> {
        match self.kind {
            SimMotorKind::Smart => Some(self),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct GyroState {
    connected: Cell<bool>,
    polls_until_ready: Cell<u32>,
    total: Cell<f64>,
}

#[derive(Debug, Clone)]
pub struct SimGyroHandle(Rc<GyroState>);

impl SimGyroHandle {
    pub fn set_connected(&self, connected: bool) {
        self.0.connected.set(connected);
    }

    /// Report ready only after `polls` calls to `is_connected`
    pub fn ready_after_polls(&self, polls: u32) {
        self.0.connected.set(true);
        self.0.polls_until_ready.set(polls);
    }

    /// Set the unwrapped heading; yaw follows it wrapped
    pub fn set_total_angle(&self, degrees: f64) {
        self.0.total.set(degrees);
    }

    pub fn rotate(&self, degrees: f64) {
        self.0.total.set(self.0.total.get() + degrees);
    }

    pub fn total_angle(&self) -> f64 {
        self.0.total.get()
    }
}

#[derive(Debug)]
pub struct SimGyro {
    state: Rc<GyroState>,
}

impl SimGyro {
    pub fn new() -> (Self, SimGyroHandle) {
        let state = Rc::new(GyroState::default());
        state.connected.set(true);
        (
            Self {
                state: Rc::clone(&state),
            },
            SimGyroHandle(state),
        )
    }
}

impl HeadingSource for SimGyro {
    fn is_connected(&self) -> bool {
        let polls = self.state.polls_until_ready.get();
        if polls > 0 {
            self.state.polls_until_ready.set(polls - 1);
            return false;
        }
        self.state.connected.get()
    }

    fn yaw_degrees(&self) -> f64 {
        normalize_angle_degrees(self.state.total.get())
    }

    fn total_angle_degrees(&self) -> f64 {
        self.state.total.get()
    }

    fn reset(&mut self) {
        self.state.total.set(0.0);
    }
}

#[derive(Debug, Clone)]
pub struct SimTickEncoder {
    ticks: Rc<Cell<i64>>,
}

impl SimTickEncoder {
    pub fn new() -> (Self, Rc<Cell<i64>>) {
        let ticks = Rc::new(Cell::new(0));
        (
            Self {
                ticks: Rc::clone(&ticks),
            },
            ticks,
        )
    }
}

impl TickEncoder for SimTickEncoder {
    fn ticks(&self) -> i64 {
        self.ticks.get()
    }

    fn reset(&mut self) {
        self.ticks.set(0);
    }
}

#[derive(Debug, Clone)]
pub struct SimAbsoluteSensor {
    raw: Rc<Cell<f64>>,
}

impl SimAbsoluteSensor {
    pub fn new(raw: f64) -> (Self, Rc<Cell<f64>>) {
        let cell = Rc::new(Cell::new(raw));
        (
            Self {
                raw: Rc::clone(&cell),
            },
            cell,
        )
    }
}

impl AbsoluteSensor for SimAbsoluteSensor {
    fn raw(&self) -> f64 {
        self.raw.get()
    }
}

/// Handles to every device of a simulated tank drive
#[derive(Debug, Clone)]
pub struct TankRig {
    pub left: SimMotorHandle,
    pub right: SimMotorHandle,
    pub gyro: SimGyroHandle,
}

/// First-order tank plant: wheel speed is power times `max_velocity`
#[derive(Debug)]
pub struct TankPlant {
    rig: TankRig,
    width: f64,
    inches_per_tick: f64,
    max_velocity: f64,
    left_dist: f64,
    right_dist: f64,
}

impl TankPlant {
    pub fn new(rig: TankRig, cfg: &TankConfig) -> Self {
        Self {
            rig,
            width: cfg.width,
            inches_per_tick: cfg.inches_per_tick,
            max_velocity: cfg.max_velocity,
            left_dist: 0.0,
            right_dist: 0.0,
        }
    }

    pub fn step(&mut self, dt: f64) {
        let dl = self.rig.left.power() * self.max_velocity * dt;
        let dr = self.rig.right.power() * self.max_velocity * dt;
        self.left_dist += dl;
        self.right_dist += dr;
        self.rig.left.set_ticks((self.left_dist / self.inches_per_tick).round() as i64);
        self.rig.right.set_ticks((self.right_dist / self.inches_per_tick).round() as i64);
        self.rig.gyro.rotate(((dr - dl) / self.width).to_degrees());
    }
}

/// Handles for one simulated swerve module
#[derive(Debug, Clone)]
pub struct ModuleRig {
    pub steer: SimMotorHandle,
    pub drive: SimMotorHandle,
    pub encoder: Rc<Cell<f64>>,
}

#[derive(Debug, Clone)]
pub struct SwerveRig {
    pub modules: [ModuleRig; MODULE_COUNT],
    pub gyro: SimGyroHandle,
}

// Steering rate of a simulated module at full power, deg/s
const SIM_STEER_RATE: f64 = 720.0;

/// First-order swerve plant: steer rate and wheel speed proportional to power
#[derive(Debug)]
pub struct SwervePlant {
    rig: SwerveRig,
    kinematics: SwerveKinematics,
    mappers: [EncoderMapper; MODULE_COUNT],
    inches_per_tick: f64,
    max_speed: f64,
    angles: [f64; MODULE_COUNT],
    distances: [f64; MODULE_COUNT],
}

impl SwervePlant {
    pub fn new(rig: SwerveRig, cfg: &SwerveConfig) -> std::result::Result<Self, crate::config::ConfigError> {
        let modules = cfg.modules.as_array();
        let mut mappers = Vec::with_capacity(MODULE_COUNT);
        for m in modules {
            mappers.push(EncoderMapper::from_config(&m.encoder, true)?);
        }
        let mappers: [EncoderMapper; MODULE_COUNT] = [mappers[0], mappers[1], mappers[2], mappers[3]];
        let angles = [0.0; MODULE_COUNT];
        for (i, m) in rig.modules.iter().enumerate() {
            m.encoder.set(mappers[i].to_raw(angles[i]));
        }
        Ok(Self {
            rig,
            kinematics: SwerveKinematics::new(cfg.width, cfg.length, cfg.max_speed),
            mappers,
            inches_per_tick: cfg.inches_per_tick,
            max_speed: cfg.max_speed,
            angles,
            distances: [0.0; MODULE_COUNT],
        })
    }

    pub fn step(&mut self, dt: f64) {
        let mut states = [ModuleState::default(); MODULE_COUNT];
        for (i, m) in self.rig.modules.iter().enumerate() {
            self.angles[i] = normalize_angle_degrees(self.angles[i] + m.steer.power() * SIM_STEER_RATE * dt);
            let speed = m.drive.power() * self.max_speed;
            self.distances[i] += speed * dt;
            m.encoder.set(self.mappers[i].to_raw(self.angles[i]));
            m.drive.set_ticks((self.distances[i] / self.inches_per_tick).round() as i64);
            states[i] = ModuleState::new(self.angles[i], speed);
        }
        let twist = self.kinematics.forward(&states, 0.0);
        self.rig.gyro.rotate(twist.dtheta * dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_failures_then_recover() {
        let (mut motor, handle) = SimMotor::new("left", SimMotorKind::Smart);
        handle.fail_next(2);
        assert!(matches!(motor.set_power(0.5), Err(MotorError::RequestFailed { .. })));
        assert!(motor.set_power(0.5).is_err());
        motor.set_power(0.5).unwrap();
        assert_eq!(handle.power(), 0.5);
    }

    #[test]
    fn test_power_clamped() {
        let (mut motor, handle) = SimMotor::new("left", SimMotorKind::PowerOnly);
        motor.set_power(3.0).unwrap();
        assert_eq!(handle.power(), 1.0);
    }

    #[test]
    fn test_follow_requires_same_type() {
        let (leader, _) = SimMotor::new("lead", SimMotorKind::Encoded);
        let (mut follower, handle) = SimMotor::new("follow", SimMotorKind::Smart);
        assert!(follower.follow(&leader, false).is_err());

        let (leader, _) = SimMotor::new("lead2", SimMotorKind::Smart);
        follower.follow(&leader, true).unwrap();
        assert_eq!(handle.following(), Some(true));
    }

    #[test]
    fn test_gyro_ready_after_polls() {
        let (gyro, handle) = SimGyro::new();
        handle.ready_after_polls(2);
        assert!(!gyro.is_connected());
        assert!(!gyro.is_connected());
        assert!(gyro.is_connected());
    }

    #[test]
    fn test_gyro_yaw_wraps() {
        let (gyro, handle) = SimGyro::new();
        handle.set_total_angle(370.0);
        assert!((gyro.yaw_degrees() - 10.0).abs() < 1e-9);
        assert_eq!(gyro.total_angle_degrees(), 370.0);
    }

    #[test]
    fn test_tank_plant_spins_in_place() {
        let (mut l, left) = SimMotor::new("l", SimMotorKind::Smart);
        let (mut r, right) = SimMotor::new("r", SimMotorKind::Smart);
        let (_g, gyro) = SimGyro::new();
        let cfg = TankConfig::default();
        let rig = TankRig {
            left: left.clone(),
            right: right.clone(),
            gyro: gyro.clone(),
        };
        let mut plant = TankPlant::new(rig, &cfg);
        l.set_power(-0.5).unwrap();
        r.set_power(0.5).unwrap();
        plant.step(0.02);
        assert!(gyro.total_angle() > 0.0);
        assert_eq!(left.ticks(), -right.ticks());
    }
}
