// Swerve drivebase: four modules, gyro, odometry
use std::time::Duration;

use tracing::{debug, warn};

use super::swerve_module::{ModuleHardware, SwerveModule};
use super::{DrivebaseError, LoopType, NeutralPolicy, wait_for_heading};
use crate::config::{ConfigError, SwerveConfig};
use crate::geometry::{Pose2d, Twist2d, normalize_angle_degrees};
use crate::hw::HeadingSource;
use crate::hw::sim::{ModuleRig, SimAbsoluteSensor, SimGyro, SimMotor, SimMotorKind, SwerveRig};
use crate::motion::{
    EncoderMapper, MODULE_COUNT, ModuleId, ModulePosition, ModuleState, Speedometer, SwerveKinematics,
    SwerveOdometry,
};

pub struct SwerveHardware {
    /// Indexed by [`ModuleId`]
    pub modules: [ModuleHardware; MODULE_COUNT],
    pub gyro: Box<dyn HeadingSource>,
}

impl SwerveHardware {
    /// Simulated modules pointing at 0 degrees, plus their handles
    pub fn simulated(cfg: &SwerveConfig) -> Result<(Self, SwerveRig), ConfigError> {
        let cfgs = cfg.modules.as_array();
        let mut hardware = Vec::with_capacity(MODULE_COUNT);
        let mut rigs = Vec::with_capacity(MODULE_COUNT);
        for id in ModuleId::ALL {
            let mapper = EncoderMapper::from_config(&cfgs[id.index()].encoder, true)?;
            let name = id.short_name();
            let (steer, steer_handle) = SimMotor::new(&format!("{name}-steer"), SimMotorKind::PowerOnly);
            let (drive, drive_handle) = SimMotor::new(&format!("{name}-drive"), SimMotorKind::Smart);
            let (encoder, raw) = SimAbsoluteSensor::new(mapper.to_raw(0.0));
            hardware.push(ModuleHardware {
                steer: Box::new(steer),
                drive: Box::new(drive),
                encoder: Box::new(encoder),
            });
            rigs.push(ModuleRig {
                steer: steer_handle,
                drive: drive_handle,
                encoder: raw,
            });
        }
        let (gyro, gyro_handle) = SimGyro::new();

        let (Ok(modules), Ok(module_rigs)) = (
            <[ModuleHardware; MODULE_COUNT]>::try_from(hardware),
            <[ModuleRig; MODULE_COUNT]>::try_from(rigs),
        ) else {
            return Err(ConfigError::invalid("swerve.modules", "expected four modules"));
        };
        Ok((
            Self {
                modules,
                gyro: Box::new(gyro),
            },
            SwerveRig {
                modules: module_rigs,
                gyro: gyro_handle,
            },
        ))
    }
}

pub struct SwerveDrivebase {
    modules: [SwerveModule; MODULE_COUNT],
    // None once the heading sensor failed its warmup
    gyro: Option<Box<dyn HeadingSource>>,
    kinematics: SwerveKinematics,
    odometry: SwerveOdometry,
    angular: Speedometer,
    heading: f64,
    total_angle: f64,
    neutral: NeutralPolicy,
}

impl SwerveDrivebase {
    pub fn new(cfg: &SwerveConfig, hw: SwerveHardware, gyro_warmup: Duration) -> Result<Self, DrivebaseError> {
        cfg.validate()?;

        let cfgs = cfg.modules.as_array();
        let build = |id: ModuleId, module_hw: ModuleHardware| {
            SwerveModule::new(
                id,
                cfgs[id.index()],
                module_hw,
                cfg.inches_per_tick,
                cfg.linear_samples,
                cfg.mirror,
            )
        };
        let [fl, fr, bl, br] = hw.modules;
        let modules = [
            build(ModuleId::FrontLeft, fl)?,
            build(ModuleId::FrontRight, fr)?,
            build(ModuleId::BackLeft, bl)?,
            build(ModuleId::BackRight, br)?,
        ];

        let gyro = if wait_for_heading(hw.gyro.as_ref(), gyro_warmup) {
            Some(hw.gyro)
        } else {
            None
        };

        Ok(Self {
            modules,
            gyro,
            kinematics: SwerveKinematics::new(cfg.width, cfg.length, cfg.max_speed)
                .with_mirror(cfg.mirror)
                .with_scale(cfg.scale),
            odometry: SwerveOdometry::default(),
            angular: Speedometer::new("angles", cfg.angular_samples, true),
            heading: 0.0,
            total_angle: 0.0,
            neutral: NeutralPolicy::default(),
        })
    }

    pub fn with_neutral_policy(mut self, policy: NeutralPolicy) -> Self {
        self.neutral = policy;
        self
    }

    pub fn is_degraded(&self) -> bool {
        self.gyro.is_none()
    }

    pub fn has_heading(&self) -> bool {
        self.gyro.is_some()
    }

    /// Sense and estimate for one tick of length `dt` seconds
    pub fn update(&mut self, dt: f64) {
        for module in self.modules.iter_mut() {
            module.compute_state(dt);
        }

        match &self.gyro {
            Some(gyro) => {
                self.heading = gyro.yaw_degrees();
                self.total_angle = gyro.total_angle_degrees();
            }
            None => {
                // integrate the spin the modules report
                let measured = self.kinematics.forward(&self.measured_states(), 0.0);
                self.total_angle += measured.dtheta * dt;
                self.heading = normalize_angle_degrees(self.total_angle);
            }
        }
        self.angular.update(dt, self.heading);

        let positions = self
            .modules
            .each_ref()
            .map(|m| ModulePosition::new(m.angle(), m.distance()));
        let pose = self.odometry.update(&positions, self.heading);

        debug!(
            "swerve: pose ({:.3}, {:.3}, {:.2}) [{}]",
            pose.x,
            pose.y,
            pose.heading,
            self.status().join(", ")
        );
    }

    /// Close the module loops
    pub fn run(&mut self, dt: f64) {
        for module in self.modules.iter_mut() {
            module.run(dt);
        }
    }

    /// Per-module targets, indexed by [`ModuleId`]
    pub fn set_targets(&mut self, states: &[ModuleState; MODULE_COUNT]) {
        for (module, state) in self.modules.iter_mut().zip(states.iter()) {
            module.set_targets(*state);
        }
    }

    /// Field-relative translation in in/s and rotation in deg/s
    pub fn set_chassis_speeds(&mut self, twist: &Twist2d) {
        if !twist.is_finite() {
            warn!("swerve: ignoring non-finite chassis speeds {:?}", twist);
            return;
        }
        let states = self.kinematics.inverse(twist, self.heading, &self.module_angles());
        self.set_targets(&states);
    }

    /// Zero power on every motor and clear every target
    pub fn stop(&mut self) {
        for module in self.modules.iter_mut() {
            module.set_power(0.0, 0.0);
        }
    }

    /// Point every module at `angle`
    pub fn set_angle(&mut self, angle: f64) {
        for module in self.modules.iter_mut() {
            module.set_angle(angle);
        }
    }

    /// Open-loop drive power on every module, steer targets unchanged
    pub fn set_drive_power(&mut self, power: f64) {
        for module in self.modules.iter_mut() {
            module.set_drive_power(power);
        }
    }

    /// Open-loop power on one module
    pub fn set_power(&mut self, which: usize, steer: f64, drive: f64) -> Result<(), DrivebaseError> {
        let module = self
            .modules
            .get_mut(which)
            .ok_or(DrivebaseError::InvalidModule(which))?;
        module.set_power(steer, drive);
        Ok(())
    }

    pub fn reset_odometry(&mut self, pose: Pose2d) {
        self.odometry.reset(pose);
    }

    pub fn init(&mut self, loop_type: LoopType) {
        let mode = self.neutral.mode_for(loop_type);
        for module in self.modules.iter_mut() {
            module.set_neutral_mode(mode);
        }
    }

    pub fn module(&self, id: ModuleId) -> &SwerveModule {
        &self.modules[id.index()]
    }

    pub fn modules(&self) -> &[SwerveModule; MODULE_COUNT] {
        &self.modules
    }

    pub fn kinematics(&self) -> &SwerveKinematics {
        &self.kinematics
    }

    pub fn module_angles(&self) -> [f64; MODULE_COUNT] {
        self.modules.each_ref().map(|m| m.angle())
    }

    pub fn measured_states(&self) -> [ModuleState; MODULE_COUNT] {
        self.modules.each_ref().map(|m| ModuleState::new(m.angle(), m.velocity()))
    }

    /// Chassis motion from the measured module states, field-relative
    pub fn measured_twist(&self) -> Twist2d {
        self.kinematics.forward(&self.measured_states(), self.heading)
    }

    pub fn pose(&self) -> Pose2d {
        self.odometry.pose()
    }

    /// Heading in (-180, 180]
    pub fn angle(&self) -> f64 {
        self.heading
    }

    pub fn angular_velocity(&self) -> f64 {
        self.angular.velocity()
    }

    pub fn total_angle(&self) -> f64 {
        self.total_angle
    }

    pub fn velocity(&self) -> f64 {
        self.modules.iter().map(|m| m.velocity()).sum::<f64>() / MODULE_COUNT as f64
    }

    pub fn acceleration(&self) -> f64 {
        self.modules.iter().map(|m| m.acceleration()).sum::<f64>() / MODULE_COUNT as f64
    }

    pub fn distance(&self) -> f64 {
        self.modules.iter().map(|m| m.distance()).sum::<f64>() / MODULE_COUNT as f64
    }

    /// One status line per module, tagged with its short name
    pub fn status(&self) -> Vec<String> {
        self.modules
            .iter()
            .map(|m| format!("{}: {}", m.id().short_name(), m.status()))
            .collect()
    }
}
