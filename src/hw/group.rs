// Several motors of one family driven as one
use tracing::warn;

use super::{MotorController, MotorError, NeutralMode, PositionSource, PowerSink, Result};

/// Motors of a single type with per-motor inversion. Position comes from the
/// first motor added (the leader).
pub struct MotorGroup {
    name: String,
    motors: Vec<(Box<dyn MotorController>, bool)>,
}

impl MotorGroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            motors: Vec::new(),
        }
    }

    pub fn add(&mut self, motor: Box<dyn MotorController>, inverted: bool) -> Result<()> {
        if let Some((leader, _)) = self.motors.first() {
            if leader.type_name() != motor.type_name() {
                return Err(MotorError::bad_request(
                    &self.name,
                    format!(
                        "cannot mix '{}' ({}) with {} motors",
                        motor.name(),
                        motor.type_name(),
                        leader.type_name()
                    ),
                ));
            }
        }
        self.motors.push((motor, inverted));
        Ok(())
    }

    pub fn with(mut self, motor: Box<dyn MotorController>, inverted: bool) -> Result<Self> {
        self.add(motor, inverted)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.motors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }

    fn leader(&self) -> Result<&(Box<dyn MotorController>, bool)> {
        self.motors
            .first()
            .ok_or_else(|| MotorError::bad_request(&self.name, "group has no motors"))
    }

    fn leader_has_position(&self) -> bool {
        self.motors.first().is_some_and(|(m, _)| m.has_position())
    }
}

impl PowerSink for MotorGroup {
    /// Every member is written even if one fails; the first error is returned
    fn set_power(&mut self, power: f64) -> Result<()> {
        if self.motors.is_empty() {
            return Err(MotorError::bad_request(&self.name, "group has no motors"));
        }
        let mut first_err = None;
        for (motor, inverted) in self.motors.iter_mut() {
            let p = if *inverted { -power } else { power };
            if let Err(e) = motor.set_power(p) {
                warn!("{}: {}", self.name, e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<()> {
        if self.motors.is_empty() {
            return Err(MotorError::bad_request(&self.name, "group has no motors"));
        }
        let mut first_err = None;
        for (motor, _) in self.motors.iter_mut() {
            if let Err(e) = motor.set_neutral_mode(mode) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl PositionSource for MotorGroup {
    fn position_ticks(&self) -> Result<i64> {
        let (leader, inverted) = self.leader()?;
        let source = leader
            .position()
            .ok_or_else(|| MotorError::bad_request(&self.name, "leader has no position feedback"))?;
        let ticks = source.position_ticks()?;
        Ok(if *inverted { -ticks } else { ticks })
    }

    fn reset_encoder(&mut self) -> Result<()> {
        let name = self.name.clone();
        let (leader, _) = self
            .motors
            .first_mut()
            .ok_or_else(|| MotorError::bad_request(&name, "group has no motors"))?;
        leader
            .position_mut()
            .ok_or_else(|| MotorError::bad_request(&name, "leader has no position feedback"))?
            .reset_encoder()
    }
}

impl MotorController for MotorGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &str {
        self.motors.first().map_or("empty", |(m, _)| m.type_name())
    }

    fn position(&self) -> Option<&dyn PositionSource> {
        if self.leader_has_position() { Some(self) } else { None }
    }

    fn position_mut(&mut self) -> Option<&mut dyn PositionSource> {
        if self.leader_has_position() { Some(self) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::require_followable;
    use crate::hw::sim::{SimMotor, SimMotorKind};

    #[test]
    fn test_heterogeneous_group_rejected() {
        let (a, _) = SimMotor::new("a", SimMotorKind::Smart);
        let (b, _) = SimMotor::new("b", SimMotorKind::PowerOnly);
        let mut group = MotorGroup::new("left");
        group.add(Box::new(a), false).unwrap();
        let err = group.add(Box::new(b), false).unwrap_err();
        assert!(matches!(err, MotorError::BadRequest { ref motor, .. } if motor == "left"));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_power_applies_inversion() {
        let (a, ha) = SimMotor::new("a", SimMotorKind::Smart);
        let (b, hb) = SimMotor::new("b", SimMotorKind::Smart);
        let mut group = MotorGroup::new("right")
            .with(Box::new(a), false)
            .unwrap()
            .with(Box::new(b), true)
            .unwrap();
        group.set_power(0.4).unwrap();
        assert_eq!(ha.power(), 0.4);
        assert_eq!(hb.power(), -0.4);

        group.set_neutral_mode(NeutralMode::Coast).unwrap();
        assert_eq!(ha.neutral_mode(), Some(NeutralMode::Coast));
        assert_eq!(hb.neutral_mode(), Some(NeutralMode::Coast));
    }

    #[test]
    fn test_transient_failure_still_writes_others() {
        let (a, ha) = SimMotor::new("a", SimMotorKind::Smart);
        let (b, hb) = SimMotor::new("b", SimMotorKind::Smart);
        let mut group = MotorGroup::new("left")
            .with(Box::new(a), false)
            .unwrap()
            .with(Box::new(b), false)
            .unwrap();
        ha.fail_next(1);
        assert!(matches!(group.set_power(0.7), Err(MotorError::RequestFailed { .. })));
        assert_eq!(ha.power(), 0.0);
        assert_eq!(hb.power(), 0.7);
    }

    #[test]
    fn test_position_from_inverted_leader() {
        let (a, ha) = SimMotor::new("a", SimMotorKind::Encoded);
        let group = MotorGroup::new("right").with(Box::new(a), true).unwrap();
        ha.set_ticks(100);
        assert!(group.has_position());
        assert_eq!(group.position().unwrap().position_ticks().unwrap(), -100);
    }

    #[test]
    fn test_group_without_position() {
        let (a, _) = SimMotor::new("a", SimMotorKind::PowerOnly);
        let group = MotorGroup::new("left").with(Box::new(a), false).unwrap();
        assert!(!group.has_position());
        assert!(group.position_ticks().is_err());
    }

    #[test]
    fn test_group_cannot_follow() {
        let (a, _) = SimMotor::new("a", SimMotorKind::Smart);
        let mut group = MotorGroup::new("left").with(Box::new(a), false).unwrap();
        assert!(require_followable(&mut group).is_err());
    }

    #[test]
    fn test_empty_group_power_is_bad_request() {
        let mut group = MotorGroup::new("empty");
        assert!(matches!(group.set_power(0.1), Err(MotorError::BadRequest { .. })));
    }
}
