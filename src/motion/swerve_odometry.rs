// Swerve odometry from module angles, wheel distances and gyro heading
use crate::geometry::{Pose2d, Translation2d};
use crate::motion::swerve_kinematics::MODULE_COUNT;

/// Cumulative reading of one module: angle in degrees, distance driven
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModulePosition {
    pub angle: f64,
    pub distance: f64,
}

impl ModulePosition {
    pub fn new(angle: f64, distance: f64) -> Self {
        Self { angle, distance }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SwerveOdometry {
    pose: Pose2d,
    last: Option<[f64; MODULE_COUNT]>,
}

impl SwerveOdometry {
    pub fn new(pose: Pose2d) -> Self {
        Self { pose, last: None }
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    /// Jump to `pose`; wheel travel keeps accumulating from the last reading
    pub fn reset(&mut self, pose: Pose2d) {
        self.pose = Pose2d::new(pose.x, pose.y, pose.heading);
    }

    /// Feed cumulative module readings. The first call only records
    /// distances and takes the heading.
    pub fn update(&mut self, modules: &[ModulePosition; MODULE_COUNT], heading: f64) -> Pose2d {
        let distances = (*modules).map(|m| m.distance);
        match self.last.replace(distances) {
            Some(prev) => {
                let mut deltas = [ModulePosition::default(); MODULE_COUNT];
                for i in 0..MODULE_COUNT {
                    deltas[i] = ModulePosition::new(modules[i].angle, distances[i] - prev[i]);
                }
                self.apply_deltas(&deltas, heading)
            }
            None => {
                self.pose = Pose2d::new(self.pose.x, self.pose.y, heading);
                self.pose
            }
        }
    }

    /// Integrate one tick of per-module (angle, delta distance)
    pub fn apply_deltas(&mut self, deltas: &[ModulePosition; MODULE_COUNT], heading: f64) -> Pose2d {
        let robot = deltas
            .iter()
            .map(|d| Translation2d::from_polar(d.distance, d.angle))
            .fold(Translation2d::ZERO, |acc, v| acc + v)
            / MODULE_COUNT as f64;

        let field = robot.rotate_by(self.pose.heading);
        self.pose = Pose2d::new(self.pose.x + field.x, self.pose.y + field.y, heading);
        self.pose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::assert_close;

    #[test]
    fn test_translate_east() {
        let mut odo = SwerveOdometry::default();
        let dt = 0.02;
        let step = [ModulePosition::new(0.0, 1.0 * dt); MODULE_COUNT];
        for _ in 0..50 {
            odo.apply_deltas(&step, 0.0);
        }
        let p = odo.pose();
        assert_close(p.x, 1.0, 1e-9);
        assert_close(p.y, 0.0, 1e-9);
        assert_close(p.heading, 0.0, 1e-12);
    }

    #[test]
    fn test_uses_previous_heading() {
        let mut odo = SwerveOdometry::new(Pose2d::new(0.0, 0.0, 90.0));
        let step = [ModulePosition::new(0.0, 1.0); MODULE_COUNT];
        // robot-forward while facing +y, heading then reported as 0
        odo.apply_deltas(&step, 0.0);
        let p = odo.pose();
        assert_close(p.x, 0.0, 1e-9);
        assert_close(p.y, 1.0, 1e-9);
        assert_close(p.heading, 0.0, 1e-12);
    }

    #[test]
    fn test_cumulative_update_primes_first() {
        let mut odo = SwerveOdometry::default();
        let at = |d: f64| [ModulePosition::new(90.0, d); MODULE_COUNT];
        odo.update(&at(100.0), 0.0);
        assert_eq!(odo.pose().translation(), Translation2d::ZERO);
        odo.update(&at(102.0), 0.0);
        assert_close(odo.pose().x, 0.0, 1e-9);
        assert_close(odo.pose().y, 2.0, 1e-9);
    }

    #[test]
    fn test_spin_in_place_does_not_translate() {
        let mut odo = SwerveOdometry::default();
        let deltas = [
            ModulePosition::new(135.0, 0.1),
            ModulePosition::new(45.0, 0.1),
            ModulePosition::new(-135.0, 0.1),
            ModulePosition::new(-45.0, 0.1),
        ];
        odo.apply_deltas(&deltas, 5.0);
        assert_close(odo.pose().x, 0.0, 1e-12);
        assert_close(odo.pose().y, 0.0, 1e-12);
        assert_close(odo.pose().heading, 5.0, 1e-12);
    }
}
