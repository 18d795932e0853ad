// Pre-sampled paths
//
// A path is a fixed-period sequence of samples per wheel group. The flavor
// decides which groups exist:
//   tank    - left, right
//   swerve  - fl, fr, bl, br
//   chassis - main (robot center; pure pursuit and ramsete)

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geometry::{Pose2d, Translation2d, lerp, shortest_arc_degrees};

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path '{0}' has no samples")]
    Empty(String),

    #[error("path '{name}': period must be > 0, got {period}")]
    BadPeriod { name: String, period: f64 },

    #[error("path '{name}': group {group} has {actual} samples, expected {expected}")]
    LengthMismatch {
        name: String,
        group: WheelGroup,
        expected: usize,
        actual: usize,
    },

    #[error("path '{name}': sample {index} of group {group} is not finite")]
    NonFinite {
        name: String,
        group: WheelGroup,
        index: usize,
    },

    #[error("path '{name}' has no {group} group")]
    NoSuchGroup { name: String, group: WheelGroup },

    #[error("path '{name}': index {index} out of range for {len} samples")]
    IndexOutOfRange { name: String, index: usize, len: usize },

    #[error("path '{name}' is a {actual} path, expected {expected}")]
    WrongKind {
        name: String,
        expected: PathKind,
        actual: PathKind,
    },

    #[error("cannot parse path: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PathError>;

/// One trajectory sample. `position` is distance along the group's own track.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PathSample {
    #[serde(default)]
    pub t: f64,
    pub x: f64,
    pub y: f64,
    /// Degrees
    pub heading: f64,
    #[serde(default)]
    pub position: f64,
    #[serde(default)]
    pub velocity: f64,
    #[serde(default)]
    pub acceleration: f64,
}

impl PathSample {
    pub fn pose(&self) -> Pose2d {
        Pose2d::new(self.x, self.y, self.heading)
    }

    pub fn translation(&self) -> Translation2d {
        Translation2d::new(self.x, self.y)
    }

    fn is_finite(&self) -> bool {
        [
            self.t,
            self.x,
            self.y,
            self.heading,
            self.position,
            self.velocity,
            self.acceleration,
        ]
        .iter()
        .all(|v| v.is_finite())
    }

    fn interpolate(&self, other: &PathSample, pcnt: f64) -> PathSample {
        PathSample {
            t: lerp(self.t, other.t, pcnt),
            x: lerp(self.x, other.x, pcnt),
            y: lerp(self.y, other.y, pcnt),
            heading: self.pose().interpolate(&other.pose(), pcnt).heading,
            position: lerp(self.position, other.position, pcnt),
            velocity: lerp(self.velocity, other.velocity, pcnt),
            acceleration: lerp(self.acceleration, other.acceleration, pcnt),
        }
    }

    /// Same sample as seen driving backwards: distances and rates negated
    pub fn reversed(&self) -> PathSample {
        PathSample {
            position: -self.position,
            velocity: -self.velocity,
            acceleration: -self.acceleration,
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelGroup {
    Left,
    Right,
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
    Main,
}

impl fmt::Display for WheelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WheelGroup::Left => "left",
            WheelGroup::Right => "right",
            WheelGroup::FrontLeft => "fl",
            WheelGroup::FrontRight => "fr",
            WheelGroup::BackLeft => "bl",
            WheelGroup::BackRight => "br",
            WheelGroup::Main => "main",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    Tank,
    Swerve,
    Chassis,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PathKind::Tank => "tank",
            PathKind::Swerve => "swerve",
            PathKind::Chassis => "chassis",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Path {
    Tank {
        name: String,
        period: f64,
        left: Vec<PathSample>,
        right: Vec<PathSample>,
    },
    Swerve {
        name: String,
        period: f64,
        fl: Vec<PathSample>,
        fr: Vec<PathSample>,
        bl: Vec<PathSample>,
        br: Vec<PathSample>,
    },
    Chassis {
        name: String,
        period: f64,
        main: Vec<PathSample>,
    },
}

impl Path {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let path: Path = serde_json::from_str(text)?;
        path.validate()?;
        Ok(path)
    }

    pub fn name(&self) -> &str {
        match self {
            Path::Tank { name, .. } | Path::Swerve { name, .. } | Path::Chassis { name, .. } => name,
        }
    }

    /// Seconds between samples
    pub fn period(&self) -> f64 {
        match self {
            Path::Tank { period, .. } | Path::Swerve { period, .. } | Path::Chassis { period, .. } => {
                *period
            }
        }
    }

    pub fn kind(&self) -> PathKind {
        match self {
            Path::Tank { .. } => PathKind::Tank,
            Path::Swerve { .. } => PathKind::Swerve,
            Path::Chassis { .. } => PathKind::Chassis,
        }
    }

    pub fn groups(&self) -> &'static [WheelGroup] {
        match self {
            Path::Tank { .. } => &[WheelGroup::Left, WheelGroup::Right],
            Path::Swerve { .. } => &[
                WheelGroup::FrontLeft,
                WheelGroup::FrontRight,
                WheelGroup::BackLeft,
                WheelGroup::BackRight,
            ],
            Path::Chassis { .. } => &[WheelGroup::Main],
        }
    }

    pub fn group(&self, group: WheelGroup) -> Result<&[PathSample]> {
        let samples: &[PathSample] = match (self, group) {
            (Path::Tank { left, .. }, WheelGroup::Left) => left,
            (Path::Tank { right, .. }, WheelGroup::Right) => right,
            (Path::Swerve { fl, .. }, WheelGroup::FrontLeft) => fl,
            (Path::Swerve { fr, .. }, WheelGroup::FrontRight) => fr,
            (Path::Swerve { bl, .. }, WheelGroup::BackLeft) => bl,
            (Path::Swerve { br, .. }, WheelGroup::BackRight) => br,
            (Path::Chassis { main, .. }, WheelGroup::Main) => main,
            _ => {
                return Err(PathError::NoSuchGroup {
                    name: self.name().to_string(),
                    group,
                });
            }
        };
        Ok(samples)
    }

    /// Samples per group; groups have equal lengths once validated
    pub fn len(&self) -> usize {
        self.groups()
            .iter()
            .filter_map(|g| self.group(*g).ok())
            .map(|s| s.len())
            .min()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time of the last sample, in seconds
    pub fn duration(&self) -> f64 {
        self.len().saturating_sub(1) as f64 * self.period()
    }

    pub fn sample(&self, group: WheelGroup, index: usize) -> Result<PathSample> {
        let samples = self.group(group)?;
        samples.get(index).copied().ok_or_else(|| PathError::IndexOutOfRange {
            name: self.name().to_string(),
            index,
            len: samples.len(),
        })
    }

    /// Linear interpolation at `t` seconds from the start, clamped to the path
    pub fn sample_at_time(&self, group: WheelGroup, t: f64) -> Result<PathSample> {
        let samples = self.group(group)?;
        let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
            return Err(PathError::Empty(self.name().to_string()));
        };
        let period = self.period();
        if !(t > 0.0) {
            return Ok(*first);
        }
        let pos = t / period;
        let index = pos.floor() as usize;
        if index + 1 >= samples.len() {
            return Ok(*last);
        }
        let mut sample = samples[index].interpolate(&samples[index + 1], pos - index as f64);
        sample.t = t;
        Ok(sample)
    }

    /// Where the robot center starts
    pub fn start_pose(&self) -> Result<Pose2d> {
        let firsts: Vec<PathSample> = self
            .groups()
            .iter()
            .map(|g| self.sample(*g, 0))
            .collect::<Result<_>>()?;
        let center = firsts
            .iter()
            .fold(Translation2d::ZERO, |acc, s| acc + s.translation())
            / firsts.len() as f64;
        Ok(Pose2d::new(center.x, center.y, firsts[0].heading))
    }

    /// Robot-center reference at `t`: every group averaged, heading taken
    /// from the first group
    pub fn center_at_time(&self, t: f64) -> Result<PathSample> {
        let samples: Vec<PathSample> = self
            .groups()
            .iter()
            .map(|g| self.sample_at_time(*g, t))
            .collect::<Result<_>>()?;
        let n = samples.len() as f64;
        let mean = |f: fn(&PathSample) -> f64| samples.iter().map(f).sum::<f64>() / n;
        Ok(PathSample {
            t: samples[0].t,
            x: mean(|s| s.x),
            y: mean(|s| s.y),
            heading: samples[0].heading,
            position: mean(|s| s.position),
            velocity: mean(|s| s.velocity),
            acceleration: mean(|s| s.acceleration),
        })
    }

    /// Heading change from sample `index - 1` to `index` in degrees; 0 at the start
    pub fn heading_step(&self, group: WheelGroup, index: usize) -> Result<f64> {
        if index == 0 {
            self.sample(group, 0)?;
            return Ok(0.0);
        }
        let prev = self.sample(group, index - 1)?;
        let cur = self.sample(group, index)?;
        Ok(shortest_arc_degrees(prev.heading, cur.heading))
    }

    pub fn require_kind(&self, expected: PathKind) -> Result<()> {
        if self.kind() == expected {
            Ok(())
        } else {
            Err(PathError::WrongKind {
                name: self.name().to_string(),
                expected,
                actual: self.kind(),
            })
        }
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.name().to_string();
        let period = self.period();
        if !(period > 0.0) || !period.is_finite() {
            return Err(PathError::BadPeriod { name, period });
        }

        let groups = self.groups();
        let expected = self.group(groups[0])?.len();
        if expected == 0 {
            return Err(PathError::Empty(name));
        }
        for &group in groups {
            let samples = self.group(group)?;
            if samples.len() != expected {
                return Err(PathError::LengthMismatch {
                    name,
                    group,
                    expected,
                    actual: samples.len(),
                });
            }
            if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
                return Err(PathError::NonFinite { name, group, index });
            }
        }
        Ok(())
    }
}
