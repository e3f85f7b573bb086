use std::time::Instant;

use crate::astro_math::Degrees;
use crate::util::{Axis, DriverError};

pub mod simulator;
pub mod skywatcher;

pub use simulator::Simulator;
pub use skywatcher::SerialSkyWatcher;

/// A low-level request to the motor controller. Ids are handed out by the
/// command queue and are strictly increasing per queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: u64,
    pub kind: CommandKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    /// Ramped stop.
    Stop(Axis),
    /// Immediate stop, no deceleration ramp.
    StopInstant(Axis),
    /// Absolute goto, mount-frame degrees.
    GoToTarget(Axis, Degrees),
    /// Teleport the position counter, mount-frame degrees.
    SetPosition(Axis, Degrees),
    /// Continuous motion at the signed rate, degrees per second.
    StartMotion(Axis, f64),
    /// Raw step counter.
    ReadPosition(Axis),
    ReadPositionWithTime(Axis),
    /// Full-stop flag.
    ReadStopped(Axis),
    ReadFactorStep(Axis),
    ReadStepsPerRev(Axis),
    SetSt4GuideRate(u8),
    SetPec(bool),
    StartPecTraining,
    SetSnapPort(bool),
    SetPolarLed(u8),
    EmergencyStop,
}

impl CommandKind {
    /// Axis the command drives, when it is a single-axis command.
    pub fn axis(&self) -> Option<Axis> {
        match self {
            Self::Stop(a)
            | Self::StopInstant(a)
            | Self::GoToTarget(a, _)
            | Self::SetPosition(a, _)
            | Self::StartMotion(a, _)
            | Self::ReadPosition(a)
            | Self::ReadPositionWithTime(a)
            | Self::ReadStopped(a)
            | Self::ReadFactorStep(a)
            | Self::ReadStepsPerRev(a) => Some(*a),
            _ => None,
        }
    }

    /// Motion commands are dropped from the queue when a stop for the same
    /// axis arrives before they reach the wire.
    pub fn is_motion(&self) -> bool {
        matches!(self, Self::GoToTarget(..) | Self::StartMotion(..))
    }

    pub fn is_stop(&self) -> bool {
        matches!(
            self,
            Self::Stop(_) | Self::StopInstant(_) | Self::EmergencyStop
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResultValue {
    Empty,
    Bool(bool),
    /// Raw step count.
    Steps(f64),
    StepsAt(f64, Instant),
    Number(f64),
}

impl ResultValue {
    pub fn as_steps(&self) -> Option<f64> {
        match self {
            Self::Steps(s) => Some(*s),
            Self::StepsAt(s, _) => Some(*s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Outcome delivered to the future returned by the queue.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub id: u64,
    pub result: Result<ResultValue, DriverError>,
}

impl CommandResult {
    pub fn successful(&self) -> bool {
        self.result.is_ok()
    }
}

/// Optional features a mount advertises during the connect handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct MountFeatures {
    pub has_ppec: bool,
    pub has_home_sensor: bool,
    pub has_polar_led: bool,
    pub has_snap_port: bool,
}

/// Capability block filled in during `initialize`.
#[derive(Debug, Clone)]
pub struct DriverInfo {
    pub mount_name: String,
    pub firmware: String,
    pub steps_per_rev: [i64; 2],
    pub worm_steps_per_rev: [f64; 2],
    /// Degrees per motor step.
    pub factor_step: [f64; 2],
    pub steps_time_freq: [f64; 2],
    pub features: MountFeatures,
}

impl DriverInfo {
    pub fn steps_to_degrees(&self, axis: Axis, steps: f64) -> Degrees {
        steps * self.factor_step[axis.index()]
    }

    pub fn degrees_to_steps(&self, axis: Axis, deg: Degrees) -> f64 {
        deg / self.factor_step[axis.index()]
    }
}

/// One concrete motor-control backend. The queue worker is the only caller
/// of `send_command` during normal operation; `EmergencyStop` may arrive
/// from the façade directly, serialised by the wire mutex around the
/// driver object.
pub trait MountDriver: Send {
    /// Open the link and perform the handshake. Fills the capability block
    /// returned by `info()`.
    fn initialize(&mut self) -> Result<(), DriverError>;

    fn shutdown(&mut self);

    fn is_initialized(&self) -> bool;

    /// Capability block; only valid after a successful `initialize`.
    fn info(&self) -> Result<&DriverInfo, DriverError>;

    fn send_command(&mut self, cmd: &Command) -> Result<ResultValue, DriverError>;

    /// Whether any axis reports motion. Used by the emergency-stop check.
    fn is_moving(&mut self) -> Result<bool, DriverError>;

    fn last_error(&self) -> Option<&DriverError>;

    /// True when the mount reports supply voltage below its threshold.
    fn low_voltage(&self) -> bool {
        false
    }
}
