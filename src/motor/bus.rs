// Single-motor driver contract
//
// The group logic never talks to hardware directly; it goes through this trait,
// keyed by port number. The real implementation lives in `sts.rs`, tests use an
// in-memory mock. Handles are not held across calls: every operation re-addresses
// the port, so a motor that was swapped or re-plugged between calls is picked up
// with no stale state.

use crate::units::{Angle, AngularVelocity, Current, Temperature};

/// Physical connector number on the bus.
pub type PortId = u8;

/// Behavior of a motor when it is told to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrakeMode {
    /// Spin freely until friction stops the motor.
    Coast,
    /// Short the windings to stop quickly.
    Brake,
    /// Actively hold the stopped position.
    Hold,
}

/// Internal gear cartridge of a motor.
///
/// The cartridge determines both the free speed of the output shaft and how many
/// encoder ticks one output revolution takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cartridge {
    Red,
    Green,
    Blue,
}

impl Cartridge {
    /// Theoretical free speed of the output shaft.
    pub fn max_velocity(&self) -> AngularVelocity {
        match self {
            Cartridge::Red => AngularVelocity::from_rpm(100.0),
            Cartridge::Green => AngularVelocity::from_rpm(200.0),
            Cartridge::Blue => AngularVelocity::from_rpm(600.0),
        }
    }

    /// Encoder ticks per output revolution. The raw encoder measures 50 counts
    /// per internal revolution; the cartridge gears that down.
    pub fn ticks_per_revolution(&self) -> f64 {
        match self {
            Cartridge::Red => 1800.0,
            Cartridge::Green => 900.0,
            Cartridge::Blue => 300.0,
        }
    }
}

/// Logical rotation direction of a motor relative to the mechanism it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Multiplier applied to commanded outputs and observed angles.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reverse => -1.0,
        }
    }
}

/// A port plus the direction the motor on it should spin.
///
/// Replaces the sign-of-the-port encoding some SDKs use, which cannot represent
/// a reversed port 0 and invites two's-complement edge cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSpec {
    pub port: PortId,
    pub direction: Direction,
}

impl PortSpec {
    pub fn forward(port: PortId) -> Self {
        Self { port, direction: Direction::Forward }
    }

    pub fn reversed(port: PortId) -> Self {
        Self { port, direction: Direction::Reverse }
    }

    pub fn is_reversed(&self) -> bool {
        self.direction == Direction::Reverse
    }
}

/// `-3` means "port 3, reversed" for callers migrating from signed-port APIs.
impl From<i16> for PortSpec {
    fn from(signed: i16) -> Self {
        if signed < 0 {
            Self::reversed(signed.unsigned_abs() as PortId)
        } else {
            Self::forward(signed as PortId)
        }
    }
}

/// Errors surfaced by a bus implementation.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("no device on port {port}")]
    Disconnected { port: PortId },

    #[error("device on port {port} rejected the command")]
    Rejected { port: PortId },

    #[error("transport error on port {port}: {reason}")]
    Transport { port: PortId, reason: String },
}

/// The contract the motor group consumes from the single-motor driver.
///
/// Angles are raw: measured at the motor's own shaft in its native gearing, with
/// no direction or offset applied. The group layers those on top.
pub trait MotorBus {
    /// Liveness probe. Must not hang; a stalled transaction is the driver's
    /// responsibility to turn into `false` or an error.
    fn is_connected(&mut self, port: PortId) -> bool;

    /// Drive at a fraction of full power, -1.0..=1.0.
    fn move_percent(&mut self, port: PortId, percent: f64) -> Result<(), BusError>;

    /// Drive at a target velocity of the motor's own shaft.
    fn move_velocity(&mut self, port: PortId, velocity: AngularVelocity) -> Result<(), BusError>;

    /// Stop using the currently configured brake mode.
    fn brake(&mut self, port: PortId) -> Result<(), BusError>;

    fn set_brake_mode(&mut self, port: PortId, mode: BrakeMode) -> Result<(), BusError>;

    /// `None` when the mode cannot be read.
    fn brake_mode(&mut self, port: PortId) -> Option<BrakeMode>;

    /// Relative angle of the motor's shaft since its zero was last set.
    fn angle(&mut self, port: PortId) -> Result<Angle, BusError>;

    /// Move the motor's relative zero so that its current position reads `angle`.
    fn set_angle(&mut self, port: PortId, angle: Angle) -> Result<(), BusError>;

    /// `None` when the cartridge cannot be determined.
    fn cartridge(&mut self, port: PortId) -> Option<Cartridge>;

    fn temperature(&mut self, port: PortId) -> Result<Temperature, BusError>;

    fn current(&mut self, port: PortId) -> Result<Current, BusError>;
}
