// Motor control module
//
// Provides:
// - The single-motor bus contract (`MotorBus`) and its supporting types
// - The serial bus-servo protocol implementation
// - Fault-tolerant motor groups with hotplug support

mod bus;
mod group;
pub mod sts;

#[cfg(test)]
pub(crate) mod mock;

pub use bus::{BrakeMode, BusError, Cartridge, Direction, MotorBus, PortId, PortSpec};
pub use group::{GroupError, MotorGroup};
pub use sts::StsBus;
