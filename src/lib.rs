// Hardware abstraction layer for a serial-bus competition robot
//
// Provides:
// - Unit-safe angle/velocity/telemetry types
// - A single-motor bus contract plus the real serial implementation
// - Fault-tolerant motor groups with hotplug support
// - Rotary encoder, IMU and distance sensor wrappers

pub mod config;
pub mod distance;
pub mod encoder;
pub mod imu;
pub mod motor;
pub mod runtime;
pub mod telemetry;
pub mod units;

pub use encoder::Encoder;
pub use motor::{BrakeMode, Cartridge, Direction, GroupError, MotorBus, MotorGroup, PortSpec};
pub use units::{Angle, AngularVelocity, Current, Temperature};
