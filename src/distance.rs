// Distance sensor wrapper
//
// Millimeter-ranged time-of-flight sensor with a software offset so a sensor
// mounted behind a bumper can report distance from the robot's edge.

use crate::motor::{BusError, PortId};
use crate::units::Length;

/// Raw transport for distance sensors. Millimeters, the sensor's native unit.
pub trait DistanceBus {
    fn is_connected(&mut self, port: PortId) -> bool;

    fn distance_millimeters(&mut self, port: PortId) -> Result<u32, BusError>;
}

pub struct DistanceSensor<B: DistanceBus> {
    bus: B,
    port: PortId,
    offset: Length,
}

impl<B: DistanceBus> DistanceSensor<B> {
    pub fn new(bus: B, port: PortId) -> Self {
        Self {
            bus,
            port,
            offset: Length::from_millimeters(0.0),
        }
    }

    pub fn is_connected(&mut self) -> bool {
        self.bus.is_connected(self.port)
    }

    /// Measured distance plus the mounting offset. [`Length::INVALID`] on
    /// failure.
    pub fn distance(&mut self) -> Length {
        match self.bus.distance_millimeters(self.port) {
            Ok(millimeters) => Length::from_millimeters(millimeters as f64) + self.offset,
            Err(_) => Length::INVALID,
        }
    }

    /// Set the mounting offset. Fails when the sensor is unreachable, so a
    /// typo'd port is caught at setup rather than during a match.
    pub fn set_offset(&mut self, offset: Length) -> Result<(), BusError> {
        self.bus.distance_millimeters(self.port)?;
        self.offset = offset;
        Ok(())
    }
}
