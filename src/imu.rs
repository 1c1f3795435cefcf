// Inertial sensor wrapper
//
// Heading is kept as an unbounded rotation with a software offset, so callers
// can re-declare "which way is zero" without touching the hardware. The gyro
// scalar compensates systematic drift (a sensor that reads 359.2 degrees for a
// full physical turn gets a scalar of 360/359.2).

use crate::motor::{BusError, PortId};
use crate::units::Angle;

/// Raw transport for inertial sensors. Rotation is reported in centidegrees,
/// counterclockwise positive, unbounded.
pub trait ImuBus {
    fn is_connected(&mut self, port: PortId) -> bool;

    fn rotation_centidegrees(&mut self, port: PortId) -> Result<i64, BusError>;

    /// Start the gyro bias calibration routine. Non-blocking.
    fn calibrate(&mut self, port: PortId) -> Result<(), BusError>;

    fn is_calibrating(&mut self, port: PortId) -> Result<bool, BusError>;
}

pub struct Imu<B: ImuBus> {
    bus: B,
    port: PortId,
    offset: Angle,
    gyro_scalar: f64,
}

impl<B: ImuBus> Imu<B> {
    pub fn new(bus: B, port: PortId) -> Self {
        Self {
            bus,
            port,
            offset: Angle::ZERO,
            gyro_scalar: 1.0,
        }
    }

    pub fn is_connected(&mut self) -> bool {
        self.bus.is_connected(self.port)
    }

    /// Start calibration. Resets the software offset: a freshly calibrated
    /// sensor reports zero rotation.
    pub fn calibrate(&mut self) -> Result<(), BusError> {
        self.offset = Angle::ZERO;
        self.bus.calibrate(self.port)
    }

    pub fn is_calibrating(&mut self) -> Result<bool, BusError> {
        self.bus.is_calibrating(self.port)
    }

    /// Unbounded rotation since calibration. [`Angle::INVALID`] on failure.
    pub fn rotation(&mut self) -> Angle {
        match self.bus.rotation_centidegrees(self.port) {
            Ok(centidegrees) => {
                Angle::from_degrees(centidegrees as f64 / 100.0 * self.gyro_scalar) + self.offset
            }
            Err(_) => Angle::INVALID,
        }
    }

    /// Declare the current rotation to be `rotation`, via the software offset.
    pub fn set_rotation(&mut self, rotation: Angle) -> Result<(), BusError> {
        let raw = self.rotation();
        if !raw.is_valid() {
            return Err(BusError::Disconnected { port: self.port });
        }
        self.offset += rotation - raw;
        Ok(())
    }

    pub fn set_gyro_scalar(&mut self, scalar: f64) {
        self.gyro_scalar = scalar;
    }

    pub fn gyro_scalar(&self) -> f64 {
        self.gyro_scalar
    }
}
