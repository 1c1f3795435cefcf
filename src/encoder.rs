// Rotary encoders
//
// `Encoder` is the capability the rest of the robot code consumes: anything
// that measures an unbounded relative angle and can be re-zeroed. Motor groups
// implement it too, so odometry code does not care whether a tracking wheel
// sits on a dedicated sensor or on a drive motor.

use crate::motor::{BusError, GroupError, MotorBus, MotorGroup, PortId};
use crate::units::Angle;

/// A device measuring the angle of a rotating shaft.
pub trait Encoder {
    type Error: std::error::Error;

    fn is_connected(&mut self) -> bool;

    /// Relative angle since the last zero. [`Angle::INVALID`] on failure.
    fn angle(&mut self) -> Angle;

    /// Re-zero so the current position reads `angle`.
    fn set_angle(&mut self, angle: Angle) -> Result<(), Self::Error>;
}

impl<B: MotorBus> Encoder for MotorGroup<B> {
    type Error = GroupError;

    fn is_connected(&mut self) -> bool {
        MotorGroup::is_connected(self)
    }

    fn angle(&mut self) -> Angle {
        MotorGroup::angle(self)
    }

    fn set_angle(&mut self, angle: Angle) -> Result<(), GroupError> {
        MotorGroup::set_angle(self, angle)
    }
}

/// Raw transport for dedicated rotation sensors. Reports centidegrees, the
/// sensor's native integer unit.
pub trait EncoderBus {
    fn is_connected(&mut self, port: PortId) -> bool;

    /// Multi-turn position in centidegrees.
    fn position_centidegrees(&mut self, port: PortId) -> Result<i64, BusError>;

    fn set_position_centidegrees(&mut self, port: PortId, centidegrees: i64)
    -> Result<(), BusError>;
}

/// A dedicated rotation sensor on the bus.
pub struct RotationSensor<B: EncoderBus> {
    bus: B,
    port: PortId,
    reversed: bool,
}

impl<B: EncoderBus> RotationSensor<B> {
    pub fn new(bus: B, port: PortId) -> Self {
        Self {
            bus,
            port,
            reversed: false,
        }
    }

    pub fn set_reversed(&mut self, reversed: bool) {
        self.reversed = reversed;
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    fn sign(&self) -> f64 {
        if self.reversed { -1.0 } else { 1.0 }
    }
}

impl<B: EncoderBus> Encoder for RotationSensor<B> {
    type Error = BusError;

    fn is_connected(&mut self) -> bool {
        self.bus.is_connected(self.port)
    }

    fn angle(&mut self) -> Angle {
        match self.bus.position_centidegrees(self.port) {
            Ok(centidegrees) => Angle::from_degrees(centidegrees as f64 / 100.0) * self.sign(),
            Err(_) => Angle::INVALID,
        }
    }

    fn set_angle(&mut self, angle: Angle) -> Result<(), BusError> {
        let centidegrees = (angle.as_degrees() * self.sign() * 100.0).round() as i64;
        self.bus.set_position_centidegrees(self.port, centidegrees)
    }
}

/// Raw transport for optical shaft encoders on the legacy two-wire ports.
/// The count is in degrees of shaft rotation since the last reset. Direction
/// reversal is a wiring-level concern configured on the port pair itself.
pub trait AdiBus {
    fn count_degrees(&mut self, top: PortId, bottom: PortId) -> Result<i32, BusError>;

    /// Reset the count to zero.
    fn reset(&mut self, top: PortId, bottom: PortId) -> Result<(), BusError>;
}

/// An optical shaft encoder on a two-wire port pair.
///
/// The legacy ports carry no device identity, so a disconnected encoder cannot
/// be told apart from a stationary one; connectivity here only means the port
/// pair still reads back. The hardware count cannot be written either, so
/// re-zeroing resets the count and keeps the target as a software offset.
pub struct AdiEncoder<B: AdiBus> {
    bus: B,
    top: PortId,
    bottom: PortId,
    offset: Angle,
}

impl<B: AdiBus> AdiEncoder<B> {
    pub fn new(bus: B, top: PortId, bottom: PortId) -> Self {
        Self {
            bus,
            top,
            bottom,
            offset: Angle::ZERO,
        }
    }
}

impl<B: AdiBus> Encoder for AdiEncoder<B> {
    type Error = BusError;

    /// Port-pair validity only; an unplugged encoder still reads as connected.
    fn is_connected(&mut self) -> bool {
        self.bus.count_degrees(self.top, self.bottom).is_ok()
    }

    fn angle(&mut self) -> Angle {
        match self.bus.count_degrees(self.top, self.bottom) {
            Ok(degrees) => Angle::from_degrees(degrees as f64) + self.offset,
            Err(_) => Angle::INVALID,
        }
    }

    fn set_angle(&mut self, angle: Angle) -> Result<(), BusError> {
        self.bus.reset(self.top, self.bottom)?;
        self.offset = angle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEncoder {
        connected: bool,
        centidegrees: i64,
    }

    impl EncoderBus for FakeEncoder {
        fn is_connected(&mut self, _port: PortId) -> bool {
            self.connected
        }

        fn position_centidegrees(&mut self, port: PortId) -> Result<i64, BusError> {
            if self.connected {
                Ok(self.centidegrees)
            } else {
                Err(BusError::Disconnected { port })
            }
        }

        fn set_position_centidegrees(
            &mut self,
            port: PortId,
            centidegrees: i64,
        ) -> Result<(), BusError> {
            if self.connected {
                self.centidegrees = centidegrees;
                Ok(())
            } else {
                Err(BusError::Disconnected { port })
            }
        }
    }

    #[test]
    fn centidegree_scaling() {
        let bus = FakeEncoder {
            connected: true,
            centidegrees: 36050,
        };
        let mut sensor = RotationSensor::new(bus, 5);
        assert_eq!(sensor.angle().as_degrees(), 360.5);
    }

    #[test]
    fn reversal_flips_reads_and_writes() {
        let bus = FakeEncoder {
            connected: true,
            centidegrees: 9000,
        };
        let mut sensor = RotationSensor::new(bus, 5);
        sensor.set_reversed(true);
        assert_eq!(sensor.angle().as_degrees(), -90.0);

        sensor.set_angle(Angle::from_degrees(45.0)).unwrap();
        assert_eq!(sensor.bus.centidegrees, -4500);
        assert_eq!(sensor.angle().as_degrees(), 45.0);
    }

    #[test]
    fn disconnect_reports_the_sentinel() {
        let bus = FakeEncoder {
            connected: false,
            centidegrees: 0,
        };
        let mut sensor = RotationSensor::new(bus, 5);
        assert!(!sensor.is_connected());
        assert!(!sensor.angle().is_valid());
        assert!(sensor.set_angle(Angle::ZERO).is_err());
    }

    struct FakeShaftEncoder {
        valid: bool,
        degrees: i32,
    }

    impl AdiBus for FakeShaftEncoder {
        fn count_degrees(&mut self, top: PortId, _bottom: PortId) -> Result<i32, BusError> {
            if self.valid {
                Ok(self.degrees)
            } else {
                Err(BusError::Disconnected { port: top })
            }
        }

        fn reset(&mut self, top: PortId, _bottom: PortId) -> Result<(), BusError> {
            if self.valid {
                self.degrees = 0;
                Ok(())
            } else {
                Err(BusError::Disconnected { port: top })
            }
        }
    }

    #[test]
    fn shaft_encoder_counts_degrees() {
        let bus = FakeShaftEncoder {
            valid: true,
            degrees: 450,
        };
        let mut encoder = AdiEncoder::new(bus, 1, 2);
        assert!(encoder.is_connected());
        assert_eq!(encoder.angle().as_degrees(), 450.0);
    }

    #[test]
    fn shaft_encoder_rezeroes_through_the_software_offset() {
        let bus = FakeShaftEncoder {
            valid: true,
            degrees: 450,
        };
        let mut encoder = AdiEncoder::new(bus, 1, 2);
        encoder.set_angle(Angle::from_degrees(90.0)).unwrap();
        assert_eq!(encoder.angle().as_degrees(), 90.0);

        // further motion is measured from the reset count
        encoder.bus.degrees = 30;
        assert_eq!(encoder.angle().as_degrees(), 120.0);
    }

    #[test]
    fn shaft_encoder_on_invalid_ports_errors() {
        let bus = FakeShaftEncoder {
            valid: false,
            degrees: 0,
        };
        let mut encoder = AdiEncoder::new(bus, 1, 2);
        assert!(!encoder.is_connected());
        assert!(!encoder.angle().is_valid());
        assert!(encoder.set_angle(Angle::ZERO).is_err());
    }
}
