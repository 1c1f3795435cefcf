// In-memory bus for tests: per-port fake motors with scripted failures.

use std::collections::HashMap;

use crate::motor::bus::{BrakeMode, BusError, Cartridge, MotorBus, PortId};
use crate::units::{Angle, AngularVelocity, Current, Temperature};

/// One fake motor. `shaft` is the true physical angle of the motor's own shaft
/// in native units; tests turn it directly. `zero` models the hardware zero
/// set by `set_angle`, so the reported raw angle is `shaft - zero`.
pub struct FakeMotor {
    pub connected: bool,
    pub shaft: Angle,
    pub zero: Angle,
    pub cartridge: Option<Cartridge>,
    pub brake_mode: Option<BrakeMode>,
    pub fail_commands: bool,
    pub fail_angle_reads: bool,
    pub fail_set_angle: bool,
    pub fail_brake_mode: bool,
    pub last_percent: Option<f64>,
    pub last_velocity: Option<AngularVelocity>,
    pub braked: bool,
    pub temperature: Temperature,
    pub current: Current,
}

impl FakeMotor {
    fn new(cartridge: Cartridge) -> Self {
        Self {
            connected: true,
            shaft: Angle::ZERO,
            zero: Angle::ZERO,
            cartridge: Some(cartridge),
            brake_mode: Some(BrakeMode::Coast),
            fail_commands: false,
            fail_angle_reads: false,
            fail_set_angle: false,
            fail_brake_mode: false,
            last_percent: None,
            last_velocity: None,
            braked: false,
            temperature: Temperature::from_celsius(25.0),
            current: Current::from_amps(0.0),
        }
    }
}

#[derive(Default)]
pub struct MockBus {
    motors: HashMap<PortId, FakeMotor>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, port: PortId, cartridge: Cartridge) {
        self.motors.insert(port, FakeMotor::new(cartridge));
    }

    /// Panics on an unknown port; tests only address motors they installed.
    pub fn motor(&mut self, port: PortId) -> &mut FakeMotor {
        self.motors.get_mut(&port).expect("no fake motor on port")
    }

    fn live(&mut self, port: PortId) -> Result<&mut FakeMotor, BusError> {
        match self.motors.get_mut(&port) {
            Some(motor) if motor.connected => Ok(motor),
            _ => Err(BusError::Disconnected { port }),
        }
    }
}

impl MotorBus for MockBus {
    fn is_connected(&mut self, port: PortId) -> bool {
        self.motors.get(&port).is_some_and(|m| m.connected)
    }

    fn move_percent(&mut self, port: PortId, percent: f64) -> Result<(), BusError> {
        let motor = self.live(port)?;
        if motor.fail_commands {
            return Err(BusError::Rejected { port });
        }
        motor.last_percent = Some(percent);
        motor.braked = false;
        Ok(())
    }

    fn move_velocity(&mut self, port: PortId, velocity: AngularVelocity) -> Result<(), BusError> {
        let motor = self.live(port)?;
        if motor.fail_commands {
            return Err(BusError::Rejected { port });
        }
        motor.last_velocity = Some(velocity);
        motor.braked = false;
        Ok(())
    }

    fn brake(&mut self, port: PortId) -> Result<(), BusError> {
        let motor = self.live(port)?;
        if motor.fail_commands {
            return Err(BusError::Rejected { port });
        }
        motor.braked = true;
        Ok(())
    }

    fn set_brake_mode(&mut self, port: PortId, mode: BrakeMode) -> Result<(), BusError> {
        let motor = self.live(port)?;
        if motor.fail_brake_mode {
            return Err(BusError::Rejected { port });
        }
        motor.brake_mode = Some(mode);
        Ok(())
    }

    fn brake_mode(&mut self, port: PortId) -> Option<BrakeMode> {
        match self.motors.get(&port) {
            Some(motor) if motor.connected => motor.brake_mode,
            _ => None,
        }
    }

    fn angle(&mut self, port: PortId) -> Result<Angle, BusError> {
        let motor = self.live(port)?;
        if motor.fail_angle_reads {
            return Err(BusError::Transport {
                port,
                reason: "scripted read failure".into(),
            });
        }
        Ok(motor.shaft - motor.zero)
    }

    fn set_angle(&mut self, port: PortId, angle: Angle) -> Result<(), BusError> {
        let motor = self.live(port)?;
        if motor.fail_set_angle {
            return Err(BusError::Rejected { port });
        }
        motor.zero = motor.shaft - angle;
        Ok(())
    }

    fn cartridge(&mut self, port: PortId) -> Option<Cartridge> {
        match self.motors.get(&port) {
            Some(motor) if motor.connected => motor.cartridge,
            _ => None,
        }
    }

    fn temperature(&mut self, port: PortId) -> Result<Temperature, BusError> {
        let motor = self.live(port)?;
        Ok(motor.temperature)
    }

    fn current(&mut self, port: PortId) -> Result<Current, BusError> {
        let motor = self.live(port)?;
        Ok(motor.current)
    }
}
