// Serial smart-motor bus protocol implementation
//
// Half-duplex bus, one controller and up to 32 motors, Dynamixel-style framing:
// [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
//
// Positions are multi-turn encoder ticks; the tick size depends on the gear
// cartridge reported by the model-number register. Relative zeroing is done
// with the position-offset register, which this driver subtracts on read.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, trace};

use crate::motor::bus::{BrakeMode, BusError, Cartridge, MotorBus, PortId};
use crate::units::{Angle, AngularVelocity, Current, Temperature};

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

const HEADER: [u8; 2] = [0xFF, 0xFF];

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// Register map of the smart motor.
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    /// 2 bytes, read-only. Encodes the gear cartridge.
    ModelNumber = 0x03,
    /// 1 byte: 0 = coast, 1 = brake, 2 = hold.
    BrakeMode = 0x28,
    /// 1 byte, write-only. Stop using the configured brake mode.
    Halt = 0x2B,
    /// 2 bytes signed, -1000..=1000 permille of full power.
    GoalPwm = 0x2C,
    /// 2 bytes sign-magnitude, ticks per second.
    GoalVelocity = 0x2E,
    /// 4 bytes signed, multi-turn tick count since power-up.
    PresentPosition = 0x38,
    /// 4 bytes signed, subtracted from PresentPosition to form the
    /// relative angle.
    PositionOffset = 0x3C,
    /// 1 byte, degrees Celsius.
    PresentTemperature = 0x3F,
    /// 2 bytes, milliamps.
    PresentCurrent = 0x45,
}

/// Model numbers, per the vendor datasheet. The hundreds digit is the
/// cartridge's free speed in tens of rpm.
const MODEL_RED: u16 = 0x5110;
const MODEL_GREEN: u16 = 0x5120;
const MODEL_BLUE: u16 = 0x5160;

#[derive(Debug, thiserror::Error)]
pub enum StsError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("motor {id} returned error status: 0x{status:02X}")]
    MotorError { id: u8, status: u8 },

    #[error("timeout waiting for response from motor {id}")]
    Timeout { id: u8 },
}

impl StsError {
    fn into_bus_error(self, port: PortId) -> BusError {
        match self {
            StsError::Timeout { .. } => BusError::Disconnected { port },
            StsError::MotorError { .. } => BusError::Rejected { port },
            other => BusError::Transport {
                port,
                reason: other.to_string(),
            },
        }
    }
}

type Result<T> = std::result::Result<T, StsError>;

/// The real motor bus, over a serial adapter.
pub struct StsBus {
    port: Box<dyn SerialPort>,
}

impl StsBus {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }

    /// Ones'-complement sum over everything after the header.
    fn checksum(data: &[u8]) -> u8 {
        let sum: u16 = data.iter().map(|&b| b as u16).sum();
        (!sum & 0xFF) as u8
    }

    fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // instruction + checksum
        let mut packet = Vec::with_capacity(6 + params.len());
        packet.extend_from_slice(&HEADER);
        packet.push(id);
        packet.push(length);
        packet.push(instruction as u8);
        packet.extend_from_slice(params);
        packet.push(Self::checksum(&packet[2..]));
        packet
    }

    fn transact(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        let packet = Self::build_packet(id, instruction, params);
        trace!(id, ?instruction, "bus transaction");
        self.port.write_all(&packet)?;
        self.port.flush()?;
        self.read_response(id)
    }

    fn read_response(&mut self, expected_id: u8) -> Result<Vec<u8>> {
        Self::read_frame(&mut self.port, expected_id)
    }

    /// Parse one response frame. Split from the port handle so corrupted
    /// frames can be exercised without hardware.
    fn read_frame<R: Read + ?Sized>(reader: &mut R, expected_id: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        reader.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                StsError::Timeout { id: expected_id }
            } else {
                StsError::Io(e)
            }
        })?;
        if header != HEADER {
            return Err(StsError::InvalidResponse {
                id: expected_id,
                reason: format!("bad header: {:02X?}", header),
            });
        }

        let mut id_length = [0u8; 2];
        reader.read_exact(&mut id_length)?;
        let id = id_length[0];
        let length = id_length[1] as usize;
        if id != expected_id {
            return Err(StsError::InvalidResponse {
                id: expected_id,
                reason: format!("id mismatch: expected {expected_id}, got {id}"),
            });
        }
        // a glitched line can produce any length byte; the frame must at least
        // hold the status and checksum bytes
        if length < 2 {
            return Err(StsError::InvalidResponse {
                id,
                reason: format!("length byte {length} cannot hold status and checksum"),
            });
        }

        // status byte + params + checksum
        let mut remaining = vec![0u8; length];
        reader.read_exact(&mut remaining)?;

        let mut checksum_data = vec![id, length as u8];
        checksum_data.extend_from_slice(&remaining[..remaining.len() - 1]);
        if Self::checksum(&checksum_data) != remaining[remaining.len() - 1] {
            return Err(StsError::ChecksumMismatch { id });
        }

        let status = remaining[0];
        if status != 0 {
            return Err(StsError::MotorError { id, status });
        }
        Ok(remaining[1..remaining.len() - 1].to_vec())
    }

    /// Liveness probe. A timeout means "nothing on that id", not a fault.
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        match self.transact(id, Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(StsError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        debug!(id, ?register, value, "write u8");
        self.transact(id, Instruction::Write, &[register as u8, value])?;
        Ok(())
    }

    pub fn write_i16(&mut self, id: u8, register: Register, value: i16) -> Result<()> {
        let raw = encode_sign_magnitude(value);
        debug!(id, ?register, value, "write i16");
        let params = [register as u8, (raw & 0xFF) as u8, (raw >> 8) as u8];
        self.transact(id, Instruction::Write, &params)?;
        Ok(())
    }

    pub fn write_i32(&mut self, id: u8, register: Register, value: i32) -> Result<()> {
        debug!(id, ?register, value, "write i32");
        let bytes = value.to_le_bytes();
        let params = [register as u8, bytes[0], bytes[1], bytes[2], bytes[3]];
        self.transact(id, Instruction::Write, &params)?;
        Ok(())
    }

    pub fn read_u8(&mut self, id: u8, register: Register) -> Result<u8> {
        let response = self.transact(id, Instruction::Read, &[register as u8, 1])?;
        response.first().copied().ok_or(StsError::InvalidResponse {
            id,
            reason: "empty response".to_string(),
        })
    }

    pub fn read_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let response = self.transact(id, Instruction::Read, &[register as u8, 2])?;
        if response.len() < 2 {
            return Err(StsError::InvalidResponse {
                id,
                reason: format!("expected 2 bytes, got {}", response.len()),
            });
        }
        Ok(u16::from_le_bytes([response[0], response[1]]))
    }

    pub fn read_i32(&mut self, id: u8, register: Register) -> Result<i32> {
        let response = self.transact(id, Instruction::Read, &[register as u8, 4])?;
        if response.len() < 4 {
            return Err(StsError::InvalidResponse {
                id,
                reason: format!("expected 4 bytes, got {}", response.len()),
            });
        }
        Ok(i32::from_le_bytes([
            response[0],
            response[1],
            response[2],
            response[3],
        ]))
    }

    fn read_cartridge(&mut self, id: u8) -> Result<Option<Cartridge>> {
        let model = self.read_u16(id, Register::ModelNumber)?;
        Ok(cartridge_from_model(model))
    }

    /// Relative position in ticks: present position minus the offset register.
    fn relative_ticks(&mut self, id: u8) -> Result<i32> {
        let present = self.read_i32(id, Register::PresentPosition)?;
        let offset = self.read_i32(id, Register::PositionOffset)?;
        Ok(present.wrapping_sub(offset))
    }
}

impl MotorBus for StsBus {
    fn is_connected(&mut self, port: PortId) -> bool {
        self.ping(port).unwrap_or(false)
    }

    fn move_percent(&mut self, port: PortId, percent: f64) -> std::result::Result<(), BusError> {
        let permille = (percent.clamp(-1.0, 1.0) * 1000.0).round() as i16;
        self.write_i16(port, Register::GoalPwm, permille)
            .map_err(|e| e.into_bus_error(port))
    }

    fn move_velocity(
        &mut self,
        port: PortId,
        velocity: AngularVelocity,
    ) -> std::result::Result<(), BusError> {
        let cartridge = self
            .read_cartridge(port)
            .map_err(|e| e.into_bus_error(port))?
            .ok_or(BusError::Rejected { port })?;
        let ticks_per_second = velocity.as_rpm() / 60.0 * cartridge.ticks_per_revolution();
        let raw = ticks_per_second
            .round()
            .clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        self.write_i16(port, Register::GoalVelocity, raw)
            .map_err(|e| e.into_bus_error(port))
    }

    fn brake(&mut self, port: PortId) -> std::result::Result<(), BusError> {
        self.write_u8(port, Register::Halt, 1)
            .map_err(|e| e.into_bus_error(port))
    }

    fn set_brake_mode(&mut self, port: PortId, mode: BrakeMode) -> std::result::Result<(), BusError> {
        self.write_u8(port, Register::BrakeMode, brake_mode_to_raw(mode))
            .map_err(|e| e.into_bus_error(port))
    }

    fn brake_mode(&mut self, port: PortId) -> Option<BrakeMode> {
        let raw = self.read_u8(port, Register::BrakeMode).ok()?;
        brake_mode_from_raw(raw)
    }

    fn angle(&mut self, port: PortId) -> std::result::Result<Angle, BusError> {
        let cartridge = self
            .read_cartridge(port)
            .map_err(|e| e.into_bus_error(port))?
            .ok_or(BusError::Rejected { port })?;
        let ticks = self
            .relative_ticks(port)
            .map_err(|e| e.into_bus_error(port))?;
        Ok(ticks_to_angle(ticks, cartridge))
    }

    fn set_angle(&mut self, port: PortId, angle: Angle) -> std::result::Result<(), BusError> {
        let cartridge = self
            .read_cartridge(port)
            .map_err(|e| e.into_bus_error(port))?
            .ok_or(BusError::Rejected { port })?;
        let present = self
            .read_i32(port, Register::PresentPosition)
            .map_err(|e| e.into_bus_error(port))?;
        let offset = present.wrapping_sub(angle_to_ticks(angle, cartridge));
        self.write_i32(port, Register::PositionOffset, offset)
            .map_err(|e| e.into_bus_error(port))
    }

    fn cartridge(&mut self, port: PortId) -> Option<Cartridge> {
        self.read_cartridge(port).ok().flatten()
    }

    fn temperature(&mut self, port: PortId) -> std::result::Result<Temperature, BusError> {
        let raw = self
            .read_u8(port, Register::PresentTemperature)
            .map_err(|e| e.into_bus_error(port))?;
        Ok(Temperature::from_celsius(raw as f64))
    }

    fn current(&mut self, port: PortId) -> std::result::Result<Current, BusError> {
        let raw = self
            .read_u16(port, Register::PresentCurrent)
            .map_err(|e| e.into_bus_error(port))?;
        Ok(Current::from_milliamps(raw as f64))
    }
}

fn brake_mode_to_raw(mode: BrakeMode) -> u8 {
    match mode {
        BrakeMode::Coast => 0,
        BrakeMode::Brake => 1,
        BrakeMode::Hold => 2,
    }
}

fn brake_mode_from_raw(raw: u8) -> Option<BrakeMode> {
    match raw {
        0 => Some(BrakeMode::Coast),
        1 => Some(BrakeMode::Brake),
        2 => Some(BrakeMode::Hold),
        _ => None,
    }
}

fn cartridge_from_model(model: u16) -> Option<Cartridge> {
    match model {
        MODEL_RED => Some(Cartridge::Red),
        MODEL_GREEN => Some(Cartridge::Green),
        MODEL_BLUE => Some(Cartridge::Blue),
        _ => None,
    }
}

fn ticks_to_angle(ticks: i32, cartridge: Cartridge) -> Angle {
    Angle::from_revolutions(ticks as f64 / cartridge.ticks_per_revolution())
}

fn angle_to_ticks(angle: Angle, cartridge: Cartridge) -> i32 {
    (angle.as_revolutions() * cartridge.ticks_per_revolution()).round() as i32
}

/// Sign-magnitude: bit 15 is the direction, bits 0-14 the magnitude.
fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | value.unsigned_abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_ones_complement_of_the_sum() {
        let data = [1u8, 4, 0x03, 30, 0, 2];
        assert_eq!(StsBus::checksum(&data), 215);
    }

    #[test]
    fn packet_framing() {
        let packet = StsBus::build_packet(1, Instruction::Ping, &[]);
        assert_eq!(packet.len(), 6);
        assert_eq!(&packet[..2], &HEADER);
        assert_eq!(packet[2], 1); // id
        assert_eq!(packet[3], 2); // instruction + checksum
        assert_eq!(packet[4], 0x01); // ping
        assert_eq!(packet[5], StsBus::checksum(&packet[2..5]));
    }

    #[test]
    fn status_only_frame_parses_to_empty_params() {
        let frame = [0xFF, 0xFF, 0x01, 0x02, 0x00, 0xFC];
        let params = StsBus::read_frame(&mut &frame[..], 1).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn undersized_length_byte_is_rejected_not_fatal() {
        // length 0 and 1 cannot hold the status and checksum bytes
        for frame in [[0xFF, 0xFF, 0x01, 0x00], [0xFF, 0xFF, 0x01, 0x01]] {
            let err = StsBus::read_frame(&mut &frame[..], 1).unwrap_err();
            assert!(matches!(err, StsError::InvalidResponse { id: 1, .. }));
        }
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let frame = [0xFF, 0xFF, 0x01, 0x02, 0x00, 0x00];
        let err = StsBus::read_frame(&mut &frame[..], 1).unwrap_err();
        assert!(matches!(err, StsError::ChecksumMismatch { id: 1 }));
    }

    #[test]
    fn sign_magnitude_encoding() {
        assert_eq!(encode_sign_magnitude(0), 0);
        assert_eq!(encode_sign_magnitude(100), 100);
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(encode_sign_magnitude(-1), 0x8001);
    }

    #[test]
    fn model_number_to_cartridge() {
        assert_eq!(cartridge_from_model(MODEL_GREEN), Some(Cartridge::Green));
        assert_eq!(cartridge_from_model(MODEL_BLUE), Some(Cartridge::Blue));
        assert_eq!(cartridge_from_model(0x0000), None);
    }

    #[test]
    fn tick_angle_round_trip_respects_gearing() {
        // one output revolution of a green motor is 900 ticks
        let angle = ticks_to_angle(900, Cartridge::Green);
        assert_eq!(angle.as_degrees(), 360.0);
        assert_eq!(angle_to_ticks(angle, Cartridge::Green), 900);
        // the same 900 ticks on a blue motor is three output revolutions
        assert_eq!(ticks_to_angle(900, Cartridge::Blue).as_revolutions(), 3.0);
    }
}
