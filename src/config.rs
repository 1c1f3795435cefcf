// Loop timing and bus defaults
use std::time::Duration;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Serial port for the motor bus
pub const BUS_PORT: &str = "/dev/ttyUSB0";
