// Poll loop with watchdog
//
// Drives a motor group at a fixed rate from the latest received command. If
// commands stop arriving (teleop crashed, script hung) the watchdog brakes the
// group instead of letting the last command run forever. A group that never
// saw a command is left alone.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{CMD_TIMEOUT, LOOP_HZ};
use crate::motor::{MotorBus, MotorGroup};
use crate::telemetry::{GroupCommand, GroupTelemetry};
use crate::units::AngularVelocity;

pub struct Runtime {
    latest_cmd: Option<GroupCommand>,
    cmd_received_at: Instant,
    cmd_timeout: Duration,
    stale: bool,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_timeout(CMD_TIMEOUT)
    }

    pub fn with_timeout(cmd_timeout: Duration) -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            cmd_timeout,
            stale: false,
        }
    }

    pub fn on_command(&mut self, cmd: GroupCommand) {
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
        self.stale = false;
    }

    /// One tick: dispatch the latest command, or brake if it has gone stale.
    /// Group-level failures are logged, not propagated; the next tick retries.
    pub fn apply<B: MotorBus>(&mut self, group: &mut MotorGroup<B>) {
        let Some(cmd) = self.latest_cmd else {
            return;
        };
        let cmd_age = self.cmd_received_at.elapsed();
        if cmd_age > self.cmd_timeout {
            if !self.stale {
                warn!(?cmd_age, "command stale, braking group");
                self.stale = true;
            }
            if let Err(e) = group.brake() {
                warn!(error = %e, "watchdog brake failed");
            }
            return;
        }
        let result = match cmd {
            GroupCommand::Percent(percent) => group.move_percent(percent),
            GroupCommand::VelocityRpm(rpm) => {
                group.move_velocity(AngularVelocity::from_rpm(rpm))
            }
            GroupCommand::Brake => group.brake(),
        };
        if let Err(e) = result {
            warn!(error = %e, "group rejected command");
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-rate loop: drain commands, apply with watchdog, emit one telemetry
/// JSON line per tick. Returns once the command channel closes.
pub async fn run<B: MotorBus>(
    mut group: MotorGroup<B>,
    mut commands: mpsc::Receiver<GroupCommand>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut runtime = Runtime::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );

    loop {
        tick.tick().await;

        let mut closed = false;
        loop {
            match commands.try_recv() {
                Ok(cmd) => runtime.on_command(cmd),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }
        if closed {
            // leave the group stopped on the way out
            let _ = group.brake();
            info!("command channel closed, runtime exiting");
            return Ok(());
        }

        runtime.apply(&mut group);

        let telemetry = GroupTelemetry::capture(&mut group);
        println!("{}", serde_json::to_string(&telemetry)?);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{Cartridge, mock::MockBus};

    fn group() -> MotorGroup<MockBus> {
        let mut bus = MockBus::new();
        bus.install(1, Cartridge::Green);
        MotorGroup::with_members(bus, [1i16], AngularVelocity::from_rpm(200.0))
    }

    #[test]
    fn fresh_command_is_dispatched() {
        let mut group = group();
        let mut runtime = Runtime::new();
        runtime.on_command(GroupCommand::Percent(0.5));
        runtime.apply(&mut group);
        assert_eq!(group.bus_mut().motor(1).last_percent, Some(0.5));
        assert!(!group.bus_mut().motor(1).braked);
    }

    #[test]
    fn stale_command_brakes_the_group() {
        let mut group = group();
        let mut runtime = Runtime::with_timeout(Duration::ZERO);
        runtime.on_command(GroupCommand::Percent(0.5));
        std::thread::sleep(Duration::from_millis(1));
        runtime.apply(&mut group);
        assert!(group.bus_mut().motor(1).braked);
    }

    #[test]
    fn idle_runtime_leaves_the_group_alone() {
        let mut group = group();
        let mut runtime = Runtime::with_timeout(Duration::ZERO);
        runtime.apply(&mut group);
        assert_eq!(group.bus_mut().motor(1).last_percent, None);
        assert!(!group.bus_mut().motor(1).braked);
    }
}
