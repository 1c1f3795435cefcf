// Telemetry and command types emitted/consumed by the runtime loop

use serde::{Deserialize, Serialize};

use crate::motor::{BrakeMode, MotorBus, MotorGroup};

/// Command for a motor group, from teleop or scripts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupCommand {
    /// Fraction of full power, -1.0..=1.0.
    Percent(f64),
    /// Group output velocity in rpm.
    VelocityRpm(f64),
    Brake,
}

/// Health of a motor group, derived from live vs registered members.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every registered member is live.
    Ok,
    /// Some members are down but the group still acts.
    Degraded,
    /// No member responds.
    Offline,
}

/// One snapshot of a motor group's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTelemetry {
    /// `None` when every member failed to report.
    pub angle_degrees: Option<f64>,
    pub live_members: usize,
    pub registered_members: usize,
    pub brake_mode: BrakeMode,
    pub temperatures_celsius: Vec<f64>,
    pub currents_amps: Vec<f64>,
    pub health: HealthStatus,
}

impl GroupTelemetry {
    pub fn capture<B: MotorBus>(group: &mut MotorGroup<B>) -> Self {
        let angle = group.angle();
        let live = group.size();
        let registered = group.registered();
        let health = if live == 0 {
            HealthStatus::Offline
        } else if live < registered {
            HealthStatus::Degraded
        } else {
            HealthStatus::Ok
        };
        Self {
            angle_degrees: angle.is_valid().then(|| angle.as_degrees()),
            live_members: live,
            registered_members: registered,
            brake_mode: group.brake_mode(),
            temperatures_celsius: group
                .temperatures()
                .iter()
                .map(|t| t.as_celsius())
                .collect(),
            currents_amps: group.currents().iter().map(|c| c.as_amps()).collect(),
            health,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::{Cartridge, mock::MockBus};
    use crate::units::AngularVelocity;

    #[test]
    fn health_follows_live_member_count() {
        let mut bus = MockBus::new();
        bus.install(1, Cartridge::Green);
        bus.install(2, Cartridge::Green);
        let mut group =
            MotorGroup::with_members(bus, [1i16, 2], AngularVelocity::from_rpm(200.0));

        assert_eq!(GroupTelemetry::capture(&mut group).health, HealthStatus::Ok);

        group.bus_mut().motor(2).connected = false;
        let snapshot = GroupTelemetry::capture(&mut group);
        assert_eq!(snapshot.health, HealthStatus::Degraded);
        assert_eq!(snapshot.live_members, 1);
        assert_eq!(snapshot.registered_members, 2);

        group.bus_mut().motor(1).connected = false;
        let snapshot = GroupTelemetry::capture(&mut group);
        assert_eq!(snapshot.health, HealthStatus::Offline);
        assert!(snapshot.angle_degrees.is_none());
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let mut bus = MockBus::new();
        bus.install(1, Cartridge::Green);
        let mut group = MotorGroup::with_members(bus, [1i16], AngularVelocity::from_rpm(200.0));
        let json = serde_json::to_string(&GroupTelemetry::capture(&mut group)).unwrap();
        assert!(json.contains("\"health\":\"ok\""));
        assert!(json.contains("\"brake_mode\":\"coast\""));
    }
}
