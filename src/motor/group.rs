// Fault-tolerant motor group
//
// A group of individually fallible motors acting as one logical actuator and
// encoder. As long as one member works the group keeps working: failed members
// are excluded per poll and folded back in automatically once they respond
// again, without disturbing the angle the group reports.
//
// Every public operation performs its own fresh poll of the bus. There is no
// background task and no cached liveness state beyond the per-member
// `connected_last_poll` flag, which only exists to detect reconnect edges.

use tracing::{debug, warn};

use crate::motor::bus::{BrakeMode, Cartridge, MotorBus, PortId, PortSpec};
use crate::units::{Angle, AngularVelocity, Current, Temperature};

/// Errors surfaced by group operations.
///
/// A single member failing while others survive is never an error here; it is
/// compensated for by exclusion. Errors mean the whole group could not act, or
/// a structural precondition was violated.
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("port {port} is already a member of the group")]
    AlreadyMember { port: PortId },

    #[error("motor on port {port} could not be configured")]
    NotConfigurable { port: PortId },

    #[error("no member of the group accepted the command")]
    AllMembersFailed,
}

/// Bookkeeping for one registered motor.
#[derive(Debug, Clone, Copy)]
struct MemberRecord {
    spec: PortSpec,
    /// Whether the motor responded on the previous poll. A false -> true edge
    /// means the motor must be re-synchronized before it is used again.
    connected_last_poll: bool,
    /// Additive correction in group units:
    /// virtual angle = scaled raw angle + offset.
    offset: Angle,
}

/// A member that passed liveness and configuration checks for the current poll.
#[derive(Debug, Clone, Copy)]
struct ActiveMember {
    spec: PortSpec,
    offset: Angle,
}

pub struct MotorGroup<B: MotorBus> {
    bus: B,
    members: Vec<MemberRecord>,
    /// Theoretical max output velocity of the mechanism after external gearing.
    /// Used to convert between each member's native units and group units.
    output_velocity: AngularVelocity,
    /// Last commanded brake mode. Authoritative: members are corrected toward
    /// it on every poll, never the other way around.
    brake_mode: BrakeMode,
}

impl<B: MotorBus> MotorGroup<B> {
    pub fn new(bus: B, output_velocity: AngularVelocity) -> Self {
        Self {
            bus,
            members: Vec::new(),
            output_velocity,
            brake_mode: BrakeMode::Coast,
        }
    }

    /// Create a group and register the given motors. Motors that cannot be
    /// configured yet are still registered and picked up once they respond.
    pub fn with_members<I, S>(bus: B, specs: I, output_velocity: AngularVelocity) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PortSpec>,
    {
        let mut group = Self::new(bus, output_velocity);
        for spec in specs {
            let spec = spec.into();
            if let Err(e) = group.add_motor(spec) {
                warn!(port = spec.port, error = %e, "motor not configured at construction");
            }
        }
        group
    }

    pub fn output_velocity(&self) -> AngularVelocity {
        self.output_velocity
    }

    /// Number of registered ports, reachable or not. Compare [`Self::size`].
    pub fn registered(&self) -> usize {
        self.members.len()
    }

    /// Register a motor. Duplicate detection is on the port number alone,
    /// direction does not matter: one connector cannot host two logical motors.
    ///
    /// The add is optimistic: if the motor cannot be configured right now the
    /// record is kept with an invalid offset so the motor joins automatically
    /// once it becomes reachable, and the call reports `NotConfigurable`.
    pub fn add_motor(&mut self, spec: impl Into<PortSpec>) -> Result<(), GroupError> {
        let spec = spec.into();
        if self.members.iter().any(|m| m.spec.port == spec.port) {
            return Err(GroupError::AlreadyMember { port: spec.port });
        }
        let offset = self.configure_member(spec);
        let configured = offset.is_valid();
        self.members.push(MemberRecord {
            spec,
            connected_last_poll: configured,
            offset,
        });
        if configured {
            Ok(())
        } else {
            debug!(port = spec.port, "added unconfigured, will retry on next poll");
            Err(GroupError::NotConfigurable { port: spec.port })
        }
    }

    /// Remove a motor by port number. Removing a non-member is a no-op.
    pub fn remove_motor(&mut self, port: PortId) {
        self.members.retain(|m| m.spec.port != port);
    }

    /// Flip the logical direction of a member. Modeled as remove + re-add so
    /// the offset is recomputed and the group's reported angle stays put.
    pub fn set_reversed(&mut self, port: PortId, reversed: bool) -> Result<(), GroupError> {
        let Some(member) = self.members.iter().find(|m| m.spec.port == port) else {
            return Ok(());
        };
        if member.spec.is_reversed() == reversed {
            return Ok(());
        }
        self.remove_motor(port);
        let spec = if reversed {
            PortSpec::reversed(port)
        } else {
            PortSpec::forward(port)
        };
        self.add_motor(spec)
    }

    /// Drive all members at a fraction of full power, -1.0..=1.0.
    /// Succeeds if at least one member accepts the command.
    pub fn move_percent(&mut self, percent: f64) -> Result<(), GroupError> {
        let members = self.resolve_active();
        let mut success = false;
        for m in &members {
            match self.bus.move_percent(m.spec.port, percent * m.spec.direction.sign()) {
                Ok(()) => success = true,
                Err(e) => debug!(port = m.spec.port, error = %e, "member rejected drive command"),
            }
        }
        if success { Ok(()) } else { Err(GroupError::AllMembersFailed) }
    }

    /// Drive all members at a target group-output velocity. Each member's
    /// command is scaled by its own gearing so mixed cartridges stay in sync.
    pub fn move_velocity(&mut self, velocity: AngularVelocity) -> Result<(), GroupError> {
        let members = self.resolve_active();
        let mut success = false;
        for m in &members {
            let Some(cartridge) = self.bus.cartridge(m.spec.port) else {
                continue;
            };
            let ratio = cartridge.max_velocity() / self.output_velocity;
            let command = velocity * (ratio * m.spec.direction.sign());
            match self.bus.move_velocity(m.spec.port, command) {
                Ok(()) => success = true,
                Err(e) => debug!(port = m.spec.port, error = %e, "member rejected velocity command"),
            }
        }
        if success { Ok(()) } else { Err(GroupError::AllMembersFailed) }
    }

    /// Stop all members using the configured brake mode.
    pub fn brake(&mut self) -> Result<(), GroupError> {
        let members = self.resolve_active();
        let mut success = false;
        for m in &members {
            match self.bus.brake(m.spec.port) {
                Ok(()) => success = true,
                Err(e) => debug!(port = m.spec.port, error = %e, "member failed to brake"),
            }
        }
        if success { Ok(()) } else { Err(GroupError::AllMembersFailed) }
    }

    /// Set the brake mode of the group.
    ///
    /// The intent is remembered unconditionally, even when every member is
    /// unreachable: the poll pass corrects members toward it as they come
    /// back. The call itself fails only if no member is live right now.
    pub fn set_brake_mode(&mut self, mode: BrakeMode) -> Result<(), GroupError> {
        self.brake_mode = mode;
        // the poll applies the new mode to every live member
        let members = self.resolve_active();
        if members.is_empty() {
            Err(GroupError::AllMembersFailed)
        } else {
            Ok(())
        }
    }

    /// The group's brake mode intent. Individual members may transiently
    /// disagree while they are being reconfigured; the intent is what counts.
    pub fn brake_mode(&self) -> BrakeMode {
        self.brake_mode
    }

    /// Whether at least one member is live and configured.
    pub fn is_connected(&mut self) -> bool {
        !self.resolve_active().is_empty()
    }

    /// Number of live, correctly configured members. Distinct from the number
    /// of registered ports.
    pub fn size(&mut self) -> usize {
        self.resolve_active().len()
    }

    /// The average virtual angle of the group.
    ///
    /// Members whose angle or cartridge cannot be read are excluded and the
    /// mean is renormalized over the survivors: one bad sensor must not zero
    /// out the whole group's reading. Returns [`Angle::INVALID`] only when
    /// every member fails.
    pub fn angle(&mut self) -> Angle {
        let members = self.resolve_active();
        let mut sum = Angle::ZERO;
        let mut errors = 0usize;
        for m in &members {
            let Some(cartridge) = self.bus.cartridge(m.spec.port) else {
                errors += 1;
                continue;
            };
            let raw = match self.bus.angle(m.spec.port) {
                Ok(raw) if raw.is_valid() => raw,
                _ => {
                    errors += 1;
                    continue;
                }
            };
            sum += self.to_group_units(raw, m.spec, cartridge) + m.offset;
        }
        if errors == members.len() {
            return Angle::INVALID;
        }
        sum / (members.len() - errors) as f64
    }

    /// Set the relative angle the group reports. Succeeds if at least one
    /// member accepts its new zero.
    pub fn set_angle(&mut self, angle: Angle) -> Result<(), GroupError> {
        let members = self.resolve_active();
        let mut success = false;
        for m in &members {
            let Some(cartridge) = self.bus.cartridge(m.spec.port) else {
                continue;
            };
            let native = self.to_native_units(angle, m.spec, cartridge);
            if let Err(e) = self.bus.set_angle(m.spec.port, native) {
                debug!(port = m.spec.port, error = %e, "member rejected new zero");
                continue;
            }
            // the hardware zero now lands on the target; the stored offset only
            // carries the read-back residual
            let offset = match self.bus.angle(m.spec.port) {
                Ok(raw) if raw.is_valid() => {
                    angle - self.to_group_units(raw, m.spec, cartridge)
                }
                _ => Angle::ZERO,
            };
            if let Some(record) = self.members.iter_mut().find(|r| r.spec.port == m.spec.port) {
                record.offset = offset;
            }
            success = true;
        }
        if success { Ok(()) } else { Err(GroupError::AllMembersFailed) }
    }

    /// Winding temperatures of the live members, skipping failed reads.
    pub fn temperatures(&mut self) -> Vec<Temperature> {
        let members = self.resolve_active();
        members
            .iter()
            .filter_map(|m| self.bus.temperature(m.spec.port).ok())
            .collect()
    }

    /// Current draw of the live members, skipping failed reads.
    pub fn currents(&mut self) -> Vec<Current> {
        let members = self.resolve_active();
        members
            .iter()
            .filter_map(|m| self.bus.current(m.spec.port).ok())
            .collect()
    }

    /// One poll over the registry: probe liveness, re-synchronize members that
    /// just came back, and correct brake modes toward the group intent.
    /// Returns the members eligible for aggregation and dispatch this poll.
    fn resolve_active(&mut self) -> Vec<ActiveMember> {
        let mut active = Vec::with_capacity(self.members.len());
        for i in 0..self.members.len() {
            let spec = self.members[i].spec;
            if !self.bus.is_connected(spec.port) {
                self.members[i].connected_last_poll = false;
                continue;
            }
            if !self.members[i].connected_last_poll {
                // reconnect edge: re-seat the motor at the group's angle before
                // letting it contribute again
                let offset = self.configure_member(spec);
                if !offset.is_valid() {
                    debug!(port = spec.port, "reconfiguration failed, excluded this poll");
                    continue;
                }
                debug!(port = spec.port, "member reconfigured after reconnect");
                self.members[i].offset = offset;
            } else {
                // correct drift from the group's brake mode intent
                let needs_correction = self.bus.brake_mode(spec.port) != Some(self.brake_mode);
                if needs_correction
                    && let Err(e) = self.bus.set_brake_mode(spec.port, self.brake_mode)
                {
                    warn!(port = spec.port, error = %e, "brake mode correction failed, excluded");
                    continue;
                }
            }
            self.members[i].connected_last_poll = true;
            active.push(ActiveMember {
                spec,
                offset: self.members[i].offset,
            });
        }
        active
    }

    /// Compute the offset a (re)joining motor needs so the group's reported
    /// angle is continuous, and seat the motor's hardware zero accordingly.
    ///
    /// Strictly bottom-layer: operates on the stored records and the bus only,
    /// never on the public aggregation path, so simultaneous reconnects cannot
    /// cascade into recursive reconfiguration.
    fn configure_member(&mut self, spec: PortSpec) -> Angle {
        let mut success = true;

        // inherit the group's brake mode intent; a failure here is recorded but
        // must not abort the rest of the configuration
        if self.bus.set_brake_mode(spec.port, self.brake_mode).is_err() {
            success = false;
        }

        // snapshot the other members with usable offsets
        let others: Vec<(PortSpec, Angle)> = self
            .members
            .iter()
            .filter(|m| m.spec.port != spec.port && m.offset.is_valid())
            .map(|m| (m.spec, m.offset))
            .collect();

        // target = mean virtual angle of the other live members; a lone or
        // first member defines its own zero
        let mut sum = Angle::ZERO;
        let mut count = 0usize;
        for (other, offset) in others {
            if !self.bus.is_connected(other.port) {
                continue;
            }
            let Some(cartridge) = self.bus.cartridge(other.port) else {
                continue;
            };
            let Ok(raw) = self.bus.angle(other.port) else {
                continue;
            };
            if !raw.is_valid() {
                continue;
            }
            sum += self.to_group_units(raw, other, cartridge) + offset;
            count += 1;
        }
        let target = if count > 0 { sum / count as f64 } else { Angle::ZERO };
        if !target.is_valid() {
            return Angle::INVALID;
        }

        let Some(cartridge) = self.bus.cartridge(spec.port) else {
            return Angle::INVALID;
        };
        if self
            .bus
            .set_angle(spec.port, self.to_native_units(target, spec, cartridge))
            .is_err()
        {
            return Angle::INVALID;
        }
        // read back: the residual between the target and what the hardware
        // actually reports becomes the stored offset
        let offset = match self.bus.angle(spec.port) {
            Ok(raw) if raw.is_valid() => target - self.to_group_units(raw, spec, cartridge),
            _ => return Angle::INVALID,
        };
        if success && offset.is_valid() {
            offset
        } else {
            Angle::INVALID
        }
    }

    /// Raw member angle -> group output units, applying gearing and direction.
    fn to_group_units(&self, raw: Angle, spec: PortSpec, cartridge: Cartridge) -> Angle {
        let ratio = self.output_velocity / cartridge.max_velocity();
        raw * (ratio * spec.direction.sign())
    }

    /// Group output units -> the member's native units.
    fn to_native_units(&self, angle: Angle, spec: PortSpec, cartridge: Cartridge) -> Angle {
        let ratio = cartridge.max_velocity() / self.output_velocity;
        angle * (ratio * spec.direction.sign())
    }

    #[cfg(test)]
    pub(crate) fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}
