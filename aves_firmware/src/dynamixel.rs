//! The Dynamixel back end.
//!
//! Smart servos on a shared bus, addressed `D<id>` on the wire with
//! 0–4095 positions in place of pulse widths. The bus protocol driver
//! is out of this core's hands; what lives here is the same contract
//! the PWM slots honor: configure before move, reject out-of-bounds,
//! drop torque on emergency stop.

use aves_common::consts::{DYNAMIXEL_MAP_SIZE, DYNAMIXEL_MAX_POSITION};
use aves_common::error::ControllerError;
use parking_lot::Mutex;
use tracing::{info, warn};

/// The bus driver seam.
pub trait DynamixelBus: Send + Sync {
    fn write_goal_position(&self, id: u8, position: u16);
    fn write_profile_velocity(&self, id: u8, velocity: u32);
    fn set_torque(&self, id: u8, enabled: bool);
}

/// One configured bus servo.
#[derive(Debug, Clone, Copy)]
struct DynamixelSlot {
    id: u8,
    min_position: u16,
    max_position: u16,
    velocity: u32,
    current_position: u16,
}

/// Configured Dynamixel servos, capacity-bounded like everything else
/// on this side of the wire.
pub struct DynamixelMap<B: DynamixelBus> {
    slots: Mutex<heapless::Vec<DynamixelSlot, DYNAMIXEL_MAP_SIZE>>,
    bus: B,
}

impl<B: DynamixelBus> DynamixelMap<B> {
    pub fn new(bus: B) -> Self {
        Self {
            slots: Mutex::new(heapless::Vec::new()),
            bus,
        }
    }

    /// Apply a `DYNAMIXEL` config record: bounds, profile velocity,
    /// torque on.
    pub fn configure(
        &self,
        id: u8,
        min_position: u16,
        max_position: u16,
        velocity: u32,
    ) -> Result<(), ControllerError> {
        if min_position >= max_position || max_position > DYNAMIXEL_MAX_POSITION {
            return Err(ControllerError::InvalidData(format!(
                "dynamixel {id}: bad position bounds {min_position}..{max_position}"
            )));
        }

        let mut slots = self.slots.lock();
        if let Some(slot) = slots.iter_mut().find(|s| s.id == id) {
            slot.min_position = min_position;
            slot.max_position = max_position;
            slot.velocity = velocity;
        } else {
            slots
                .push(DynamixelSlot {
                    id,
                    min_position,
                    max_position,
                    velocity,
                    current_position: min_position,
                })
                .map_err(|_| {
                    ControllerError::InvalidData(format!(
                        "dynamixel map full ({DYNAMIXEL_MAP_SIZE} slots)"
                    ))
                })?;
        }
        drop(slots);

        self.bus.write_profile_velocity(id, velocity);
        self.bus.set_torque(id, true);
        info!("dynamixel {id} configured: {min_position}..{max_position} at velocity {velocity}");
        Ok(())
    }

    /// Request a goal position.
    pub fn request_position(&self, id: u8, position: u16) -> Result<(), ControllerError> {
        let mut slots = self.slots.lock();
        let slot = slots.iter_mut().find(|s| s.id == id).ok_or_else(|| {
            warn!("dropping position for unconfigured dynamixel {id}");
            ControllerError::InvalidData(format!("dynamixel {id} is not configured"))
        })?;
        if position < slot.min_position || position > slot.max_position {
            warn!(
                "invalid position for dynamixel {id}: {position} (valid is {} - {})",
                slot.min_position, slot.max_position
            );
            return Err(ControllerError::InvalidData(format!(
                "position {position} outside {}..{}",
                slot.min_position, slot.max_position
            )));
        }
        slot.current_position = position;
        drop(slots);

        self.bus.write_goal_position(id, position);
        Ok(())
    }

    /// Drop torque on every configured servo. Emergency-stop path.
    pub fn torque_off_all(&self) {
        for slot in self.slots.lock().iter() {
            self.bus.set_torque(slot.id, false);
        }
    }

    pub fn configured_count(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn current_position(&self, id: u8) -> Option<u16> {
        self.slots
            .lock()
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.current_position)
    }
}

// ─── Simulation bus ─────────────────────────────────────────────────

/// Records bus writes for the host build and the tests.
#[derive(Debug, Default)]
pub struct SimBus {
    state: Mutex<SimBusState>,
}

#[derive(Debug, Default, Clone)]
pub struct SimBusState {
    pub goal_positions: Vec<(u8, u16)>,
    pub torque: Vec<(u8, bool)>,
    pub velocities: Vec<(u8, u32)>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SimBusState {
        self.state.lock().clone()
    }

    /// Latest torque setting for an id, if any was ever written.
    pub fn torque_of(&self, id: u8) -> Option<bool> {
        self.state
            .lock()
            .torque
            .iter()
            .rev()
            .find(|(i, _)| *i == id)
            .map(|(_, on)| *on)
    }
}

impl DynamixelBus for SimBus {
    fn write_goal_position(&self, id: u8, position: u16) {
        self.state.lock().goal_positions.push((id, position));
    }

    fn write_profile_velocity(&self, id: u8, velocity: u32) {
        self.state.lock().velocities.push((id, velocity));
    }

    fn set_torque(&self, id: u8, enabled: bool) {
        self.state.lock().torque.push((id, enabled));
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_enables_torque_and_velocity() {
        let map = DynamixelMap::new(SimBus::new());
        map.configure(3, 100, 4000, 120).unwrap();
        assert_eq!(map.bus.torque_of(3), Some(true));
        let snap = map.bus.snapshot();
        assert_eq!(snap.velocities, vec![(3, 120)]);
    }

    #[test]
    fn unconfigured_id_rejects_positions() {
        let map = DynamixelMap::new(SimBus::new());
        assert!(map.request_position(5, 2000).is_err());
        assert!(map.bus.snapshot().goal_positions.is_empty());
    }

    #[test]
    fn positions_clamp_to_configured_bounds() {
        let map = DynamixelMap::new(SimBus::new());
        map.configure(1, 500, 3500, 100).unwrap();
        assert!(map.request_position(1, 499).is_err());
        assert!(map.request_position(1, 3501).is_err());
        map.request_position(1, 2048).unwrap();
        assert_eq!(map.bus.snapshot().goal_positions, vec![(1, 2048)]);
        assert_eq!(map.current_position(1), Some(2048));
    }

    #[test]
    fn bounds_above_twelve_bits_are_rejected() {
        let map = DynamixelMap::new(SimBus::new());
        assert!(map.configure(1, 0, 5000, 100).is_err());
    }

    #[test]
    fn torque_off_all_covers_every_slot() {
        let map = DynamixelMap::new(SimBus::new());
        map.configure(1, 0, 4095, 50).unwrap();
        map.configure(2, 0, 4095, 50).unwrap();
        map.torque_off_all();
        assert_eq!(map.bus.torque_of(1), Some(false));
        assert_eq!(map.bus.torque_of(2), Some(false));
    }

    #[test]
    fn reconfigure_updates_in_place() {
        let map = DynamixelMap::new(SimBus::new());
        map.configure(1, 0, 4095, 50).unwrap();
        map.configure(1, 100, 4000, 80).unwrap();
        assert_eq!(map.configured_count(), 1);
        assert!(map.request_position(1, 50).is_err());
    }
}
