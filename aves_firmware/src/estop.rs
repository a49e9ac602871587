//! The emergency stop latch.
//!
//! Triggered when the controller decides conditions are dangerous:
//! overheating, excessive power draw, an obstructed motor. Activation
//! powers everything down and parks the module in a state only a power
//! cycle exits — the message processor halts, so no later command,
//! valid or not, can move a servo again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{error, warn};

use crate::dynamixel::{DynamixelBus, DynamixelMap};
use crate::power::PowerControl;
use crate::state::FirmwareState;

/// Latch the emergency stop: cut torque, cut power, close the gate.
///
/// Idempotent; the first activation does the work.
pub fn activate<B: DynamixelBus>(
    state: &FirmwareState,
    power: &dyn PowerControl,
    dynamixel: &DynamixelMap<B>,
    reason: &str,
) {
    if state.is_emergency_stopped() {
        return;
    }

    error!("EMERGENCY STOP ACTIVATED - powering down all motors ({reason})");

    state.on_emergency_stop();
    dynamixel.torque_off_all();
    power.set_all(false);

    error!("emergency stop complete - system waiting for power cycle");
}

/// Park here after activation. Only the process stop flag (the host
/// build's stand-in for a power cycle) exits.
pub fn idle_loop(stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        // Sleep in slices so the host build can still be shut down.
        for _ in 0..50 {
            if stop.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        warn!("system in emergency stop state - waiting for power cycle");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamixel::SimBus;
    use crate::power::SimPower;

    #[test]
    fn activation_cuts_torque_and_power() {
        let state = FirmwareState::new();
        let power = SimPower::new();
        let dynamixel = DynamixelMap::new(SimBus::new());
        dynamixel.configure(2, 0, 4095, 50).unwrap();
        power.set_all(true);

        activate(&state, &power, &dynamixel, "test");

        assert!(state.is_emergency_stopped());
        assert!(!state.safe_to_run());
        assert!(!power.any_on());
    }

    #[test]
    fn activation_is_idempotent() {
        let state = FirmwareState::new();
        let power = SimPower::new();
        let dynamixel = DynamixelMap::new(SimBus::new());

        activate(&state, &power, &dynamixel, "first");
        power.set_all(true); // hostile: something re-enabled power
        activate(&state, &power, &dynamixel, "second");
        // The second call is a no-op; the latch was already taken.
        assert!(state.is_emergency_stopped());
    }
}
