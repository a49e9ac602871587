//! Motor power rail control.
//!
//! Rails stay off until the first valid `POS` frame of a session, go
//! off again on disconnect, and stay off forever after `ESTOP`. The
//! hardware behind the pins varies by board revision, so the interface
//! is a trait; the simulation just remembers rail state, which is all
//! the tests need.

use std::sync::atomic::{AtomicBool, Ordering};

use aves_common::consts::MOTOR_MAP_SIZE;
use tracing::info;

/// Per-motor power rail switches.
pub trait PowerControl: Send + Sync {
    fn set_motor(&self, index: usize, on: bool);

    fn set_all(&self, on: bool) {
        for index in 0..MOTOR_MAP_SIZE {
            self.set_motor(index, on);
        }
    }
}

/// Host stand-in for the power rail switches.
#[derive(Debug, Default)]
pub struct SimPower {
    rails: [AtomicBool; MOTOR_MAP_SIZE],
}

impl SimPower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self, index: usize) -> bool {
        self.rails[index].load(Ordering::SeqCst)
    }

    pub fn any_on(&self) -> bool {
        self.rails.iter().any(|r| r.load(Ordering::SeqCst))
    }
}

impl PowerControl for SimPower {
    fn set_motor(&self, index: usize, on: bool) {
        let was = self.rails[index].swap(on, Ordering::SeqCst);
        if was != on {
            info!(
                "motor {index} power rail {}",
                if on { "enabled" } else { "disabled" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_all_covers_every_rail() {
        let p = SimPower::new();
        assert!(!p.any_on());
        p.set_all(true);
        for i in 0..MOTOR_MAP_SIZE {
            assert!(p.is_on(i));
        }
        p.set_all(false);
        assert!(!p.any_on());
    }
}
