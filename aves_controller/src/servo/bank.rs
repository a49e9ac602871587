//! The servo bank: owner of every servo in a creature.
//!
//! Single-writer by design. The frame scheduler is the only task that
//! mutates servo state (requests from the rig, then the smoothing
//! tick); everything downstream works from position snapshots taken at
//! send time.

use std::collections::BTreeMap;

use aves_common::error::ControllerError;
use aves_common::protocol::ServoPosition;
use tracing::warn;

use super::Servo;

/// Owns the creature's servos, keyed by their configured ids.
#[derive(Debug, Default)]
pub struct ServoBank {
    // BTreeMap so snapshots batch in a stable order.
    servos: BTreeMap<String, Servo>,
}

impl ServoBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a servo. Duplicate ids and duplicate output locations are
    /// configuration errors.
    pub fn insert(&mut self, servo: Servo) -> Result<(), ControllerError> {
        if self.servos.contains_key(servo.id()) {
            return Err(ControllerError::InvalidConfiguration(format!(
                "duplicate servo id: {}",
                servo.id()
            )));
        }
        if self
            .servos
            .values()
            .any(|existing| existing.output() == servo.output())
        {
            return Err(ControllerError::InvalidConfiguration(format!(
                "duplicate output location: {}",
                servo.wire_id()
            )));
        }
        self.servos.insert(servo.id().to_string(), servo);
        Ok(())
    }

    /// Request a position on one servo, by id.
    ///
    /// Unknown ids and out-of-range positions are data errors: logged,
    /// counted by the caller if it cares, and otherwise ignored so one
    /// bad input cannot stall a frame.
    pub fn request(&mut self, id: &str, position: u16) -> Result<(), ControllerError> {
        match self.servos.get_mut(id) {
            Some(servo) => servo.move_to(position),
            None => {
                warn!("position requested for unknown servo: {id}");
                Err(ControllerError::InvalidData(format!(
                    "unknown servo id: {id}"
                )))
            }
        }
    }

    /// Run the smoothing step on every servo. Called once per frame by
    /// the scheduler.
    pub fn tick_all(&mut self) {
        for servo in self.servos.values_mut() {
            servo.tick();
        }
    }

    /// Snapshot the current pulse widths for a `POS` batch.
    pub fn snapshot(&self) -> Vec<ServoPosition> {
        self.servos
            .values()
            .map(|s| ServoPosition {
                id: s.wire_id(),
                value: s.current_microseconds() as u16,
            })
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.servos.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Servo> {
        self.servos.get(id)
    }

    pub fn len(&self) -> usize {
        self.servos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servos.is_empty()
    }

    /// Iterate servos in snapshot order.
    pub fn iter(&self) -> impl Iterator<Item = &Servo> {
        self.servos.values()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
