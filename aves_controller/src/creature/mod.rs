//! Creatures and their rigs.
//!
//! A creature owns its servo bank and knows how to turn named inputs
//! into servo positions. Rig variants are a closed set — selection
//! happens once, at configuration load, by type tag.

pub mod crow;
pub mod head;
pub mod parrot;

pub use head::{DifferentialHead, HeadPosition};

use aves_common::error::ControllerError;
use aves_common::protocol::MotorConfigRecord;
use tracing::{debug, warn};

use crate::input::InputFrame;
use crate::servo::ServoBank;

/// The closed set of rig variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigKind {
    Parrot,
    Crow,
}

impl RigKind {
    /// Resolve a configuration type tag.
    pub fn from_type_tag(tag: &str) -> Result<Self, ControllerError> {
        match tag {
            "parrot" => Ok(Self::Parrot),
            "crow" => Ok(Self::Crow),
            other => Err(ControllerError::InvalidConfiguration(format!(
                "unknown creature type: {other}"
            ))),
        }
    }

    /// Input channel names this rig expects in every frame.
    pub fn required_inputs(self) -> &'static [&'static str] {
        match self {
            Self::Parrot => parrot::REQUIRED_INPUTS,
            Self::Crow => crow::REQUIRED_INPUTS,
        }
    }

    /// Servo ids that must exist after servo loading.
    pub fn required_servos(self) -> &'static [&'static str] {
        match self {
            Self::Parrot => parrot::REQUIRED_SERVOS,
            Self::Crow => crow::REQUIRED_SERVOS,
        }
    }
}

/// A fully-loaded creature: rig, head transform, and servo bank.
#[derive(Debug)]
pub struct Creature {
    name: String,
    description: String,
    rig: RigKind,
    universe: u16,
    channel_offset: u16,
    head: DifferentialHead,
    bank: ServoBank,
    /// Per-motor records the link hands to the firmware on handshake.
    config_records: Vec<MotorConfigRecord>,
    servo_update_hz: u16,
}

impl Creature {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        rig: RigKind,
        universe: u16,
        channel_offset: u16,
        head: DifferentialHead,
        bank: ServoBank,
        config_records: Vec<MotorConfigRecord>,
        servo_update_hz: u16,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            rig,
            universe,
            channel_offset,
            head,
            bank,
            config_records,
            servo_update_hz,
        }
    }

    /// One-time startup check: every servo the rig drives must exist.
    ///
    /// A missing servo is fatal here, where it costs nothing, instead
    /// of a panic mid-show.
    pub fn preflight(&self) -> Result<(), ControllerError> {
        debug!("servos found:");
        for servo in self.bank.iter() {
            debug!("servo: {}", servo.id());
        }

        for required in self.rig.required_servos() {
            if !self.bank.contains(required) {
                return Err(ControllerError::InvalidConfiguration(format!(
                    "missing required servo: {required}"
                )));
            }
        }

        debug!("pre-flight check passed");
        Ok(())
    }

    /// Map one frame of named inputs onto the servo bank.
    ///
    /// Missing required inputs get a warning but do not kill the tick;
    /// whatever inputs did arrive are still applied.
    pub fn map_inputs(&mut self, inputs: &InputFrame) {
        for required in self.rig.required_inputs() {
            if inputs.value(required).is_none() {
                warn!("missing required input: {required}");
            }
        }

        match self.rig {
            RigKind::Parrot => parrot::map(&self.head, inputs, &mut self.bank),
            RigKind::Crow => crow::map(&self.head, inputs, &mut self.bank),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn rig(&self) -> RigKind {
        self.rig
    }

    pub fn universe(&self) -> u16 {
        self.universe
    }

    pub fn channel_offset(&self) -> u16 {
        self.channel_offset
    }

    pub fn head(&self) -> &DifferentialHead {
        &self.head
    }

    pub fn bank(&self) -> &ServoBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut ServoBank {
        &mut self.bank
    }

    pub fn config_records(&self) -> &[MotorConfigRecord] {
        &self.config_records
    }

    pub fn servo_update_hz(&self) -> u16 {
        self.servo_update_hz
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::{DefaultPosition, OutputLocation, Servo};

    fn test_bank(ids: &[&str]) -> ServoBank {
        let mut bank = ServoBank::new();
        for (i, id) in ids.iter().enumerate() {
            bank.insert(
                Servo::new(
                    *id,
                    *id,
                    OutputLocation::Pwm {
                        module: 'A',
                        header: i as u8,
                    },
                    1000,
                    2000,
                    0.0,
                    false,
                    50,
                    DefaultPosition::Center,
                )
                .unwrap(),
            )
            .unwrap();
        }
        bank
    }

    fn parrot(bank: ServoBank) -> Creature {
        Creature::new(
            "Petra",
            "test parrot",
            RigKind::Parrot,
            1,
            0,
            DifferentialHead::new(0.4, 0, 1023),
            bank,
            Vec::new(),
            50,
        )
    }

    #[test]
    fn type_tags_resolve() {
        assert_eq!(RigKind::from_type_tag("parrot").unwrap(), RigKind::Parrot);
        assert_eq!(RigKind::from_type_tag("crow").unwrap(), RigKind::Crow);
        assert!(matches!(
            RigKind::from_type_tag("wyvern"),
            Err(ControllerError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn preflight_passes_with_all_servos() {
        let creature = parrot(test_bank(RigKind::Parrot.required_servos()));
        assert!(creature.preflight().is_ok());
    }

    #[test]
    fn preflight_names_the_missing_servo() {
        let creature = parrot(test_bank(&["neck_left", "neck_right", "beak"]));
        let err = creature.preflight().unwrap_err();
        match err {
            ControllerError::InvalidConfiguration(msg) => {
                assert!(msg.contains("neck_rotate"), "got: {msg}");
            }
            other => panic!("wrong error kind: {other:?}"),
        }
    }

    #[test]
    fn missing_inputs_do_not_stop_the_tick() {
        let mut creature = parrot(test_bank(RigKind::Parrot.required_servos()));
        let inputs = InputFrame::from_values([("beak".to_string(), 255u16)]);
        creature.map_inputs(&inputs);
        assert_eq!(creature.bank().get("beak").unwrap().position(), 1023);
    }
}
