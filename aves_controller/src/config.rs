//! Creature configuration loading.
//!
//! Creature files are the JSON documents the show tooling emits. The
//! builder validates everything before constructing anything: required
//! fields (enforced by the deserialization types), travel bounds,
//! smoothing, DMX slot ranges, and the creature type tag. Nothing gets
//! a servo bank until all of it checks out.

use std::path::Path;

use aves_common::error::ControllerError;
use aves_common::protocol::MotorConfigRecord;
use serde::Deserialize;
use tracing::{debug, info};

use crate::creature::{Creature, DifferentialHead, RigKind};
use crate::input::{InputMapper, InputSpec};
use crate::servo::{DefaultPosition, OutputLocation, Servo, ServoBank};

#[derive(Debug, Deserialize)]
struct CreatureFile {
    id: String,
    #[serde(rename = "type")]
    creature_type: String,
    name: String,
    version: String,
    description: String,
    universe: u16,
    channel_offset: u16,
    head_offset_max: f64,
    servo_frequency: u16,
    position_min: u16,
    position_max: u16,
    motors: Vec<MotorEntry>,
    inputs: Vec<InputEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum MotorEntry {
    Servo {
        id: String,
        name: String,
        output_module: char,
        output_header: u8,
        min_pulse_us: u16,
        max_pulse_us: u16,
        smoothing_value: f64,
        inverted: bool,
        default_position: DefaultPositionTag,
    },
    Dynamixel {
        id: String,
        name: String,
        dynamixel_id: u8,
        min_position: u16,
        max_position: u16,
        profile_velocity: u32,
        smoothing_value: f64,
        inverted: bool,
        default_position: DefaultPositionTag,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DefaultPositionTag {
    Min,
    Max,
    Center,
}

impl From<DefaultPositionTag> for DefaultPosition {
    fn from(tag: DefaultPositionTag) -> Self {
        match tag {
            DefaultPositionTag::Min => Self::Min,
            DefaultPositionTag::Max => Self::Max,
            DefaultPositionTag::Center => Self::Center,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InputEntry {
    name: String,
    slot: u16,
    width: u8,
}

/// Load and validate a creature file.
///
/// Returns the creature plus the input mapper for its universe slice.
/// Every failure is fatal: a creature that half-loads is worse than one
/// that refuses to start.
pub fn build_creature(path: &Path) -> Result<(Creature, InputMapper), ControllerError> {
    info!("parsing creature configuration file {}", path.display());

    let raw = std::fs::read_to_string(path).map_err(|e| {
        ControllerError::InvalidConfiguration(format!("unable to read {}: {e}", path.display()))
    })?;

    let file: CreatureFile = serde_json::from_str(&raw).map_err(|e| {
        ControllerError::InvalidData(format!("unable to parse creature config: {e}"))
    })?;

    let rig = RigKind::from_type_tag(&file.creature_type)?;

    if file.position_min >= file.position_max {
        return Err(ControllerError::InvalidConfiguration(format!(
            "position_min ({}) must be below position_max ({})",
            file.position_min, file.position_max
        )));
    }
    if !(0.0..=0.5).contains(&file.head_offset_max) {
        return Err(ControllerError::InvalidConfiguration(format!(
            "head_offset_max {} outside [0, 0.5]",
            file.head_offset_max
        )));
    }
    if file.servo_frequency == 0 {
        return Err(ControllerError::InvalidConfiguration(
            "servo_frequency must be non-zero".into(),
        ));
    }

    let mut bank = ServoBank::new();
    let mut records = Vec::with_capacity(file.motors.len());

    for motor in &file.motors {
        match motor {
            MotorEntry::Servo {
                id,
                name,
                output_module,
                output_header,
                min_pulse_us,
                max_pulse_us,
                smoothing_value,
                inverted,
                default_position,
            } => {
                let servo = Servo::new(
                    id.clone(),
                    name.clone(),
                    OutputLocation::Pwm {
                        module: *output_module,
                        header: *output_header,
                    },
                    *min_pulse_us,
                    *max_pulse_us,
                    *smoothing_value,
                    *inverted,
                    file.servo_frequency,
                    (*default_position).into(),
                )?;
                records.push(MotorConfigRecord::Servo {
                    id: servo.wire_id(),
                    min_us: *min_pulse_us,
                    max_us: *max_pulse_us,
                });
                bank.insert(servo)?;
            }
            MotorEntry::Dynamixel {
                id,
                name,
                dynamixel_id,
                min_position,
                max_position,
                profile_velocity,
                smoothing_value,
                inverted,
                default_position,
            } => {
                // Same entity, position units in place of microseconds.
                let servo = Servo::new(
                    id.clone(),
                    name.clone(),
                    OutputLocation::Dynamixel {
                        bus_id: *dynamixel_id,
                    },
                    *min_position,
                    *max_position,
                    *smoothing_value,
                    *inverted,
                    file.servo_frequency,
                    (*default_position).into(),
                )?;
                records.push(MotorConfigRecord::Dynamixel {
                    id: *dynamixel_id,
                    min_position: *min_position,
                    max_position: *max_position,
                    velocity: *profile_velocity,
                });
                bank.insert(servo)?;
            }
        }
    }

    let specs = file
        .inputs
        .iter()
        .map(|i| InputSpec {
            name: i.name.clone(),
            slot: i.slot,
            width: i.width,
        })
        .collect();
    let mapper = InputMapper::new(specs, file.channel_offset)?;

    let head = DifferentialHead::new(file.head_offset_max, file.position_min, file.position_max);

    debug!(
        "creature {} v{} ({}): {} motors, {} inputs, universe {}",
        file.id,
        file.version,
        file.creature_type,
        bank.len(),
        mapper.specs().len(),
        file.universe
    );

    let creature = Creature::new(
        file.name,
        file.description,
        rig,
        file.universe,
        file.channel_offset,
        head,
        bank,
        records,
        file.servo_frequency,
    );

    Ok((creature, mapper))
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    fn parrot_json(smoothing: f64, slot: u16) -> String {
        let motors: Vec<String> = ["neck_left", "neck_right", "neck_rotate", "body_lean", "beak"]
            .iter()
            .enumerate()
            .map(|(i, id)| {
                format!(
                    r#"{{"type":"servo","id":"{id}","name":"{id}","output_module":"A",
                       "output_header":{i},"min_pulse_us":1250,"max_pulse_us":2250,
                       "smoothing_value":{smoothing},"inverted":false,
                       "default_position":"center"}}"#
                )
            })
            .collect();
        format!(
            r#"{{
              "id": "parrot-1", "type": "parrot", "name": "Petra",
              "version": "2", "description": "test parrot",
              "universe": 1, "channel_offset": 0,
              "head_offset_max": 0.4, "servo_frequency": 50,
              "position_min": 0, "position_max": 1023,
              "motors": [{}],
              "inputs": [
                {{"name": "head_height", "slot": {slot}, "width": 1}},
                {{"name": "head_tilt", "slot": 2, "width": 1}},
                {{"name": "neck_rotate", "slot": 3, "width": 1}},
                {{"name": "body_lean", "slot": 4, "width": 1}},
                {{"name": "beak", "slot": 5, "width": 1}},
                {{"name": "chest", "slot": 6, "width": 1}},
                {{"name": "stand_rotate", "slot": 7, "width": 2}}
              ]
            }}"#,
            motors.join(",")
        )
    }

    #[test]
    fn builds_a_valid_parrot() {
        let f = write_config(&parrot_json(0.9, 1));
        let (creature, mapper) = build_creature(f.path()).unwrap();
        assert_eq!(creature.rig(), RigKind::Parrot);
        assert_eq!(creature.bank().len(), 5);
        assert_eq!(creature.config_records().len(), 5);
        assert_eq!(mapper.specs().len(), 7);
        creature.preflight().unwrap();
    }

    #[test]
    fn frozen_smoothing_is_rejected() {
        let f = write_config(&parrot_json(1.0, 1));
        let err = build_creature(f.path()).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfiguration(_)));
    }

    #[test]
    fn slot_past_universe_is_rejected() {
        let f = write_config(&parrot_json(0.5, 513));
        let err = build_creature(f.path()).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfiguration(_)));
    }

    #[test]
    fn unknown_creature_type_is_rejected() {
        let body = parrot_json(0.5, 1).replace("\"parrot\"", "\"wyvern\"");
        let f = write_config(&body);
        assert!(matches!(
            build_creature(f.path()),
            Err(ControllerError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn malformed_json_is_invalid_data() {
        let f = write_config("{ this is not json");
        assert!(matches!(
            build_creature(f.path()),
            Err(ControllerError::InvalidData(_))
        ));
    }

    #[test]
    fn missing_file_is_invalid_configuration() {
        let err = build_creature(Path::new("/nonexistent/creature.json")).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfiguration(_)));
    }

    #[test]
    fn dynamixel_motor_gets_bus_record() {
        let body = parrot_json(0.5, 1).replace(
            r#""motors": ["#,
            r#""motors": [{"type":"dynamixel","id":"stand","name":"stand",
                "dynamixel_id":3,"min_position":100,"max_position":4000,
                "profile_velocity":120,"smoothing_value":0.5,"inverted":false,
                "default_position":"center"},"#,
        );
        let f = write_config(&body);
        let (creature, _) = build_creature(f.path()).unwrap();
        assert_eq!(creature.bank().len(), 6);
        let dyn_record = creature
            .config_records()
            .iter()
            .find(|r| matches!(r, MotorConfigRecord::Dynamixel { .. }))
            .unwrap();
        match dyn_record {
            MotorConfigRecord::Dynamixel { id, velocity, .. } => {
                assert_eq!(*id, 3);
                assert_eq!(*velocity, 120);
            }
            _ => unreachable!(),
        }
        assert_eq!(creature.bank().get("stand").unwrap().wire_id(), "D3");
    }
}
