//! Named inputs out of a DMX universe frame.
//!
//! A creature reads its inputs at `channel_offset + slot` within one
//! universe; slots are 1-based as DMX convention has it. The mapper is
//! the only code that touches raw universe bytes — everything after it
//! works with named values.

use std::collections::HashMap;

use aves_common::consts::DMX_UNIVERSE_SIZE;
use aves_common::error::ControllerError;
use tracing::trace;

/// One raw universe frame as delivered by the E1.31 client.
pub type UniverseFrame = [u8; DMX_UNIVERSE_SIZE as usize];

/// Declaration of one input channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSpec {
    pub name: String,
    /// 1-based slot within the universe, before the channel offset.
    pub slot: u16,
    /// 1 or 2 bytes; two-byte inputs are big-endian.
    pub width: u8,
}

impl InputSpec {
    /// Validate a spec against a channel offset.
    pub fn validate(&self, channel_offset: u16) -> Result<(), ControllerError> {
        if self.slot == 0 {
            return Err(ControllerError::InvalidConfiguration(format!(
                "input {}: DMX slots are 1-based",
                self.name
            )));
        }
        if !matches!(self.width, 1 | 2) {
            return Err(ControllerError::InvalidConfiguration(format!(
                "input {}: width {} not in {{1, 2}}",
                self.name, self.width
            )));
        }
        if self.slot + channel_offset + self.width as u16 > DMX_UNIVERSE_SIZE + 1 {
            return Err(ControllerError::InvalidConfiguration(format!(
                "input {}: slot {} + offset {channel_offset} + width {} exceeds the universe",
                self.name, self.slot, self.width
            )));
        }
        Ok(())
    }
}

/// Values extracted from one universe frame, keyed by input name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputFrame {
    values: HashMap<String, u16>,
}

impl InputFrame {
    /// Raw value of a named input, if present in this frame.
    pub fn value(&self, name: &str) -> Option<u16> {
        self.values.get(name).copied()
    }

    /// 8-bit view of a named input. Two-byte inputs yield their high
    /// byte, which is what the rigs want.
    pub fn byte(&self, name: &str) -> Option<u8> {
        self.value(name)
            .map(|v| if v > 0xff { (v >> 8) as u8 } else { v as u8 })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build a frame directly from named values. Test scaffolding and
    /// the rig unit tests use this.
    pub fn from_values(values: impl IntoIterator<Item = (String, u16)>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }
}

/// Extracts a creature's named inputs from raw universe frames.
#[derive(Debug, Clone)]
pub struct InputMapper {
    specs: Vec<InputSpec>,
    channel_offset: u16,
}

impl InputMapper {
    /// Build a mapper; every spec is validated against the offset.
    pub fn new(specs: Vec<InputSpec>, channel_offset: u16) -> Result<Self, ControllerError> {
        for spec in &specs {
            spec.validate(channel_offset)?;
        }
        Ok(Self {
            specs,
            channel_offset,
        })
    }

    /// Extract this creature's inputs from one universe frame.
    pub fn map(&self, universe: &UniverseFrame) -> InputFrame {
        let mut values = HashMap::with_capacity(self.specs.len());
        for spec in &self.specs {
            let index = (self.channel_offset + spec.slot - 1) as usize;
            let value = match spec.width {
                1 => universe[index] as u16,
                _ => ((universe[index] as u16) << 8) | universe[index + 1] as u16,
            };
            trace!("input {} <- slot {} = {value}", spec.name, spec.slot);
            values.insert(spec.name.clone(), value);
        }
        InputFrame { values }
    }

    pub fn specs(&self) -> &[InputSpec] {
        &self.specs
    }

    pub fn channel_offset(&self) -> u16 {
        self.channel_offset
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
