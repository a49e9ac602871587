//! Servo entities and the bank that owns them.

pub mod bank;

pub use bank::ServoBank;

use aves_common::consts::{MAX_POSITION, MIN_POSITION};
use aves_common::error::ControllerError;
use aves_common::range::{microseconds_to_position, position_to_microseconds};
use tracing::{debug, trace};

/// Where a servo's control signal leaves the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLocation {
    /// A PWM header on a servo module: module tag plus header index,
    /// e.g. module `A`, header 0 → wire id `A0`.
    Pwm { module: char, header: u8 },
    /// A Dynamixel bus id; wire id `D<n>`, positions 0–4095.
    Dynamixel { bus_id: u8 },
}

impl OutputLocation {
    /// The string key used on the wire and in `POS` batches.
    pub fn wire_id(&self) -> String {
        match self {
            Self::Pwm { module, header } => format!("{module}{header}"),
            Self::Dynamixel { bus_id } => format!("D{bus_id}"),
        }
    }
}

/// Symbolic startup pose, resolved against the servo's travel at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultPosition {
    Min,
    Max,
    Center,
}

impl DefaultPosition {
    fn resolve(self, min_us: u16, max_us: u16) -> u16 {
        match self {
            Self::Min => min_us,
            Self::Max => max_us,
            Self::Center => min_us + (max_us - min_us) / 2,
        }
    }
}

/// One servo: travel bounds, smoothing, inversion, and runtime state.
///
/// The min and max pulse widths define this joint's travel inside the
/// creature and are highly specific to the physical build; commanding
/// outside them risks bending something that should not bend, which is
/// why the firmware re-checks them independently.
#[derive(Debug, Clone)]
pub struct Servo {
    id: String,
    name: String,
    output: OutputLocation,
    min_us: u16,
    max_us: u16,
    smoothing: f64,
    inverted: bool,
    update_hz: u16,
    frame_length_us: u32,
    default_us: u16,
    desired_us: u32,
    current_us: u32,
    current_position: u16,
}

impl Servo {
    /// Build a servo, validating its travel and smoothing.
    ///
    /// Smoothing of exactly 1.0 would freeze the joint forever, so it
    /// is rejected rather than clamped.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        output: OutputLocation,
        min_us: u16,
        max_us: u16,
        smoothing: f64,
        inverted: bool,
        update_hz: u16,
        default_position: DefaultPosition,
    ) -> Result<Self, ControllerError> {
        let id = id.into();
        if min_us >= max_us {
            return Err(ControllerError::InvalidConfiguration(format!(
                "servo {id}: min_us ({min_us}) must be below max_us ({max_us})"
            )));
        }
        if !(0.0..1.0).contains(&smoothing) {
            return Err(ControllerError::InvalidConfiguration(format!(
                "servo {id}: smoothing_value {smoothing} outside [0, 1)"
            )));
        }
        if update_hz == 0 {
            return Err(ControllerError::InvalidConfiguration(format!(
                "servo {id}: update_hz must be non-zero"
            )));
        }

        let default_us = default_position.resolve(min_us, max_us);

        // Park at the default pose so the very first frame holds it.
        let start_us = if inverted {
            max_us - (default_us - min_us)
        } else {
            default_us
        };

        let servo = Self {
            name: name.into(),
            output,
            min_us,
            max_us,
            smoothing,
            inverted,
            update_hz,
            frame_length_us: 1_000_000 / update_hz as u32,
            default_us,
            desired_us: start_us as u32,
            current_us: start_us as u32,
            current_position: microseconds_to_position(start_us as u32, min_us, max_us),
            id,
        };

        debug!(
            "set up servo {}: output {}, travel {}..{}us, default {}us, inverted: {}",
            servo.id,
            servo.output.wire_id(),
            min_us,
            max_us,
            default_us,
            if inverted { "yes" } else { "no" }
        );

        Ok(servo)
    }

    /// Request a move to a device-independent position.
    ///
    /// Validates the range, applies inversion, and records the target
    /// pulse width. The actual motion happens over subsequent
    /// [`tick`](Self::tick) calls; decoupling the request from the
    /// output keeps external control (DMX) from yanking joints.
    pub fn move_to(&mut self, position: u16) -> Result<(), ControllerError> {
        if !(MIN_POSITION..=MAX_POSITION).contains(&position) {
            return Err(ControllerError::InvalidData(format!(
                "servo {}: position {position} outside {MIN_POSITION}..{MAX_POSITION}",
                self.id
            )));
        }

        let position = if self.inverted {
            MAX_POSITION - position
        } else {
            position
        };

        self.desired_us = position_to_microseconds(position, self.min_us, self.max_us);
        self.current_position = position;

        trace!(
            "requesting servo {} to position {} ({}us)",
            self.id, position, self.desired_us
        );
        Ok(())
    }

    /// Advance the smoothing filter by one frame.
    ///
    /// One-pole IIR: the smoothing value is the weight of the previous
    /// output. Integer rounding plus a minimum step of one count, so
    /// the output reaches the target instead of stalling just short of
    /// it once the remaining error rounds away.
    pub fn tick(&mut self) {
        if self.current_us == self.desired_us {
            return;
        }

        let next = (self.desired_us as f64 * (1.0 - self.smoothing)
            + self.current_us as f64 * self.smoothing)
            .round() as u32;

        self.current_us = if next == self.current_us {
            if self.desired_us > self.current_us {
                self.current_us + 1
            } else {
                self.current_us - 1
            }
        } else {
            next
        };
    }

    /// Logical position, inversion undone so observers see what was
    /// requested.
    pub fn position(&self) -> u16 {
        if self.inverted {
            MAX_POSITION - self.current_position
        } else {
            self.current_position
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output(&self) -> &OutputLocation {
        &self.output
    }

    pub fn wire_id(&self) -> String {
        self.output.wire_id()
    }

    pub fn min_us(&self) -> u16 {
        self.min_us
    }

    pub fn max_us(&self) -> u16 {
        self.max_us
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn update_hz(&self) -> u16 {
        self.update_hz
    }

    /// Length of one control frame in microseconds.
    pub fn frame_length_us(&self) -> u32 {
        self.frame_length_us
    }

    pub fn default_us(&self) -> u16 {
        self.default_us
    }

    pub fn desired_microseconds(&self) -> u32 {
        self.desired_us
    }

    pub fn current_microseconds(&self) -> u32 {
        self.current_us
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
