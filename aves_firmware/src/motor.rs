//! The motor map: eight PWM slots bound to fixed pins.
//!
//! Slot geometry is compile-time; travel bounds arrive at runtime via
//! `CONFIG` and every slot starts unconfigured. Configuration and
//! position requests take the map mutex; the wrap handler never does —
//! it reads each slot's requested duty ticks through a single aligned
//! atomic, and a torn frame is corrected twenty milliseconds later.

use std::sync::atomic::{AtomicU32, Ordering};

use aves_common::consts::MOTOR_MAP_SIZE;
use aves_common::error::ControllerError;
use parking_lot::Mutex;
use static_assertions::const_assert;
use tracing::{info, warn};

// The wrap handler walks the map with a fixed stride; the pin tables
// below must agree with it.
const_assert!(MOTOR_MAP_SIZE == 8);

/// GPIO pins for the eight servo headers, slot 0 first.
pub const SERVO_GPIO_PINS: [u8; MOTOR_MAP_SIZE] = [6, 7, 8, 9, 10, 11, 12, 13];

/// Per-slot motor power control pins.
pub const SERVO_POWER_PINS: [u8; MOTOR_MAP_SIZE] = [14, 15, 16, 17, 18, 19, 20, 21];

/// PWM counter geometry, fixed once the block is started.
#[derive(Debug, Clone, Copy)]
pub struct PwmParams {
    /// Counter wrap value.
    pub resolution: u32,
    /// Length of one PWM frame in microseconds.
    pub frame_length_us: u32,
}

impl PwmParams {
    /// Standard 50 Hz servo frame with a 20000-count wrap: one count
    /// per microsecond.
    pub const fn standard() -> Self {
        Self {
            resolution: 20_000,
            frame_length_us: 20_000,
        }
    }

    /// Counter ticks for a pulse width.
    #[inline]
    pub fn ticks_for(&self, us: u16) -> u32 {
        ((self.resolution as u64 * us as u64 + self.frame_length_us as u64 / 2)
            / self.frame_length_us as u64) as u32
    }
}

/// One PWM servo slot.
#[derive(Debug, Clone)]
pub struct MotorSlot {
    /// Slot id as it appears on the wire (`"0"`–`"7"`).
    pub id: heapless::String<4>,
    pub gpio_pin: u8,
    pub pwm_channel: u8,
    pub power_pin: u8,
    pub min_us: u16,
    pub max_us: u16,
    pub current_us: u16,
    pub is_configured: bool,
}

/// The module's motor map.
pub struct MotorMap {
    slots: Mutex<[MotorSlot; MOTOR_MAP_SIZE]>,
    /// Requested duty ticks per slot, read lock-free by the wrap
    /// handler.
    requested_ticks: [AtomicU32; MOTOR_MAP_SIZE],
    params: PwmParams,
}

impl MotorMap {
    pub fn new(params: PwmParams) -> Self {
        let slots = std::array::from_fn(|i| MotorSlot {
            id: {
                let mut id = heapless::String::new();
                let _ = id.push(char::from_digit(i as u32, 10).unwrap_or('?'));
                id
            },
            gpio_pin: SERVO_GPIO_PINS[i],
            pwm_channel: i as u8,
            power_pin: SERVO_POWER_PINS[i],
            min_us: 0,
            max_us: 0,
            current_us: 0,
            is_configured: false,
        });
        Self {
            slots: Mutex::new(slots),
            requested_ticks: std::array::from_fn(|_| AtomicU32::new(0)),
            params,
        }
    }

    /// Resolve a wire id to a slot index.
    ///
    /// The controller prefixes ids with its module tag (`A0`, `B3`);
    /// the slot digit is always the last character.
    pub fn index_of(&self, motor_id: &str) -> Option<usize> {
        let digit = motor_id.chars().next_back()?.to_digit(10)? as usize;
        let prefix_ok = match motor_id.len() {
            1 => true,
            2 => motor_id.chars().next().is_some_and(|c| c.is_ascii_uppercase() && c != 'D'),
            _ => false,
        };
        (prefix_ok && digit < MOTOR_MAP_SIZE).then_some(digit)
    }

    /// Apply travel bounds from a `CONFIG` record.
    pub fn configure(
        &self,
        motor_id: &str,
        min_us: u16,
        max_us: u16,
    ) -> Result<(), ControllerError> {
        let index = self.index_of(motor_id).ok_or_else(|| {
            ControllerError::InvalidData(format!("unknown motor id: {motor_id}"))
        })?;
        if min_us >= max_us {
            return Err(ControllerError::InvalidData(format!(
                "motor {motor_id}: min_us {min_us} must be below max_us {max_us}"
            )));
        }

        let mut slots = self.slots.lock();
        let slot = &mut slots[index];
        slot.min_us = min_us;
        slot.max_us = max_us;
        slot.is_configured = true;
        info!("motor {motor_id} may move between {min_us} and {max_us} microseconds");
        Ok(())
    }

    /// Record a requested pulse width for the next wrap.
    ///
    /// Rejected (with a counter-friendly error) when the slot is
    /// unknown, unconfigured, or the pulse is outside its travel. The
    /// servo simply does not move.
    pub fn request_position(&self, motor_id: &str, us: u16) -> Result<(), ControllerError> {
        let index = self.index_of(motor_id).ok_or_else(|| {
            ControllerError::InvalidData(format!("unknown motor id: {motor_id}"))
        })?;

        let mut slots = self.slots.lock();
        let slot = &mut slots[index];
        if !slot.is_configured {
            warn!("dropping position for unconfigured motor {motor_id}");
            return Err(ControllerError::InvalidData(format!(
                "motor {motor_id} is not configured"
            )));
        }
        if us < slot.min_us || us > slot.max_us {
            warn!(
                "invalid position for {motor_id}: {us} (valid is {} - {})",
                slot.min_us, slot.max_us
            );
            return Err(ControllerError::InvalidData(format!(
                "position {us} outside {}..{}",
                slot.min_us, slot.max_us
            )));
        }

        slot.current_us = us;
        self.requested_ticks[index].store(self.params.ticks_for(us), Ordering::Relaxed);
        Ok(())
    }

    /// Requested duty ticks for one slot. Wrap-handler path: lock-free.
    #[inline]
    pub fn requested_ticks(&self, index: usize) -> u32 {
        self.requested_ticks[index].load(Ordering::Relaxed)
    }

    /// Whether a slot has received its travel bounds.
    pub fn is_configured(&self, motor_id: &str) -> bool {
        self.index_of(motor_id)
            .map(|i| self.slots.lock()[i].is_configured)
            .unwrap_or(false)
    }

    /// Whether every slot is configured.
    pub fn all_configured(&self) -> bool {
        self.slots.lock().iter().all(|s| s.is_configured)
    }

    /// Copy of one slot, for telemetry and tests.
    pub fn slot(&self, index: usize) -> MotorSlot {
        self.slots.lock()[index].clone()
    }

    pub fn params(&self) -> PwmParams {
        self.params
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
