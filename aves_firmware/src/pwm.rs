//! The PWM wrap handler and its hardware seams.
//!
//! The handler runs once per PWM frame at interrupt priority. Rules:
//! no allocation, no locks, no I/O beyond the duty registers. It reads
//! one atomic flag and eight atomic tick values; everything else
//! belongs to task context.

use aves_common::consts::{MOTOR_MAP_SIZE, PWM_WRAPS_PER_WATCHDOG_KICK};

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::motor::MotorMap;
use crate::state::FirmwareState;

/// Duty-register access for the eight PWM channels.
pub trait PwmBackend: Send + Sync {
    /// Write a channel's duty ticks. Called from the wrap handler:
    /// must not block or allocate.
    fn set_channel_level(&self, channel: u8, ticks: u32);
}

/// The hardware watchdog the wrap handler feeds.
pub trait HardwareWatchdog: Send + Sync {
    /// Must not block or allocate.
    fn kick(&self);
}

/// Per-handler bookkeeping that lives outside the shared state.
#[derive(Debug, Default)]
pub struct WrapContext {
    wraps_since_kick: u32,
}

/// One PWM wrap: write every slot's duty cycle, feed the watchdog.
///
/// When the safety gate is closed the duty registers are left alone —
/// the wrap still counts and the watchdog still gets fed, because a
/// starved watchdog reset during configuration would be its own
/// failure.
pub fn on_pwm_wrap(
    state: &FirmwareState,
    motors: &MotorMap,
    pwm: &dyn PwmBackend,
    watchdog: &dyn HardwareWatchdog,
    context: &mut WrapContext,
) {
    if state.safe_to_run() {
        for channel in 0..MOTOR_MAP_SIZE {
            pwm.set_channel_level(channel as u8, motors.requested_ticks(channel));
        }
    }

    state.pwm_wraps.fetch_add(1, Ordering::Relaxed);

    context.wraps_since_kick += 1;
    if context.wraps_since_kick >= PWM_WRAPS_PER_WATCHDOG_KICK {
        context.wraps_since_kick = 0;
        watchdog.kick();
    }
}

// ─── Simulation backends ────────────────────────────────────────────

/// Records duty writes; the host stand-in for the PWM block.
#[derive(Debug, Default)]
pub struct SimPwm {
    levels: [AtomicU32; MOTOR_MAP_SIZE],
    writes: AtomicU64,
}

impl SimPwm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last duty ticks written to a channel.
    pub fn level(&self, channel: usize) -> u32 {
        self.levels[channel].load(Ordering::Relaxed)
    }

    /// Total duty writes across all channels.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl PwmBackend for SimPwm {
    fn set_channel_level(&self, channel: u8, ticks: u32) {
        self.levels[channel as usize].store(ticks, Ordering::Relaxed);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Counts kicks; the host stand-in for the hardware watchdog.
#[derive(Debug, Default)]
pub struct SimWatchdog {
    kicks: AtomicU64,
}

impl SimWatchdog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kicks(&self) -> u64 {
        self.kicks.load(Ordering::Relaxed)
    }
}

impl HardwareWatchdog for SimWatchdog {
    fn kick(&self) {
        self.kicks.fetch_add(1, Ordering::Relaxed);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
