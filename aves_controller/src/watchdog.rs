//! Thermal and electrical watchdog.
//!
//! Consumes board telemetry and keeps two threshold timers: motor rail
//! current and board temperature. A value over its limit starts a
//! timer; staying over for the full grace period triggers the
//! emergency stop — `ESTOP` goes out on the link, a warning event goes
//! to the server channel, and the monitor latches. A value dropping
//! back into range clears its timer immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use aves_common::protocol::Message;
use bitflags::bitflags;
use tracing::{debug, error, warn};

use aves_common::queue::MessageQueue;
use crate::server::ServerEvent;
use crate::telemetry::BoardTelemetry;

/// Rail watched for motor power draw.
const MOTOR_RAIL: &str = "MP_IN";

bitflags! {
    /// Which thresholds are currently exceeded.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AlarmFlags: u8 {
        const POWER = 1 << 0;
        const TEMPERATURE = 1 << 1;
    }
}

/// Limits and grace periods.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogLimits {
    pub max_temperature_f: f64,
    pub max_motor_amps: f64,
    /// How long a value may stay over its limit before ESTOP.
    pub grace: Duration,
}

impl Default for WatchdogLimits {
    fn default() -> Self {
        Self {
            max_temperature_f: 140.0,
            max_motor_amps: 4.0,
            grace: Duration::from_secs(3),
        }
    }
}

/// The watchdog task.
pub struct WatchdogMonitor {
    limits: WatchdogLimits,
    telemetry: MessageQueue<BoardTelemetry>,
    outgoing: MessageQueue<Message>,
    events: MessageQueue<ServerEvent>,
    power_over_since: Option<Instant>,
    temperature_over_since: Option<Instant>,
    power_warned: bool,
    temperature_warned: bool,
    triggered: bool,
}

impl WatchdogMonitor {
    pub fn new(
        limits: WatchdogLimits,
        telemetry: MessageQueue<BoardTelemetry>,
        outgoing: MessageQueue<Message>,
        events: MessageQueue<ServerEvent>,
    ) -> Self {
        Self {
            limits,
            telemetry,
            outgoing,
            events,
            power_over_since: None,
            temperature_over_since: None,
            power_warned: false,
            temperature_warned: false,
            triggered: false,
        }
    }

    pub fn run(mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) {
            let Some(record) = self.telemetry.pop_timeout(Duration::from_millis(100)) else {
                continue;
            };
            self.check(&record, Instant::now());
        }
    }

    /// Whether the monitor has already fired the emergency stop.
    pub fn triggered(&self) -> bool {
        self.triggered
    }

    /// Current alarm flags.
    pub fn alarms(&self) -> AlarmFlags {
        let mut flags = AlarmFlags::empty();
        if self.power_over_since.is_some() {
            flags |= AlarmFlags::POWER;
        }
        if self.temperature_over_since.is_some() {
            flags |= AlarmFlags::TEMPERATURE;
        }
        flags
    }

    /// Evaluate one telemetry record at time `now`.
    ///
    /// Split from `run` so tests can drive the clock.
    pub fn check(&mut self, record: &BoardTelemetry, now: Instant) {
        // Power draw on the motor rail.
        if let Some(rail) = record.rail(MOTOR_RAIL) {
            if rail.amps > self.limits.max_motor_amps {
                let since = *self.power_over_since.get_or_insert(now);
                if !self.power_warned {
                    warn!(
                        "motor rail over limit: {:.3}A > {:.3}A",
                        rail.amps, self.limits.max_motor_amps
                    );
                    self.power_warned = true;
                }
                if now.duration_since(since) >= self.limits.grace {
                    self.trigger(format!(
                        "motor rail current {:.3}A over limit for {:?}",
                        rail.amps, self.limits.grace
                    ));
                }
            } else if self.power_over_since.take().is_some() {
                debug!("motor rail back in range");
                self.power_warned = false;
            }
        }

        // Board temperature.
        if record.temperature_f > self.limits.max_temperature_f {
            let since = *self.temperature_over_since.get_or_insert(now);
            if !self.temperature_warned {
                warn!(
                    "board temperature over limit: {:.2}F > {:.2}F",
                    record.temperature_f, self.limits.max_temperature_f
                );
                self.temperature_warned = true;
            }
            if now.duration_since(since) >= self.limits.grace {
                self.trigger(format!(
                    "board temperature {:.2}F over limit for {:?}",
                    record.temperature_f, self.limits.grace
                ));
            }
        } else if self.temperature_over_since.take().is_some() {
            debug!("board temperature back in range");
            self.temperature_warned = false;
        }
    }

    fn trigger(&mut self, reason: String) {
        if self.triggered {
            return;
        }
        self.triggered = true;
        error!("EMERGENCY STOP: {reason}");
        // The writer's gate passes ESTOP in any session state. Drop-
        // oldest rather than blocking: with the link down nothing
        // drains this queue, and hanging the watchdog helps nobody.
        self.outgoing.push_drop_oldest(Message::EStop);
        self.events
            .push_drop_oldest(ServerEvent::emergency_stop(reason));
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
