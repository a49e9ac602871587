//! The fixed-period frame loop.
//!
//! One tick per servo frame: pull the freshest input frame, run the rig,
//! run the smoothing step, emit a position batch. Deadlines are
//! absolute (`t₀ + k·period`) so pacing never drifts; when a tick runs
//! long the schedule skips forward instead of trying to catch up, which
//! keeps an overloaded host from spiraling.
//!
//! The scheduler is the sole writer of servo state. Everything else
//! sees snapshots.

use std::time::{Duration, Instant};

use aves_common::protocol::Message;
use tracing::{debug, info};

use crate::creature::Creature;
use crate::input::InputFrame;
use aves_common::queue::MessageQueue;

/// Per-run counters, updated once per frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameStats {
    /// Frames emitted.
    pub frames: u64,
    /// Frames that finished past their deadline.
    pub overruns: u64,
    /// Position batches evicted from the outgoing queue.
    pub backpressure_drops: u64,
}

/// Advance `deadline` past `now` by a whole number of periods.
///
/// Returns the smallest `deadline + n·period` that is in the future.
/// `n` is 1 on the happy path; larger only after an overrun.
pub fn advance_deadline(deadline: Instant, now: Instant, period: Duration) -> Instant {
    let mut next = deadline + period;
    if next > now {
        return next;
    }
    let behind = now.duration_since(next);
    let skip = behind.as_micros() / period.as_micros() + 1;
    next += period * skip as u32;
    next
}

/// The frame-rate update loop.
pub struct FrameScheduler {
    creature: Creature,
    inputs: MessageQueue<InputFrame>,
    outgoing: MessageQueue<Message>,
    period: Duration,
    stats: FrameStats,
}

impl FrameScheduler {
    pub fn new(
        creature: Creature,
        inputs: MessageQueue<InputFrame>,
        outgoing: MessageQueue<Message>,
    ) -> Self {
        let period = Duration::from_micros(1_000_000 / creature.servo_update_hz() as u64);
        Self {
            creature,
            inputs,
            outgoing,
            period,
            stats: FrameStats::default(),
        }
    }

    /// Run until the stop flag is raised. Consumes the scheduler; the
    /// creature's servo state dies with the loop.
    pub fn run(mut self, stop: &std::sync::atomic::AtomicBool) {
        info!(
            "frame loop running: {} at {} Hz",
            self.creature.name(),
            self.creature.servo_update_hz()
        );

        let mut last_inputs: Option<InputFrame> = None;
        let mut deadline = Instant::now() + self.period;

        while !stop.load(std::sync::atomic::Ordering::SeqCst) {
            self.stats.frames += 1;

            // Freshest input wins; missed frames are stale by definition.
            if let Some(frame) = self.inputs.pop_latest() {
                last_inputs = Some(frame);
            }

            // Until the first frame arrives the servos hold their
            // defaults; there is nothing to map.
            if let Some(inputs) = &last_inputs {
                self.creature.map_inputs(inputs);
            }

            self.creature.bank_mut().tick_all();

            let batch = Message::Pos {
                positions: self.creature.bank().snapshot(),
            };
            if self.outgoing.push_drop_oldest(batch) {
                self.stats.backpressure_drops += 1;
            }

            if self.stats.frames.is_multiple_of(500) {
                debug!(
                    "frames: {} (overruns: {}, drops: {})",
                    self.stats.frames, self.stats.overruns, self.stats.backpressure_drops
                );
            }

            let now = Instant::now();
            if now < deadline {
                std::thread::sleep(deadline - now);
            } else {
                self.stats.overruns += 1;
            }
            deadline = advance_deadline(deadline, Instant::now(), self.period);
        }

        info!(
            "frame loop stopped after {} frames ({} overruns)",
            self.stats.frames, self.stats.overruns
        );
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
