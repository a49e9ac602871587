//! Process-wide firmware state.
//!
//! These values are global because the hardware they reflect is global:
//! one PWM block, one power tree, one link to the controller. They live
//! in a single struct passed by reference. The flags the wrap handler
//! reads are single-word atomics; everything else hides behind the
//! session mutex, which the handler never takes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use aves_common::session::{SessionEvent, SessionMachine, SessionState, Transition};
use parking_lot::Mutex;
use tracing::info;

/// Counters reported in `STATS`. Relaxed atomics throughout; they are
/// diagnostics, not coordination.
#[derive(Debug, Default)]
pub struct Counters {
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub successful_parses: AtomicU64,
    pub failed_parses: AtomicU64,
    pub checksum_errors: AtomicU64,
    pub position_messages: AtomicU64,
    pub positions_dropped_unsafe: AtomicU64,
    pub positions_rejected: AtomicU64,
}

impl Counters {
    #[inline]
    pub fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// The firmware's global mutable state.
#[derive(Debug)]
pub struct FirmwareState {
    session: Mutex<SessionMachine>,
    /// A valid `CONFIG` has been applied since the last (re)connect.
    config_received: AtomicBool,
    /// At least one `POS` frame has arrived since the last (re)connect.
    first_frame_received: AtomicBool,
    /// The one flag the wrap handler consults. Derived:
    /// `config_received && first_frame_received && !emergency_stop`.
    safe_to_run: AtomicBool,
    emergency_stop: AtomicBool,
    /// Wrap-handler invocations since boot.
    pub pwm_wraps: AtomicU64,
    pub counters: Counters,
}

impl Default for FirmwareState {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwareState {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(SessionMachine::new()),
            config_received: AtomicBool::new(false),
            first_frame_received: AtomicBool::new(false),
            safe_to_run: AtomicBool::new(false),
            emergency_stop: AtomicBool::new(false),
            pwm_wraps: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.session.lock().state()
    }

    pub fn handle_session_event(&self, event: SessionEvent) {
        let mut session = self.session.lock();
        let before = session.state();
        if let Transition::Ok(after) = session.handle_event(event)
            && before != after
        {
            info!("firmware session: {before:?} -> {after:?}");
        }
    }

    /// Whether the wrap handler may write duty cycles.
    #[inline]
    pub fn safe_to_run(&self) -> bool {
        self.safe_to_run.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stop.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn has_first_frame(&self) -> bool {
        self.first_frame_received.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn is_configured(&self) -> bool {
        self.config_received.load(Ordering::SeqCst)
    }

    /// Transport (re)connected: configuration starts over.
    pub fn on_connected(&self) {
        self.safe_to_run.store(false, Ordering::SeqCst);
        self.first_frame_received.store(false, Ordering::SeqCst);
        self.handle_session_event(SessionEvent::Connected);
    }

    /// Transport lost: close the gate, forget the first frame.
    pub fn on_disconnected(&self) {
        self.safe_to_run.store(false, Ordering::SeqCst);
        self.first_frame_received.store(false, Ordering::SeqCst);
        self.handle_session_event(SessionEvent::Disconnected);
    }

    /// A valid `CONFIG` was applied.
    pub fn on_config_accepted(&self) {
        self.config_received.store(true, Ordering::SeqCst);
        self.handle_session_event(SessionEvent::ConfigAccepted);
        self.update_safety_gate();
    }

    /// A `CONFIG` failed to apply; keep asking.
    pub fn on_config_failed(&self) {
        self.handle_session_event(SessionEvent::ConfigFailed);
    }

    /// The first `POS` frame of this session arrived.
    ///
    /// Returns true when this call flipped the latch.
    pub fn on_first_frame(&self) -> bool {
        let first = !self.first_frame_received.swap(true, Ordering::SeqCst);
        if first {
            self.update_safety_gate();
        }
        first
    }

    /// Latch the emergency stop. One way; only a power cycle clears it.
    pub fn on_emergency_stop(&self) {
        self.emergency_stop.store(true, Ordering::SeqCst);
        self.safe_to_run.store(false, Ordering::SeqCst);
        self.handle_session_event(SessionEvent::EmergencyStop);
    }

    fn update_safety_gate(&self) {
        let safe = self.config_received.load(Ordering::SeqCst)
            && self.first_frame_received.load(Ordering::SeqCst)
            && !self.emergency_stop.load(Ordering::SeqCst);
        let was = self.safe_to_run.swap(safe, Ordering::SeqCst);
        if safe && !was {
            info!("safety gate open: configured and first frame received");
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_needs_config_and_first_frame() {
        let s = FirmwareState::new();
        s.on_connected();
        assert!(!s.safe_to_run());

        s.on_config_accepted();
        assert!(!s.safe_to_run(), "config alone must not open the gate");

        s.on_first_frame();
        assert!(s.safe_to_run());
    }

    #[test]
    fn first_frame_alone_does_not_open_the_gate() {
        let s = FirmwareState::new();
        s.on_connected();
        s.on_first_frame();
        assert!(!s.safe_to_run());
    }

    #[test]
    fn disconnect_closes_the_gate() {
        let s = FirmwareState::new();
        s.on_connected();
        s.on_config_accepted();
        s.on_first_frame();
        assert!(s.safe_to_run());

        s.on_disconnected();
        assert!(!s.safe_to_run());
        assert!(!s.has_first_frame());
    }

    #[test]
    fn estop_closes_the_gate_forever() {
        let s = FirmwareState::new();
        s.on_connected();
        s.on_config_accepted();
        s.on_first_frame();
        s.on_emergency_stop();
        assert!(!s.safe_to_run());

        // Even a fresh config + frame cannot reopen it.
        s.on_config_accepted();
        s.on_first_frame();
        assert!(!s.safe_to_run());
        assert!(s.is_emergency_stopped());
        assert_eq!(
            s.session_state(),
            aves_common::session::SessionState::Stopped
        );
    }

    #[test]
    fn first_frame_latch_reports_only_once() {
        let s = FirmwareState::new();
        s.on_connected();
        assert!(s.on_first_frame());
        assert!(!s.on_first_frame());
    }
}
