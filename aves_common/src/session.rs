//! Session phases shared by both ends of the link.
//!
//! Boot → Idle. A transport connection starts configuration; an accepted
//! `CONFIG` starts the running phase. Stopped is the emergency-stop
//! state and is absorbing: once entered, nothing but a power cycle gets
//! out.

/// Phase of a controller ↔ module session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport, or transport lost. The firmware idles here.
    Idle,
    /// Transport up, configuration not yet accepted. The firmware asks
    /// for its config once per second in this state.
    Configuring,
    /// Configuration accepted; position frames flow.
    Running,
    /// An internal invariant broke. Exits only through a disconnect.
    Errored,
    /// Emergency stop. Terminal.
    Stopped,
}

/// Event that can move a session between phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport came up (or the peer requested a re-handshake).
    Connected,
    /// A valid `CONFIG` was applied and `READY` went out.
    ConfigAccepted,
    /// A `CONFIG` failed to apply. The session stays in Configuring and
    /// keeps asking.
    ConfigFailed,
    /// Transport dropped.
    Disconnected,
    /// `ESTOP` received or raised locally.
    EmergencyStop,
    /// A logic invariant broke.
    InternalFault,
}

/// Result of a transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Transition succeeded, with the new state.
    Ok(SessionState),
    /// Transition rejected, with the reason.
    Rejected(&'static str),
}

/// Session phase tracker.
///
/// Both the firmware and the host link hold one of these; they converge
/// because the same wire events drive both.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    /// New session in Idle.
    pub const fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    /// Current phase.
    #[inline]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether position frames may be acted on.
    #[inline]
    pub const fn allows_motion(&self) -> bool {
        matches!(self.state, SessionState::Running)
    }

    /// Whether the emergency stop latch has been taken.
    #[inline]
    pub const fn is_stopped(&self) -> bool {
        matches!(self.state, SessionState::Stopped)
    }

    /// Attempt a transition.
    pub fn handle_event(&mut self, event: SessionEvent) -> Transition {
        use SessionEvent::*;
        use SessionState::*;

        let next = match (self.state, event) {
            // The latch never releases.
            (Stopped, _) => return Transition::Rejected("stopped: power cycle required"),

            (_, EmergencyStop) => Stopped,
            (_, InternalFault) => Errored,

            (Idle, Connected) => Configuring,
            // A re-handshake while running or errored restarts configuration.
            (Running, Connected) => Configuring,
            (Errored, Connected) => Configuring,
            (Configuring, Connected) => Configuring,

            (Configuring, ConfigAccepted) => Running,
            (Configuring, ConfigFailed) => Configuring,

            (_, Disconnected) => Idle,

            _ => return Transition::Rejected(invalid_reason(self.state, event)),
        };

        self.state = next;
        Transition::Ok(next)
    }
}

fn invalid_reason(state: SessionState, event: SessionEvent) -> &'static str {
    use SessionEvent::*;
    use SessionState::*;
    match (state, event) {
        (Idle, ConfigAccepted | ConfigFailed) => "idle: no configuration in flight",
        (Running, ConfigAccepted | ConfigFailed) => "running: already configured",
        (Errored, ConfigAccepted | ConfigFailed) => "errored: reconnect required",
        _ => "invalid event for current state",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use SessionEvent::*;
    use SessionState::*;

    #[test]
    fn boot_sequence() {
        let mut sm = SessionMachine::new();
        assert_eq!(sm.state(), Idle);
        assert_eq!(sm.handle_event(Connected), Transition::Ok(Configuring));
        assert_eq!(sm.handle_event(ConfigAccepted), Transition::Ok(Running));
        assert!(sm.allows_motion());
    }

    #[test]
    fn config_failure_keeps_asking() {
        let mut sm = SessionMachine::new();
        sm.handle_event(Connected);
        assert_eq!(sm.handle_event(ConfigFailed), Transition::Ok(Configuring));
        assert!(!sm.allows_motion());
    }

    #[test]
    fn disconnect_returns_to_idle() {
        let mut sm = SessionMachine::new();
        sm.handle_event(Connected);
        sm.handle_event(ConfigAccepted);
        assert_eq!(sm.handle_event(Disconnected), Transition::Ok(Idle));
    }

    #[test]
    fn rehandshake_while_running_reconfigures() {
        let mut sm = SessionMachine::new();
        sm.handle_event(Connected);
        sm.handle_event(ConfigAccepted);
        assert_eq!(sm.handle_event(Connected), Transition::Ok(Configuring));
    }

    #[test]
    fn estop_from_every_state() {
        for initial in [Idle, Configuring, Running, Errored] {
            let mut sm = SessionMachine { state: initial };
            assert_eq!(
                sm.handle_event(EmergencyStop),
                Transition::Ok(Stopped),
                "EmergencyStop from {initial:?} should latch"
            );
        }
    }

    #[test]
    fn stopped_is_absorbing() {
        let mut sm = SessionMachine { state: Stopped };
        for event in [
            Connected,
            ConfigAccepted,
            ConfigFailed,
            Disconnected,
            EmergencyStop,
            InternalFault,
        ] {
            assert!(
                matches!(sm.handle_event(event), Transition::Rejected(_)),
                "{event:?} must not exit Stopped"
            );
            assert_eq!(sm.state(), Stopped);
        }
    }

    #[test]
    fn fault_then_reconnect_recovers() {
        let mut sm = SessionMachine::new();
        sm.handle_event(Connected);
        sm.handle_event(InternalFault);
        assert_eq!(sm.state(), Errored);
        assert_eq!(sm.handle_event(Connected), Transition::Ok(Configuring));
    }

    #[test]
    fn motion_gate() {
        assert!(!SessionMachine { state: Idle }.allows_motion());
        assert!(!SessionMachine { state: Configuring }.allows_motion());
        assert!(SessionMachine { state: Running }.allows_motion());
        assert!(!SessionMachine { state: Errored }.allows_motion());
        assert!(!SessionMachine { state: Stopped }.allows_motion());
    }
}
