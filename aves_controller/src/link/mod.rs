//! The host side of the controller ↔ module link.
//!
//! A supervisor owns the transport lifecycle: connect, split into a
//! reader and a writer, and when either half loses the wire, fall back
//! to a once-per-second reconnect probe. While disconnected (and while
//! connected but not yet `READY`) normal outbound traffic is dropped
//! silently — position batches are idempotent, and the firmware's
//! safety gate would ignore them anyway. `PING`, `INIT`, `CONFIG`, and
//! `ESTOP` always pass.
//!
//! Inbound lines go through the checksum gate, then parse, then
//! dispatch: handshake messages are handled here (a firmware `INIT`
//! is answered with the creature's `CONFIG`; `READY` moves the session
//! to Running), `PONG` feeds the heartbeat tracker, and everything
//! else is queued for the telemetry processor.
//!
//! Connections are numbered. A reader half can sit in a blocking read
//! long after its transport died; the generation tag keeps such a
//! straggler from flipping state under a newer connection.

pub mod ping;
pub mod reader;
pub mod writer;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use aves_common::protocol::{Message, MotorConfigRecord};
use aves_common::session::{SessionEvent, SessionMachine, SessionState, Transition};
use aves_common::transport::TransportFactory;
use parking_lot::Mutex;
use tracing::{info, warn};

use aves_common::queue::MessageQueue;

/// Link counters. All relaxed atomics; these are diagnostics, not
/// coordination.
#[derive(Debug, Default)]
pub struct LinkCounters {
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub checksum_errors: AtomicU64,
    pub parse_errors: AtomicU64,
    pub dropped_not_running: AtomicU64,
    pub reconnects: AtomicU64,
    /// Monotonic ms of the last `PONG`, 0 until the first one.
    pub last_pong_ms: AtomicU64,
}

impl LinkCounters {
    /// Point-in-time copy for logs and server events.
    pub fn snapshot(&self) -> LinkStats {
        LinkStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            dropped_not_running: self.dropped_not_running.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`LinkCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub checksum_errors: u64,
    pub parse_errors: u64,
    pub dropped_not_running: u64,
    pub reconnects: u64,
}

/// State shared between the supervisor, both halves, and the ping task.
pub struct LinkShared {
    session: Mutex<SessionMachine>,
    pub counters: LinkCounters,
    /// Generation of the live connection; 0 while disconnected.
    connection_gen: AtomicU64,
}

impl Default for LinkShared {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkShared {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(SessionMachine::new()),
            counters: LinkCounters::default(),
            connection_gen: AtomicU64::new(0),
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
            info!("link session: {before:?} -> {after:?}");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_gen.load(Ordering::SeqCst) != 0
    }

    fn begin_connection(&self, generation: u64) {
        self.connection_gen.store(generation, Ordering::SeqCst);
        self.handle_session_event(SessionEvent::Connected);
    }

    /// Tear down connection `generation`; a no-op if a newer one has
    /// already taken over.
    pub(crate) fn end_connection(&self, generation: u64) {
        if self
            .connection_gen
            .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.handle_session_event(SessionEvent::Disconnected);
        }
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.connection_gen.load(Ordering::SeqCst) == generation
    }
}

/// The link supervisor.
pub struct Link {
    shared: Arc<LinkShared>,
    outgoing: MessageQueue<Message>,
    incoming: MessageQueue<Message>,
    factory: TransportFactory,
    config_records: Vec<MotorConfigRecord>,
}

impl Link {
    pub fn new(
        factory: TransportFactory,
        outgoing: MessageQueue<Message>,
        incoming: MessageQueue<Message>,
        config_records: Vec<MotorConfigRecord>,
    ) -> Self {
        Self {
            shared: Arc::new(LinkShared::new()),
            outgoing,
            incoming,
            factory,
            config_records,
        }
    }

    /// Shared handle for the ping task and the watchdog.
    pub fn shared(&self) -> Arc<LinkShared> {
        Arc::clone(&self.shared)
    }

    /// Run the connect/reconnect loop until stopped.
    pub fn run(self, stop: &AtomicBool) {
        let mut generation = 0u64;

        while !stop.load(Ordering::SeqCst) {
            let transport = match (self.factory)() {
                Ok(t) => t,
                Err(e) => {
                    if generation == 0 {
                        warn!("link transport unavailable: {e}");
                    }
                    // Reconnect probe cadence while down: one per second.
                    std::thread::sleep(Duration::from_secs(1));
                    continue;
                }
            };

            info!("link transport up: {}", transport.description());
            if generation > 0 {
                self.shared.counters.reconnects.fetch_add(1, Ordering::Relaxed);
            }
            generation += 1;
            self.shared.begin_connection(generation);

            let (read_half, write_half) = transport.split();

            // The reader owns the blocking read. It is deliberately not
            // joined: a dead serial port can leave it parked in read()
            // indefinitely, and the generation tag already fences off
            // anything it might do late.
            let reader_shared = Arc::clone(&self.shared);
            let reader_incoming = self.incoming.clone();
            let reader_outgoing = self.outgoing.clone();
            let reader_records = self.config_records.clone();
            let _ = std::thread::Builder::new()
                .name(format!("link-reader-{generation}"))
                .spawn(move || {
                    reader::run(
                        read_half,
                        generation,
                        reader_shared,
                        reader_incoming,
                        reader_outgoing,
                        reader_records,
                    );
                })
                .expect("thread spawn");

            // The writer runs inline; it polls the stop flag and the
            // generation, so the supervisor regains control on either.
            writer::run(write_half, generation, &self.shared, &self.outgoing, stop);

            self.shared.end_connection(generation);

            if !stop.load(Ordering::SeqCst) {
                warn!("link transport lost, reconnecting");
            }
        }
        info!("link supervisor stopped");
    }
}
