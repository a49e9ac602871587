//! Transport tasks: the line reader, the outbound writer, and the
//! INIT requester.
//!
//! The reader feeds the message processor until the transport drops or
//! the emergency stop latches; the writer drains the outbound queue;
//! the INIT requester asks for configuration once per second for as
//! long as the session sits in Configuring.

use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use aves_common::consts::INIT_REQUEST_INTERVAL_MS;
use aves_common::protocol::Message;
use aves_common::queue::MessageQueue;
use aves_common::session::SessionState;
use aves_common::transport::{TransportReader, TransportWriter};
use tracing::{debug, warn};

use crate::dynamixel::DynamixelBus;
use crate::estop;
use crate::processor::{Disposition, MessageProcessor};
use crate::state::{Counters, FirmwareState};

/// Feed wire lines into the processor until the transport drops.
///
/// An emergency stop parks this thread in the estop idle loop; the
/// message processor is never fed again.
pub fn run_reader<B: DynamixelBus>(
    wire: TransportReader,
    processor: &MessageProcessor<B>,
    state: &FirmwareState,
    stop: &AtomicBool,
) {
    let mut lines = BufReader::new(wire);
    let mut buffer = String::new();

    while !stop.load(Ordering::SeqCst) {
        buffer.clear();
        match lines.read_line(&mut buffer) {
            Ok(0) => {
                debug!("controller transport closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("transport read failed: {e}");
                break;
            }
        }

        if processor.handle_line(&buffer) == Disposition::Halted {
            estop::idle_loop(stop);
            return;
        }
    }

    state.on_disconnected();
}

/// Drain the outbound queue onto the wire.
///
/// Exits with its session: stop flag, emergency stop, or the reader
/// marking the transport gone all wind it down.
pub fn run_writer(
    mut wire: TransportWriter,
    outbound: &MessageQueue<Message>,
    state: &FirmwareState,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::SeqCst)
        && !state.is_emergency_stopped()
        && state.session_state() != SessionState::Idle
    {
        let Some(message) = outbound.pop_timeout(Duration::from_millis(100)) else {
            continue;
        };
        let line = message.to_wire();
        if let Err(e) = wire.write_all(line.as_bytes()).and_then(|()| wire.flush()) {
            warn!("transport write failed: {e}");
            state.on_disconnected();
            return;
        }
        Counters::bump(&state.counters.messages_sent);
    }
}

/// Ask for configuration once per second while unconfigured.
pub struct InitRequester {
    state: Arc<FirmwareState>,
    outbound: MessageQueue<Message>,
}

impl InitRequester {
    pub fn new(state: Arc<FirmwareState>, outbound: MessageQueue<Message>) -> Self {
        Self { state, outbound }
    }

    pub fn run(self, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) {
            if self.state.session_state() == SessionState::Configuring {
                debug!("asking the controller for our configuration");
                self.outbound.push_drop_oldest(Message::init());
            }
            let mut remaining = Duration::from_millis(INIT_REQUEST_INTERVAL_MS);
            while !stop.load(Ordering::SeqCst) && !remaining.is_zero() {
                let slice = remaining.min(Duration::from_millis(100));
                std::thread::sleep(slice);
                remaining -= slice;
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
