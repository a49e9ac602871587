//! Link writer: drains the outgoing queue onto the wire.
//!
//! Gate policy: until the session is Running, only handshake and
//! safety traffic goes out. Position batches are dropped silently —
//! they would bounce off the firmware's safety gate anyway, and a
//! stale one arriving after `READY` is worse than none.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use aves_common::protocol::Message;
use aves_common::transport::TransportWriter;
use tracing::{trace, warn};

use crate::link::LinkShared;
use aves_common::queue::MessageQueue;

/// Poll interval for the stop flag and connection generation.
const POLL: Duration = Duration::from_millis(100);

/// Whether a message may pass before the session reaches Running.
fn passes_gate(message: &Message) -> bool {
    matches!(
        message,
        Message::Init { .. } | Message::Config { .. } | Message::Ping { .. } | Message::EStop
    )
}

/// Drain `outgoing` onto `wire` until the connection dies or a stop is
/// requested.
pub fn run(
    mut wire: TransportWriter,
    generation: u64,
    shared: &LinkShared,
    outgoing: &MessageQueue<Message>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::SeqCst) && shared.is_current(generation) {
        let Some(message) = outgoing.pop_timeout(POLL) else {
            continue;
        };

        if !matches!(shared.session_state(), aves_common::session::SessionState::Running) && !passes_gate(&message) {
            shared
                .counters
                .dropped_not_running
                .fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let line = message.to_wire();
        trace!("sending: {}", line.trim_end());

        if let Err(e) = wire.write_all(line.as_bytes()).and_then(|()| wire.flush()) {
            warn!("link write failed: {e}");
            shared.end_connection(generation);
            return;
        }
        shared
            .counters
            .messages_sent
            .fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_passes_handshake_and_safety_traffic() {
        assert!(passes_gate(&Message::init()));
        assert!(passes_gate(&Message::Config { records: vec![] }));
        assert!(passes_gate(&Message::Ping { ms: 1 }));
        assert!(passes_gate(&Message::EStop));
    }

    #[test]
    fn gate_blocks_position_batches() {
        assert!(!passes_gate(&Message::Pos { positions: vec![] }));
        assert!(!passes_gate(&Message::Ready));
    }
}
