//! Link reader: lines off the wire, through the checksum gate, into
//! the right hands.
//!
//! Handshake handling lives here because it must react immediately: a
//! firmware `INIT` is answered with the creature's `CONFIG` records,
//! and `READY` flips the session to Running. Telemetry is queued for
//! the status processor; a full telemetry queue sheds the oldest
//! report first.

use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use aves_common::clock::monotonic_ms;
use aves_common::protocol::checksum::strip_and_verify;
use aves_common::protocol::{Message, MotorConfigRecord};
use aves_common::session::SessionEvent;
use aves_common::transport::TransportReader;
use tracing::{debug, info, warn};

use crate::link::LinkShared;
use aves_common::queue::MessageQueue;

/// Read lines until the transport drops.
pub fn run(
    wire: TransportReader,
    generation: u64,
    shared: Arc<LinkShared>,
    incoming: MessageQueue<Message>,
    outgoing: MessageQueue<Message>,
    config_records: Vec<MotorConfigRecord>,
) {
    let mut lines = BufReader::new(wire);
    let mut buffer = String::new();

    loop {
        buffer.clear();
        match lines.read_line(&mut buffer) {
            Ok(0) => {
                debug!("link reader: transport closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("link read failed: {e}");
                break;
            }
        }

        if !shared.is_current(generation) {
            // A newer connection took over while we were blocked.
            return;
        }

        let line = buffer.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }

        let payload = match strip_and_verify(line) {
            Ok(p) => p,
            Err(e) => {
                warn!("dropping line with bad checksum: {e}");
                shared
                    .counters
                    .checksum_errors
                    .fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        let message = match Message::parse(payload) {
            Ok(m) => m,
            Err(e) => {
                warn!("dropping unparsable line: {e}");
                shared.counters.parse_errors.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        shared
            .counters
            .messages_received
            .fetch_add(1, Ordering::Relaxed);

        dispatch(message, &shared, &incoming, &outgoing, &config_records);
    }

    shared.end_connection(generation);
}

fn dispatch(
    message: Message,
    shared: &LinkShared,
    incoming: &MessageQueue<Message>,
    outgoing: &MessageQueue<Message>,
    config_records: &[MotorConfigRecord],
) {
    match message {
        Message::Init { protocol_version } => {
            info!("firmware requests configuration (protocol v{protocol_version})");
            // A re-handshake mid-session restarts configuration.
            shared.handle_session_event(SessionEvent::Connected);
            outgoing.push(Message::Config {
                records: config_records.to_vec(),
            });
        }
        Message::Ready => {
            info!("firmware is ready, session running");
            shared.handle_session_event(SessionEvent::ConfigAccepted);
        }
        Message::Pong { ms } => {
            shared
                .counters
                .last_pong_ms
                .store(monotonic_ms().max(1), Ordering::Relaxed);
            debug!("pong: firmware clock at {ms}ms");
        }
        Message::EStop => {
            // Only the host originates ESTOP; seeing one inbound means
            // something is very confused on the other end.
            warn!("unexpected inbound ESTOP, ignoring");
        }
        telemetry @ (Message::Stats { .. }
        | Message::MotorSense { .. }
        | Message::BoardSense { .. }
        | Message::Log { .. }) => {
            incoming.push_drop_oldest(telemetry);
        }
        other => {
            warn!("unexpected inbound {} message, ignoring", other.type_token());
        }
    }
}
