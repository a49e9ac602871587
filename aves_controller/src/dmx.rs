//! Raw universe frame intake.
//!
//! The E1.31 multicast client is an external collaborator; what it owes
//! us is a stream of 512-byte universe frames. This receiver is the
//! socket end of that contract: it accepts bare universe payloads on a
//! UDP port, maps them through the creature's input mapper, and queues
//! the result for the scheduler. Short or oversized datagrams are
//! dropped with a counter bump.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use aves_common::consts::DMX_UNIVERSE_SIZE;
use aves_common::error::ControllerError;
use tracing::{debug, info, warn};

use crate::input::{InputFrame, InputMapper, UniverseFrame};
use aves_common::queue::MessageQueue;

/// Default port for raw universe frames (the sACN port).
pub const DEFAULT_DMX_PORT: u16 = 5568;

/// The input-reader task.
pub struct UniverseReceiver {
    socket: UdpSocket,
    mapper: InputMapper,
    inputs: MessageQueue<InputFrame>,
    frames_received: u64,
    frames_rejected: u64,
}

impl UniverseReceiver {
    /// Bind to `bind_addr` (e.g. `0.0.0.0:5568`).
    pub fn bind(
        bind_addr: &str,
        mapper: InputMapper,
        inputs: MessageQueue<InputFrame>,
    ) -> Result<Self, ControllerError> {
        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| ControllerError::TransportError(format!("bind {bind_addr}: {e}")))?;
        socket
            .set_read_timeout(Some(Duration::from_millis(100)))
            .map_err(|e| ControllerError::TransportError(format!("socket timeout: {e}")))?;
        info!("listening for universe frames on {bind_addr}");
        Ok(Self {
            socket,
            mapper,
            inputs,
            frames_received: 0,
            frames_rejected: 0,
        })
    }

    /// Local address actually bound (useful when the port was 0).
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// Receive frames until stopped.
    pub fn run(mut self, stop: &AtomicBool) {
        let mut buffer = [0u8; 1024];
        while !stop.load(Ordering::SeqCst) {
            let n = match self.socket.recv(&mut buffer) {
                Ok(n) => n,
                // Timeout: just check the stop flag and go again.
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    warn!("universe socket error: {e}");
                    continue;
                }
            };

            if n != DMX_UNIVERSE_SIZE as usize {
                self.frames_rejected += 1;
                warn!(
                    "ignoring datagram of {n} bytes (want {DMX_UNIVERSE_SIZE}); {} rejected so far",
                    self.frames_rejected
                );
                continue;
            }

            let mut frame: UniverseFrame = [0; DMX_UNIVERSE_SIZE as usize];
            frame.copy_from_slice(&buffer[..DMX_UNIVERSE_SIZE as usize]);

            self.frames_received += 1;
            if self.frames_received == 1 {
                info!("first universe frame received");
            } else if self.frames_received.is_multiple_of(1000) {
                debug!("universe frames received: {}", self.frames_received);
            }

            self.inputs.push_drop_oldest(self.mapper.map(&frame));
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
