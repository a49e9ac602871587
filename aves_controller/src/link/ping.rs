//! Heartbeat task.
//!
//! Sends `PING <ms>` every five seconds and watches the pong tracker
//! the reader maintains. Three missed intervals marks the link
//! unhealthy: a warning event goes to the server channel once per
//! outage, and the log gets one line per missed check.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use aves_common::clock::monotonic_ms;
use aves_common::consts::{PING_INTERVAL_MS, PING_MISS_LIMIT};
use aves_common::protocol::Message;
use tracing::{debug, warn};

use crate::link::LinkShared;
use aves_common::queue::MessageQueue;
use crate::server::ServerEvent;

/// The heartbeat loop.
pub struct PingTask {
    shared: Arc<LinkShared>,
    outgoing: MessageQueue<Message>,
    events: MessageQueue<ServerEvent>,
}

impl PingTask {
    pub fn new(
        shared: Arc<LinkShared>,
        outgoing: MessageQueue<Message>,
        events: MessageQueue<ServerEvent>,
    ) -> Self {
        Self {
            shared,
            outgoing,
            events,
        }
    }

    /// Send pings until stopped.
    pub fn run(self, stop: &AtomicBool) {
        let interval = Duration::from_millis(PING_INTERVAL_MS);
        let unhealthy_after = PING_INTERVAL_MS * PING_MISS_LIMIT as u64;
        let mut reported_unhealthy = false;
        // Grace for the first check: the firmware cannot have ponged
        // before we ever pinged.
        let mut first_ping_ms = None;

        while !stop.load(Ordering::SeqCst) {
            let now = monotonic_ms();
            // Drop-oldest: while the link is down nothing drains the
            // queue, and a stale ping is worthless anyway.
            self.outgoing.push_drop_oldest(Message::Ping { ms: now });
            first_ping_ms.get_or_insert(now);
            debug!("ping: {now}ms, {:?}", self.shared.counters.snapshot());

            let last_pong = self.shared.counters.last_pong_ms.load(Ordering::Relaxed);
            let reference = if last_pong == 0 {
                first_ping_ms.unwrap_or(now)
            } else {
                last_pong
            };

            if self.shared.is_connected() && now.saturating_sub(reference) > unhealthy_after {
                warn!(
                    "link unhealthy: no PONG for {}ms",
                    now.saturating_sub(reference)
                );
                if !reported_unhealthy {
                    self.events.push_drop_oldest(ServerEvent::warning(
                        "link",
                        format!("no PONG for {}ms", now.saturating_sub(reference)),
                    ));
                    reported_unhealthy = true;
                }
            } else if reported_unhealthy && last_pong != 0 {
                debug!("link healthy again");
                reported_unhealthy = false;
            }

            // Sleep in short slices so stop requests land quickly.
            let mut remaining = interval;
            while !stop.load(Ordering::SeqCst) && !remaining.is_zero() {
                let slice = remaining.min(Duration::from_millis(100));
                std::thread::sleep(slice);
                remaining -= slice;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pings_carry_monotonic_time() {
        let shared = Arc::new(LinkShared::new());
        let outgoing = MessageQueue::bounded(4);
        let events = MessageQueue::bounded(4);
        let task = PingTask::new(Arc::clone(&shared), outgoing.clone(), events);

        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);
        let handle = std::thread::spawn(move || task.run(&stop_thread));
        std::thread::sleep(Duration::from_millis(30));
        stop.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        match outgoing.try_pop().expect("one ping must have gone out") {
            Message::Ping { .. } => {}
            other => panic!("expected PING, got {other:?}"),
        }
    }
}
