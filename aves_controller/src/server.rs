//! Outbound events for the presentation server.
//!
//! The WebSocket connection itself lives outside this crate; what we
//! own is the bounded queue of events and their JSON shape. The writer
//! worker serializes each event and hands the line to an [`EventSink`].
//! The default sink logs, which is exactly what a controller without a
//! server connection should do with warnings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use aves_common::queue::MessageQueue;

/// An event bound for the presentation server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A watchdog or link warning.
    Warning { source: String, message: String },
    /// The emergency stop was triggered, with the reason.
    EmergencyStop { reason: String },
    /// The link session changed phase.
    SessionChanged { state: String },
    /// Anything informational.
    Notice { message: String },
}

impl ServerEvent {
    pub fn warning(source: &str, message: impl Into<String>) -> Self {
        Self::Warning {
            source: source.to_string(),
            message: message.into(),
        }
    }

    pub fn emergency_stop(reason: impl Into<String>) -> Self {
        Self::EmergencyStop {
            reason: reason.into(),
        }
    }
}

/// Destination for serialized events.
pub trait EventSink: Send {
    fn deliver(&mut self, json: &str);
}

/// Fallback sink: events land in the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn deliver(&mut self, json: &str) {
        info!("server event: {json}");
    }
}

/// Drains the event queue into a sink until stopped.
pub struct ServerWriter {
    events: MessageQueue<ServerEvent>,
    sink: Box<dyn EventSink>,
}

impl ServerWriter {
    pub fn new(events: MessageQueue<ServerEvent>, sink: Box<dyn EventSink>) -> Self {
        Self { events, sink }
    }

    pub fn run(mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) {
            let Some(event) = self.events.pop_timeout(Duration::from_millis(100)) else {
                continue;
            };
            match serde_json::to_string(&event) {
                Ok(json) => self.sink.deliver(&json),
                Err(e) => warn!("failed to serialize server event: {e}"),
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
