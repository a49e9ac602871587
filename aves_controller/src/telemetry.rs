//! Inbound firmware telemetry.
//!
//! The status processor consumes everything the link reader queues:
//! `STATS` counter reports land in the debug log, `MSENSE`/`BSENSE`
//! snapshots merge into a board telemetry record that feeds the
//! watchdog, and `LOG` lines re-emit through tracing at their carried
//! level so the firmware's logs interleave with ours.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use aves_common::clock::monotonic_ms;
use aves_common::protocol::{LogLevel, Message, MotorSenseReading, RailReading};
use tracing::{debug, error, info, trace, warn};

use aves_common::queue::MessageQueue;

/// Merged firmware telemetry, one record per `BSENSE` report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardTelemetry {
    pub temperature_f: f64,
    pub rails: Vec<RailReading>,
    /// Most recent `MSENSE` readings, possibly older than the rails.
    pub motors: Vec<MotorSenseReading>,
    /// Monotonic ms at which the record was assembled.
    pub updated_ms: u64,
}

impl BoardTelemetry {
    /// Look up a rail by its wire name (`VBUS`, `MP_IN`, `3V3`, `5V`).
    pub fn rail(&self, name: &str) -> Option<&RailReading> {
        self.rails.iter().find(|r| r.name == name)
    }
}

/// The telemetry consumer task.
pub struct StatusProcessor {
    incoming: MessageQueue<Message>,
    telemetry_out: MessageQueue<BoardTelemetry>,
    last_motors: Vec<MotorSenseReading>,
}

impl StatusProcessor {
    pub fn new(
        incoming: MessageQueue<Message>,
        telemetry_out: MessageQueue<BoardTelemetry>,
    ) -> Self {
        Self {
            incoming,
            telemetry_out,
            last_motors: Vec::new(),
        }
    }

    pub fn run(mut self, stop: &AtomicBool) {
        while !stop.load(Ordering::SeqCst) {
            let Some(message) = self.incoming.pop_timeout(Duration::from_millis(100)) else {
                continue;
            };
            self.handle(message);
        }
    }

    /// Process one inbound telemetry message.
    pub fn handle(&mut self, message: Message) {
        match message {
            Message::Stats { entries } => {
                let formatted: Vec<String> =
                    entries.iter().map(|(k, v)| format!("{k}={v}")).collect();
                debug!("firmware stats: {}", formatted.join(" "));
            }
            Message::MotorSense { motors } => {
                trace!("motor sense: {} motors", motors.len());
                self.last_motors = motors;
            }
            Message::BoardSense { board } => {
                let record = BoardTelemetry {
                    temperature_f: board.temperature_f,
                    rails: board.rails,
                    motors: self.last_motors.clone(),
                    updated_ms: monotonic_ms(),
                };
                trace!(
                    "board sense: {:.2}F, {} rails",
                    record.temperature_f,
                    record.rails.len()
                );
                self.telemetry_out.push_drop_oldest(record);
            }
            Message::Log {
                timestamp_ms,
                level,
                text,
            } => match level {
                LogLevel::Verbose | LogLevel::Debug => debug!("[firmware {timestamp_ms}] {text}"),
                LogLevel::Info => info!("[firmware {timestamp_ms}] {text}"),
                LogLevel::Warning => warn!("[firmware {timestamp_ms}] {text}"),
                LogLevel::Error | LogLevel::Fatal => error!("[firmware {timestamp_ms}] {text}"),
            },
            other => {
                warn!("status processor ignoring {}", other.type_token());
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use aves_common::protocol::BoardSenseReading;

    fn processor() -> (StatusProcessor, MessageQueue<BoardTelemetry>) {
        let incoming = MessageQueue::bounded(8);
        let out = MessageQueue::bounded(8);
        (StatusProcessor::new(incoming, out.clone()), out)
    }

    fn board_sense(temp: f64) -> Message {
        Message::BoardSense {
            board: BoardSenseReading {
                temperature_f: temp,
                rails: vec![RailReading {
                    name: "MP_IN".into(),
                    volts: 12.0,
                    amps: 1.5,
                    watts: 18.0,
                }],
            },
        }
    }

    #[test]
    fn board_sense_produces_a_telemetry_record() {
        let (mut p, out) = processor();
        p.handle(board_sense(85.0));
        let record = out.try_pop().unwrap();
        assert_eq!(record.temperature_f, 85.0);
        assert_eq!(record.rail("MP_IN").unwrap().amps, 1.5);
        assert!(record.rail("5V").is_none());
    }

    #[test]
    fn motor_sense_rides_along_with_the_next_board_record() {
        let (mut p, out) = processor();
        p.handle(Message::MotorSense {
            motors: vec![MotorSenseReading {
                index: 2,
                position: 700,
                volts: 5.0,
                amps: 0.3,
                watts: 1.5,
            }],
        });
        assert!(out.try_pop().is_none(), "MSENSE alone emits nothing");

        p.handle(board_sense(80.0));
        let record = out.try_pop().unwrap();
        assert_eq!(record.motors.len(), 1);
        assert_eq!(record.motors[0].index, 2);
    }

    #[test]
    fn stats_and_logs_do_not_emit_telemetry() {
        let (mut p, out) = processor();
        p.handle(Message::Stats {
            entries: vec![("CHKFAIL".into(), 1)],
        });
        p.handle(Message::Log {
            timestamp_ms: 5,
            level: LogLevel::Error,
            text: "brownout".into(),
        });
        assert!(out.try_pop().is_none());
    }
}
