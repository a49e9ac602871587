//! Periodic wire reports: `STATS`, `MSENSE`, `BSENSE`.
//!
//! Counters every twenty seconds, sensors every five, matching what
//! the host-side watchdog expects to chew on. Message assembly is
//! split out as plain functions so the tests can check shapes without
//! spinning threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use aves_common::consts::{
    MOTOR_MAP_SIZE, SENSOR_REPORT_INTERVAL_MS, STATS_REPORT_INTERVAL_MS,
};
use aves_common::protocol::{BoardSenseReading, Message, MotorSenseReading, RailReading};
use aves_common::queue::MessageQueue;

use crate::sensors::{BoardRail, BoardSensors};
use crate::state::{Counters, FirmwareState};

/// Assemble the `STATS` counter report.
pub fn stats_message(state: &FirmwareState) -> Message {
    let c = &state.counters;
    Message::Stats {
        entries: vec![
            ("MSG_RECV".into(), Counters::get(&c.messages_received)),
            ("MSG_SENT".into(), Counters::get(&c.messages_sent)),
            ("S_PARSE".into(), Counters::get(&c.successful_parses)),
            ("F_PARSE".into(), Counters::get(&c.failed_parses)),
            ("CHKFAIL".into(), Counters::get(&c.checksum_errors)),
            ("POS_PROC".into(), Counters::get(&c.position_messages)),
            ("POS_DROP".into(), Counters::get(&c.positions_dropped_unsafe)),
            ("POS_REJ".into(), Counters::get(&c.positions_rejected)),
            ("PWM_WRAPS".into(), state.pwm_wraps.load(Ordering::Relaxed)),
        ],
    }
}

/// Assemble the per-motor `MSENSE` report.
pub fn motor_sense_message(sensors: &dyn BoardSensors) -> Message {
    let motors = (0..MOTOR_MAP_SIZE)
        .map(|index| {
            let power = sensors.motor_power(index);
            MotorSenseReading {
                index: index as u8,
                position: sensors.motor_position(index),
                volts: power.volts,
                amps: power.amps,
                watts: power.watts,
            }
        })
        .collect();
    Message::MotorSense { motors }
}

/// Assemble the board-level `BSENSE` report.
pub fn board_sense_message(sensors: &dyn BoardSensors) -> Message {
    let rails = BoardRail::ALL
        .iter()
        .map(|rail| {
            let sample = sensors.board_rail(*rail);
            RailReading {
                name: rail.wire_name().to_string(),
                volts: sample.volts,
                amps: sample.amps,
                watts: sample.watts,
            }
        })
        .collect();
    Message::BoardSense {
        board: BoardSenseReading {
            temperature_f: sensors.board_temperature_f(),
            rails,
        },
    }
}

/// Counter reporter task.
pub struct StatsReporter {
    state: Arc<FirmwareState>,
    outbound: MessageQueue<Message>,
}

impl StatsReporter {
    pub fn new(state: Arc<FirmwareState>, outbound: MessageQueue<Message>) -> Self {
        Self { state, outbound }
    }

    pub fn run(self, stop: &AtomicBool) {
        run_periodic(stop, STATS_REPORT_INTERVAL_MS, || {
            self.outbound.push_drop_oldest(stats_message(&self.state));
        });
    }
}

/// Sensor reporter task.
pub struct SensorReporter {
    sensors: Arc<dyn BoardSensors>,
    outbound: MessageQueue<Message>,
}

impl SensorReporter {
    pub fn new(sensors: Arc<dyn BoardSensors>, outbound: MessageQueue<Message>) -> Self {
        Self { sensors, outbound }
    }

    pub fn run(self, stop: &AtomicBool) {
        run_periodic(stop, SENSOR_REPORT_INTERVAL_MS, || {
            self.outbound
                .push_drop_oldest(motor_sense_message(self.sensors.as_ref()));
            self.outbound
                .push_drop_oldest(board_sense_message(self.sensors.as_ref()));
        });
    }
}

fn run_periodic(stop: &AtomicBool, interval_ms: u64, mut body: impl FnMut()) {
    loop {
        let mut remaining = Duration::from_millis(interval_ms);
        while !stop.load(Ordering::SeqCst) && !remaining.is_zero() {
            let slice = remaining.min(Duration::from_millis(100));
            std::thread::sleep(slice);
            remaining -= slice;
        }
        if stop.load(Ordering::SeqCst) {
            return;
        }
        body();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::SimSensors;

    #[test]
    fn stats_report_carries_the_counters() {
        let state = FirmwareState::new();
        Counters::bump(&state.counters.checksum_errors);
        Counters::bump(&state.counters.checksum_errors);

        match stats_message(&state) {
            Message::Stats { entries } => {
                let chkfail = entries.iter().find(|(k, _)| k == "CHKFAIL").unwrap();
                assert_eq!(chkfail.1, 2);
                assert!(entries.iter().any(|(k, _)| k == "PWM_WRAPS"));
            }
            other => panic!("expected STATS, got {other:?}"),
        }
    }

    #[test]
    fn motor_sense_covers_all_slots() {
        let sensors = SimSensors::new();
        sensors.set_motor_position(5, 777);
        match motor_sense_message(&sensors) {
            Message::MotorSense { motors } => {
                assert_eq!(motors.len(), MOTOR_MAP_SIZE);
                assert_eq!(motors[5].position, 777);
            }
            other => panic!("expected MSENSE, got {other:?}"),
        }
    }

    #[test]
    fn board_sense_names_the_four_rails() {
        let sensors = SimSensors::new();
        sensors.set_temperature_f(99.5);
        match board_sense_message(&sensors) {
            Message::BoardSense { board } => {
                assert_eq!(board.temperature_f, 99.5);
                let names: Vec<&str> = board.rails.iter().map(|r| r.name.as_str()).collect();
                assert_eq!(names, vec!["VBUS", "MP_IN", "3V3", "5V"]);
            }
            other => panic!("expected BSENSE, got {other:?}"),
        }
    }

    #[test]
    fn reports_survive_the_wire_roundtrip() {
        let sensors = SimSensors::new();
        let m = board_sense_message(&sensors);
        let wire = m.to_wire();
        let payload =
            aves_common::protocol::strip_and_verify(wire.trim_end()).expect("valid checksum");
        assert_eq!(Message::parse(payload).unwrap(), m);
    }
}
