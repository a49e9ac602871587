//! Wire-level session tests.
//!
//! A scripted controller drives the firmware core over a socketpair:
//! real lines, real checksums, real reader/writer tasks. The simulated
//! PWM block and power rails make the safety assertions observable.

use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use aves_common::protocol::{Message, MotorConfigRecord, ServoPosition};
use aves_common::queue::MessageQueue;
use aves_common::transport::Transport;
use aves_firmware::dynamixel::{DynamixelMap, SimBus};
use aves_firmware::io::{run_reader, run_writer};
use aves_firmware::motor::{MotorMap, PwmParams};
use aves_firmware::power::{PowerControl, SimPower};
use aves_firmware::processor::MessageProcessor;
use aves_firmware::pwm::{SimPwm, SimWatchdog, WrapContext, on_pwm_wrap};
use aves_firmware::sensors::SimSensors;
use aves_firmware::state::{Counters, FirmwareState};
use aves_firmware::telemetry::board_sense_message;

/// Everything a test needs to play both ends of the wire.
struct Rig {
    state: Arc<FirmwareState>,
    motors: Arc<MotorMap>,
    power: Arc<SimPower>,
    pwm: SimPwm,
    watchdog: SimWatchdog,
    wrap_context: WrapContext,
    stop: Arc<AtomicBool>,
    host_read: BufReader<Box<dyn std::io::Read + Send>>,
    host_write: Box<dyn std::io::Write + Send>,
}

impl Rig {
    fn new() -> Self {
        let state = Arc::new(FirmwareState::new());
        let motors = Arc::new(MotorMap::new(PwmParams::standard()));
        let dynamixel = Arc::new(DynamixelMap::new(SimBus::new()));
        let power = Arc::new(SimPower::new());
        let outbound = MessageQueue::bounded(32);
        let stop = Arc::new(AtomicBool::new(false));

        let (firmware_side, host_side) = Transport::pair().unwrap();
        let (fw_read, fw_write) = firmware_side.split();
        let (host_read, host_write) = host_side.split();

        state.on_connected();

        let processor = Arc::new(MessageProcessor::new(
            Arc::clone(&state),
            Arc::clone(&motors),
            dynamixel,
            Arc::clone(&power) as Arc<dyn PowerControl>,
            outbound.clone(),
        ));

        let reader_state = Arc::clone(&state);
        let reader_stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            run_reader(fw_read, &processor, &reader_state, &reader_stop);
        });

        let writer_state = Arc::clone(&state);
        let writer_stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            run_writer(fw_write, &outbound, &writer_state, &writer_stop);
        });

        Self {
            state,
            motors,
            power,
            pwm: SimPwm::new(),
            watchdog: SimWatchdog::new(),
            wrap_context: WrapContext::default(),
            stop,
            host_read: BufReader::new(host_read),
            host_write,
        }
    }

    fn send(&mut self, message: &Message) {
        self.host_write
            .write_all(message.to_wire().as_bytes())
            .unwrap();
        self.host_write.flush().unwrap();
    }

    fn send_raw(&mut self, line: &str) {
        self.host_write.write_all(line.as_bytes()).unwrap();
        self.host_write.flush().unwrap();
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.host_read.read_line(&mut line).unwrap();
        line
    }

    /// One simulated PWM frame.
    fn wrap(&mut self) {
        on_pwm_wrap(
            &self.state,
            &self.motors,
            &self.pwm,
            &self.watchdog,
            &mut self.wrap_context,
        );
    }

    fn wait_until(&self, what: &str, predicate: impl Fn(&Self) -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if predicate(self) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("timed out waiting for {what}");
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn config() -> Message {
    Message::Config {
        records: vec![MotorConfigRecord::Servo {
            id: "A0".into(),
            min_us: 1000,
            max_us: 2000,
        }],
    }
}

fn pos(value: u16) -> Message {
    Message::Pos {
        positions: vec![ServoPosition {
            id: "A0".into(),
            value,
        }],
    }
}

#[test]
fn handshake_then_motion() {
    let mut rig = Rig::new();

    rig.send(&config());
    let ready = rig.read_line();
    assert!(ready.starts_with("READY\t1\tCS "), "got: {ready:?}");

    rig.send(&pos(1500));
    rig.wait_until("first frame latch", |r| r.state.safe_to_run());
    assert!(rig.power.is_on(0), "first frame must enable motor power");

    rig.wrap();
    assert_eq!(rig.pwm.level(0), 1500);
}

#[test]
fn positions_before_config_never_reach_the_pwm_block() {
    let mut rig = Rig::new();

    // Valid checksum, valid shape, sent before CONFIG.
    rig.send(&pos(1500));
    rig.wait_until("gated position drop", |r| {
        Counters::get(&r.state.counters.positions_dropped_unsafe) == 1
    });

    rig.wrap();
    assert_eq!(rig.pwm.level(0), 0, "duty cycle must stay at boot default");
    assert!(!rig.power.any_on());

    // After the handshake the same frame moves the servo.
    rig.send(&config());
    let _ready = rig.read_line();
    rig.send(&pos(1500));
    rig.wait_until("motion after handshake", |r| r.state.safe_to_run());
    rig.wrap();
    assert_eq!(rig.pwm.level(0), 1500);
}

#[test]
fn bad_checksum_is_dropped_and_counted_once() {
    let mut rig = Rig::new();
    rig.send(&config());
    let _ready = rig.read_line();

    rig.send_raw("POS\tA0 1500\tCS 12345\n");
    rig.wait_until("checksum counter", |r| {
        Counters::get(&r.state.counters.checksum_errors) == 1
    });

    rig.wrap();
    assert_eq!(rig.pwm.level(0), 0, "A0 must not move on a bad checksum");

    // The stream recovers: the next valid line works.
    rig.send(&pos(1750));
    rig.wait_until("recovery after bad line", |r| r.state.safe_to_run());
    rig.wrap();
    assert_eq!(rig.pwm.level(0), 1750);
    assert_eq!(Counters::get(&rig.state.counters.checksum_errors), 1);
}

#[test]
fn estop_is_absorbing_over_the_wire() {
    let mut rig = Rig::new();
    rig.send(&config());
    let _ready = rig.read_line();
    rig.send(&pos(1500));
    rig.wait_until("running", |r| r.state.safe_to_run());
    rig.wrap();
    assert_eq!(rig.pwm.level(0), 1500);

    rig.send(&Message::EStop);
    rig.wait_until("estop latch", |r| r.state.is_emergency_stopped());
    assert!(!rig.power.any_on(), "motor power must be cut");

    // A full fresh handshake afterwards changes nothing.
    rig.send(&config());
    rig.send(&pos(1900));
    std::thread::sleep(Duration::from_millis(100));

    assert!(!rig.state.safe_to_run());
    rig.wrap();
    assert_eq!(
        rig.pwm.level(0),
        1500,
        "duty register must hold its last value, never the new request"
    );
    assert!(!rig.power.any_on());
}

#[test]
fn telemetry_report_passes_the_host_checksum_gate() {
    // Assembled exactly as the reporter task sends it.
    let sensors = SimSensors::new();
    let report = board_sense_message(&sensors);
    let wire = report.to_wire();
    let payload = aves_common::protocol::strip_and_verify(wire.trim_end()).unwrap();
    assert_eq!(Message::parse(payload).unwrap(), report);
}
