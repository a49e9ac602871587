//! The message processor: every inbound line ends up here.
//!
//! Order of gates: emergency-stop latch, checksum, parse, then an
//! exhaustive dispatch on the message type. Checksum and parse
//! failures drop the line with a counter bump and never disturb motor
//! state. Position batches bounce off the session gate until the
//! firmware is Running — that is what keeps servos from jumping to
//! garbage at boot.

use std::sync::Arc;

use aves_common::clock::monotonic_ms;
use aves_common::protocol::checksum::strip_and_verify;
use aves_common::protocol::{Message, MotorConfigRecord};
use aves_common::queue::MessageQueue;
use tracing::{debug, error, info, warn};

use crate::dynamixel::{DynamixelBus, DynamixelMap};
use crate::estop;
use crate::motor::MotorMap;
use crate::power::PowerControl;
use crate::state::{Counters, FirmwareState};

/// What the caller should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep processing.
    Continue,
    /// The emergency stop latched; stop feeding the processor.
    Halted,
}

/// Inbound line handler.
pub struct MessageProcessor<B: DynamixelBus> {
    state: Arc<FirmwareState>,
    motors: Arc<MotorMap>,
    dynamixel: Arc<DynamixelMap<B>>,
    power: Arc<dyn PowerControl>,
    outbound: MessageQueue<Message>,
}

impl<B: DynamixelBus> MessageProcessor<B> {
    pub fn new(
        state: Arc<FirmwareState>,
        motors: Arc<MotorMap>,
        dynamixel: Arc<DynamixelMap<B>>,
        power: Arc<dyn PowerControl>,
        outbound: MessageQueue<Message>,
    ) -> Self {
        Self {
            state,
            motors,
            dynamixel,
            power,
            outbound,
        }
    }

    /// Process one raw wire line.
    pub fn handle_line(&self, raw: &str) -> Disposition {
        if self.state.is_emergency_stopped() {
            return Disposition::Halted;
        }

        Counters::bump(&self.state.counters.messages_received);

        let line = raw.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Disposition::Continue;
        }

        let payload = match strip_and_verify(line) {
            Ok(p) => p,
            Err(e) => {
                warn!("checksum mismatch, dropping line: {e}");
                Counters::bump(&self.state.counters.checksum_errors);
                return Disposition::Continue;
            }
        };

        let message = match Message::parse(payload) {
            Ok(m) => m,
            Err(e) => {
                error!("unable to parse incoming message: {e}");
                Counters::bump(&self.state.counters.failed_parses);
                return Disposition::Continue;
            }
        };
        Counters::bump(&self.state.counters.successful_parses);

        self.handle_message(message)
    }

    /// Dispatch one parsed message.
    pub fn handle_message(&self, message: Message) -> Disposition {
        match message {
            Message::Config { records } => self.handle_config(records),
            Message::Pos { positions } => self.handle_positions(positions),
            Message::Ping { ms } => {
                debug!("ping from controller at {ms}ms");
                self.outbound.push(Message::Pong { ms: monotonic_ms() });
                Disposition::Continue
            }
            Message::Init { protocol_version } => {
                info!("controller requests re-handshake (protocol v{protocol_version})");
                self.state.on_connected();
                Disposition::Continue
            }
            Message::EStop => {
                estop::activate(&self.state, self.power.as_ref(), &self.dynamixel, "controller command");
                Disposition::Halted
            }
            other => {
                warn!("unexpected inbound {} message, ignoring", other.type_token());
                Disposition::Continue
            }
        }
    }

    fn handle_config(&self, records: Vec<MotorConfigRecord>) -> Disposition {
        debug!("received a config message from the controller");

        if records.is_empty() {
            error!("config message carried no motor records");
            self.state.on_config_failed();
            return Disposition::Continue;
        }

        for record in &records {
            let applied = match record {
                MotorConfigRecord::Servo { id, min_us, max_us } => {
                    self.motors.configure(id, *min_us, *max_us)
                }
                MotorConfigRecord::Dynamixel {
                    id,
                    min_position,
                    max_position,
                    velocity,
                } => self
                    .dynamixel
                    .configure(*id, *min_position, *max_position, *velocity),
            };
            if let Err(e) = applied {
                error!("unable to apply config record: {e}");
                self.state.on_config_failed();
                return Disposition::Continue;
            }
        }

        info!("valid configuration received from the controller");
        self.state.on_config_accepted();
        self.outbound.push(Message::Ready);
        Disposition::Continue
    }

    fn handle_positions(&self, positions: Vec<aves_common::protocol::ServoPosition>) -> Disposition {
        if !matches!(self.state.session_state(), aves_common::session::SessionState::Running) {
            // Boot-time safety gate: silently dropped, counted.
            let dropped = Counters::bump(&self.state.counters.positions_dropped_unsafe);
            if dropped == 1 {
                debug!("dropping position messages until the session is running");
            }
            return Disposition::Continue;
        }

        if self.state.on_first_frame() {
            info!("first frame received from the controller, enabling motor power");
            self.power.set_all(true);
        }

        for position in &positions {
            let result = match position.id.strip_prefix('D') {
                Some(bus_id) => match bus_id.parse::<u8>() {
                    Ok(id) => self.dynamixel.request_position(id, position.value),
                    Err(_) => Err(aves_common::error::ControllerError::InvalidData(format!(
                        "bad dynamixel id: {}",
                        position.id
                    ))),
                },
                None => self.motors.request_position(&position.id, position.value),
            };
            if result.is_err() {
                // Already logged at the map; the servo just does not move.
                Counters::bump(&self.state.counters.positions_rejected);
            }
        }

        Counters::bump(&self.state.counters.position_messages);
        Disposition::Continue
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
