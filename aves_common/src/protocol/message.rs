//! Wire message types and their render/parse pair.
//!
//! `render` produces the tab-separated payload without the checksum
//! field; [`Message::to_wire`] adds the checksum and terminator. `parse`
//! takes a payload that has already been through
//! [`strip_and_verify`](crate::protocol::checksum::strip_and_verify).
//!
//! Round-trip contract: `parse(&m.render())` yields a message equal to
//! `m` for every well-formed `m`.

use std::fmt;

use crate::consts::PROTOCOL_VERSION;
use crate::error::ControllerError;
use crate::protocol::checksum::with_checksum;

/// One `(servo id, value)` entry of a `POS` batch.
///
/// For PWM servos the value is a pulse width in microseconds; ids
/// beginning with `D` address the Dynamixel bus and carry a 0–4095
/// position instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServoPosition {
    pub id: String,
    pub value: u16,
}

/// One per-motor record of a `CONFIG` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotorConfigRecord {
    /// PWM servo travel bounds.
    Servo { id: String, min_us: u16, max_us: u16 },
    /// Dynamixel bounds plus profile velocity.
    Dynamixel {
        id: u8,
        min_position: u16,
        max_position: u16,
        velocity: u32,
    },
}

/// One motor's sensor snapshot from an `MSENSE` report.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorSenseReading {
    pub index: u8,
    pub position: u16,
    pub volts: f64,
    pub amps: f64,
    pub watts: f64,
}

/// One named power rail triple from a `BSENSE` report.
#[derive(Debug, Clone, PartialEq)]
pub struct RailReading {
    pub name: String,
    pub volts: f64,
    pub amps: f64,
    pub watts: f64,
}

/// Board-level telemetry from a `BSENSE` report.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSenseReading {
    pub temperature_f: f64,
    pub rails: Vec<RailReading>,
}

/// Severity carried on forwarded firmware `LOG` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    const fn code(self) -> char {
        match self {
            Self::Verbose => 'V',
            Self::Debug => 'D',
            Self::Info => 'I',
            Self::Warning => 'W',
            Self::Error => 'E',
            Self::Fatal => 'F',
        }
    }

    fn from_code(c: char) -> Option<Self> {
        Some(match c {
            'V' => Self::Verbose,
            'D' => Self::Debug,
            'I' => Self::Info,
            'W' => Self::Warning,
            'E' => Self::Error,
            'F' => Self::Fatal,
            _ => return None,
        })
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Every message either side can put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Handshake request. The firmware asserts this once per second
    /// while unconfigured; the host may send it to force a re-handshake.
    Init { protocol_version: u8 },
    /// Per-motor bounds, host → firmware.
    Config { records: Vec<MotorConfigRecord> },
    /// Configuration accepted, firmware → host. Session moves to Running.
    Ready,
    /// One frame's position batch.
    Pos { positions: Vec<ServoPosition> },
    /// Heartbeat, carrying monotonic milliseconds.
    Ping { ms: u64 },
    /// Heartbeat reply.
    Pong { ms: u64 },
    /// Free-form counter report.
    Stats { entries: Vec<(String, u64)> },
    /// Per-motor sensor snapshot.
    MotorSense { motors: Vec<MotorSenseReading> },
    /// Board/rail telemetry.
    BoardSense { board: BoardSenseReading },
    /// Structured firmware log line, forwarded into the host's logs.
    Log {
        timestamp_ms: u64,
        level: LogLevel,
        text: String,
    },
    /// Terminal emergency stop.
    EStop,
}

impl Message {
    /// Convenience constructor for the boot-time handshake.
    pub const fn init() -> Self {
        Self::Init {
            protocol_version: PROTOCOL_VERSION,
        }
    }

    /// First token on the wire, used for dispatch and for logging.
    pub const fn type_token(&self) -> &'static str {
        match self {
            Self::Init { .. } => "INIT",
            Self::Config { .. } => "CONFIG",
            Self::Ready => "READY",
            Self::Pos { .. } => "POS",
            Self::Ping { .. } => "PING",
            Self::Pong { .. } => "PONG",
            Self::Stats { .. } => "STATS",
            Self::MotorSense { .. } => "MSENSE",
            Self::BoardSense { .. } => "BSENSE",
            Self::Log { .. } => "LOG",
            Self::EStop => "ESTOP",
        }
    }

    /// Render the tab-separated payload, checksum field not included.
    pub fn render(&self) -> String {
        match self {
            Self::Init { protocol_version } => format!("INIT\t{protocol_version}"),
            Self::Config { records } => {
                let mut out = String::from("CONFIG");
                for r in records {
                    match r {
                        MotorConfigRecord::Servo { id, min_us, max_us } => {
                            out.push_str(&format!("\tSERVO {id} {min_us} {max_us}"));
                        }
                        MotorConfigRecord::Dynamixel {
                            id,
                            min_position,
                            max_position,
                            velocity,
                        } => {
                            out.push_str(&format!(
                                "\tDYNAMIXEL {id} {min_position} {max_position} {velocity}"
                            ));
                        }
                    }
                }
                out
            }
            Self::Ready => String::from("READY\t1"),
            Self::Pos { positions } => {
                let mut out = String::from("POS");
                for p in positions {
                    out.push_str(&format!("\t{} {}", p.id, p.value));
                }
                out
            }
            Self::Ping { ms } => format!("PING\t{ms}"),
            Self::Pong { ms } => format!("PONG\t{ms}"),
            Self::Stats { entries } => {
                let mut out = String::from("STATS");
                for (key, value) in entries {
                    out.push_str(&format!("\t{key} {value}"));
                }
                out
            }
            Self::MotorSense { motors } => {
                let mut out = String::from("MSENSE");
                for m in motors {
                    out.push_str(&format!(
                        "\tM{} {} {:.2} {:.2} {:.2}",
                        m.index, m.position, m.volts, m.amps, m.watts
                    ));
                }
                out
            }
            Self::BoardSense { board } => {
                let mut out = format!("BSENSE\tTEMP {:.2}", board.temperature_f);
                for r in &board.rails {
                    out.push_str(&format!(
                        "\t{} {:.3} {:.3} {:.3}",
                        r.name, r.volts, r.amps, r.watts
                    ));
                }
                out
            }
            Self::Log {
                timestamp_ms,
                level,
                text,
            } => format!("LOG\t{timestamp_ms} [{level}] {text}"),
            Self::EStop => String::from("ESTOP"),
        }
    }

    /// Full wire form: payload, checksum field, newline.
    pub fn to_wire(&self) -> String {
        let mut line = with_checksum(&self.render());
        line.push('\n');
        line
    }

    /// Parse a checksum-stripped payload.
    ///
    /// Unknown types and malformed argument tokens come back as
    /// `InvalidData`; the caller drops the line and counts it.
    pub fn parse(payload: &str) -> Result<Self, ControllerError> {
        let mut tokens = payload.split('\t');
        let kind = tokens
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ControllerError::InvalidData("empty message".into()))?;

        match kind {
            "INIT" => {
                let version = next_field(&mut tokens, "INIT protocol version")?;
                Ok(Self::Init {
                    protocol_version: parse_num(version, "protocol version")?,
                })
            }
            "CONFIG" => {
                let mut records = Vec::new();
                for token in tokens {
                    records.push(parse_config_record(token)?);
                }
                Ok(Self::Config { records })
            }
            "READY" => {
                let flag = next_field(&mut tokens, "READY flag")?;
                if flag != "1" {
                    return Err(ControllerError::InvalidData(format!(
                        "unexpected READY flag: {flag}"
                    )));
                }
                Ok(Self::Ready)
            }
            "POS" => {
                let mut positions = Vec::new();
                for token in tokens {
                    let (id, value) = split_pair(token, "POS entry")?;
                    positions.push(ServoPosition {
                        id: id.to_string(),
                        value: parse_num(value, "POS value")?,
                    });
                }
                Ok(Self::Pos { positions })
            }
            "PING" => {
                let ms = next_field(&mut tokens, "PING timestamp")?;
                Ok(Self::Ping {
                    ms: parse_num(ms, "PING timestamp")?,
                })
            }
            "PONG" => {
                let ms = next_field(&mut tokens, "PONG timestamp")?;
                Ok(Self::Pong {
                    ms: parse_num(ms, "PONG timestamp")?,
                })
            }
            "STATS" => {
                let mut entries = Vec::new();
                for token in tokens {
                    let (key, value) = split_pair(token, "STATS entry")?;
                    entries.push((key.to_string(), parse_num(value, "STATS value")?));
                }
                Ok(Self::Stats { entries })
            }
            "MSENSE" => {
                let mut motors = Vec::new();
                for token in tokens {
                    motors.push(parse_motor_sense(token)?);
                }
                Ok(Self::MotorSense { motors })
            }
            "BSENSE" => parse_board_sense(tokens),
            "LOG" => {
                let body = next_field(&mut tokens, "LOG body")?;
                parse_log(body)
            }
            "ESTOP" => Ok(Self::EStop),
            other => Err(ControllerError::InvalidData(format!(
                "unknown message type: {other}"
            ))),
        }
    }
}

fn next_field<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    what: &str,
) -> Result<&'a str, ControllerError> {
    tokens
        .next()
        .ok_or_else(|| ControllerError::InvalidData(format!("missing {what}")))
}

fn parse_num<T: std::str::FromStr>(field: &str, what: &str) -> Result<T, ControllerError> {
    field
        .parse()
        .map_err(|_| ControllerError::InvalidData(format!("bad {what}: {field:?}")))
}

fn split_pair<'a>(token: &'a str, what: &str) -> Result<(&'a str, &'a str), ControllerError> {
    token
        .split_once(' ')
        .ok_or_else(|| ControllerError::InvalidData(format!("malformed {what}: {token:?}")))
}

fn parse_config_record(token: &str) -> Result<MotorConfigRecord, ControllerError> {
    let mut fields = token.split(' ');
    let motor_type = next_field(&mut fields, "CONFIG motor type")?;
    match motor_type {
        "SERVO" => {
            let id = next_field(&mut fields, "SERVO id")?;
            let min_us = parse_num(next_field(&mut fields, "SERVO min_us")?, "SERVO min_us")?;
            let max_us = parse_num(next_field(&mut fields, "SERVO max_us")?, "SERVO max_us")?;
            Ok(MotorConfigRecord::Servo {
                id: id.to_string(),
                min_us,
                max_us,
            })
        }
        "DYNAMIXEL" => {
            let id = parse_num(next_field(&mut fields, "DYNAMIXEL id")?, "DYNAMIXEL id")?;
            let min_position = parse_num(
                next_field(&mut fields, "DYNAMIXEL min_position")?,
                "DYNAMIXEL min_position",
            )?;
            let max_position = parse_num(
                next_field(&mut fields, "DYNAMIXEL max_position")?,
                "DYNAMIXEL max_position",
            )?;
            let velocity = parse_num(
                next_field(&mut fields, "DYNAMIXEL velocity")?,
                "DYNAMIXEL velocity",
            )?;
            Ok(MotorConfigRecord::Dynamixel {
                id,
                min_position,
                max_position,
                velocity,
            })
        }
        other => Err(ControllerError::InvalidData(format!(
            "unknown motor type: {other}"
        ))),
    }
}

fn parse_motor_sense(token: &str) -> Result<MotorSenseReading, ControllerError> {
    let mut fields = token.split(' ');
    let tag = next_field(&mut fields, "MSENSE motor tag")?;
    let index = tag
        .strip_prefix('M')
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| ControllerError::InvalidData(format!("bad MSENSE motor tag: {tag:?}")))?;
    Ok(MotorSenseReading {
        index,
        position: parse_num(next_field(&mut fields, "MSENSE position")?, "MSENSE position")?,
        volts: parse_num(next_field(&mut fields, "MSENSE volts")?, "MSENSE volts")?,
        amps: parse_num(next_field(&mut fields, "MSENSE amps")?, "MSENSE amps")?,
        watts: parse_num(next_field(&mut fields, "MSENSE watts")?, "MSENSE watts")?,
    })
}

fn parse_board_sense<'a>(
    tokens: impl Iterator<Item = &'a str>,
) -> Result<Message, ControllerError> {
    let mut temperature_f = None;
    let mut rails = Vec::new();
    for token in tokens {
        let (name, rest) = split_pair(token, "BSENSE entry")?;
        if name == "TEMP" {
            temperature_f = Some(parse_num(rest, "BSENSE temperature")?);
            continue;
        }
        let mut fields = rest.split(' ');
        rails.push(RailReading {
            name: name.to_string(),
            volts: parse_num(next_field(&mut fields, "BSENSE volts")?, "BSENSE volts")?,
            amps: parse_num(next_field(&mut fields, "BSENSE amps")?, "BSENSE amps")?,
            watts: parse_num(next_field(&mut fields, "BSENSE watts")?, "BSENSE watts")?,
        });
    }
    Ok(Message::BoardSense {
        board: BoardSenseReading {
            temperature_f: temperature_f.ok_or_else(|| {
                ControllerError::InvalidData("BSENSE missing TEMP entry".into())
            })?,
            rails,
        },
    })
}

fn parse_log(body: &str) -> Result<Message, ControllerError> {
    let (ms, rest) = split_pair(body, "LOG timestamp")?;
    let rest = rest
        .strip_prefix('[')
        .ok_or_else(|| ControllerError::InvalidData(format!("malformed LOG level: {body:?}")))?;
    let (level_str, text) = rest
        .split_once("] ")
        .ok_or_else(|| ControllerError::InvalidData(format!("malformed LOG level: {body:?}")))?;
    let level = level_str
        .chars()
        .next()
        .filter(|_| level_str.len() == 1)
        .and_then(LogLevel::from_code)
        .ok_or_else(|| ControllerError::InvalidData(format!("unknown LOG level: {level_str:?}")))?;
    Ok(Message::Log {
        timestamp_ms: parse_num(ms, "LOG timestamp")?,
        level,
        text: text.to_string(),
    })
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::checksum::strip_and_verify;

    fn roundtrip(m: Message) {
        let rendered = m.render();
        let parsed = Message::parse(&rendered).expect("parse should succeed");
        assert_eq!(parsed, m, "rendered form was {rendered:?}");

        // The full wire form must also survive the checksum gate.
        let wire = m.to_wire();
        let stripped = strip_and_verify(wire.trim_end()).expect("checksum should validate");
        assert_eq!(stripped, rendered);
    }

    #[test]
    fn roundtrip_every_variant() {
        roundtrip(Message::init());
        roundtrip(Message::Config {
            records: vec![
                MotorConfigRecord::Servo {
                    id: "A0".into(),
                    min_us: 1000,
                    max_us: 2000,
                },
                MotorConfigRecord::Dynamixel {
                    id: 3,
                    min_position: 100,
                    max_position: 4000,
                    velocity: 120,
                },
            ],
        });
        roundtrip(Message::Ready);
        roundtrip(Message::Pos {
            positions: vec![
                ServoPosition {
                    id: "A0".into(),
                    value: 1500,
                },
                ServoPosition {
                    id: "D3".into(),
                    value: 2048,
                },
            ],
        });
        roundtrip(Message::Ping { ms: 123456 });
        roundtrip(Message::Pong { ms: 123457 });
        roundtrip(Message::Stats {
            entries: vec![("CHKFAIL".into(), 2), ("PWM_WRAPS".into(), 50000)],
        });
        roundtrip(Message::MotorSense {
            motors: vec![MotorSenseReading {
                index: 0,
                position: 512,
                volts: 5.25,
                amps: 0.75,
                watts: 3.94,
            }],
        });
        roundtrip(Message::BoardSense {
            board: BoardSenseReading {
                temperature_f: 84.5,
                rails: vec![RailReading {
                    name: "VBUS".into(),
                    volts: 5.125,
                    amps: 0.25,
                    watts: 1.281,
                }],
            },
        });
        roundtrip(Message::Log {
            timestamp_ms: 99,
            level: LogLevel::Warning,
            text: "motor 3 near limit".into(),
        });
        roundtrip(Message::EStop);
    }

    #[test]
    fn empty_pos_batch_roundtrips() {
        roundtrip(Message::Pos { positions: vec![] });
    }

    #[test]
    fn unknown_type_is_invalid_data() {
        let err = Message::parse("BANANA\t1 2").unwrap_err();
        assert!(matches!(err, ControllerError::InvalidData(_)));
    }

    #[test]
    fn malformed_pos_entry_is_invalid_data() {
        assert!(Message::parse("POS\tA0").is_err());
        assert!(Message::parse("POS\tA0 banana").is_err());
    }

    #[test]
    fn config_rejects_unknown_motor_type() {
        assert!(Message::parse("CONFIG\tSTEPPER 0 1 2").is_err());
    }

    #[test]
    fn ready_requires_flag_one() {
        assert!(Message::parse("READY\t0").is_err());
        assert!(Message::parse("READY").is_err());
    }

    #[test]
    fn log_line_shape() {
        let m = Message::Log {
            timestamp_ms: 1234,
            level: LogLevel::Info,
            text: "PWM running at 50 Hz".into(),
        };
        assert_eq!(m.render(), "LOG\t1234 [I] PWM running at 50 Hz");
    }

    #[test]
    fn pos_wire_shape_matches_firmware_expectation() {
        let m = Message::Pos {
            positions: vec![ServoPosition {
                id: "A0".into(),
                value: 1500,
            }],
        };
        assert_eq!(m.render(), "POS\tA0 1500");
    }
}
