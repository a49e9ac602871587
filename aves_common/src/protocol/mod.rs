//! The framed text protocol between controller and servo module.
//!
//! Line-oriented ASCII, tab-separated tokens, newline-terminated. Every
//! line carries a trailing `\tCS <n>` where `n` is the byte sum of the
//! preceding portion (the tab before `CS` included) reduced mod 2¹⁶.
//! Lines failing the checksum are dropped by the receiver and counted;
//! they are never an error the sender hears about.
//!
//! Message types are a closed set; dispatch is an exhaustive match even
//! though the wire representation stays stringly typed.

pub mod checksum;
pub mod message;

pub use checksum::{checksum, strip_and_verify, with_checksum};
pub use message::{
    BoardSenseReading, LogLevel, Message, MotorConfigRecord, MotorSenseReading, RailReading,
    ServoPosition,
};
