//! # AVES Controller Library
//!
//! Host-side half of the AVES animatronic control system. Streams of
//! DMX universe frames come in; smoothed, checksummed servo position
//! batches go out to the module firmware at the servo frame rate.
//!
//! ## Pipeline
//!
//! ```text
//! universe frames ─► InputMapper ─► Rig ─► ServoBank ─► FrameScheduler ─► Link ─► firmware
//!                                                                           │
//!                  WatchdogMonitor ◄── BoardTelemetry ◄── StatusProcessor ◄─┘
//! ```
//!
//! Tasks are plain threads joined in reverse construction order; every
//! edge between them is a bounded queue. The scheduler is the sole
//! writer of servo state.

#![deny(clippy::disallowed_types)]

pub mod config;
pub mod creature;
pub mod dmx;
pub mod input;
pub mod link;
pub mod scheduler;
pub mod server;
pub mod servo;
pub mod telemetry;
pub mod watchdog;
pub mod worker;
