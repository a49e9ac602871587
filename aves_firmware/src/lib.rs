//! # AVES Firmware Core
//!
//! The servo module's brain: owns the motor map, writes PWM duty
//! cycles on the wrap interrupt, and enforces the safety interlocks
//! that keep a half-configured module from bending plastic.
//!
//! ## Safety model
//!
//! Nothing moves until the gate opens, and the gate opens only when a
//! valid `CONFIG` has been applied *and* the first `POS` frame has
//! arrived. A disconnect closes it; `ESTOP` closes it forever.
//!
//! Hardware access (PWM registers, power rails, sensors, the hardware
//! watchdog, the Dynamixel bus) sits behind traits with simulation
//! implementations, so the whole core runs and tests on a host.

#![deny(clippy::disallowed_types)]

pub mod dynamixel;
pub mod estop;
pub mod io;
pub mod motor;
pub mod power;
pub mod processor;
pub mod pwm;
pub mod sensors;
pub mod state;
pub mod telemetry;
