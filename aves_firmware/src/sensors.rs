//! Board sensor access.
//!
//! The power monitor and the temperature sensor live on I²C behind
//! this trait. The simulation lets tests (and the host binary) set the
//! values the reporters and the host-side watchdog will see.

use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use aves_common::consts::MOTOR_MAP_SIZE;

/// One voltage/current/power triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RailSample {
    pub volts: f64,
    pub amps: f64,
    pub watts: f64,
}

impl RailSample {
    pub const fn zero() -> Self {
        Self {
            volts: 0.0,
            amps: 0.0,
            watts: 0.0,
        }
    }
}

/// The monitored board rails, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardRail {
    Vbus,
    MotorIn,
    V3v3,
    V5,
}

impl BoardRail {
    pub const ALL: [Self; 4] = [Self::Vbus, Self::MotorIn, Self::V3v3, Self::V5];

    /// Name used in `BSENSE` reports.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Vbus => "VBUS",
            Self::MotorIn => "MP_IN",
            Self::V3v3 => "3V3",
            Self::V5 => "5V",
        }
    }
}

/// Sensor readings the reporters consume.
pub trait BoardSensors: Send + Sync {
    fn board_temperature_f(&self) -> f64;
    /// Sensed (not commanded) motor position, raw ADC counts.
    fn motor_position(&self, index: usize) -> u16;
    fn motor_power(&self, index: usize) -> RailSample;
    fn board_rail(&self, rail: BoardRail) -> RailSample;
}

/// Host stand-in for the sensor tree, with settable values.
#[derive(Debug)]
pub struct SimSensors {
    temperature_bits: AtomicU64,
    motor_amps_bits: AtomicU64,
    motor_positions: [AtomicU16; MOTOR_MAP_SIZE],
}

impl Default for SimSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SimSensors {
    pub fn new() -> Self {
        let s = Self {
            temperature_bits: AtomicU64::new(0),
            motor_amps_bits: AtomicU64::new(0),
            motor_positions: std::array::from_fn(|_| AtomicU16::new(512)),
        };
        s.set_temperature_f(82.5);
        s.set_motor_amps(0.25);
        s
    }

    pub fn set_temperature_f(&self, value: f64) {
        self.temperature_bits
            .store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn set_motor_amps(&self, value: f64) {
        self.motor_amps_bits
            .store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn set_motor_position(&self, index: usize, value: u16) {
        self.motor_positions[index].store(value, Ordering::Relaxed);
    }

    fn motor_amps(&self) -> f64 {
        f64::from_bits(self.motor_amps_bits.load(Ordering::Relaxed))
    }
}

impl BoardSensors for SimSensors {
    fn board_temperature_f(&self) -> f64 {
        f64::from_bits(self.temperature_bits.load(Ordering::Relaxed))
    }

    fn motor_position(&self, index: usize) -> u16 {
        self.motor_positions[index].load(Ordering::Relaxed)
    }

    fn motor_power(&self, index: usize) -> RailSample {
        let _ = index;
        let amps = self.motor_amps();
        RailSample {
            volts: 5.0,
            amps,
            watts: 5.0 * amps,
        }
    }

    fn board_rail(&self, rail: BoardRail) -> RailSample {
        let amps = self.motor_amps();
        match rail {
            BoardRail::Vbus => RailSample {
                volts: 5.1,
                amps: 0.4,
                watts: 2.04,
            },
            BoardRail::MotorIn => RailSample {
                volts: 12.0,
                amps,
                watts: 12.0 * amps,
            },
            BoardRail::V3v3 => RailSample {
                volts: 3.3,
                amps: 0.1,
                watts: 0.33,
            },
            BoardRail::V5 => RailSample {
                volts: 5.0,
                amps: 0.2,
                watts: 1.0,
            },
        }
    }
}
