//! Workspace-wide constants.
//!
//! Position bounds are the device-independent coordinate the rigs speak
//! in; everything downstream of the servo bank works in microseconds.

/// Lowest value of the device-independent position coordinate.
pub const MIN_POSITION: u16 = 0;

/// Highest value of the device-independent position coordinate (10 bit).
pub const MAX_POSITION: u16 = 1023;

/// Centered position, used as a servo default.
pub const DEFAULT_POSITION: u16 = 512;

/// Number of 8-bit slots in one DMX universe.
pub const DMX_UNIVERSE_SIZE: u16 = 512;

/// Version tag carried in `INIT` messages. Both sides must agree.
pub const PROTOCOL_VERSION: u8 = 3;

/// Default servo update rate. Standard analog servos want 50 Hz.
pub const DEFAULT_SERVO_FREQUENCY_HZ: u16 = 50;

/// Highest Dynamixel position value (12 bit).
pub const DYNAMIXEL_MAX_POSITION: u16 = 4095;

/// PWM servo outputs per module.
pub const MOTOR_MAP_SIZE: usize = 8;

/// Dynamixel bus ids a module will accept.
pub const DYNAMIXEL_MAP_SIZE: usize = 8;

/// How often the firmware asks for its configuration while unconfigured.
pub const INIT_REQUEST_INTERVAL_MS: u64 = 1_000;

/// How often the controller pings the firmware.
pub const PING_INTERVAL_MS: u64 = 5_000;

/// Missed pongs before the link is considered unhealthy.
pub const PING_MISS_LIMIT: u32 = 3;

/// Cadence of the firmware `STATS` report.
pub const STATS_REPORT_INTERVAL_MS: u64 = 20_000;

/// Cadence of the firmware `MSENSE`/`BSENSE` reports.
pub const SENSOR_REPORT_INTERVAL_MS: u64 = 5_000;

/// Longest wire line either side will accept, terminator included.
pub const MAX_MESSAGE_LENGTH: usize = 512;

/// PWM wraps between hardware watchdog kicks (half a second at 50 Hz).
pub const PWM_WRAPS_PER_WATCHDOG_KICK: u32 = 25;
