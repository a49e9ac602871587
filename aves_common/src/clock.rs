//! Monotonic milliseconds.
//!
//! `PING`/`PONG` and forwarded log lines carry milliseconds from a
//! monotonic clock that starts at process birth. Wall clocks have no
//! business in heartbeat math.

use std::sync::OnceLock;
use std::time::Instant;

static START: OnceLock<Instant> = OnceLock::new();

/// Milliseconds since the first call in this process.
pub fn monotonic_ms() -> u64 {
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_goes_backwards() {
        let a = monotonic_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = monotonic_ms();
        assert!(b >= a + 1);
    }
}
