//! GNSS receiver clock to UTC conversion.

use serde::{Deserialize, Serialize};

const NANOS_PER_MILLI: i64 = 1_000_000;
const MILLIS_PER_SECOND: i64 = 1_000;

/// Hardware clock state reported with one measurement epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GnssClockSnapshot {
    /// Receiver hardware clock, in nanoseconds
    pub time_nanos: i64,
    /// Offset between the hardware clock and true GNSS time, in nanoseconds
    pub full_bias_nanos: i64,
    pub has_leap_second: bool,
    pub leap_second: i32,
}

impl GnssClockSnapshot {
    pub fn new(time_nanos: i64, full_bias_nanos: i64) -> Self {
        Self {
            time_nanos,
            full_bias_nanos,
            has_leap_second: false,
            leap_second: 0,
        }
    }

    pub fn with_leap_second(mut self, leap_second: i32) -> Self {
        self.has_leap_second = true;
        self.leap_second = leap_second;
        self
    }
}

/// Converts a clock snapshot into UTC milliseconds.
///
/// Division truncates toward zero, matching the hardware timestamp convention.
/// GNSS time carries no leap seconds, so they are removed here when known.
/// Arithmetic wraps on overflow, like the platform's 64-bit integers.
pub fn to_utc_millis(clock: &GnssClockSnapshot) -> i64 {
    let mut utc_millis = clock.time_nanos.wrapping_sub(clock.full_bias_nanos) / NANOS_PER_MILLI;
    if clock.has_leap_second {
        utc_millis = utc_millis
            .wrapping_sub(i64::from(clock.leap_second).wrapping_mul(MILLIS_PER_SECOND));
    }
    utc_millis
}
