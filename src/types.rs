//! Core type definitions for the simulation framework.
//!
//! This module defines the identifiers and the time representation shared by
//! every other module.

use std::time::Duration;

/// Simulation time in nanoseconds.
///
/// All events, link delays and application schedules use the same integer
/// representation, so there is no floating-point drift over long runs.
pub type SimTime = u64;

/// Index of a node in the topology.
pub type NodeId = usize;

/// Index of an interface within its owning node.
pub type IfIndex = usize;

/// Index of a link in the topology.
pub type LinkId = usize;

/// Index of an installed application.
pub type AppId = usize;

/// Transport-layer port number.
pub type Port = u16;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: SimTime = 1_000_000_000;

/// Nanoseconds per millisecond.
pub const NANOS_PER_MILLI: SimTime = 1_000_000;

/// Nanoseconds per microsecond.
pub const NANOS_PER_MICRO: SimTime = 1_000;

/// Returns `secs` whole seconds as [`SimTime`].
pub const fn seconds(secs: u64) -> SimTime {
    secs * NANOS_PER_SEC
}

/// Returns `ms` milliseconds as [`SimTime`].
pub const fn millis(ms: u64) -> SimTime {
    ms * NANOS_PER_MILLI
}

/// Returns `us` microseconds as [`SimTime`].
pub const fn micros(us: u64) -> SimTime {
    us * NANOS_PER_MICRO
}

/// Returns `ns` nanoseconds as [`SimTime`].
pub const fn nanos(ns: u64) -> SimTime {
    ns
}

/// Converts a timestamp to fractional seconds.
pub fn as_secs_f64(time: SimTime) -> f64 {
    time as f64 / NANOS_PER_SEC as f64
}

/// Converts a fractional number of seconds, rounding to the nearest nanosecond.
///
/// Negative inputs clamp to zero.
pub fn seconds_f64(secs: f64) -> SimTime {
    (secs.max(0.0) * NANOS_PER_SEC as f64).round() as SimTime
}

/// Converts a wall-clock style [`Duration`] into simulation time.
pub fn from_duration(duration: Duration) -> SimTime {
    duration.as_nanos().min(SimTime::MAX as u128) as SimTime
}

/// Converts simulation time back into a [`Duration`].
pub fn to_duration(time: SimTime) -> Duration {
    Duration::from_nanos(time)
}

/// Formats a timestamp as seconds with nanosecond precision, e.g. `+2.003638400s`.
pub fn format_time(time: SimTime) -> String {
    format!("+{}.{:09}s", time / NANOS_PER_SEC, time % NANOS_PER_SEC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_constructors() {
        assert_eq!(seconds(2), 2_000_000_000);
        assert_eq!(millis(2), 2_000_000);
        assert_eq!(micros(6), 6_000);
        assert_eq!(nanos(6560), 6_560);
        assert_eq!(as_secs_f64(millis(1500)), 1.5);
        assert_eq!(seconds_f64(1.5), 1_500_000_000);
        assert_eq!(seconds_f64(-3.0), 0);
    }

    #[test]
    fn test_duration_conversion() {
        let d = Duration::from_micros(6560 / 1000);
        assert_eq!(from_duration(d), 6_000);
        assert_eq!(to_duration(millis(2)), Duration::from_millis(2));
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(seconds(2)), "+2.000000000s");
        assert_eq!(format_time(2_003_638_400), "+2.003638400s");
    }
}
