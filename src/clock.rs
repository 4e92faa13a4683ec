//! Timestamp source for log records

use std::time::{SystemTime, UNIX_EPOCH};

/// Process-wide clock.
///
/// Need not be monotonic itself: the engine clamps every timestamp to be
/// above the last one it logged.
pub trait Clock: Send + Sync {
    /// Microseconds since the Unix epoch
    fn now(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}
