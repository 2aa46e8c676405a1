//! Wall-clock source for tick timestamps

use ledger_core::TickTimestamp;
use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> TickTimestamp;
}

/// The operating system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> TickTimestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or(0);
        TickTimestamp::from_unix_millis(millis)
    }
}

/// Clock moved by hand
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<TickTimestamp>,
}

impl ManualClock {
    /// Clock reading `start`
    pub fn new(start: TickTimestamp) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Move forward by `millis`
    pub fn advance(&self, millis: u64) {
        let mut now = self.now.lock();
        for _ in 0..millis {
            now.advance_millisecond();
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> TickTimestamp {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_valid() {
        let now = SystemClock.now();
        assert!(now.is_valid());
        assert!(now.year >= 24);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(TickTimestamp::new(24, 3, 1, 23, 59, 59, 500).unwrap());
        clock.advance(600);
        assert_eq!(clock.now(), TickTimestamp::new(24, 3, 2, 0, 0, 0, 100).unwrap());
    }
}
