//! Tick timestamps and the weekly epoch calendar
//!
//! Ticks carry a wall-clock timestamp with millisecond precision and a
//! two-digit year (offset from 2000). Timestamps only move forward: when the
//! proposed tick data does not carry a later time, the ledger advances by
//! one millisecond instead.

use crate::errors::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Day index of the first epoch boundary (2022-04-20, boundary at 12:00).
pub const EPOCH_ZERO_DAY_INDEX: u32 = 738_570;

/// Days per epoch
pub const EPOCH_LENGTH_DAYS: u32 = 7;

/// Hour of the boundary day at which the epoch ends
pub const EPOCH_TRANSITION_HOUR: u8 = 12;

/// Calendar timestamp of a tick.
///
/// Field order matches significance, so the derived ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TickTimestamp {
    /// Years since 2000
    pub year: u8,
    /// 1-12
    pub month: u8,
    /// 1-31
    pub day: u8,
    /// 0-23
    pub hour: u8,
    /// 0-59
    pub minute: u8,
    /// 0-59
    pub second: u8,
    /// 0-999
    pub millisecond: u16,
}

/// Encoded size of a timestamp
pub const TIMESTAMP_SIZE: usize = 8;

impl TickTimestamp {
    /// Build a timestamp, rejecting out-of-range fields.
    pub fn new(
        year: u8,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        millisecond: u16,
    ) -> Result<Self> {
        let ts = Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            millisecond,
        };
        if ts.is_valid() {
            Ok(ts)
        } else {
            Err(LedgerError::invalid(format!("invalid timestamp {ts:?}")))
        }
    }

    /// Whether every field is within its calendar range
    pub fn is_valid(&self) -> bool {
        (1..=12).contains(&self.month)
            && self.day >= 1
            && self.day <= days_in_month(self.year, self.month)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60
            && self.millisecond < 1000
    }

    /// Days since the proleptic calendar origin used by the epoch schedule.
    pub fn day_index(&self) -> u32 {
        day_index(self.year, self.month, self.day)
    }

    /// Whether the epoch numbered `epoch` is over at this time.
    pub fn epoch_boundary_reached(&self, epoch: u16) -> bool {
        let boundary = EPOCH_ZERO_DAY_INDEX + u32::from(epoch) * EPOCH_LENGTH_DAYS;
        let today = self.day_index();
        (today == boundary && self.hour >= EPOCH_TRANSITION_HOUR) || today > boundary
    }

    /// Epoch this timestamp falls in: the first epoch whose boundary has
    /// not been reached.
    pub fn epoch(&self) -> u16 {
        let today = self.day_index();
        if today < EPOCH_ZERO_DAY_INDEX {
            return 0;
        }
        let days = today - EPOCH_ZERO_DAY_INDEX;
        let before_boundary = days % EPOCH_LENGTH_DAYS == 0 && self.hour < EPOCH_TRANSITION_HOUR;
        let epoch = days / EPOCH_LENGTH_DAYS + u32::from(!before_boundary);
        u16::try_from(epoch).unwrap_or(u16::MAX)
    }

    /// Advance by one millisecond with full calendar rollover.
    pub fn advance_millisecond(&mut self) {
        self.millisecond += 1;
        if self.millisecond < 1000 {
            return;
        }
        self.millisecond = 0;
        self.second += 1;
        if self.second < 60 {
            return;
        }
        self.second = 0;
        self.minute += 1;
        if self.minute < 60 {
            return;
        }
        self.minute = 0;
        self.hour += 1;
        if self.hour < 24 {
            return;
        }
        self.hour = 0;
        self.day += 1;
        if self.day <= days_in_month(self.year, self.month) {
            return;
        }
        self.day = 1;
        self.month += 1;
        if self.month <= 12 {
            return;
        }
        self.month = 1;
        self.year = self.year.wrapping_add(1);
    }

    /// The later of `self + 1ms` and `proposed`.
    pub fn next_after(&self, proposed: &TickTimestamp) -> TickTimestamp {
        if proposed > self {
            *proposed
        } else {
            let mut next = *self;
            next.advance_millisecond();
            next
        }
    }

    /// Little-endian wire encoding
    pub fn to_bytes(&self) -> [u8; TIMESTAMP_SIZE] {
        let ms = self.millisecond.to_le_bytes();
        [
            ms[0],
            ms[1],
            self.second,
            self.minute,
            self.hour,
            self.day,
            self.month,
            self.year,
        ]
    }

    /// Decode from the wire encoding. Range checks are left to the caller.
    pub fn from_bytes(bytes: &[u8; TIMESTAMP_SIZE]) -> Self {
        Self {
            millisecond: u16::from_le_bytes([bytes[0], bytes[1]]),
            second: bytes[2],
            minute: bytes[3],
            hour: bytes[4],
            day: bytes[5],
            month: bytes[6],
            year: bytes[7],
        }
    }

    /// UTC time `millis` after the Unix epoch. Years outside 2000-2255 are
    /// clamped to the nearest representable instant.
    pub fn from_unix_millis(millis: u64) -> Self {
        const Y2K_MILLIS: u64 = 946_684_800_000;
        let millis = millis.max(Y2K_MILLIS);
        let days = millis / 86_400_000;
        let in_day = millis % 86_400_000;

        let z = days + 719_468;
        let era = z / 146_097;
        let doe = z - era * 146_097;
        let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let day = doy - (153 * mp + 2) / 5 + 1;
        let month = if mp < 10 { mp + 3 } else { mp - 9 };
        let year = yoe + era * 400 + u64::from(month <= 2);
        if year > 2255 {
            return Self {
                year: u8::MAX,
                month: 12,
                day: 31,
                hour: 23,
                minute: 59,
                second: 59,
                millisecond: 999,
            };
        }

        Self {
            year: (year - 2000) as u8,
            month: month as u8,
            day: day as u8,
            hour: (in_day / 3_600_000) as u8,
            minute: (in_day / 60_000 % 60) as u8,
            second: (in_day / 1_000 % 60) as u8,
            millisecond: (in_day % 1_000) as u16,
        }
    }
}

/// Number of days in `month` of year `2000 + year`
pub fn days_in_month(year: u8, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if year & 3 == 0 => 29,
        2 => 28,
        _ => 0,
    }
}

/// Day index of `2000 + year`-`month`-`day` with March as the first month.
pub fn day_index(year: u8, month: u8, day: u8) -> u32 {
    let m = (u32::from(month) + 9) % 12;
    let y = u32::from(year) + 2000 - m / 10;
    y * 365 + y / 4 - y / 100 + y / 400 + (m * 306 + 5) / 10 + u32::from(day) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(year: u8, month: u8, day: u8, hour: u8) -> TickTimestamp {
        TickTimestamp::new(year, month, day, hour, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_day_index_reference_dates() {
        assert_eq!(day_index(22, 4, 20), EPOCH_ZERO_DAY_INDEX);
        assert_eq!(day_index(22, 4, 13), EPOCH_ZERO_DAY_INDEX - 7);
        assert_eq!(day_index(24, 1, 1), 739_191);
    }

    #[test]
    fn test_epoch_boundary_at_noon() {
        assert!(!ts(22, 4, 27, 11).epoch_boundary_reached(1));
        assert!(ts(22, 4, 27, 12).epoch_boundary_reached(1));
        assert!(ts(22, 4, 28, 0).epoch_boundary_reached(1));
        assert!(!ts(22, 4, 26, 23).epoch_boundary_reached(1));
    }

    #[test]
    fn test_epoch_of_timestamp() {
        assert_eq!(ts(22, 4, 27, 11).epoch(), 1);
        assert_eq!(ts(22, 4, 27, 12).epoch(), 2);
        assert_eq!(ts(22, 4, 24, 0).epoch(), 1);
        assert_eq!(ts(21, 1, 1, 0).epoch(), 0);
        for t in [ts(24, 1, 10, 8), ts(24, 1, 10, 12), ts(25, 6, 3, 17)] {
            let epoch = t.epoch();
            assert!(!t.epoch_boundary_reached(epoch));
            assert!(t.epoch_boundary_reached(epoch - 1));
        }
    }

    #[test]
    fn test_millisecond_rollover_into_leap_day() {
        let mut t = TickTimestamp::new(24, 2, 28, 23, 59, 59, 999).unwrap();
        t.advance_millisecond();
        assert_eq!(t, ts(24, 2, 29, 0));

        let mut t = TickTimestamp::new(23, 2, 28, 23, 59, 59, 999).unwrap();
        t.advance_millisecond();
        assert_eq!(t, ts(23, 3, 1, 0));
    }

    #[test]
    fn test_year_rollover() {
        let mut t = TickTimestamp::new(23, 12, 31, 23, 59, 59, 999).unwrap();
        t.advance_millisecond();
        assert_eq!(t, ts(24, 1, 1, 0));
    }

    #[test]
    fn test_next_after_prefers_later_proposal() {
        let now = ts(23, 5, 5, 10);
        let later = ts(23, 5, 5, 11);
        assert_eq!(now.next_after(&later), later);
        let earlier = ts(23, 5, 5, 9);
        let mut expected = now;
        expected.millisecond = 1;
        assert_eq!(now.next_after(&earlier), expected);
        assert_eq!(now.next_after(&now), expected);
    }

    #[test]
    fn test_wire_encoding() {
        let t = TickTimestamp::new(23, 7, 14, 9, 30, 15, 512).unwrap();
        assert_eq!(TickTimestamp::from_bytes(&t.to_bytes()), t);
        assert_eq!(t.to_bytes()[7], 23);
    }

    #[test]
    fn test_from_unix_millis() {
        let t = TickTimestamp::from_unix_millis(1_704_844_800_000 + 12 * 3_600_000 + 5_123);
        assert_eq!(t, TickTimestamp::new(24, 1, 10, 12, 0, 5, 123).unwrap());
        assert_eq!(TickTimestamp::from_unix_millis(0), ts(0, 1, 1, 0));
        assert_eq!(TickTimestamp::from_unix_millis(951_782_400_000), ts(0, 2, 29, 0));
    }

    #[test]
    fn test_invalid_fields_rejected() {
        assert!(TickTimestamp::new(23, 2, 30, 0, 0, 0, 0).is_err());
        assert!(TickTimestamp::new(23, 13, 1, 0, 0, 0, 0).is_err());
        assert!(TickTimestamp::new(23, 1, 1, 0, 0, 0, 1000).is_err());
    }
}
