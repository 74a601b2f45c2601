//! Wall-clock access for scheduling decisions.
//!
//! Scheduling needs both the absolute "now" and the local calendar, since
//! recurring task alarms are pinned to a local time of day.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Local calendar date of an instant
    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate;

    /// Instant of a local wall-clock time, `None` if it does not exist that day
    fn resolve_local(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>>;

    /// First local occurrence of `time` strictly after `after`
    fn next_daily(&self, after: DateTime<Utc>, time: NaiveTime) -> Option<DateTime<Utc>> {
        let today = self.local_date(after);
        // Two days covers a DST gap swallowing today's occurrence
        (0..=2)
            .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
            .filter_map(|date| self.resolve_local(date, time))
            .find(|instant| *instant > after)
    }
}

/// The host's real clock and time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&Local).date_naive()
    }

    fn resolve_local(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        Local
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// A settable clock in a fixed UTC offset
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        FixedClock {
            now: Mutex::new(now),
            offset,
        }
    }

    /// Clock reading the given local wall-clock time
    pub fn at_local(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Option<Self> {
        offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|dt| FixedClock::new(dt.with_timezone(&Utc), offset))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = *now + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    fn resolve_local(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eight() -> NaiveTime {
        NaiveTime::from_hms_opt(8, 0, 0).unwrap()
    }

    fn clock_at(h: u32, m: u32) -> FixedClock {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        FixedClock::at_local(
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            offset,
        )
        .unwrap()
    }

    #[test]
    fn test_next_daily_before_time_is_today() {
        let clock = clock_at(7, 30);
        let next = clock.next_daily(clock.now(), eight()).unwrap();
        assert_eq!(next, clock.now() + Duration::minutes(30));
    }

    #[test]
    fn test_next_daily_after_time_is_tomorrow() {
        let clock = clock_at(9, 0);
        let next = clock.next_daily(clock.now(), eight()).unwrap();
        assert_eq!(next, clock.now() + Duration::hours(23));
    }

    #[test]
    fn test_next_daily_exactly_at_time_rolls_forward() {
        let clock = clock_at(8, 0);
        let next = clock.next_daily(clock.now(), eight()).unwrap();
        assert_eq!(next, clock.now() + Duration::days(1));
    }

    #[test]
    fn test_local_date_uses_offset() {
        // 23:30 UTC on the 19th is already the 20th at UTC+2
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let instant = Utc.with_ymd_and_hms(2026, 10, 19, 23, 30, 0).unwrap();
        let clock = FixedClock::new(instant, offset);
        assert_eq!(
            clock.local_date(instant),
            NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
        );
    }
}
