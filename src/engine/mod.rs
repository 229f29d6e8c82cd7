//! Realtime schedule correlation engine.
//!
//! Pure functions over the static records in [`crate::model`] and a
//! [`Clock`]. Nothing here performs I/O or returns an error: correlation
//! misses, malformed times and empty selections degrade to "unknown" values.

pub mod blocks;
pub mod board;
pub mod brigade;
pub mod calendar;
pub mod correlate;
pub mod delay;
pub mod line;
pub mod shape;
pub mod time;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;

/// Reports younger than this are fresh.
pub const DEFAULT_FRESH_WINDOW_SECS: i64 = 600;

/// Night-line duties still count as "tonight" until this local hour.
pub const DEFAULT_NIGHT_ROLLOVER_HOUR: u32 = 5;

/// The instant every derivation in one poll cycle is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clock {
    pub now: DateTime<Utc>,
    pub tz: Tz,
    pub fresh_window_secs: i64,
    pub night_rollover_hour: u32,
}

impl Clock {
    pub fn new(now: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            now,
            tz,
            fresh_window_secs: DEFAULT_FRESH_WINDOW_SECS,
            night_rollover_hour: DEFAULT_NIGHT_ROLLOVER_HOUR,
        }
    }

    pub fn with_fresh_window(mut self, secs: i64) -> Self {
        self.fresh_window_secs = secs;
        self
    }

    pub fn with_night_rollover_hour(mut self, hour: u32) -> Self {
        self.night_rollover_hour = hour;
        self
    }

    pub fn local_time(&self) -> NaiveTime {
        self.now.with_timezone(&self.tz).time()
    }

    pub fn local_date(&self) -> NaiveDate {
        self.now.with_timezone(&self.tz).date_naive()
    }

    pub fn weekday(&self) -> Weekday {
        self.local_date().weekday()
    }

    /// Seconds elapsed since a unix timestamp.
    pub fn age_secs(&self, timestamp: i64) -> i64 {
        self.now.timestamp() - timestamp
    }

    /// Service day whose timetable offset lands closest to `reference`.
    ///
    /// Picks among yesterday, today and tomorrow so that `24:10:00` seen at
    /// 00:15 and `23:58:00` seen at 00:03 both resolve to the right day.
    pub fn nearest_service_date(&self, scheduled_secs: i64, reference: DateTime<Utc>) -> NaiveDate {
        let today = self.local_date();
        [today - Duration::days(1), today, today + Duration::days(1)]
            .into_iter()
            .filter_map(|date| {
                time::service_instant(&self.tz, date, scheduled_secs)
                    .map(|at| (date, (at.timestamp() - reference.timestamp()).abs()))
            })
            .min_by_key(|(_, distance)| *distance)
            .map(|(date, _)| date)
            .unwrap_or(today)
    }

    /// Hour of the local clock, lifted past 24 in the small hours so it
    /// compares against night-line end times on the same service-day scale.
    pub(crate) fn night_clock_hour(&self) -> u32 {
        let hour = self.local_time().hour();
        if hour < self.night_rollover_hour {
            hour + 24
        } else {
            hour
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{clock_at, warsaw_ts};
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_local_fields() {
        let clock = clock_at(23, 50);
        assert_eq!(clock.local_time(), NaiveTime::from_hms_opt(23, 50, 0).unwrap());
        assert_eq!(clock.weekday(), Weekday::Tue);
        assert_eq!(clock.age_secs(clock.now.timestamp() - 42), 42);
    }

    #[test]
    fn test_nearest_service_date_after_midnight() {
        let clock = clock_at(0, 15);
        let reference = Utc.timestamp_opt(warsaw_ts(10, 0, 15, 0), 0).unwrap();
        // 24:10 belongs to the previous service day
        assert_eq!(
            clock.nearest_service_date(24 * 3600 + 600, reference),
            NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
        );
        // 23:58 also belongs to yesterday when seen at 00:15
        assert_eq!(
            clock.nearest_service_date(23 * 3600 + 58 * 60, reference),
            NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
        );
        // 00:20 is today
        assert_eq!(
            clock.nearest_service_date(20 * 60, reference),
            NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
        );
    }

    #[test]
    fn test_night_clock_hour() {
        assert_eq!(clock_at(1, 0).night_clock_hour(), 25);
        assert_eq!(clock_at(23, 0).night_clock_hour(), 23);
        assert_eq!(clock_at(12, 0).night_clock_hour(), 12);
    }
}
