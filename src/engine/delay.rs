//! Delay, staleness and time-to-departure derivations.

use std::collections::HashSet;
use std::fmt;

use chrono::{TimeZone, Utc};
use serde::{Serialize, Serializer};

use super::Clock;
use super::time::{clock_minutes, clock_seconds, service_instant};
use crate::model::StopTime;

/// Freshness of a realtime report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Staleness {
    Fresh,
    /// Old report while the duty should still be running.
    Stale,
    /// Old report after the duty's end time: the vehicle has likely gone home.
    LateService,
}

/// Freshness wins over the end-of-service check.
pub fn staleness(age_secs: i64, before_end: bool, fresh_window_secs: i64) -> Staleness {
    if age_secs <= fresh_window_secs {
        Staleness::Fresh
    } else if !before_end {
        Staleness::LateService
    } else {
        Staleness::Stale
    }
}

/// Schedule-based time to reach a stop from the vehicle's current stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eta {
    ArrivingNow,
    NotApplicable,
    Minutes(i64),
}

impl fmt::Display for Eta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eta::ArrivingNow => f.write_str(">>>"),
            Eta::NotApplicable => f.write_str("-"),
            Eta::Minutes(minutes) => write!(f, "{minutes} min"),
        }
    }
}

impl Serialize for Eta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Sums timetable deltas between consecutive stops from `current` to `target`.
///
/// A pair with an unparseable time contributes zero.
pub fn time_to_departure(stop_times: &[StopTime], current: Option<usize>, target: usize) -> Eta {
    let Some(current) = current else {
        return Eta::NotApplicable;
    };
    if target == current {
        return Eta::ArrivingNow;
    }
    if target < current || target >= stop_times.len() {
        return Eta::NotApplicable;
    }
    let minutes = stop_times[current..=target]
        .windows(2)
        .map(|pair| {
            match (
                clock_minutes(&pair[0].scheduled_time),
                clock_minutes(&pair[1].scheduled_time),
            ) {
                (Some(prev), Some(next)) => next - prev,
                _ => 0,
            }
        })
        .sum();
    Eta::Minutes(minutes)
}

/// ETA for every stop of a trip, index-aligned with `stop_times`.
pub fn etas(stop_times: &[StopTime], current: Option<usize>) -> Vec<Eta> {
    (0..stop_times.len())
        .map(|i| time_to_departure(stop_times, current, i))
        .collect()
}

/// Minutes between the report and the scheduled time at the current stop.
///
/// `None` when the position is unknown; a malformed scheduled time yields
/// zero delay.
pub fn schedule_delay(
    stop_times: &[StopTime],
    current: Option<usize>,
    report_timestamp: i64,
    clock: &Clock,
) -> Option<i64> {
    let stop = stop_times.get(current?)?;
    let Some(scheduled_secs) = clock_seconds(&stop.scheduled_time) else {
        return Some(0);
    };
    let Some(reported) = Utc.timestamp_opt(report_timestamp, 0).single() else {
        return Some(0);
    };
    let service_date = clock.nearest_service_date(scheduled_secs, reported);
    let Some(scheduled) = service_instant(&clock.tz, service_date, scheduled_secs) else {
        return Some(0);
    };
    let diff_secs = report_timestamp - scheduled.timestamp();
    Some((diff_secs as f64 / 60.0).round() as i64)
}

/// Keeps a delay only on the first row of each schedule number.
///
/// Later rows sharing a schedule number get `None` so one brigade's delay
/// is not repeated across its line badges.
pub fn attribute_delays<'a>(
    rows: impl IntoIterator<Item = (&'a str, Option<i64>)>,
) -> Vec<Option<i64>> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .map(|(schedule_number, delay)| {
            if seen.insert(schedule_number) {
                delay
            } else {
                None
            }
        })
        .collect()
}

/// Table cell for an attributed delay.
pub fn delay_cell(delay: Option<i64>) -> String {
    match delay {
        Some(minutes) => format!("{minutes} min"),
        None => "—".to_string(),
    }
}

/// Badge next to upcoming stops in the vehicle view.
pub fn delay_badge(delay: Option<i64>) -> String {
    match delay {
        Some(minutes) if minutes > 0 => format!("+{minutes} min"),
        Some(_) => "OK".to_string(),
        None => "—".to_string(),
    }
}

/// Recent reports read as seconds ago, older ones as the local report time.
pub fn age_label(timestamp: i64, clock: &Clock) -> String {
    let age = clock.age_secs(timestamp);
    if age <= 120 {
        return format!("{} s ago", age.max(0));
    }
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(at) => at.with_timezone(&clock.tz).format("%H:%M").to_string(),
        None => "-".to_string(),
    }
}
