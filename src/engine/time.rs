//! Timetable clock strings.
//!
//! GTFS writes times as `HH:MM:SS` on a service-day clock, so hours run past
//! 23 for trips that cross midnight. Parsers here return `None` on anything
//! malformed; callers decide what a missing value means.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Weekday};

/// Splits `HH:MM` or `HH:MM:SS` into `(hours, minutes, seconds)`.
pub fn parse_clock(time: &str) -> Option<(u32, u32, u32)> {
    let mut parts = time.trim().split(':');
    let hours: u32 = parts.next()?.trim().parse().ok()?;
    let minutes: u32 = parts.next()?.trim().parse().ok()?;
    let seconds: u32 = match parts.next() {
        Some(s) => s.trim().parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() || minutes > 59 || seconds > 59 {
        return None;
    }
    Some((hours, minutes, seconds))
}

/// Minutes since the start of the service day, ignoring seconds.
pub fn clock_minutes(time: &str) -> Option<i64> {
    parse_clock(time).map(|(h, m, _)| i64::from(h) * 60 + i64::from(m))
}

/// Seconds since the start of the service day.
pub fn clock_seconds(time: &str) -> Option<i64> {
    parse_clock(time).map(|(h, m, s)| i64::from(h) * 3600 + i64::from(m) * 60 + i64::from(s))
}

/// Folds service-day hours back onto the wall clock: `"24:45:00"` becomes
/// `"00:45:00"`. Malformed input is returned untouched.
pub fn fold_past_midnight(time: &str) -> String {
    let trimmed = time.trim();
    match (parse_clock(trimmed), trimmed.split_once(':')) {
        (Some((hours, _, _)), Some((_, rest))) if hours >= 24 => {
            format!("{:02}:{}", hours % 24, rest)
        }
        _ => trimmed.to_string(),
    }
}

/// `HH:MM` prefix used by every rendered time column.
pub fn hhmm(time: &str) -> &str {
    let trimmed = time.trim();
    trimmed.get(..5).unwrap_or(trimmed)
}

/// Local instant of a service-day offset.
///
/// Anchored at noon minus twelve hours so DST transition days still land on
/// the published wall-clock times.
pub fn service_instant<Tz: TimeZone>(
    tz: &Tz,
    service_date: NaiveDate,
    seconds: i64,
) -> Option<DateTime<Tz>> {
    let noon = service_date.and_time(NaiveTime::from_hms_opt(12, 0, 0)?);
    let noon = tz.from_local_datetime(&noon).earliest()?;
    Some(noon - Duration::hours(12) + Duration::seconds(seconds))
}

/// Lower-case English day name, the form used in calendar variants.
pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Monday = 0 … Sunday = 6; unknown names sort as Monday.
pub fn day_order(name: &str) -> u8 {
    match name.trim().to_lowercase().as_str() {
        "monday" => 0,
        "tuesday" => 1,
        "wednesday" => 2,
        "thursday" => 3,
        "friday" => 4,
        "saturday" => 5,
        "sunday" => 6,
        _ => 0,
    }
}

/// Accepts a day name (`"saturday"`, `"sat"`) from user input.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    name.trim().parse::<Weekday>().ok()
}
