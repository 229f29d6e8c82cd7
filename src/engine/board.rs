//! Departure board for a single stop.

use std::fmt;

use serde::{Serialize, Serializer};

use super::Clock;
use super::correlate::VehicleStatus;
use super::delay::attribute_delays;
use super::time::{clock_seconds, hhmm, service_instant};

/// Delays are only worth showing for departures this close.
pub const DELAY_HORIZON_MINUTES: i64 = 60;

/// A timetabled departure at a stop, as served by the schedule provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledDeparture {
    pub trip_id: String,
    pub stop_id: String,
    pub route_short_name: String,
    pub trip_headsign: String,
    pub departure_time: String,
    pub schedule_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    Departed,
    ArrivingNow,
    Minutes(i64),
}

impl Countdown {
    pub fn from_minutes(minutes: i64) -> Self {
        match minutes {
            m if m < 0 => Countdown::Departed,
            0 => Countdown::ArrivingNow,
            m => Countdown::Minutes(m),
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Countdown::Departed => f.write_str("departed"),
            Countdown::ArrivingNow => f.write_str(">>>"),
            Countdown::Minutes(minutes) => write!(f, "{minutes} min"),
        }
    }
}

impl Serialize for Countdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepartureRow {
    pub line: String,
    pub headsign: String,
    pub scheduled_departure: String,
    pub countdown: Countdown,
    pub schedule_number: String,
    pub vehicle_id: Option<String>,
    pub delay_minutes: Option<i64>,
}

/// Whole minutes from now until `departure_time` on today's service day.
///
/// Both ends are cut to the minute first, so 08:10:59 counts 08:12 as two
/// minutes away, the same as the wall clock reads.
pub fn minutes_until(departure_time: &str, clock: &Clock) -> Option<i64> {
    let at = service_instant(&clock.tz, clock.local_date(), clock_seconds(departure_time)?)?;
    Some(at.timestamp().div_euclid(60) - clock.now.timestamp().div_euclid(60))
}

/// Joins timetabled departures with the live vehicles working them.
///
/// Vehicles are matched by schedule number. Rows whose time cannot be read
/// are dropped.
pub fn departure_board(
    departures: &[ScheduledDeparture],
    statuses: &[VehicleStatus],
    clock: &Clock,
) -> Vec<DepartureRow> {
    let rows: Vec<DepartureRow> = departures
        .iter()
        .filter_map(|dep| {
            let minutes = minutes_until(&dep.departure_time, clock)?;
            let vehicle = statuses
                .iter()
                .find(|s| s.report.schedule_number.as_deref() == Some(dep.schedule_number.as_str()));
            let delay_minutes = vehicle
                .and_then(VehicleStatus::delay_minutes)
                .filter(|_| minutes <= DELAY_HORIZON_MINUTES);
            Some(DepartureRow {
                line: dep.route_short_name.clone(),
                headsign: dep.trip_headsign.clone(),
                scheduled_departure: hhmm(&dep.departure_time).to_string(),
                countdown: Countdown::from_minutes(minutes),
                schedule_number: dep.schedule_number.clone(),
                vehicle_id: vehicle.map(|s| s.report.vehicle_id.clone()),
                delay_minutes,
            })
        })
        .collect();

    let attributed = attribute_delays(
        rows.iter()
            .map(|r| (r.schedule_number.as_str(), r.delay_minutes)),
    );
    rows.into_iter()
        .zip(attributed)
        .map(|(row, delay_minutes)| DepartureRow { delay_minutes, ..row })
        .collect()
}
