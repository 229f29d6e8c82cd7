//! Per-brigade timetable: the trips one vehicle works through a shift.

use std::sync::Arc;

use serde::Serialize;

use super::time::{clock_seconds, hhmm};
use crate::model::Trip;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRow {
    /// 1-based position of the trip within the duty.
    pub ordinal: usize,
    pub trip_id: String,
    /// Layover since the previous trip's last stop; absent on the first trip.
    pub break_minutes: Option<i64>,
    pub duration_minutes: Option<i64>,
    pub first_stop_time: String,
    pub last_stop_time: String,
    pub line: String,
    pub headsign: String,
    pub is_live: bool,
}

fn whole_minutes_between(from: &str, to: &str) -> Option<i64> {
    Some((clock_seconds(to)? - clock_seconds(from)?).div_euclid(60))
}

/// One row per trip, in the order given.
pub fn schedule_rows(trips: &[Arc<Trip>], live_trip_id: Option<&str>) -> Vec<ScheduleRow> {
    trips
        .iter()
        .enumerate()
        .map(|(i, trip)| {
            let break_minutes = i
                .checked_sub(1)
                .and_then(|prev| whole_minutes_between(&trips[prev].last_stop_time, &trip.first_stop_time));
            ScheduleRow {
                ordinal: i + 1,
                trip_id: trip.trip_id.clone(),
                break_minutes,
                duration_minutes: whole_minutes_between(&trip.first_stop_time, &trip.last_stop_time),
                first_stop_time: hhmm(&trip.first_stop_time).to_string(),
                last_stop_time: hhmm(&trip.last_stop_time).to_string(),
                line: trip.route_short_name.clone(),
                headsign: trip.trip_headsign.clone(),
                is_live: live_trip_id == Some(trip.trip_id.as_str()),
            }
        })
        .collect()
}
