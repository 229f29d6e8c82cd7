//! Matching live vehicle reports onto trip stop sequences.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::Clock;
use super::blocks::{block_before_end, is_before_end_time};
use super::delay::{Eta, Staleness, etas, schedule_delay, staleness};
use crate::model::{Block, CorrelationResult, RealtimeVehicleReport, Trip, VehicleType};

/// Static lookups the correlator needs from a loaded schedule.
pub trait ScheduleLookup {
    fn trip(&self, vehicle_type: VehicleType, trip_id: &str) -> Option<Arc<Trip>>;

    fn block_for_trip(&self, vehicle_type: VehicleType, trip_id: &str) -> Option<&Block>;
}

/// First stop-time whose `stop_id` matches; loop routes resolve to the
/// earliest visit.
pub fn current_stop_index(trip: &Trip, stop_id: Option<&str>) -> Option<usize> {
    let stop_id = stop_id?;
    trip.stop_times.iter().position(|st| st.stop_id == stop_id)
}

/// Position of a trip in an ordered trip list.
pub fn find_trip(trips: &[Arc<Trip>], trip_id: &str) -> Option<usize> {
    trips.iter().position(|t| t.trip_id == trip_id)
}

fn report_before_end(report: &RealtimeVehicleReport, lookup: &impl ScheduleLookup, clock: &Clock) -> bool {
    let Some(trip_id) = report.trip_id.as_deref() else {
        return true;
    };
    if let Some(block) = lookup.block_for_trip(report.vehicle_type, trip_id) {
        return block_before_end(block, clock);
    }
    match lookup.trip(report.vehicle_type, trip_id) {
        Some(trip) => is_before_end_time(
            &trip.last_stop_time,
            std::slice::from_ref(&trip.route_short_name),
            clock,
        ),
        None => true,
    }
}

/// Correlates one report; `None` when its trip is not in the loaded schedule.
pub fn correlate(
    report: &RealtimeVehicleReport,
    lookup: &impl ScheduleLookup,
    clock: &Clock,
) -> Option<CorrelationResult> {
    let trip = lookup.trip(report.vehicle_type, report.trip_id.as_deref()?)?;
    let current_stop_index = current_stop_index(&trip, report.stop_id.as_deref());
    let delay_minutes = schedule_delay(&trip.stop_times, current_stop_index, report.timestamp, clock);
    let before_end = report_before_end(report, lookup, clock);
    Some(CorrelationResult {
        staleness: staleness(clock.age_secs(report.timestamp), before_end, clock.fresh_window_secs),
        trip,
        current_stop_index,
        delay_minutes,
    })
}

/// Everything the presentation layer needs about one live vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleStatus {
    pub report: RealtimeVehicleReport,
    /// `None` means "not in service / not reporting a known trip".
    pub correlation: Option<CorrelationResult>,
    pub staleness: Staleness,
}

impl VehicleStatus {
    pub fn delay_minutes(&self) -> Option<i64> {
        self.correlation.as_ref().and_then(|c| c.delay_minutes)
    }

    pub fn current_stop_name(&self) -> Option<&str> {
        let correlation = self.correlation.as_ref()?;
        let index = correlation.current_stop_index?;
        correlation
            .trip
            .stop_times
            .get(index)
            .map(|st| st.stop_name.as_str())
    }
}

/// One status per live vehicle for a whole snapshot.
///
/// A vehicle reported twice keeps its newest report; output order follows
/// first appearance in the snapshot.
pub fn correlate_snapshot(
    reports: &[RealtimeVehicleReport],
    lookup: &impl ScheduleLookup,
    clock: &Clock,
) -> Vec<VehicleStatus> {
    let mut latest: Vec<&RealtimeVehicleReport> = Vec::with_capacity(reports.len());
    let mut slots: HashMap<(VehicleType, &str), usize> = HashMap::new();
    for report in reports {
        match slots.get(&(report.vehicle_type, report.vehicle_id.as_str())) {
            Some(&slot) => {
                if report.timestamp >= latest[slot].timestamp {
                    latest[slot] = report;
                }
            }
            None => {
                slots.insert((report.vehicle_type, report.vehicle_id.as_str()), latest.len());
                latest.push(report);
            }
        }
    }

    latest
        .into_iter()
        .map(|report| {
            let correlation = correlate(report, lookup, clock);
            let staleness = match &correlation {
                Some(c) => c.staleness,
                None => staleness(
                    clock.age_secs(report.timestamp),
                    report_before_end(report, lookup, clock),
                    clock.fresh_window_secs,
                ),
            };
            VehicleStatus {
                report: report.clone(),
                correlation,
                staleness,
            }
        })
        .collect()
}

/// Browses the trips of a vehicle's block without touching the list itself.
///
/// `selected` is an index into the shared trip list, clamped to its bounds;
/// the live trip is the one the vehicle currently reports.
#[derive(Debug, Clone)]
pub struct TripCursor {
    trips: Arc<[Arc<Trip>]>,
    live: Option<usize>,
    selected: usize,
}

impl TripCursor {
    /// Starts on the live trip, or the first trip when it is unknown.
    pub fn new(trips: Arc<[Arc<Trip>]>, live_trip_id: Option<&str>) -> Self {
        let live = live_trip_id.and_then(|id| find_trip(&trips, id));
        Self {
            selected: live.unwrap_or(0),
            trips,
            live,
        }
    }

    pub fn trips(&self) -> &[Arc<Trip>] {
        &self.trips
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&Arc<Trip>> {
        self.trips.get(self.selected)
    }

    pub fn is_live(&self) -> bool {
        self.live == Some(self.selected)
    }

    /// Moves by `delta` trips, clamped to `[0, len - 1]`.
    pub fn shift(&mut self, delta: isize) {
        let last = self.trips.len().saturating_sub(1);
        self.selected = self.selected.saturating_add_signed(delta).min(last);
    }

    pub fn next(&mut self) {
        self.shift(1);
    }

    pub fn previous(&mut self) {
        self.shift(-1);
    }

    /// Back to the live trip (or the first trip if none is live).
    pub fn current(&mut self) {
        self.selected = self.live.unwrap_or(0);
    }
}

/// One row of the stop list in the vehicle view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopRow {
    pub stop_id: String,
    pub stop_name: String,
    pub departure: String,
    pub passed: bool,
    pub is_current: bool,
    pub eta: Eta,
}

/// Stop list of the selected trip; ETAs only on the live trip.
pub fn stop_rows(cursor: &TripCursor, current_stop_index: Option<usize>) -> Vec<StopRow> {
    let Some(trip) = cursor.selected() else {
        return Vec::new();
    };
    let live = cursor.is_live();
    let current = if live { current_stop_index } else { None };
    let etas = etas(&trip.stop_times, current);
    trip.stop_times
        .iter()
        .zip(etas)
        .enumerate()
        .map(|(i, (st, eta))| StopRow {
            stop_id: st.stop_id.clone(),
            stop_name: st.stop_name.clone(),
            departure: super::time::hhmm(&st.scheduled_time).to_string(),
            passed: current.is_some_and(|c| i < c),
            is_current: current == Some(i),
            eta,
        })
        .collect()
}
