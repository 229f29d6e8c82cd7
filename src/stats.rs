use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::engine::correlate::VehicleStatus;
use crate::engine::delay::Staleness;
use crate::model::VehicleType;

/// Per-tick counters over one correlated fleet snapshot.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SnapshotStats {
    pub timestamp: DateTime<Utc>,
    pub vehicles: usize,
    pub buses: usize,
    pub trams: usize,

    // report fields
    pub with_trip: usize,
    pub with_stop_id: usize,
    pub with_schedule_number: usize,

    // correlation
    pub correlated: usize,
    pub unknown_position: usize,
    pub delayed: usize,

    // staleness
    pub fresh: usize,
    pub stale: usize,
    pub late_service: usize,
}

impl SnapshotStats {
    pub fn from_statuses(statuses: &[VehicleStatus], timestamp: DateTime<Utc>) -> Self {
        let mut s = SnapshotStats {
            timestamp,
            vehicles: statuses.len(),
            ..Default::default()
        };

        for status in statuses {
            let report = &status.report;
            match report.vehicle_type {
                VehicleType::Bus => s.buses += 1,
                VehicleType::Tram => s.trams += 1,
            }

            if report.trip_id.is_some() {
                s.with_trip += 1;
            }
            if report.stop_id.is_some() {
                s.with_stop_id += 1;
            }
            if report.schedule_number.is_some() {
                s.with_schedule_number += 1;
            }

            if let Some(c) = &status.correlation {
                s.correlated += 1;
                if c.current_stop_index.is_none() {
                    s.unknown_position += 1;
                }
                if c.delay_minutes.is_some_and(|d| d > 0) {
                    s.delayed += 1;
                }
            }

            match status.staleness {
                Staleness::Fresh => s.fresh += 1,
                Staleness::Stale => s.stale += 1,
                Staleness::LateService => s.late_service += 1,
            }
        }

        s
    }

    pub fn log(&self) {
        info!(
            vehicles = self.vehicles,
            buses = self.buses,
            trams = self.trams,
            correlated = self.correlated,
            unknown_position = self.unknown_position,
            delayed = self.delayed,
            fresh = self.fresh,
            stale = self.stale,
            late_service = self.late_service,
            "Fleet snapshot"
        );
    }
}
