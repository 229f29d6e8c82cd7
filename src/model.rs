//! Reference and realtime records shared by the providers and the engine.
//!
//! Static records (`Route`, `ServiceCalendar`, `Block`, `Trip`, `StopTime`)
//! are built once per schedule load and never mutated afterwards. Realtime
//! records are rebuilt from scratch on every poll.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::engine::line::{LineKind, classify};

/// Which dataset a route or vehicle belongs to.
///
/// Identifiers (route, trip, block, service) are only unique within one
/// dataset, so lookups always carry the vehicle type along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Bus,
    Tram,
}

impl VehicleType {
    /// Three-character line numbers are buses, everything else is a tram.
    pub fn from_short_name(route_short_name: &str) -> Self {
        if route_short_name.chars().count() == 3 {
            VehicleType::Bus
        } else {
            VehicleType::Tram
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Bus => "bus",
            VehicleType::Tram => "tram",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VehicleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bus" | "a" => Ok(VehicleType::Bus),
            "tram" | "t" => Ok(VehicleType::Tram),
            other => Err(format!("unknown vehicle type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub route_id: String,
    pub route_short_name: String,
    pub category: LineKind,
}

impl Route {
    pub fn new(route_id: impl Into<String>, route_short_name: impl Into<String>) -> Self {
        let route_short_name = route_short_name.into();
        Self {
            route_id: route_id.into(),
            category: classify(&route_short_name),
            route_short_name,
        }
    }
}

/// A `(days, service_id)` pair as published for a route.
///
/// Day names are kept as received (lower-case English weekday names in
/// practice); unknown names are tolerated everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ServiceCalendar {
    pub service_id: String,
    pub days: Vec<String>,
}

/// One vehicle duty ("brygada") under a single service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    pub block_id: String,
    pub schedule_number: String,
    pub service_id: String,
    pub start_time: String,
    pub end_time: String,
    pub service_days: Vec<String>,
    /// Index-aligned with the line badges rendered for this block.
    pub route_short_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStop {
    pub stop_id: String,
    pub stop_name: String,
}

/// Stops served by one direction of a line, in travel order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDirection {
    pub route_short_name: String,
    pub direction_id: u32,
    /// Distinct headsigns of the direction's trips, in feed order.
    pub headsigns: Vec<String>,
    pub stops: Vec<RouteStop>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopTime {
    pub stop_id: String,
    pub stop_name: String,
    pub scheduled_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trip {
    pub trip_id: String,
    pub route_short_name: String,
    pub trip_headsign: String,
    pub first_stop_time: String,
    pub last_stop_time: String,
    /// Sequence order; never re-sorted past load time.
    pub stop_times: Vec<StopTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShapePoint {
    pub sequence: u32,
    pub lat: f64,
    pub lon: f64,
}

/// A single vehicle position as reported by the realtime feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeVehicleReport {
    pub vehicle_id: String,
    pub trip_id: Option<String>,
    pub stop_id: Option<String>,
    pub route_short_name: Option<String>,
    pub schedule_number: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub bearing: f32,
    /// Unix seconds.
    pub timestamp: i64,
    pub vehicle_type: VehicleType,
}

/// Where a live vehicle sits on its trip, derived on every poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub trip: Arc<Trip>,
    /// `None` when the reported stop is not part of the trip: position unknown.
    pub current_stop_index: Option<usize>,
    pub delay_minutes: Option<i64>,
    pub staleness: crate::engine::delay::Staleness,
}
