//! Static schedule provider: GTFS datasets indexed for the engine's queries.
//!
//! Bus and tram schedules are published as separate GTFS datasets whose
//! identifiers overlap, so each dataset is loaded into its own
//! [`StaticSchedule`] and the [`Network`] dispatches on [`VehicleType`].

pub mod loader;
pub mod numbering;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::engine::board::ScheduledDeparture;
use crate::engine::correlate::ScheduleLookup;
use crate::engine::time::{clock_seconds, fold_past_midnight};
use crate::error::ScheduleError;
use crate::model::{
    Block, Route, RouteDirection, RouteStop, ServiceCalendar, ShapePoint, StopTime, Trip,
    VehicleType,
};
use loader::{GtfsTables, load_tables};
use numbering::{BlockKey, assign_schedule_numbers, block_number};

#[derive(Debug, Clone)]
struct TripMeta {
    route_id: String,
    service_id: String,
    block_id: Option<String>,
    shape_id: Option<String>,
    direction_id: Option<u32>,
}

/// One loaded GTFS dataset.
#[derive(Debug, Clone)]
pub struct StaticSchedule {
    vehicle_type: VehicleType,
    routes: Vec<Route>,
    route_index: HashMap<String, usize>,
    calendars: HashMap<String, Vec<String>>,
    /// Service ids in calendar.txt order.
    calendar_order: Vec<String>,
    trips: HashMap<String, Arc<Trip>>,
    /// Trip ids in trips.txt order.
    trip_order: Vec<String>,
    trip_meta: HashMap<String, TripMeta>,
    blocks: Vec<Block>,
    /// Trips of `blocks[i]`, ordered by first departure.
    block_trips: Vec<Arc<[Arc<Trip>]>>,
    block_index: HashMap<(String, String), usize>,
    shapes: HashMap<String, Vec<ShapePoint>>,
}

fn departure_key(trip: &Trip) -> (i64, &str) {
    (
        clock_seconds(&trip.first_stop_time).unwrap_or(i64::MAX),
        trip.trip_id.as_str(),
    )
}

impl StaticSchedule {
    #[instrument(skip_all, fields(vehicle_type = %vehicle_type))]
    pub fn load(dir: &Path, vehicle_type: VehicleType) -> Result<Self, ScheduleError> {
        let tables = load_tables(dir)?;
        let schedule = Self::from_tables(vehicle_type, tables);
        info!(
            routes = schedule.routes.len(),
            trips = schedule.trips.len(),
            blocks = schedule.blocks.len(),
            "Static schedule ready"
        );
        Ok(schedule)
    }

    pub fn from_tables(vehicle_type: VehicleType, tables: GtfsTables) -> Self {
        let routes: Vec<Route> = tables
            .routes
            .iter()
            .map(|r| Route::new(r.route_id.clone(), r.route_short_name.clone()))
            .collect();
        let route_index: HashMap<String, usize> = routes
            .iter()
            .enumerate()
            .map(|(i, r)| (r.route_id.clone(), i))
            .collect();
        let short_name = |route_id: &str| -> String {
            route_index
                .get(route_id)
                .map(|&i| routes[i].route_short_name.clone())
                .unwrap_or_else(|| route_id.to_string())
        };

        let stop_names: HashMap<&str, &str> = tables
            .stops
            .iter()
            .map(|s| (s.stop_id.as_str(), s.stop_name.as_str()))
            .collect();

        let mut stop_times_by_trip: HashMap<&str, Vec<&loader::StopTimeRecord>> = HashMap::new();
        for st in &tables.stop_times {
            stop_times_by_trip.entry(st.trip_id.as_str()).or_default().push(st);
        }

        let mut trips = HashMap::new();
        let mut trip_meta = HashMap::new();
        for record in &tables.trips {
            let mut stops = stop_times_by_trip
                .remove(record.trip_id.as_str())
                .unwrap_or_default();
            stops.sort_by_key(|st| st.stop_sequence);
            let stop_times: Vec<StopTime> = stops
                .iter()
                .map(|st| StopTime {
                    stop_id: st.stop_id.clone(),
                    stop_name: stop_names
                        .get(st.stop_id.as_str())
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| st.stop_id.clone()),
                    scheduled_time: st.departure_time.clone(),
                })
                .collect();
            let trip = Trip {
                trip_id: record.trip_id.clone(),
                route_short_name: short_name(&record.route_id),
                trip_headsign: record.trip_headsign.clone(),
                first_stop_time: stop_times
                    .first()
                    .map(|s| s.scheduled_time.clone())
                    .unwrap_or_default(),
                last_stop_time: stop_times
                    .last()
                    .map(|s| s.scheduled_time.clone())
                    .unwrap_or_default(),
                stop_times,
            };
            trips.insert(record.trip_id.clone(), Arc::new(trip));
            trip_meta.insert(
                record.trip_id.clone(),
                TripMeta {
                    route_id: record.route_id.clone(),
                    service_id: record.service_id.clone(),
                    block_id: record.block_id.clone(),
                    shape_id: record.shape_id.clone(),
                    direction_id: record.direction_id,
                },
            );
        }

        // (block_id, service_id) -> trip ids, in first-seen order of blocks
        let mut grouped: Vec<((String, String), Vec<Arc<Trip>>)> = Vec::new();
        let mut group_index: HashMap<(String, String), usize> = HashMap::new();
        for record in &tables.trips {
            let (Some(block_id), Some(trip)) = (&record.block_id, trips.get(&record.trip_id)) else {
                continue;
            };
            let key = (block_id.clone(), record.service_id.clone());
            let slot = *group_index.entry(key.clone()).or_insert_with(|| {
                grouped.push((key, Vec::new()));
                grouped.len() - 1
            });
            grouped[slot].1.push(trip.clone());
        }
        for (_, block) in grouped.iter_mut() {
            block.sort_by(|a, b| departure_key(a).cmp(&departure_key(b)));
        }

        let block_routes: Vec<Vec<String>> = grouped
            .iter()
            .map(|(_, block)| {
                let mut ids: Vec<String> = Vec::new();
                for meta in block.iter().filter_map(|t| trip_meta.get(&t.trip_id)) {
                    if !ids.contains(&meta.route_id) {
                        ids.push(meta.route_id.clone());
                    }
                }
                ids
            })
            .collect();
        let keys: Vec<BlockKey<'_>> = grouped
            .iter()
            .zip(&block_routes)
            .map(|(((block_id, service_id), _), route_ids)| BlockKey {
                block_id,
                service_id,
                route_ids,
            })
            .collect();
        let mut numbers = assign_schedule_numbers(vehicle_type, &keys, short_name);

        let calendars: HashMap<String, Vec<String>> = tables
            .calendar
            .iter()
            .map(|c| (c.service_id.clone(), c.days.clone()))
            .collect();
        let mut calendar_order: Vec<String> = Vec::new();
        for c in &tables.calendar {
            if !calendar_order.contains(&c.service_id) {
                calendar_order.push(c.service_id.clone());
            }
        }
        let trip_order = tables.trips.iter().map(|t| t.trip_id.clone()).collect();

        let mut blocks = Vec::with_capacity(grouped.len());
        let mut block_trips = Vec::with_capacity(grouped.len());
        for (((block_id, service_id), block), route_ids) in grouped.into_iter().zip(&block_routes) {
            let key = (block_id, service_id);
            blocks.push(Block {
                schedule_number: numbers.remove(&key).unwrap_or_default(),
                start_time: block
                    .first()
                    .map(|t| t.first_stop_time.clone())
                    .unwrap_or_default(),
                end_time: block
                    .last()
                    .map(|t| fold_past_midnight(&t.last_stop_time))
                    .unwrap_or_default(),
                service_days: calendars.get(&key.1).cloned().unwrap_or_default(),
                route_short_names: route_ids.iter().map(|id| short_name(id)).collect(),
                block_id: key.0,
                service_id: key.1,
            });
            block_trips.push(Arc::from(block));
        }
        let block_index = blocks
            .iter()
            .enumerate()
            .map(|(i, b)| ((b.block_id.clone(), b.service_id.clone()), i))
            .collect();

        let mut shapes: HashMap<String, Vec<ShapePoint>> = HashMap::new();
        for shape in tables.shapes {
            shapes.entry(shape.shape_id).or_default().push(shape.point);
        }

        Self {
            vehicle_type,
            routes,
            route_index,
            calendars,
            calendar_order,
            trips,
            trip_order,
            trip_meta,
            blocks,
            block_trips,
            block_index,
            shapes,
        }
    }

    pub fn vehicle_type(&self) -> VehicleType {
        self.vehicle_type
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route_by_short_name(&self, short_name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.route_short_name == short_name)
    }

    pub fn route_short_name(&self, route_id: &str) -> Option<&str> {
        self.route_index
            .get(route_id)
            .map(|&i| self.routes[i].route_short_name.as_str())
    }

    fn route_block_indices(&self, route_id: &str) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.blocks.len())
            .filter(|&i| {
                self.block_trips[i].iter().any(|t| {
                    self.trip_meta
                        .get(&t.trip_id)
                        .is_some_and(|m| m.route_id == route_id)
                })
            })
            .collect();
        indices.sort_by_key(|&i| block_number(&self.blocks[i].block_id).unwrap_or(u64::MAX));
        indices
    }

    /// Blocks working a route under any service, by block number.
    pub fn blocks_for_route(&self, route_id: &str) -> Vec<Block> {
        self.route_block_indices(route_id)
            .into_iter()
            .map(|i| self.blocks[i].clone())
            .collect()
    }

    /// Trips in trips.txt order with their metadata.
    fn trips_in_feed_order(&self) -> impl Iterator<Item = (&Arc<Trip>, &TripMeta)> {
        self.trip_order
            .iter()
            .filter_map(|id| Some((self.trips.get(id)?, self.trip_meta.get(id)?)))
    }

    /// `(days, service_id)` variants of the services a route runs under, in
    /// the order the route's trips first use them.
    pub fn calendar_variants(&self, route_id: &str) -> Vec<ServiceCalendar> {
        let mut variants: Vec<ServiceCalendar> = Vec::new();
        for (_, meta) in self.trips_in_feed_order().filter(|(_, m)| m.route_id == route_id) {
            if variants.iter().any(|v| v.service_id == meta.service_id) {
                continue;
            }
            variants.push(ServiceCalendar {
                service_id: meta.service_id.clone(),
                days: self.calendars.get(&meta.service_id).cloned().unwrap_or_default(),
            });
        }
        variants
    }

    pub fn block(&self, block_id: &str, service_id: &str) -> Option<&Block> {
        let i = self.block_index.get(&(block_id.to_string(), service_id.to_string()))?;
        Some(&self.blocks[*i])
    }

    pub fn trips_for_block(&self, block_id: &str, service_id: &str) -> Option<Arc<[Arc<Trip>]>> {
        let i = self.block_index.get(&(block_id.to_string(), service_id.to_string()))?;
        Some(self.block_trips[*i].clone())
    }

    pub fn trips_for_schedule_number(
        &self,
        schedule_number: &str,
        service_id: &str,
    ) -> Option<Arc<[Arc<Trip>]>> {
        let i = self
            .blocks
            .iter()
            .position(|b| b.schedule_number == schedule_number && b.service_id == service_id)?;
        Some(self.block_trips[i].clone())
    }

    pub fn trip(&self, trip_id: &str) -> Option<Arc<Trip>> {
        self.trips.get(trip_id).cloned()
    }

    pub fn block_for_trip(&self, trip_id: &str) -> Option<&Block> {
        let meta = self.trip_meta.get(trip_id)?;
        self.block(meta.block_id.as_deref()?, &meta.service_id)
    }

    pub fn trips_for_trip_block(&self, trip_id: &str) -> Option<Arc<[Arc<Trip>]>> {
        let meta = self.trip_meta.get(trip_id)?;
        self.trips_for_block(meta.block_id.as_deref()?, &meta.service_id)
    }

    pub fn stop_list(&self, trip_id: &str) -> Option<&[StopTime]> {
        self.trips.get(trip_id).map(|t| t.stop_times.as_slice())
    }

    /// Shape points of a trip in file order; empty when the trip has no shape.
    pub fn shape_points(&self, trip_id: &str) -> &[ShapePoint] {
        self.trip_meta
            .get(trip_id)
            .and_then(|m| m.shape_id.as_ref())
            .and_then(|id| self.shapes.get(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Timetabled departures at a stop under one service, by departure time.
    pub fn departures_at(&self, stop_id: &str, service_id: &str) -> Vec<ScheduledDeparture> {
        self.departures_matching(stop_id, service_id, |_| true)
    }

    /// Trips of a line running in one direction, in feed order.
    fn direction_trips<'s>(
        &'s self,
        short_name: &'s str,
        direction_id: u32,
    ) -> impl Iterator<Item = (&'s Arc<Trip>, &'s TripMeta)> + 's {
        self.trips_in_feed_order().filter(move |(trip, meta)| {
            trip.route_short_name == short_name && meta.direction_id == Some(direction_id)
        })
    }

    /// Stops of one direction of a line, taken from its longest trip.
    ///
    /// `None` when the line has no trips tagged with that direction.
    pub fn route_stops(&self, short_name: &str, direction_id: u32) -> Option<RouteDirection> {
        let mut headsigns: Vec<String> = Vec::new();
        let mut longest: Option<&Arc<Trip>> = None;
        for (trip, _) in self.direction_trips(short_name, direction_id) {
            if !headsigns.contains(&trip.trip_headsign) {
                headsigns.push(trip.trip_headsign.clone());
            }
            if longest.is_none_or(|l| trip.stop_times.len() > l.stop_times.len()) {
                longest = Some(trip);
            }
        }
        let longest = longest?;
        Some(RouteDirection {
            route_short_name: short_name.to_string(),
            direction_id,
            headsigns,
            stops: longest
                .stop_times
                .iter()
                .map(|st| RouteStop {
                    stop_id: st.stop_id.clone(),
                    stop_name: st.stop_name.clone(),
                })
                .collect(),
        })
    }

    /// Departures of one line direction at a stop under one service.
    pub fn timetable(
        &self,
        short_name: &str,
        direction_id: u32,
        stop_id: &str,
        service_id: &str,
    ) -> Vec<ScheduledDeparture> {
        self.departures_matching(stop_id, service_id, |(trip, meta)| {
            trip.route_short_name == short_name && meta.direction_id == Some(direction_id)
        })
    }

    fn departures_matching(
        &self,
        stop_id: &str,
        service_id: &str,
        keep: impl Fn((&Arc<Trip>, &TripMeta)) -> bool,
    ) -> Vec<ScheduledDeparture> {
        let mut departures: Vec<ScheduledDeparture> = Vec::new();
        for (trip, meta) in self.trips_in_feed_order() {
            if meta.service_id != service_id || !keep((trip, meta)) {
                continue;
            }
            let trip_id = &trip.trip_id;
            let schedule_number = self
                .block_for_trip(trip_id)
                .map(|b| b.schedule_number.clone())
                .unwrap_or_default();
            departures.extend(trip.stop_times.iter().filter(|st| st.stop_id == stop_id).map(|st| {
                ScheduledDeparture {
                    trip_id: trip_id.clone(),
                    stop_id: st.stop_id.clone(),
                    route_short_name: trip.route_short_name.clone(),
                    trip_headsign: trip.trip_headsign.clone(),
                    departure_time: st.scheduled_time.clone(),
                    schedule_number: schedule_number.clone(),
                }
            }));
        }
        departures.sort_by(|a, b| {
            let key = |d: &ScheduledDeparture| clock_seconds(&d.departure_time).unwrap_or(i64::MAX);
            key(a).cmp(&key(b)).then_with(|| a.trip_id.cmp(&b.trip_id))
        });
        departures
    }

    /// Distinct service variants across the whole dataset, in calendar order.
    pub fn all_calendar_variants(&self) -> Vec<ServiceCalendar> {
        self.calendar_order
            .iter()
            .map(|service_id| ServiceCalendar {
                service_id: service_id.clone(),
                days: self.calendars.get(service_id).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

/// All datasets of the network.
#[derive(Debug, Clone, Default)]
pub struct Network {
    datasets: BTreeMap<VehicleType, StaticSchedule>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, schedule: StaticSchedule) -> Self {
        self.datasets.insert(schedule.vehicle_type(), schedule);
        self
    }

    pub fn load(bus_dir: Option<&Path>, tram_dir: Option<&Path>) -> Result<Self, ScheduleError> {
        let mut network = Self::new();
        if let Some(dir) = bus_dir {
            network = network.with_dataset(StaticSchedule::load(dir, VehicleType::Bus)?);
        }
        if let Some(dir) = tram_dir {
            network = network.with_dataset(StaticSchedule::load(dir, VehicleType::Tram)?);
        }
        Ok(network)
    }

    pub fn dataset(&self, vehicle_type: VehicleType) -> Option<&StaticSchedule> {
        self.datasets.get(&vehicle_type)
    }

    pub fn datasets(&self) -> impl Iterator<Item = &StaticSchedule> {
        self.datasets.values()
    }

    /// Dataset owning a line, picked by the short-name convention.
    pub fn dataset_for_line(&self, route_short_name: &str) -> Option<&StaticSchedule> {
        self.dataset(VehicleType::from_short_name(route_short_name))
    }

    /// Every route with the vehicle type of its dataset.
    pub fn routes(&self) -> impl Iterator<Item = (&Route, VehicleType)> {
        self.datasets
            .values()
            .flat_map(|d| d.routes().iter().map(move |r| (r, d.vehicle_type())))
    }
}

impl ScheduleLookup for Network {
    fn trip(&self, vehicle_type: VehicleType, trip_id: &str) -> Option<Arc<Trip>> {
        self.dataset(vehicle_type)?.trip(trip_id)
    }

    fn block_for_trip(&self, vehicle_type: VehicleType, trip_id: &str) -> Option<&Block> {
        self.dataset(vehicle_type)?.block_for_trip(trip_id)
    }
}
