//! Protobuf parser for GTFS Realtime vehicle position feeds.

use prost::Message;
use tracing::debug;

use crate::error::FeedError;
use crate::gtfs_rt::{FeedEntity, FeedMessage};
use crate::model::{RealtimeVehicleReport, VehicleType};
use crate::schedule::Network;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns [`FeedError::Decode`] if the bytes are not valid protobuf for a
/// `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage, FeedError> {
    Ok(FeedMessage::decode(bytes)?)
}

fn vehicle_id(entity: &FeedEntity) -> String {
    let descriptor = entity.vehicle.as_ref().and_then(|v| v.vehicle.as_ref());
    descriptor
        .and_then(|d| d.id.clone().filter(|s| !s.is_empty()))
        .or_else(|| descriptor.and_then(|d| d.label.clone().filter(|s| !s.is_empty())))
        .unwrap_or_else(|| entity.id.clone())
}

/// Turns every positioned vehicle entity into a [`RealtimeVehicleReport`].
///
/// Route short names and schedule numbers are resolved through the static
/// schedule of `vehicle_type`; when it is missing, the raw route id stands
/// in for the short name and the schedule number stays unknown. A feed
/// without a route id takes the line of the scheduled trip instead.
pub fn vehicle_reports(
    feed: &FeedMessage,
    vehicle_type: VehicleType,
    network: &Network,
) -> Vec<RealtimeVehicleReport> {
    let dataset = network.dataset(vehicle_type);
    let header_ts = feed.header.timestamp.unwrap_or(0);
    let mut skipped = 0usize;

    let reports: Vec<RealtimeVehicleReport> = feed
        .entity
        .iter()
        .filter(|e| !e.is_deleted())
        .filter_map(|entity| {
            let vehicle = entity.vehicle.as_ref()?;
            let Some(position) = vehicle.position.as_ref() else {
                skipped += 1;
                return None;
            };
            let trip = vehicle.trip.as_ref();
            let trip_id = trip.and_then(|t| t.trip_id.clone()).filter(|s| !s.is_empty());
            let route_id = trip.and_then(|t| t.route_id.clone()).filter(|s| !s.is_empty());

            let route_short_name = route_id
                .map(|id| {
                    dataset
                        .and_then(|d| d.route_short_name(&id))
                        .map(str::to_string)
                        .unwrap_or(id)
                })
                .or_else(|| {
                    let trip = dataset?.trip(trip_id.as_deref()?)?;
                    Some(trip.route_short_name.clone())
                });
            let schedule_number = trip_id
                .as_deref()
                .and_then(|id| dataset?.block_for_trip(id))
                .map(|b| b.schedule_number.clone())
                .filter(|s| !s.is_empty());

            Some(RealtimeVehicleReport {
                vehicle_id: vehicle_id(entity),
                trip_id,
                stop_id: vehicle.stop_id.clone().filter(|s| !s.is_empty()),
                route_short_name,
                schedule_number,
                latitude: f64::from(position.latitude),
                longitude: f64::from(position.longitude),
                bearing: position.bearing.unwrap_or(0.0),
                timestamp: vehicle.timestamp.unwrap_or(header_ts) as i64,
                vehicle_type,
            })
        })
        .collect();

    if skipped > 0 {
        debug!(skipped, %vehicle_type, "Vehicle entities without a position");
    }
    reports
}
