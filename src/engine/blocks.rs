//! Block ("brygada") filtering and the per-block vehicle board.

use chrono::Timelike;
use serde::Serialize;

use super::Clock;
use super::delay::{Staleness, age_label, staleness};
use super::line::{LineKind, classify};
use super::time::{parse_clock, weekday_name};
use crate::model::{Block, RealtimeVehicleReport};

/// Blocks under one service, in input order.
pub fn blocks_for_service<'a>(blocks: &'a [Block], service_id: &str) -> Vec<&'a Block> {
    blocks.iter().filter(|b| b.service_id == service_id).collect()
}

pub fn has_night_line(route_short_names: &[String]) -> bool {
    route_short_names
        .iter()
        .any(|name| classify(name) == LineKind::Night)
}

/// Whether the local clock is still before a duty's end time.
///
/// Night duties end after midnight: their end hour is pushed by 24 and the
/// clock is read on the same scale (see [`Clock::night_clock_hour`]). An
/// unparseable end time counts as still running.
pub fn is_before_end_time(end_time: &str, route_short_names: &[String], clock: &Clock) -> bool {
    let Some((end_hour, end_minute, _)) = parse_clock(end_time) else {
        return true;
    };
    let end_hour = end_hour % 24;
    let now = clock.local_time();
    let (now_hour, end_hour) = if has_night_line(route_short_names) {
        (clock.night_clock_hour(), end_hour + 24)
    } else {
        (now.hour(), end_hour)
    };
    now_hour < end_hour || (now_hour == end_hour && now.minute() < end_minute)
}

pub fn block_before_end(block: &Block, clock: &Clock) -> bool {
    is_before_end_time(&block.end_time, &block.route_short_names, clock)
}

pub fn runs_today(block: &Block, clock: &Clock) -> bool {
    let today = weekday_name(clock.weekday());
    block
        .service_days
        .iter()
        .any(|d| d.trim().to_lowercase() == today)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleBadge {
    pub vehicle_id: String,
    pub staleness: Staleness,
    pub age_secs: i64,
    pub age_label: String,
}

/// What the vehicle column of a block row shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "vehicles", rename_all = "kebab-case")]
pub enum VehiclePresence {
    /// The block's service does not run on the displayed day.
    NotOperatingToday,
    NotYetStarted,
    /// No vehicle reports the block although its end time has passed.
    Missing,
    Reporting(Vec<VehicleBadge>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockRow<'a> {
    pub block: &'a Block,
    pub before_end: bool,
    pub presence: VehiclePresence,
}

/// Rows for one service, joined with the vehicles reporting each schedule
/// number.
pub fn block_rows<'a>(
    blocks: &'a [Block],
    service_id: &str,
    reports: &[RealtimeVehicleReport],
    clock: &Clock,
) -> Vec<BlockRow<'a>> {
    blocks_for_service(blocks, service_id)
        .into_iter()
        .map(|block| {
            let before_end = block_before_end(block, clock);
            let presence = if !runs_today(block, clock) {
                VehiclePresence::NotOperatingToday
            } else {
                let badges: Vec<VehicleBadge> = reports
                    .iter()
                    .filter(|r| r.schedule_number.as_deref() == Some(block.schedule_number.as_str()))
                    .map(|r| {
                        let age_secs = clock.age_secs(r.timestamp);
                        VehicleBadge {
                            vehicle_id: r.vehicle_id.clone(),
                            staleness: staleness(age_secs, before_end, clock.fresh_window_secs),
                            age_secs,
                            age_label: age_label(r.timestamp, clock),
                        }
                    })
                    .collect();
                if !badges.is_empty() {
                    VehiclePresence::Reporting(badges)
                } else if before_end {
                    VehiclePresence::NotYetStarted
                } else {
                    VehiclePresence::Missing
                }
            };
            BlockRow {
                block,
                before_end,
                presence,
            }
        })
        .collect()
}
