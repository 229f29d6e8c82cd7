//! Rider-facing schedule numbers ("164/03") for blocks.

use std::collections::{BTreeMap, HashMap};

use crate::model::VehicleType;

/// A block as seen by the numbering pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockKey<'a> {
    pub block_id: &'a str,
    pub service_id: &'a str,
    /// Distinct route ids in order of first appearance within the block.
    pub route_ids: &'a [String],
}

/// Schedule numbers keyed by `(block_id, service_id)`, using the numbering
/// rule of the dataset's vehicle type.
pub fn assign_schedule_numbers(
    vehicle_type: VehicleType,
    blocks: &[BlockKey<'_>],
    short_name: impl Fn(&str) -> String,
) -> HashMap<(String, String), String> {
    match vehicle_type {
        VehicleType::Bus => assign_bus_schedule_numbers(blocks, short_name),
        VehicleType::Tram => assign_tram_schedule_numbers(blocks, short_name),
    }
}

/// Numbers tram blocks per service and owning route.
///
/// A block is owned by the last distinct route it works. Within a service,
/// blocks are ordered by `(owning route_id, block_id)` and numbered from 01
/// per route as `"{short_name}/{NN}"`. Blocks without routes get no number.
pub fn assign_tram_schedule_numbers(
    blocks: &[BlockKey<'_>],
    short_name: impl Fn(&str) -> String,
) -> HashMap<(String, String), String> {
    let mut by_service: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for block in blocks {
        if let Some(owner) = block.route_ids.last() {
            by_service
                .entry(block.service_id)
                .or_default()
                .push((owner.as_str(), block.block_id));
        }
    }

    let mut numbers = HashMap::new();
    for (service_id, mut owned) in by_service {
        owned.sort();
        owned.dedup();
        let mut counters: HashMap<&str, u32> = HashMap::new();
        for (route_id, block_id) in owned {
            let counter = counters.entry(route_id).or_insert(0);
            *counter += 1;
            numbers.insert(
                (block_id.to_string(), service_id.to_string()),
                format!("{}/{:02}", short_name(route_id), counter),
            );
        }
    }
    numbers
}

/// Numbers bus blocks per service by walking lines in numeric order.
///
/// Each line lists the block numbers working it, ascending. A block is
/// numbered `"{short_name}/{NN}"` only when it directly follows the last
/// numbered block of the service; the walk starts at the first block of the
/// lowest line. A block working several lines is claimed by the lowest one,
/// and blocks breaking the sequence stay unnumbered. Block ids without a
/// numeric suffix are never numbered.
pub fn assign_bus_schedule_numbers(
    blocks: &[BlockKey<'_>],
    short_name: impl Fn(&str) -> String,
) -> HashMap<(String, String), String> {
    let mut by_service: HashMap<&str, Vec<&BlockKey<'_>>> = HashMap::new();
    for block in blocks {
        by_service.entry(block.service_id).or_default().push(block);
    }

    let mut numbers = HashMap::new();
    for (service_id, service_blocks) in by_service {
        // (numeric line, short name) -> block numbers
        let mut lines: BTreeMap<(u64, String), Vec<u64>> = BTreeMap::new();
        let mut block_ids: HashMap<u64, &str> = HashMap::new();
        for block in service_blocks {
            let Some(number) = block_number(block.block_id) else {
                continue;
            };
            block_ids.entry(number).or_insert(block.block_id);
            for route_id in block.route_ids {
                let name = short_name(route_id);
                let order = name.parse().unwrap_or(u64::MAX);
                lines.entry((order, name)).or_default().push(number);
            }
        }
        for line_blocks in lines.values_mut() {
            line_blocks.sort_unstable();
            line_blocks.dedup();
        }

        let Some(mut expected) = lines.values().find_map(|n| n.first().copied()) else {
            continue;
        };
        for ((_, name), line_blocks) in &lines {
            let mut counter = 0u32;
            for number in line_blocks {
                if *number != expected {
                    continue;
                }
                expected = number + 1;
                counter += 1;
                if let Some(block_id) = block_ids.get(number) {
                    numbers.insert(
                        (block_id.to_string(), service_id.to_string()),
                        format!("{name}/{counter:02}"),
                    );
                }
            }
        }
    }
    numbers
}

/// Numeric suffix of ids like `block_12`; used for display ordering.
pub fn block_number(block_id: &str) -> Option<u64> {
    block_id.rsplit('_').next()?.parse().ok()
}
