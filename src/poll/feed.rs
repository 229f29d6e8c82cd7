//! Snapshot sources backed by the realtime vehicle position feeds.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, instrument};

use super::SnapshotSource;
use crate::engine::Clock;
use crate::engine::correlate::{VehicleStatus, correlate_snapshot};
use crate::error::FeedError;
use crate::fetch::{HttpClient, fetch_source};
use crate::model::{RealtimeVehicleReport, VehicleType};
use crate::parser::{parse_feed, vehicle_reports};
use crate::schedule::Network;
use crate::stats::SnapshotStats;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEndpoint {
    pub vehicle_type: VehicleType,
    /// HTTP(S) URL, `file://` URL or local path.
    pub url: String,
}

/// All vehicle position feeds of the network, read as one snapshot.
#[derive(Clone)]
pub struct RealtimeFeed {
    client: Arc<dyn HttpClient>,
    endpoints: Vec<FeedEndpoint>,
    network: Arc<Network>,
}

impl RealtimeFeed {
    pub fn new(client: Arc<dyn HttpClient>, endpoints: Vec<FeedEndpoint>, network: Arc<Network>) -> Self {
        Self {
            client,
            endpoints,
            network,
        }
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Reports of every feed concatenated; any failing feed fails the read.
    #[instrument(skip(self), fields(feeds = self.endpoints.len()))]
    pub async fn reports(&self) -> Result<Vec<RealtimeVehicleReport>, FeedError> {
        let mut reports = Vec::new();
        for endpoint in &self.endpoints {
            let bytes = fetch_source(self.client.as_ref(), &endpoint.url).await?;
            let feed = parse_feed(&bytes)?;
            let batch = vehicle_reports(&feed, endpoint.vehicle_type, &self.network);
            debug!(
                vehicle_type = %endpoint.vehicle_type,
                entities = feed.entity.len(),
                reports = batch.len(),
                "Feed parsed"
            );
            reports.extend(batch);
        }
        Ok(reports)
    }
}

#[async_trait]
impl SnapshotSource for RealtimeFeed {
    type Snapshot = Vec<RealtimeVehicleReport>;

    async fn fetch(&self) -> Result<Self::Snapshot, FeedError> {
        self.reports().await
    }
}

/// Which vehicles a fleet view keeps.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FleetScope {
    #[default]
    All,
    Vehicle(String),
    ScheduleNumber(String),
}

impl FleetScope {
    fn keeps(&self, status: &VehicleStatus) -> bool {
        match self {
            FleetScope::All => true,
            FleetScope::Vehicle(id) => status.report.vehicle_id == *id,
            FleetScope::ScheduleNumber(number) => {
                status.report.schedule_number.as_deref() == Some(number.as_str())
            }
        }
    }
}

/// One correlated poll of the fleet.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    #[serde(skip)]
    pub clock: Clock,
    pub stats: SnapshotStats,
    pub statuses: Vec<VehicleStatus>,
}

/// Feed reads correlated against the static schedule at fetch time.
///
/// Statistics cover the whole fleet; the scope only trims `statuses`.
#[derive(Clone)]
pub struct TrackedFleet {
    feed: RealtimeFeed,
    clock: Clock,
    scope: FleetScope,
}

impl TrackedFleet {
    /// `clock` supplies timezone and thresholds; its instant is replaced on
    /// every fetch.
    pub fn new(feed: RealtimeFeed, clock: Clock) -> Self {
        Self {
            feed,
            clock,
            scope: FleetScope::All,
        }
    }

    pub fn scoped(mut self, scope: FleetScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn correlate(&self, reports: &[RealtimeVehicleReport], clock: Clock) -> FleetSnapshot {
        let statuses = correlate_snapshot(reports, self.feed.network().as_ref(), &clock);
        let stats = SnapshotStats::from_statuses(&statuses, clock.now);
        stats.log();
        FleetSnapshot {
            clock,
            stats,
            statuses: statuses.into_iter().filter(|s| self.scope.keeps(s)).collect(),
        }
    }
}

#[async_trait]
impl SnapshotSource for TrackedFleet {
    type Snapshot = FleetSnapshot;

    async fn fetch(&self) -> Result<Self::Snapshot, FeedError> {
        let reports = self.feed.reports().await?;
        let clock = Clock {
            now: Utc::now(),
            ..self.clock
        };
        Ok(self.correlate(&reports, clock))
    }
}
