use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc, Weekday};
use chrono_tz::Europe::Warsaw;
use gtfs_rt_tracker::config::TrackerConfig;
use gtfs_rt_tracker::engine::Clock;
use gtfs_rt_tracker::engine::blocks::{VehiclePresence, block_rows};
use gtfs_rt_tracker::engine::board::{Countdown, departure_board};
use gtfs_rt_tracker::engine::brigade::schedule_rows;
use gtfs_rt_tracker::engine::calendar::ServiceSelection;
use gtfs_rt_tracker::engine::correlate::{TripCursor, stop_rows};
use gtfs_rt_tracker::engine::delay::{Eta, Staleness};
use gtfs_rt_tracker::engine::shape::assemble_polyline;
use gtfs_rt_tracker::fetch::BasicClient;
use gtfs_rt_tracker::gtfs_rt::{
    FeedEntity, FeedHeader, FeedMessage, Position, TripDescriptor, VehicleDescriptor,
    VehiclePosition,
};
use gtfs_rt_tracker::model::VehicleType;
use gtfs_rt_tracker::poll::Poller;
use gtfs_rt_tracker::poll::feed::{FeedEndpoint, FleetScope, RealtimeFeed, TrackedFleet};
use gtfs_rt_tracker::schedule::{Network, StaticSchedule};
use prost::Message;

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/tram")
}

/// Tuesday 2026-03-10 at `h:m:s` Warsaw time, as unix seconds.
fn local_ts(h: u32, m: u32, s: u32) -> i64 {
    Warsaw
        .with_ymd_and_hms(2026, 3, 10, h, m, s)
        .single()
        .expect("unambiguous local time")
        .timestamp()
}

fn clock() -> Clock {
    let now = Utc
        .timestamp_opt(local_ts(8, 10, 0), 0)
        .single()
        .expect("valid timestamp");
    Clock::new(now, Warsaw)
}

fn network() -> Arc<Network> {
    let dir = fixture_dir();
    let network = Network::load(None, Some(dir.as_path())).expect("Failed to load fixture GTFS");
    Arc::new(network)
}

struct Sighting<'a> {
    vehicle_id: &'a str,
    trip_id: &'a str,
    route_id: &'a str,
    stop_id: &'a str,
    timestamp: i64,
}

fn encode_feed(sightings: &[Sighting<'_>]) -> Vec<u8> {
    FeedMessage {
        header: FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            incrementality: None,
            timestamp: Some(local_ts(8, 10, 0) as u64),
            feed_version: None,
        },
        entity: sightings
            .iter()
            .map(|s| FeedEntity {
                id: format!("entity_{}", s.vehicle_id),
                is_deleted: None,
                vehicle: Some(VehiclePosition {
                    trip: Some(TripDescriptor {
                        trip_id: Some(s.trip_id.to_string()),
                        route_id: Some(s.route_id.to_string()),
                        ..Default::default()
                    }),
                    vehicle: Some(VehicleDescriptor {
                        id: Some(s.vehicle_id.to_string()),
                        ..Default::default()
                    }),
                    position: Some(Position {
                        latitude: 50.0636,
                        longitude: 19.9326,
                        bearing: Some(90.0),
                        ..Default::default()
                    }),
                    stop_id: Some(s.stop_id.to_string()),
                    timestamp: Some(s.timestamp as u64),
                    ..Default::default()
                }),
            })
            .collect(),
    }
    .encode_to_vec()
}

/// Writes both feeds to temp files and returns the endpoints reading them.
fn feed_files(name: &str) -> Vec<FeedEndpoint> {
    let tram = encode_feed(&[
        Sighting {
            vehicle_id: "RP001",
            trip_id: "block_3_trip_1",
            route_id: "route_52",
            stop_id: "stop_2",
            timestamp: local_ts(8, 9, 0),
        },
        Sighting {
            vehicle_id: "RP002",
            trip_id: "ghost_trip",
            route_id: "route_52",
            stop_id: "stop_1",
            timestamp: local_ts(8, 9, 0),
        },
        Sighting {
            vehicle_id: "RP003",
            trip_id: "block_9_trip_1",
            route_id: "route_62",
            stop_id: "stop_3",
            timestamp: local_ts(7, 50, 0),
        },
    ]);
    let bus = encode_feed(&[Sighting {
        vehicle_id: "BH123",
        trip_id: "bus_trip_1",
        route_id: "route_164",
        stop_id: "stop_1",
        timestamp: local_ts(8, 9, 30),
    }]);

    let dir = std::env::temp_dir();
    let pid = std::process::id();
    let tram_path = dir.join(format!("gtfs_rt_tracker_it_{name}_{pid}_T.pb"));
    let bus_path = dir.join(format!("gtfs_rt_tracker_it_{name}_{pid}_A.pb"));
    std::fs::write(&tram_path, tram).unwrap();
    std::fs::write(&bus_path, bus).unwrap();

    vec![
        FeedEndpoint {
            vehicle_type: VehicleType::Bus,
            url: format!("file://{}", bus_path.display()),
        },
        FeedEndpoint {
            vehicle_type: VehicleType::Tram,
            url: tram_path.display().to_string(),
        },
    ]
}

fn cleanup(endpoints: &[FeedEndpoint]) {
    for endpoint in endpoints {
        let path = endpoint.url.trim_start_matches("file://");
        std::fs::remove_file(path).ok();
    }
}

#[test]
fn test_static_schedule_from_fixture() {
    let schedule = StaticSchedule::load(&fixture_dir(), VehicleType::Tram).expect("load fixture");

    let line = schedule.route_by_short_name("52").unwrap();
    let blocks = schedule.blocks_for_route(&line.route_id);
    let ids: Vec<(&str, &str)> = blocks
        .iter()
        .map(|b| (b.block_id.as_str(), b.schedule_number.as_str()))
        .collect();
    assert_eq!(ids, vec![("block_1", "52/01"), ("block_3", "52/01")]);
    assert_eq!(blocks[1].start_time, "08:00:00");
    assert_eq!(blocks[1].end_time, "08:50:00");

    let night = schedule.block("block_9", "service_1").unwrap();
    assert_eq!(night.schedule_number, "62/01");
    assert_eq!(night.end_time, "00:30:00");

    // stop_times rows are out of order in the file
    let stops: Vec<&str> = schedule
        .stop_list("block_3_trip_2")
        .unwrap()
        .iter()
        .map(|st| st.stop_name.as_str())
        .collect();
    assert_eq!(stops, vec!["Dworzec Główny", "Teatr Bagatela", "Rondo Mogilskie"]);
}

#[test]
fn test_calendar_selection_and_block_rows() {
    let network = network();
    let clock = clock();
    let dataset = network.dataset_for_line("52").unwrap();
    let line = dataset.route_by_short_name("52").unwrap();

    let variants = dataset.calendar_variants(&line.route_id);
    let weekday = ServiceSelection::for_weekday(&variants, Weekday::Tue);
    assert_eq!(weekday.active_service_id.as_deref(), Some("service_1"));
    let sunday = ServiceSelection::for_weekday(&variants, Weekday::Sun);
    assert_eq!(sunday.active_service_id.as_deref(), Some("service_2"));

    let reports = vec![];
    let blocks = dataset.blocks_for_route(&line.route_id);
    let rows = block_rows(&blocks, "service_1", &reports, &clock);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].block.block_id, "block_3");
    assert!(rows[0].before_end);
    assert_eq!(rows[0].presence, VehiclePresence::NotYetStarted);

    let rows = block_rows(&blocks, "service_2", &reports, &clock);
    assert_eq!(rows[0].presence, VehiclePresence::NotOperatingToday);
}

#[test]
fn test_bus_schedule_numbers_follow_contiguous_blocks() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/bus");
    let schedule = StaticSchedule::load(&dir, VehicleType::Bus).expect("load bus fixture");
    let number = |block_id: &str| {
        schedule
            .block(block_id, "service_1")
            .map(|b| b.schedule_number.clone())
            .unwrap()
    };

    assert_eq!(number("block_1"), "503/01");
    assert_eq!(number("block_2"), "503/02");
    assert_eq!(number("block_3"), "504/01");
    // block_4 breaks the 1, 2, 3 sequence on line 503
    assert_eq!(number("block_4"), "");
    assert!(schedule.trips_for_schedule_number("503/03", "service_1").is_none());
}

#[test]
fn test_line_timetable_by_direction() {
    let schedule = StaticSchedule::load(&fixture_dir(), VehicleType::Tram).expect("load fixture");

    let outbound = schedule.route_stops("52", 0).unwrap();
    let ids: Vec<&str> = outbound.stops.iter().map(|s| s.stop_id.as_str()).collect();
    assert_eq!(ids, vec!["stop_1", "stop_2", "stop_3"]);
    assert_eq!(outbound.headsigns, vec!["Os.Piastów"]);
    let inbound = schedule.route_stops("52", 1).unwrap();
    let names: Vec<&str> = inbound.stops.iter().map(|s| s.stop_name.as_str()).collect();
    assert_eq!(names, vec!["Dworzec Główny", "Teatr Bagatela", "Rondo Mogilskie"]);
    assert_eq!(inbound.headsigns, vec!["Czerwone Maki P+R"]);

    let times: Vec<String> = schedule
        .timetable("52", 0, "stop_2", "service_1")
        .into_iter()
        .map(|d| d.departure_time)
        .collect();
    assert_eq!(times, vec!["08:06:00", "08:46:00"]);
    let back = schedule.timetable("52", 1, "stop_2", "service_1");
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].departure_time, "08:24:00");
    assert_eq!(back[0].schedule_number, "52/01");
    assert_eq!(schedule.timetable("52", 0, "stop_2", "service_2").len(), 1);
    assert!(schedule.timetable("62", 1, "stop_2", "service_1").is_empty());
}

#[tokio::test]
async fn test_feed_to_correlated_fleet() {
    let network = network();
    let endpoints = feed_files("fleet");
    let feed = RealtimeFeed::new(Arc::new(BasicClient::new()), endpoints.clone(), network.clone());

    let reports = feed.reports().await.expect("read feeds");
    cleanup(&endpoints);
    assert_eq!(reports.len(), 4);

    let bus = &reports[0];
    assert_eq!(bus.vehicle_type, VehicleType::Bus);
    assert_eq!(bus.route_short_name.as_deref(), Some("route_164"));
    assert_eq!(bus.schedule_number, None);

    let clock = clock();
    let fleet = TrackedFleet::new(feed, clock);
    let snapshot = fleet.correlate(&reports, clock);
    assert_eq!(snapshot.stats.vehicles, 4);
    assert_eq!(snapshot.stats.buses, 1);
    assert_eq!(snapshot.stats.trams, 3);
    assert_eq!(snapshot.stats.correlated, 2);
    assert_eq!(snapshot.stats.stale, 1);

    let rp001 = snapshot
        .statuses
        .iter()
        .find(|s| s.report.vehicle_id == "RP001")
        .unwrap();
    assert_eq!(rp001.report.route_short_name.as_deref(), Some("52"));
    assert_eq!(rp001.report.schedule_number.as_deref(), Some("52/01"));
    assert_eq!(rp001.delay_minutes(), Some(3));
    assert_eq!(rp001.current_stop_name(), Some("Teatr Bagatela"));
    assert_eq!(rp001.staleness, Staleness::Fresh);

    let rp002 = snapshot
        .statuses
        .iter()
        .find(|s| s.report.vehicle_id == "RP002")
        .unwrap();
    assert!(rp002.correlation.is_none());
    assert_eq!(rp002.staleness, Staleness::Fresh);

    // night duty still within its hours, so an old report is only stale
    let rp003 = snapshot
        .statuses
        .iter()
        .find(|s| s.report.vehicle_id == "RP003")
        .unwrap();
    assert_eq!(rp003.staleness, Staleness::Stale);

    let scoped = TrackedFleet::new(
        RealtimeFeed::new(Arc::new(BasicClient::new()), Vec::new(), network),
        clock,
    )
    .scoped(FleetScope::Vehicle("RP001".to_string()));
    let snapshot = scoped.correlate(&reports, clock);
    assert_eq!(snapshot.stats.vehicles, 4);
    assert_eq!(snapshot.statuses.len(), 1);
}

#[tokio::test]
async fn test_vehicle_view_and_brigade_timetable() {
    let network = network();
    let endpoints = feed_files("vehicle");
    let feed = RealtimeFeed::new(Arc::new(BasicClient::new()), endpoints.clone(), network.clone());
    let reports = feed.reports().await.expect("read feeds");
    cleanup(&endpoints);

    let clock = clock();
    let snapshot = TrackedFleet::new(feed, clock)
        .scoped(FleetScope::Vehicle("RP001".to_string()))
        .correlate(&reports, clock);
    let status = &snapshot.statuses[0];
    let current = status.correlation.as_ref().unwrap().current_stop_index;
    assert_eq!(current, Some(1));

    let dataset = network.dataset(VehicleType::Tram).unwrap();
    let trips = dataset.trips_for_trip_block("block_3_trip_1").unwrap();
    let mut cursor = TripCursor::new(trips.clone(), Some("block_3_trip_1"));
    assert!(cursor.is_live());

    let rows = stop_rows(&cursor, current);
    let etas: Vec<Eta> = rows.iter().map(|r| r.eta).collect();
    assert_eq!(etas, vec![Eta::NotApplicable, Eta::ArrivingNow, Eta::Minutes(4)]);
    assert!(rows[0].passed);
    assert!(rows[1].is_current);

    let polyline = assemble_polyline(dataset.shape_points("block_3_trip_1"));
    assert_eq!(
        polyline,
        vec![(50.0655, 19.9555), (50.0636, 19.9326), (50.0683, 19.9467)]
    );

    cursor.next();
    assert!(!cursor.is_live());
    assert_eq!(cursor.selected().unwrap().trip_id, "block_3_trip_2");
    assert!(stop_rows(&cursor, current).iter().all(|r| r.eta == Eta::NotApplicable));

    let timetable = dataset.trips_for_schedule_number("52/01", "service_1").unwrap();
    let rows = schedule_rows(&timetable, Some("block_3_trip_1"));
    let breaks: Vec<Option<i64>> = rows.iter().map(|r| r.break_minutes).collect();
    assert_eq!(breaks, vec![None, Some(10), Some(10)]);
    assert!(rows[0].is_live);
    assert_eq!(rows[1].first_stop_time, "08:20");
    assert_eq!(rows[1].headsign, "Czerwone Maki P+R");
}

#[tokio::test]
async fn test_departure_board_at_stop() {
    let network = network();
    let endpoints = feed_files("board");
    let feed = RealtimeFeed::new(Arc::new(BasicClient::new()), endpoints.clone(), network.clone());
    let reports = feed.reports().await.expect("read feeds");
    cleanup(&endpoints);

    let clock = clock();
    let snapshot = TrackedFleet::new(feed, clock).correlate(&reports, clock);
    let dataset = network.dataset(VehicleType::Tram).unwrap();
    let departures = dataset.departures_at("stop_2", "service_1");
    let board = departure_board(&departures, &snapshot.statuses, &clock);

    let summary: Vec<(&str, &str, Countdown)> = board
        .iter()
        .map(|r| (r.line.as_str(), r.scheduled_departure.as_str(), r.countdown))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("52", "08:06", Countdown::Departed),
            ("52", "08:24", Countdown::Minutes(14)),
            ("52", "08:46", Countdown::Minutes(36)),
            ("62", "24:05", Countdown::Minutes(955)),
        ]
    );
    // one brigade's delay is shown once
    assert_eq!(board[0].delay_minutes, Some(3));
    assert_eq!(board[1].delay_minutes, None);
    assert_eq!(board[1].vehicle_id.as_deref(), Some("RP001"));
    // beyond the delay horizon
    assert_eq!(board[3].vehicle_id.as_deref(), Some("RP003"));
    assert_eq!(board[3].delay_minutes, None);
}

#[tokio::test]
async fn test_poller_publishes_first_snapshot() {
    let endpoints = feed_files("poller");
    let feed = RealtimeFeed::new(Arc::new(BasicClient::new()), endpoints.clone(), network());

    let mut poller = Poller::new(Duration::from_secs(3600));
    let mut rx = poller.subscribe("all".to_string(), feed);
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("first fetch published")
        .expect("sender alive");

    let snapshot = rx.borrow().clone();
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.data.unwrap().len(), 4);
    poller.stop();
    cleanup(&endpoints);
}

#[test]
fn test_config_points_at_fixture() {
    let path = std::env::temp_dir().join(format!("gtfs_rt_tracker_it_config_{}.json", std::process::id()));
    let json = format!(
        r#"{{"tram_gtfs_dir": {:?}, "fresh_window_secs": 300}}"#,
        fixture_dir().display().to_string()
    );
    std::fs::write(&path, json).unwrap();
    let config = TrackerConfig::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.fresh_window_secs, 300);
    let network = Network::load(config.bus_gtfs_dir.as_deref(), config.tram_gtfs_dir.as_deref()).unwrap();
    assert!(network.dataset(VehicleType::Tram).is_some());
    assert!(network.dataset(VehicleType::Bus).is_none());
}
