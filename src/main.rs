//! CLI entry point for the GTFS-RT vehicle tracker.
//!
//! Loads the static schedules, reads the realtime vehicle position feeds and
//! prints correlated views (fleet, blocks of a line, one vehicle, one
//! brigade, one stop, a line timetable) as JSON.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gtfs_rt_tracker::{
    config::TrackerConfig,
    engine::{
        Clock,
        blocks::{BlockRow, block_rows},
        board::{DepartureRow, ScheduledDeparture, departure_board},
        brigade::{ScheduleRow, schedule_rows},
        calendar::{ServiceSelection, resolve_active_service},
        correlate::{StopRow, TripCursor, VehicleStatus, stop_rows},
        delay::{age_label, delay_badge},
        line::{LineGroup, group_routes},
        shape::assemble_polyline,
        time::{clock_seconds, parse_weekday},
    },
    fetch::BasicClient,
    model::Route,
    output::{append_record, print_json},
    poll::{
        Poller, SnapshotSource,
        feed::{FleetScope, FleetSnapshot, RealtimeFeed, TrackedFleet},
    },
    schedule::Network,
};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_tracker")]
#[command(about = "Track transit vehicles against their planned schedules", long_about = None)]
struct Cli {
    /// JSON config file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List lines grouped into their published families
    Lines,
    /// One correlated snapshot of every reporting vehicle
    Vehicles {
        /// CSV file to append snapshot statistics to
        #[arg(long)]
        stats_csv: Option<String>,
    },
    /// Blocks of a line under its active service, with the vehicles working them
    Blocks {
        /// Line short name, e.g. "52" or "164"
        route: String,

        /// Weekday to resolve the service for instead of today
        #[arg(short, long)]
        day: Option<String>,
    },
    /// Trips and stop list of one vehicle
    Vehicle {
        vehicle_id: String,

        /// Trips to move away from the live one (negative = earlier)
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        offset: isize,

        /// Keep polling until Ctrl+C
        #[arg(short, long, default_value_t = false)]
        watch: bool,
    },
    /// Timetable of one brigade
    Schedule {
        /// Schedule number, e.g. "164/03"
        schedule_number: String,
        service_id: String,

        /// Keep polling until Ctrl+C
        #[arg(short, long, default_value_t = false)]
        watch: bool,
    },
    /// Upcoming departures at a stop
    Stop { stop_id: String },
    /// Stops of one line direction, or its departures at one stop
    Timetable {
        /// Line short name, e.g. "52" or "164"
        route: String,
        /// GTFS direction_id, usually 0 or 1
        direction: u32,

        /// Stop to list departures for; omit to list the direction's stops
        #[arg(long)]
        stop: Option<String>,

        /// Weekday to resolve the service for instead of today
        #[arg(short, long)]
        day: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_rt_tracker.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_tracker.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = TrackerConfig::from_sources(cli.config.as_deref())?;
    let app = App::new(config)?;

    match cli.command {
        Commands::Lines => app.lines(),
        Commands::Vehicles { stats_csv } => app.vehicles(stats_csv.as_deref()).await,
        Commands::Blocks { route, day } => app.blocks(&route, day.as_deref()).await,
        Commands::Vehicle {
            vehicle_id,
            offset,
            watch,
        } => app.vehicle(&vehicle_id, offset, watch).await,
        Commands::Schedule {
            schedule_number,
            service_id,
            watch,
        } => app.schedule(&schedule_number, &service_id, watch).await,
        Commands::Stop { stop_id } => app.stop(&stop_id).await,
        Commands::Timetable {
            route,
            direction,
            stop,
            day,
        } => app.timetable(&route, direction, stop.as_deref(), day.as_deref()),
    }
}

struct App {
    config: TrackerConfig,
    network: Arc<Network>,
    feed: RealtimeFeed,
}

#[derive(Serialize)]
struct LineGroupView<'a> {
    group: &'static str,
    lines: Vec<&'a Route>,
}

#[derive(Serialize)]
struct BlocksView<'a> {
    route: &'a Route,
    selection: ServiceSelection,
    rows: Vec<BlockRow<'a>>,
}

#[derive(Serialize)]
struct VehicleView {
    status: VehicleStatus,
    age: String,
    delay: String,
    trip_index: usize,
    trip_count: usize,
    live_trip: bool,
    stops: Vec<StopRow>,
    polyline: Vec<(f64, f64)>,
}

#[derive(Serialize)]
struct ScheduleView<'a> {
    schedule_number: &'a str,
    service_id: &'a str,
    vehicles: Vec<&'a str>,
    trips: Vec<ScheduleRow>,
}

#[derive(Serialize)]
struct StopView<'a> {
    stop_id: &'a str,
    departures: Vec<DepartureRow>,
}

#[derive(Serialize)]
struct TimetableView<'a> {
    route: &'a str,
    direction_id: u32,
    stop_id: &'a str,
    selection: ServiceSelection,
    departures: Vec<ScheduledDeparture>,
}

impl App {
    fn new(config: TrackerConfig) -> Result<Self> {
        let network = Network::load(config.bus_gtfs_dir.as_deref(), config.tram_gtfs_dir.as_deref())
            .context("loading static GTFS")?;
        if network.datasets().next().is_none() {
            warn!("No static GTFS directory configured; vehicles will not correlate");
        }
        let network = Arc::new(network);
        let client = BasicClient::with_timeout(config.request_timeout())?;
        let feed = RealtimeFeed::new(Arc::new(client), config.endpoints(), network.clone());
        Ok(Self {
            config,
            network,
            feed,
        })
    }

    fn clock(&self) -> Result<Clock> {
        Ok(self.config.clock(Utc::now())?)
    }

    fn fleet(&self, scope: FleetScope) -> Result<TrackedFleet> {
        Ok(TrackedFleet::new(self.feed.clone(), self.clock()?).scoped(scope))
    }

    fn lines(&self) -> Result<()> {
        let groups: Vec<LineGroupView<'_>> = group_routes(self.network.routes())
            .into_iter()
            .map(|(group, lines)| LineGroupView {
                group: LineGroup::label(&group),
                lines,
            })
            .collect();
        print_json(&groups)
    }

    async fn vehicles(&self, stats_csv: Option<&str>) -> Result<()> {
        let snapshot = self.fleet(FleetScope::All)?.fetch().await?;
        if let Some(path) = stats_csv {
            append_record(path, &snapshot.stats)?;
        }
        print_json(&snapshot)
    }

    async fn blocks(&self, route: &str, day: Option<&str>) -> Result<()> {
        let clock = self.clock()?;
        let dataset = self
            .network
            .dataset_for_line(route)
            .ok_or_else(|| anyhow!("no static schedule loaded for line {route}"))?;
        let line = dataset
            .route_by_short_name(route)
            .ok_or_else(|| anyhow!("unknown line {route}"))?;
        let weekday = match day {
            Some(day) => parse_weekday(day).ok_or_else(|| anyhow!("unknown weekday '{day}'"))?,
            None => clock.weekday(),
        };

        let variants = dataset.calendar_variants(&line.route_id);
        let selection = ServiceSelection::for_weekday(&variants, weekday);
        let reports = match self.feed.reports().await {
            Ok(reports) => reports,
            Err(e) => {
                warn!(error = %e, "Realtime feed unavailable; showing schedule only");
                Vec::new()
            }
        };

        let blocks = dataset.blocks_for_route(&line.route_id);
        let rows = match &selection.active_service_id {
            Some(service_id) => block_rows(&blocks, service_id, &reports, &clock),
            None => Vec::new(),
        };
        print_json(&BlocksView {
            route: line,
            selection,
            rows,
        })
    }

    fn vehicle_view(&self, snapshot: &FleetSnapshot, offset: isize) -> Option<VehicleView> {
        let status = snapshot.statuses.first()?.clone();
        let report = &status.report;
        let dataset = self.network.dataset(report.vehicle_type);
        let live_trip = report.trip_id.as_deref();

        let trips = live_trip
            .and_then(|id| dataset?.trips_for_trip_block(id))
            .unwrap_or_else(|| Arc::from(Vec::new()));
        let mut cursor = TripCursor::new(trips, live_trip);
        cursor.shift(offset);

        let current = status.correlation.as_ref().and_then(|c| c.current_stop_index);
        let polyline = match (cursor.selected(), dataset) {
            (Some(trip), Some(dataset)) => assemble_polyline(dataset.shape_points(&trip.trip_id)),
            _ => Vec::new(),
        };
        Some(VehicleView {
            age: age_label(report.timestamp, &snapshot.clock),
            delay: delay_badge(status.delay_minutes()),
            trip_index: cursor.selected_index(),
            trip_count: cursor.trips().len(),
            live_trip: cursor.is_live(),
            stops: stop_rows(&cursor, current),
            polyline,
            status,
        })
    }

    async fn vehicle(&self, vehicle_id: &str, offset: isize, watch: bool) -> Result<()> {
        let fleet = self.fleet(FleetScope::Vehicle(vehicle_id.to_string()))?;
        if !watch {
            let snapshot = fleet.fetch().await?;
            return match self.vehicle_view(&snapshot, offset) {
                Some(view) => print_json(&view),
                None => Err(anyhow!("vehicle {vehicle_id} is not reporting")),
            };
        }
        self.watch(vehicle_id.to_string(), fleet, self.config.vehicle_poll_interval(), |snapshot| {
            match self.vehicle_view(snapshot, offset) {
                Some(view) => print_json(&view),
                None => {
                    warn!(vehicle_id, "Vehicle not in snapshot");
                    Ok(())
                }
            }
        })
        .await
    }

    fn schedule_view(&self, schedule_number: &str, service_id: &str, snapshot: &FleetSnapshot) -> Result<()> {
        let line = schedule_number.split('/').next().unwrap_or(schedule_number);
        let dataset = self
            .network
            .dataset_for_line(line)
            .ok_or_else(|| anyhow!("no static schedule loaded for line {line}"))?;
        let trips = dataset
            .trips_for_schedule_number(schedule_number, service_id)
            .ok_or_else(|| anyhow!("no brigade {schedule_number} under {service_id}"))?;
        let live_trip = snapshot
            .statuses
            .iter()
            .find_map(|s| s.report.trip_id.as_deref());
        print_json(&ScheduleView {
            schedule_number,
            service_id,
            vehicles: snapshot
                .statuses
                .iter()
                .map(|s| s.report.vehicle_id.as_str())
                .collect(),
            trips: schedule_rows(&trips, live_trip),
        })
    }

    async fn schedule(&self, schedule_number: &str, service_id: &str, watch: bool) -> Result<()> {
        let fleet = self.fleet(FleetScope::ScheduleNumber(schedule_number.to_string()))?;
        if !watch {
            let snapshot = fleet.fetch().await?;
            return self.schedule_view(schedule_number, service_id, &snapshot);
        }
        self.watch(
            schedule_number.to_string(),
            fleet,
            self.config.schedule_poll_interval(),
            |snapshot| self.schedule_view(schedule_number, service_id, snapshot),
        )
        .await
    }

    async fn stop(&self, stop_id: &str) -> Result<()> {
        let snapshot = self.fleet(FleetScope::All)?.fetch().await?;
        let clock = snapshot.clock;
        let mut departures = Vec::new();
        for dataset in self.network.datasets() {
            let variants = dataset.all_calendar_variants();
            if let Some(service) = resolve_active_service(&variants, clock.weekday()) {
                departures.extend(dataset.departures_at(stop_id, &service.service_id));
            }
        }
        if departures.is_empty() {
            return Err(anyhow!("no departures scheduled at stop {stop_id} today"));
        }
        // bus and tram datasets may share a stop id
        departures.sort_by_key(|d| clock_seconds(&d.departure_time).unwrap_or(i64::MAX));
        print_json(&StopView {
            stop_id,
            departures: departure_board(&departures, &snapshot.statuses, &clock),
        })
    }

    fn timetable(&self, route: &str, direction: u32, stop: Option<&str>, day: Option<&str>) -> Result<()> {
        let dataset = self
            .network
            .dataset_for_line(route)
            .ok_or_else(|| anyhow!("no static schedule loaded for line {route}"))?;
        let line = dataset
            .route_by_short_name(route)
            .ok_or_else(|| anyhow!("unknown line {route}"))?;
        let Some(stop_id) = stop else {
            let stops = dataset
                .route_stops(route, direction)
                .ok_or_else(|| anyhow!("line {route} has no trips in direction {direction}"))?;
            return print_json(&stops);
        };

        let weekday = match day {
            Some(day) => parse_weekday(day).ok_or_else(|| anyhow!("unknown weekday '{day}'"))?,
            None => self.clock()?.weekday(),
        };
        let selection = ServiceSelection::for_weekday(&dataset.calendar_variants(&line.route_id), weekday);
        let departures = match &selection.active_service_id {
            Some(service_id) => dataset.timetable(route, direction, stop_id, service_id),
            None => Vec::new(),
        };
        print_json(&TimetableView {
            route,
            direction_id: direction,
            stop_id,
            selection,
            departures,
        })
    }

    /// Polls `fleet` and renders every new snapshot until Ctrl+C.
    async fn watch(
        &self,
        key: String,
        fleet: TrackedFleet,
        interval: std::time::Duration,
        render: impl Fn(&FleetSnapshot) -> Result<()>,
    ) -> Result<()> {
        let mut poller = Poller::new(interval);
        let mut rx = poller.subscribe(key, fleet);
        info!("Watching. Press Ctrl+C to stop.");
        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = rx.borrow_and_update().clone();
                    if let Some(error) = &snapshot.error {
                        warn!(error = %error, "Showing last good snapshot");
                    }
                    if let Some(data) = &snapshot.data {
                        render(data)?;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }
        poller.stop();
        Ok(())
    }
}
