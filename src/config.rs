use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::engine::{Clock, DEFAULT_FRESH_WINDOW_SECS, DEFAULT_NIGHT_ROLLOVER_HOUR};
use crate::model::VehicleType;
use crate::poll::feed::FeedEndpoint;
use crate::poll::{SCHEDULE_VIEW_INTERVAL, VEHICLE_POSITIONS_INTERVAL};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackerConfig {
    /// Bus vehicle positions feed (URL or local path)
    #[serde(default = "TrackerConfig::default_bus_feed_url")]
    pub bus_feed_url: String,
    /// Tram vehicle positions feed (URL or local path)
    #[serde(default = "TrackerConfig::default_tram_feed_url")]
    pub tram_feed_url: String,
    /// Unpacked static GTFS directory for buses
    #[serde(default)]
    pub bus_gtfs_dir: Option<PathBuf>,
    /// Unpacked static GTFS directory for trams
    #[serde(default)]
    pub tram_gtfs_dir: Option<PathBuf>,
    /// IANA timezone the timetables are published in
    #[serde(default = "TrackerConfig::default_timezone")]
    pub timezone: String,
    /// Reports younger than this are fresh (default: 600)
    #[serde(default = "TrackerConfig::default_fresh_window_secs")]
    pub fresh_window_secs: i64,
    /// Vehicle position poll interval (default: 15)
    #[serde(default = "TrackerConfig::default_vehicle_poll_secs")]
    pub vehicle_poll_secs: u64,
    /// Poll interval of schedule-number views (default: 20)
    #[serde(default = "TrackerConfig::default_schedule_poll_secs")]
    pub schedule_poll_secs: u64,
    /// Local hour until which night lines still belong to the previous day (default: 5)
    #[serde(default = "TrackerConfig::default_night_rollover_hour")]
    pub night_rollover_hour: u32,
    /// HTTP timeout for feed downloads (default: 10)
    #[serde(default = "TrackerConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            bus_feed_url: Self::default_bus_feed_url(),
            tram_feed_url: Self::default_tram_feed_url(),
            bus_gtfs_dir: None,
            tram_gtfs_dir: None,
            timezone: Self::default_timezone(),
            fresh_window_secs: Self::default_fresh_window_secs(),
            vehicle_poll_secs: Self::default_vehicle_poll_secs(),
            schedule_poll_secs: Self::default_schedule_poll_secs(),
            night_rollover_hour: Self::default_night_rollover_hour(),
            request_timeout_secs: Self::default_request_timeout_secs(),
        }
    }
}

impl TrackerConfig {
    fn default_bus_feed_url() -> String {
        "https://gtfs.ztp.krakow.pl/VehiclePositions_A.pb".to_string()
    }
    fn default_tram_feed_url() -> String {
        "https://gtfs.ztp.krakow.pl/VehiclePositions_T.pb".to_string()
    }
    fn default_timezone() -> String {
        "Europe/Warsaw".to_string()
    }
    fn default_fresh_window_secs() -> i64 {
        DEFAULT_FRESH_WINDOW_SECS
    }
    fn default_vehicle_poll_secs() -> u64 {
        VEHICLE_POSITIONS_INTERVAL.as_secs()
    }
    fn default_schedule_poll_secs() -> u64 {
        SCHEDULE_VIEW_INTERVAL.as_secs()
    }
    fn default_night_rollover_hour() -> u32 {
        DEFAULT_NIGHT_ROLLOVER_HOUR
    }
    fn default_request_timeout_secs() -> u64 {
        10
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Config file if given, then environment overrides from the process env.
    pub fn from_sources(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `TRACKER_*` variables looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        fn number<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::ParseError(format!("{key}={value} is not a number")))
        }

        if let Some(v) = var("TRACKER_BUS_FEED_URL") {
            self.bus_feed_url = v;
        }
        if let Some(v) = var("TRACKER_TRAM_FEED_URL") {
            self.tram_feed_url = v;
        }
        if let Some(v) = var("TRACKER_BUS_GTFS_DIR") {
            self.bus_gtfs_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("TRACKER_TRAM_GTFS_DIR") {
            self.tram_gtfs_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = var("TRACKER_TIMEZONE") {
            self.timezone = v;
        }
        if let Some(v) = var("TRACKER_FRESH_WINDOW_SECS") {
            self.fresh_window_secs = number("TRACKER_FRESH_WINDOW_SECS", v)?;
        }
        if let Some(v) = var("TRACKER_VEHICLE_POLL_SECS") {
            self.vehicle_poll_secs = number("TRACKER_VEHICLE_POLL_SECS", v)?;
        }
        if let Some(v) = var("TRACKER_SCHEDULE_POLL_SECS") {
            self.schedule_poll_secs = number("TRACKER_SCHEDULE_POLL_SECS", v)?;
        }
        if let Some(v) = var("TRACKER_NIGHT_ROLLOVER_HOUR") {
            self.night_rollover_hour = number("TRACKER_NIGHT_ROLLOVER_HOUR", v)?;
        }
        if let Some(v) = var("TRACKER_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = number("TRACKER_REQUEST_TIMEOUT_SECS", v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;
        if self.vehicle_poll_secs == 0 || self.schedule_poll_secs == 0 {
            return Err(ConfigError::Invalid("poll intervals must be positive".into()));
        }
        if self.night_rollover_hour > 23 {
            return Err(ConfigError::Invalid("night_rollover_hour must be 0-23".into()));
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{}'", self.timezone)))
    }

    /// Engine clock at `now` with the configured thresholds.
    pub fn clock(&self, now: DateTime<Utc>) -> Result<Clock, ConfigError> {
        Ok(Clock::new(now, self.tz()?)
            .with_fresh_window(self.fresh_window_secs)
            .with_night_rollover_hour(self.night_rollover_hour))
    }

    pub fn endpoints(&self) -> Vec<FeedEndpoint> {
        vec![
            FeedEndpoint {
                vehicle_type: VehicleType::Bus,
                url: self.bus_feed_url.clone(),
            },
            FeedEndpoint {
                vehicle_type: VehicleType::Tram,
                url: self.tram_feed_url.clone(),
            },
        ]
    }

    pub fn vehicle_poll_interval(&self) -> Duration {
        Duration::from_secs(self.vehicle_poll_secs)
    }

    pub fn schedule_poll_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_poll_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
