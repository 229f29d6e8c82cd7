//! Typed errors for the feed and schedule providers.
//!
//! The correlation engine itself never fails: misses and malformed times are
//! expressed in its return values. Only I/O at the edges produces errors.

use thiserror::Error;

/// Failure to obtain or decode a realtime snapshot.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Feed returned HTTP {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("Invalid feed URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to load a static GTFS dataset.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("IO error reading {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
    #[error("Required GTFS file missing: {0}")]
    MissingFile(String),
    #[error("{file} has no {column} column")]
    MissingColumn { file: String, column: String },
}
