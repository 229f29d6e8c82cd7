//! Output formatting and persistence for views and snapshot statistics.
//!
//! Views are printed as pretty JSON on stdout; statistics can also be
//! appended to a CSV file, one row per tick.

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::stats::SnapshotStats;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Writes any view as pretty-printed JSON followed by a newline.
pub fn write_json<W: Write, T: Serialize + ?Sized>(mut out: W, view: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, view)?;
    writeln!(out)?;
    Ok(())
}

/// Prints a view as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(view: &T) -> Result<()> {
    write_json(std::io::stdout().lock(), view)
}

/// Appends a [`SnapshotStats`] record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &str, stats: &SnapshotStats) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(stats)?;
    writer.flush()?;

    Ok(())
}
