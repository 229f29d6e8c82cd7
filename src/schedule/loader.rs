//! Reading a GTFS text directory into flat records.

use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use tracing::{info, instrument, warn};

use crate::error::ScheduleError;
use crate::model::ShapePoint;

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRecord {
    pub route_id: String,
    pub route_short_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub block_id: Option<String>,
    pub trip_headsign: String,
    pub direction_id: Option<u32>,
    pub shape_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopTimeRecord {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub departure_time: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopRecord {
    pub stop_id: String,
    pub stop_name: String,
}

/// A `calendar.txt` row reduced to the day names it runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarRecord {
    pub service_id: String,
    pub days: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRecord {
    pub shape_id: String,
    pub point: ShapePoint,
}

/// Raw contents of one GTFS directory, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GtfsTables {
    pub routes: Vec<RouteRecord>,
    pub trips: Vec<TripRecord>,
    pub stop_times: Vec<StopTimeRecord>,
    pub stops: Vec<StopRecord>,
    pub calendar: Vec<CalendarRecord>,
    pub shapes: Vec<ShapeRecord>,
}

const WEEKDAY_COLUMNS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Parsed header row with column lookups that name the file on failure.
struct Columns<'a> {
    file: &'a str,
    headers: StringRecord,
}

impl Columns<'_> {
    fn required(&self, name: &str) -> Result<usize, ScheduleError> {
        self.optional(name).ok_or_else(|| ScheduleError::MissingColumn {
            file: self.file.to_string(),
            column: name.to_string(),
        })
    }

    fn optional(&self, name: &str) -> Option<usize> {
        // some exports carry a UTF-8 BOM on the first header
        self.headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}') == name)
    }
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("")
}

fn open(dir: &Path, file: &str) -> Result<Option<csv::Reader<File>>, ScheduleError> {
    let path = dir.join(file);
    if !path.exists() {
        return Ok(None);
    }
    let handle = File::open(&path).map_err(|source| ScheduleError::Io {
        file: file.to_string(),
        source,
    })?;
    Ok(Some(
        csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(handle),
    ))
}

fn open_required(dir: &Path, file: &str) -> Result<csv::Reader<File>, ScheduleError> {
    open(dir, file)?.ok_or_else(|| ScheduleError::MissingFile(file.to_string()))
}

/// Reads every row of `file`, handing each record to `row`.
///
/// `row` returns `None` for records it has to skip; skips are counted and
/// logged once per file.
fn read_rows<T>(
    mut rdr: csv::Reader<File>,
    file: &str,
    mut row: impl FnMut(&Columns<'_>, &StringRecord) -> Result<Option<T>, ScheduleError>,
) -> Result<Vec<T>, ScheduleError> {
    info!("Parsing {file}");
    let csv_err = |source| ScheduleError::Csv {
        file: file.to_string(),
        source,
    };
    let columns = Columns {
        file,
        headers: rdr.headers().map_err(csv_err)?.clone(),
    };

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result.map_err(csv_err)?;
        match row(&columns, &record)? {
            Some(item) => out.push(item),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, file, "Skipped malformed records");
    }
    Ok(out)
}

fn parse_routes(rdr: csv::Reader<File>) -> Result<Vec<RouteRecord>, ScheduleError> {
    read_rows(rdr, "routes.txt", |cols, record| {
        let route_id = field(record, cols.required("route_id")?);
        if route_id.is_empty() {
            return Ok(None);
        }
        let short_name = cols
            .optional("route_short_name")
            .and_then(|i| non_empty(field(record, i)))
            .unwrap_or_else(|| route_id.to_string());
        Ok(Some(RouteRecord {
            route_id: route_id.to_string(),
            route_short_name: short_name,
        }))
    })
}

fn parse_trips(rdr: csv::Reader<File>) -> Result<Vec<TripRecord>, ScheduleError> {
    read_rows(rdr, "trips.txt", |cols, record| {
        let trip_id = field(record, cols.required("trip_id")?);
        if trip_id.is_empty() {
            return Ok(None);
        }
        Ok(Some(TripRecord {
            trip_id: trip_id.to_string(),
            route_id: field(record, cols.required("route_id")?).to_string(),
            service_id: field(record, cols.required("service_id")?).to_string(),
            block_id: cols
                .optional("block_id")
                .and_then(|i| non_empty(field(record, i))),
            trip_headsign: cols
                .optional("trip_headsign")
                .map(|i| field(record, i).to_string())
                .unwrap_or_default(),
            direction_id: cols
                .optional("direction_id")
                .and_then(|i| field(record, i).parse::<u32>().ok()),
            shape_id: cols
                .optional("shape_id")
                .and_then(|i| non_empty(field(record, i))),
        }))
    })
}

fn parse_stop_times(rdr: csv::Reader<File>) -> Result<Vec<StopTimeRecord>, ScheduleError> {
    read_rows(rdr, "stop_times.txt", |cols, record| {
        let trip_id = field(record, cols.required("trip_id")?);
        let stop_id = field(record, cols.required("stop_id")?);
        let Ok(stop_sequence) = field(record, cols.required("stop_sequence")?).parse::<u32>() else {
            return Ok(None);
        };
        if trip_id.is_empty() || stop_id.is_empty() {
            return Ok(None);
        }
        // departure_time falls back to arrival_time when blank
        let departure_time = cols
            .optional("departure_time")
            .and_then(|i| non_empty(field(record, i)))
            .or_else(|| {
                cols.optional("arrival_time")
                    .and_then(|i| non_empty(field(record, i)))
            })
            .unwrap_or_default();
        Ok(Some(StopTimeRecord {
            trip_id: trip_id.to_string(),
            stop_id: stop_id.to_string(),
            stop_sequence,
            departure_time,
        }))
    })
}

fn parse_stops(rdr: csv::Reader<File>) -> Result<Vec<StopRecord>, ScheduleError> {
    read_rows(rdr, "stops.txt", |cols, record| {
        let stop_id = field(record, cols.required("stop_id")?);
        if stop_id.is_empty() {
            return Ok(None);
        }
        Ok(Some(StopRecord {
            stop_id: stop_id.to_string(),
            stop_name: cols
                .optional("stop_name")
                .map(|i| field(record, i).to_string())
                .unwrap_or_default(),
        }))
    })
}

fn parse_calendar(rdr: csv::Reader<File>) -> Result<Vec<CalendarRecord>, ScheduleError> {
    read_rows(rdr, "calendar.txt", |cols, record| {
        let service_id = field(record, cols.required("service_id")?);
        if service_id.is_empty() {
            return Ok(None);
        }
        let mut days = Vec::new();
        for day in WEEKDAY_COLUMNS {
            if field(record, cols.required(day)?) == "1" {
                days.push(day.to_string());
            }
        }
        Ok(Some(CalendarRecord {
            service_id: service_id.to_string(),
            days,
        }))
    })
}

fn parse_shapes(rdr: csv::Reader<File>) -> Result<Vec<ShapeRecord>, ScheduleError> {
    read_rows(rdr, "shapes.txt", |cols, record| {
        let shape_id = field(record, cols.required("shape_id")?);
        let sequence = field(record, cols.required("shape_pt_sequence")?).parse::<u32>();
        let lat = field(record, cols.required("shape_pt_lat")?).parse::<f64>();
        let lon = field(record, cols.required("shape_pt_lon")?).parse::<f64>();
        match (sequence, lat, lon) {
            (Ok(sequence), Ok(lat), Ok(lon)) if !shape_id.is_empty() => Ok(Some(ShapeRecord {
                shape_id: shape_id.to_string(),
                point: ShapePoint { sequence, lat, lon },
            })),
            _ => Ok(None),
        }
    })
}

/// Loads the GTFS text files of one dataset; `shapes.txt` is optional.
#[instrument(skip_all, fields(dir = %dir.display()))]
pub fn load_tables(dir: &Path) -> Result<GtfsTables, ScheduleError> {
    let tables = GtfsTables {
        routes: parse_routes(open_required(dir, "routes.txt")?)?,
        trips: parse_trips(open_required(dir, "trips.txt")?)?,
        stop_times: parse_stop_times(open_required(dir, "stop_times.txt")?)?,
        stops: parse_stops(open_required(dir, "stops.txt")?)?,
        calendar: parse_calendar(open_required(dir, "calendar.txt")?)?,
        shapes: match open(dir, "shapes.txt")? {
            Some(rdr) => parse_shapes(rdr)?,
            None => Vec::new(),
        },
    };
    info!(
        routes = tables.routes.len(),
        trips = tables.trips.len(),
        stop_times = tables.stop_times.len(),
        stops = tables.stops.len(),
        shape_points = tables.shapes.len(),
        "GTFS tables loaded"
    );
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gtfs_rt_tracker_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(dir: &Path, file: &str, contents: &str) {
        std::fs::write(dir.join(file), contents).unwrap();
    }

    fn write_minimal(dir: &Path) {
        write(dir, "routes.txt", "\u{feff}route_id,route_short_name\nroute_4,4\n,9\n");
        write(
            dir,
            "trips.txt",
            "trip_id,route_id,service_id,block_id,trip_headsign,direction_id\nt1,route_4,service_1,block_1,Bronowice,1\n",
        );
        write(
            dir,
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             t1,08:00:00,08:00:00,s1,1\n\
             t1,08:05:00,,s2,2\n\
             t1,08:10:00,08:10:00,s3,x\n",
        );
        write(dir, "stops.txt", "stop_id,stop_name\ns1,Rondo Mogilskie\ns2,Teatr Bagatela\n");
        write(
            dir,
            "calendar.txt",
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
             service_1,1,1,1,1,1,0,0,20260101,20261231\n",
        );
    }

    #[test]
    fn test_load_tables() {
        let dir = scratch_dir("load");
        write_minimal(&dir);

        let tables = load_tables(&dir).unwrap();
        assert_eq!(tables.routes.len(), 1);
        assert_eq!(tables.routes[0].route_short_name, "4");
        assert_eq!(tables.trips[0].block_id.as_deref(), Some("block_1"));
        assert_eq!(tables.trips[0].shape_id, None);
        assert_eq!(tables.trips[0].direction_id, Some(1));
        // the row with a bad stop_sequence is skipped
        assert_eq!(tables.stop_times.len(), 2);
        assert_eq!(tables.stop_times[1].departure_time, "08:05:00");
        assert_eq!(
            tables.calendar[0].days,
            vec!["monday", "tuesday", "wednesday", "thursday", "friday"]
        );
        assert!(tables.shapes.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_required_file() {
        let dir = scratch_dir("missing");
        write_minimal(&dir);
        std::fs::remove_file(dir.join("calendar.txt")).unwrap();

        let err = load_tables(&dir).unwrap_err();
        assert!(matches!(err, ScheduleError::MissingFile(ref f) if f == "calendar.txt"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_required_column() {
        let dir = scratch_dir("column");
        write_minimal(&dir);
        write(&dir, "trips.txt", "trip_id,service_id\nt1,service_1\n");

        let err = load_tables(&dir).unwrap_err();
        assert!(matches!(err, ScheduleError::MissingColumn { ref column, .. } if column == "route_id"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
