use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use rusqlite::{params, Statement};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{debug, info, warn};

use crate::{
    store::{schema, Store},
    timetable::{calendar::parse_date, time::Time},
};

#[derive(Debug, Default)]
pub struct LoadReport {
    pub stops: usize,
    pub routes: usize,
    pub trips: usize,
    pub calendar: usize,
    pub transfers: usize,
    pub stop_times: usize,
    pub trip_segments: usize,
}

pub fn cleaned_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}_cleaned.csv"))
}

impl Store {
    /// Replaces every table with the contents of a cleaner output directory, then derives
    /// `trip_segments`. Runs in one transaction, so a failure leaves no partial tables behind.
    pub fn load_cleaned_dir<P: AsRef<Path>>(&mut self, dir: P) -> anyhow::Result<LoadReport> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            bail!("Cleaned feed directory {} not found", dir.display());
        }

        let tx = self.conn.transaction()?;
        tx.execute_batch(schema::CREATE_TABLES)?;

        let mut report = LoadReport::default();

        report.stops = load_table(
            &mut tx.prepare(
                "INSERT INTO stops (stop_id, stop_name, stop_lat, stop_lon) VALUES (?1, ?2, ?3, ?4)",
            )?,
            dir,
            "stops",
            true,
            |stmt, rec: StopRecord| {
                stmt.execute(params![rec.stop_id, rec.stop_name, rec.stop_lat, rec.stop_lon])?;
                Ok(())
            },
        )?;

        report.routes = load_table(
            &mut tx.prepare(
                "INSERT INTO routes (route_id, route_short_name, route_long_name, route_type)
                 VALUES (?1, ?2, ?3, ?4)",
            )?,
            dir,
            "routes",
            false,
            |stmt, rec: RouteRecord| {
                stmt.execute(params![
                    rec.route_id,
                    rec.route_short_name,
                    rec.route_long_name,
                    rec.route_type
                ])?;
                Ok(())
            },
        )?;

        report.trips = load_table(
            &mut tx.prepare(
                "INSERT INTO trips (trip_id, route_id, service_id, direction_id)
                 VALUES (?1, ?2, ?3, ?4)",
            )?,
            dir,
            "trips",
            true,
            |stmt, rec: TripRecord| {
                stmt.execute(params![
                    rec.trip_id,
                    rec.route_id,
                    rec.service_id,
                    rec.direction_id
                ])?;
                Ok(())
            },
        )?;

        report.calendar = load_table(
            &mut tx.prepare(
                "INSERT INTO calendar (service_id, monday, tuesday, wednesday, thursday, friday,
                 saturday, sunday, start_date, end_date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?,
            dir,
            "calendar",
            false,
            |stmt, rec: CalendarRecord| {
                let start_date = parse_date(&rec.start_date)?.format("%Y-%m-%d").to_string();
                let end_date = parse_date(&rec.end_date)?.format("%Y-%m-%d").to_string();
                stmt.execute(params![
                    rec.service_id,
                    rec.monday,
                    rec.tuesday,
                    rec.wednesday,
                    rec.thursday,
                    rec.friday,
                    rec.saturday,
                    rec.sunday,
                    start_date,
                    end_date
                ])?;
                Ok(())
            },
        )?;

        report.transfers = load_table(
            &mut tx.prepare(
                "INSERT INTO transfers (from_stop_id, to_stop_id, transfer_type, min_transfer_time)
                 VALUES (?1, ?2, ?3, ?4)",
            )?,
            dir,
            "transfers",
            false,
            |stmt, rec: TransferRecord| {
                stmt.execute(params![
                    rec.from_stop_id,
                    rec.to_stop_id,
                    rec.transfer_type,
                    rec.min_transfer_time
                ])?;
                Ok(())
            },
        )?;

        info!("Loading and converting stop_times, this may take a moment");
        report.stop_times = load_table(
            &mut tx.prepare(
                "INSERT INTO stop_times (trip_id, stop_id, stop_sequence, arrival_time,
                 departure_time, arrival_time_sec, departure_time_sec)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?,
            dir,
            "stop_times",
            true,
            |stmt, rec: StopTimeRecord| {
                let arrival_sec = parse_optional_time(rec.arrival_time.as_deref())?;
                let departure_sec = parse_optional_time(rec.departure_time.as_deref())?;
                stmt.execute(params![
                    rec.trip_id,
                    rec.stop_id,
                    rec.stop_sequence,
                    rec.arrival_time,
                    rec.departure_time,
                    arrival_sec,
                    departure_sec
                ])?;
                Ok(())
            },
        )?;

        info!("Creating indices");
        tx.execute_batch(schema::CREATE_INDICES)?;

        info!("Building trip_segments");
        tx.execute_batch(schema::CREATE_TRIP_SEGMENTS)?;
        tx.commit()?;

        report.trip_segments = self.count("trip_segments")?;
        for segment in self.sample_segments(5)? {
            debug!(?segment, "Sample trip segment");
        }

        info!(?report, "Database build complete");
        Ok(report)
    }
}

fn parse_optional_time(s: Option<&str>) -> anyhow::Result<Option<u32>> {
    s.map(|s| Time::parse(s).map(Time::secs)).transpose()
}

fn load_table<T, F>(
    stmt: &mut Statement<'_>,
    dir: &Path,
    table: &str,
    required: bool,
    insert: F,
) -> anyhow::Result<usize>
where
    T: DeserializeOwned,
    F: Fn(&mut Statement<'_>, T) -> anyhow::Result<()>,
{
    let path = cleaned_path(dir, table);
    if !path.is_file() {
        if required {
            bail!("Required table {} is missing", path.display());
        }
        warn!(table, "Optional table missing, leaving it empty");
        return Ok(0);
    }

    info!("Loading {} into SQL", path.display());
    let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut count = 0;
    for rec in csv::Reader::from_reader(file).deserialize() {
        let rec: T = rec.with_context(|| format!("Malformed row in {}", path.display()))?;
        insert(stmt, rec).with_context(|| format!("Failed to insert row into {table}"))?;
        count += 1;
    }
    Ok(count)
}

#[derive(Deserialize)]
struct StopRecord {
    stop_id: String,
    #[serde(default)]
    stop_name: Option<String>,
    stop_lat: f64,
    stop_lon: f64,
}

#[derive(Deserialize)]
struct RouteRecord {
    route_id: String,
    #[serde(default)]
    route_short_name: Option<String>,
    #[serde(default)]
    route_long_name: Option<String>,
    #[serde(default)]
    route_type: Option<u16>,
}

#[derive(Deserialize)]
struct TripRecord {
    trip_id: String,
    route_id: String,
    service_id: String,
    #[serde(default)]
    direction_id: Option<u8>,
}

#[derive(Deserialize)]
struct CalendarRecord {
    service_id: String,
    monday: u8,
    tuesday: u8,
    wednesday: u8,
    thursday: u8,
    friday: u8,
    saturday: u8,
    sunday: u8,
    start_date: String,
    end_date: String,
}

#[derive(Deserialize)]
struct TransferRecord {
    from_stop_id: String,
    to_stop_id: String,
    #[serde(default)]
    transfer_type: Option<u8>,
    #[serde(default)]
    min_transfer_time: Option<u32>,
}

#[derive(Deserialize)]
struct StopTimeRecord {
    trip_id: String,
    stop_id: String,
    stop_sequence: u32,
    #[serde(default)]
    arrival_time: Option<String>,
    #[serde(default)]
    departure_time: Option<String>,
}
