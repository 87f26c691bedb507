use std::{
    collections::HashSet,
    fs::{self, File},
    io::Read,
    path::Path,
};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use itertools::Itertools;
use tracing::{info, warn};
use zip::ZipArchive;

use crate::timetable::time::Time;

const SPARSE_COLUMN_PERCENT: f64 = 10.0;
/// Longest `min_transfer_time` kept, one service day
const MAX_TRANSFER_SECS: u32 = 24 * 3600;

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRow {
    pub file: String,
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct TableReport {
    pub file: String,
    pub rows_kept: usize,
    pub dropped: Vec<DroppedRow>,
    /// Columns with more than 10% empty values, and that percentage
    pub sparse_columns: Vec<(String, f64)>,
    pub date_columns: Vec<String>,
}

#[derive(Debug, Default)]
pub struct CleanReport {
    pub tables: Vec<TableReport>,
    pub skipped_empty: Vec<String>,
}

impl TableReport {
    fn drop_row(&mut self, line: u64, reason: String) {
        self.dropped.push(DroppedRow {
            file: self.file.clone(),
            line,
            reason,
        });
    }
}

impl CleanReport {
    pub fn table(&self, file: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.file == file)
    }

    pub fn rows_dropped(&self) -> usize {
        self.tables.iter().map(|t| t.dropped.len()).sum()
    }
}

pub struct CleanedTable {
    pub headers: StringRecord,
    pub rows: Vec<StringRecord>,
    pub report: TableReport,
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Float,
    /// Bounds are inclusive
    Integer { min: u32, max: u32 },
    Time,
    Flag,
}

fn required_columns(table: &str) -> &'static [&'static str] {
    match table {
        "stops" => &["stop_id", "stop_lat", "stop_lon"],
        "stop_times" => &["trip_id", "stop_id", "stop_sequence"],
        "trips" => &["trip_id", "route_id", "service_id"],
        "routes" => &["route_id"],
        "transfers" => &["from_stop_id", "to_stop_id"],
        "calendar" => &["service_id", "start_date", "end_date"],
        _ => &[],
    }
}

fn column_kind(table: &str, column: &str) -> Option<Kind> {
    match (table, column) {
        ("stops", "stop_lat" | "stop_lon") => Some(Kind::Float),
        ("stop_times", "stop_sequence") => Some(Kind::Integer {
            min: 0,
            max: u32::MAX,
        }),
        ("stop_times", "arrival_time" | "departure_time") => Some(Kind::Time),
        ("trips", "direction_id") => Some(Kind::Integer { min: 0, max: 1 }),
        ("routes", "route_type") => Some(Kind::Integer {
            min: 0,
            max: u16::MAX.into(),
        }),
        ("transfers", "transfer_type") => Some(Kind::Integer { min: 0, max: 5 }),
        ("transfers", "min_transfer_time") => Some(Kind::Integer {
            min: 0,
            max: MAX_TRANSFER_SECS,
        }),
        (
            "calendar",
            "monday" | "tuesday" | "wednesday" | "thursday" | "friday" | "saturday" | "sunday",
        ) => Some(Kind::Flag),
        _ => None,
    }
}

/// Column whose values must be unique within a table.
fn primary_key(table: &str) -> Option<&'static str> {
    match table {
        "stops" => Some("stop_id"),
        "trips" => Some("trip_id"),
        "routes" => Some("route_id"),
        "calendar" => Some("service_id"),
        _ => None,
    }
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Kind::Float => "Float",
            Kind::Integer { .. } => "Integer",
            Kind::Time => "Time",
            Kind::Flag => "Flag",
        }
    }

    fn accepts(self, value: &str) -> bool {
        match self {
            Kind::Float => value.parse::<f64>().is_ok_and(f64::is_finite),
            Kind::Integer { min, max } => value
                .parse::<u32>()
                .is_ok_and(|v| (min..=max).contains(&v)),
            Kind::Time => Time::parse(value).is_ok(),
            Kind::Flag => value == "0" || value == "1",
        }
    }
}

/// Rewrites `YYYYMMDD` as `YYYY-MM-DD`. Anything unparseable becomes empty.
fn standardize_date(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

pub fn cleaned_file_name(file: &str) -> String {
    let stem = file.strip_suffix(".txt").unwrap_or(file);
    format!("{stem}_cleaned.csv")
}

/// Cleans one GTFS table. Returns `None` for an empty file.
pub fn clean_table<R: Read>(file: &str, reader: R) -> anyhow::Result<Option<CleanedTable>> {
    let table = file.strip_suffix(".txt").unwrap_or(file);
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .with_context(|| format!("Failed to read header of {file}"))?
        .clone();
    if headers.iter().all(str::is_empty) {
        return Ok(None);
    }

    let column_index = |name: &str| headers.iter().position(|h| h == name);
    let required = required_columns(table)
        .iter()
        .map(|col| {
            column_index(col)
                .map(|i| (i, *col))
                .with_context(|| format!("{file} is missing required column {col}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let kinds = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| column_kind(table, h).map(|k| (i, h.to_owned(), k)))
        .collect::<Vec<_>>();
    let key = primary_key(table).and_then(|col| column_index(col).map(|i| (i, col)));
    let date_columns = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.to_ascii_lowercase().contains("date"))
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    let mut report = TableReport {
        file: file.to_owned(),
        date_columns: date_columns.iter().map(|i| headers[*i].to_owned()).collect(),
        ..Default::default()
    };
    let mut missing = vec![0usize; headers.len()];
    let mut well_formed = 0usize;
    let mut rows = Vec::new();
    let mut seen_keys = HashSet::new();

    for result in rdr.byte_records() {
        let record = result.with_context(|| format!("Failed to read a row of {file}"))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let Ok(record) = StringRecord::from_byte_record(record) else {
            report.drop_row(line, "invalid UTF-8".to_owned());
            continue;
        };

        if record.len() != headers.len() {
            report.drop_row(
                line,
                format!("expected {} fields, found {}", headers.len(), record.len()),
            );
            continue;
        }

        well_formed += 1;
        for (i, value) in record.iter().enumerate() {
            if value.is_empty() {
                missing[i] += 1;
            }
        }

        let mut fields = record.iter().map(str::to_owned).collect::<Vec<_>>();
        for i in &date_columns {
            fields[*i] = standardize_date(&fields[*i]);
        }

        let reason = required
            .iter()
            .find(|(i, _)| fields[*i].is_empty())
            .map(|(_, col)| format!("missing required field {col}"))
            .or_else(|| {
                kinds
                    .iter()
                    .find(|(i, _, kind)| !fields[*i].is_empty() && !kind.accepts(&fields[*i]))
                    .map(|(i, col, kind)| {
                        format!("invalid {} in {col}: {:?}", kind.name(), fields[*i])
                    })
            })
            .or_else(|| {
                key.filter(|(i, _)| !seen_keys.insert(fields[*i].clone()))
                    .map(|(i, col)| format!("duplicate {col} {:?}", fields[i]))
            });
        if let Some(reason) = reason {
            report.drop_row(line, reason);
            continue;
        }

        rows.push(StringRecord::from(fields));
    }

    if well_formed > 0 {
        report.sparse_columns = headers
            .iter()
            .zip(missing)
            .map(|(h, n)| (h.to_owned(), n as f64 / well_formed as f64 * 100.0))
            .filter(|(_, pct)| *pct > SPARSE_COLUMN_PERCENT)
            .collect();
    }
    report.rows_kept = rows.len();

    Ok(Some(CleanedTable {
        headers,
        rows,
        report,
    }))
}

pub fn write_table<P: AsRef<Path>>(table: &CleanedTable, path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Cleans every `.txt` table of a GTFS zip into `<name>_cleaned.csv` files.
pub fn clean_feed<P: AsRef<Path>, Q: AsRef<Path>>(
    zip_path: P,
    output_dir: Q,
) -> anyhow::Result<CleanReport> {
    let zip_path = zip_path.as_ref();
    let output_dir = output_dir.as_ref();
    info!("Processing {}", zip_path.display());

    let file = File::open(zip_path)
        .with_context(|| format!("The feed {} was not found", zip_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("{} is not a valid zip file", zip_path.display()))?;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let names = archive
        .file_names()
        .filter(|n| n.ends_with(".txt"))
        .map(str::to_owned)
        .sorted()
        .collect::<Vec<_>>();
    if names.is_empty() {
        bail!("{} contains no GTFS tables", zip_path.display());
    }

    let mut report = CleanReport::default();
    for name in names {
        let file_name = Path::new(&name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&name)
            .to_owned();
        info!("Processing {file_name}");

        let entry = archive.by_name(&name)?;
        let Some(table) = clean_table(&file_name, entry)? else {
            info!("Skipping {file_name}: file is empty");
            report.skipped_empty.push(file_name);
            continue;
        };

        for (column, pct) in &table.report.sparse_columns {
            info!("{file_name}: column {column} is {pct:.2}% empty");
        }
        if !table.report.date_columns.is_empty() {
            info!(
                "{file_name}: standardized date columns {:?}",
                table.report.date_columns
            );
        }
        for dropped in &table.report.dropped {
            warn!(
                file = file_name.as_str(),
                line = dropped.line,
                reason = dropped.reason.as_str(),
                "Dropped row"
            );
        }

        let output = output_dir.join(cleaned_file_name(&file_name));
        write_table(&table, &output)?;
        info!(
            rows = table.report.rows_kept,
            dropped = table.report.dropped.len(),
            "Saved cleaned file to {}",
            output.display()
        );
        report.tables.push(table.report);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleaned_file_name() {
        assert_eq!(cleaned_file_name("stops.txt"), "stops_cleaned.csv");
    }

    #[test]
    fn test_empty_file_is_skipped() {
        assert!(clean_table("shapes.txt", "".as_bytes()).unwrap().is_none());
    }

    #[test]
    fn test_trims_fields_and_drops_bad_stops() {
        let input = "stop_id, stop_name ,stop_lat,stop_lon\n\
                     101S , Van Cortlandt Park ,40.889248,-73.898583\n\
                     ,Nowhere,40.0,-73.0\n\
                     102S,Broken,north,-73.0\n\
                     103S,Too,Many,Fields,Here\n";
        let table = clean_table("stops.txt", input.as_bytes()).unwrap().unwrap();

        assert_eq!(&table.headers[1], "stop_name");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(&table.rows[0][0], "101S");
        assert_eq!(&table.rows[0][1], "Van Cortlandt Park");

        let reasons = table
            .report
            .dropped
            .iter()
            .map(|d| d.reason.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            reasons,
            vec![
                "missing required field stop_id",
                "invalid Float in stop_lat: \"north\"",
                "expected 4 fields, found 5",
            ]
        );
        assert_eq!(table.report.dropped[0].line, 3);
    }

    #[test]
    fn test_dates_are_standardized_and_invalid_dates_dropped() {
        let input = "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
                     Weekday,1,1,1,1,1,0,0,20240101,20241231\n\
                     Broken,1,1,1,1,1,0,0,2024013x,20241231\n";
        let table = clean_table("calendar.txt", input.as_bytes())
            .unwrap()
            .unwrap();

        assert_eq!(table.report.date_columns, vec!["start_date", "end_date"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(&table.rows[0][8], "2024-01-01");
        assert_eq!(&table.rows[0][9], "2024-12-31");
        assert_eq!(
            table.report.dropped[0].reason,
            "missing required field start_date"
        );
    }

    #[test]
    fn test_reports_sparse_columns() {
        let input = "trip_id,arrival_time,departure_time,stop_id,stop_sequence,stop_headsign\n\
                     T1,08:00:00,08:00:00,A,1,\n\
                     T1,,08:05:00,B,2,\n\
                     T1,25:10:00,25:10:00,C,3,Downtown\n";
        let table = clean_table("stop_times.txt", input.as_bytes())
            .unwrap()
            .unwrap();

        assert_eq!(table.rows.len(), 3);
        let sparse = table
            .report
            .sparse_columns
            .iter()
            .map(|(c, _)| c.as_str())
            .collect::<Vec<_>>();
        assert_eq!(sparse, vec!["arrival_time", "stop_headsign"]);
    }

    #[test]
    fn test_overflowing_time_is_dropped() {
        let input = "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                     T1,08:00:00,08:00:00,A,1\n\
                     T1,9999999:00:00,9999999:00:00,B,2\n";
        let table = clean_table("stop_times.txt", input.as_bytes())
            .unwrap()
            .unwrap();

        assert_eq!(table.rows.len(), 1);
        assert_eq!(
            table.report.dropped,
            vec![DroppedRow {
                file: "stop_times.txt".to_owned(),
                line: 3,
                reason: "invalid Time in arrival_time: \"9999999:00:00\"".to_owned(),
            }]
        );
    }

    #[test]
    fn test_integers_must_fit_their_column() {
        let input = "route_id,service_id,trip_id,direction_id\n\
                     R1,S,T1,0\n\
                     R1,S,T2,300\n\
                     R1,S,T3,-1\n\
                     R1,S,T4,\n";
        let table = clean_table("trips.txt", input.as_bytes()).unwrap().unwrap();
        assert_eq!(table.rows.len(), 2);
        let reasons = table
            .report
            .dropped
            .iter()
            .map(|d| d.reason.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            reasons,
            vec![
                "invalid Integer in direction_id: \"300\"",
                "invalid Integer in direction_id: \"-1\"",
            ]
        );

        let input = "from_stop_id,to_stop_id,transfer_type,min_transfer_time\n\
                     A,B,2,180\n\
                     A,C,2,4294967295\n\
                     A,D,9,0\n";
        let table = clean_table("transfers.txt", input.as_bytes())
            .unwrap()
            .unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.report.dropped.len(), 2);
    }

    #[test]
    fn test_invalid_utf8_row_is_dropped() {
        let mut input =
            b"stop_id,stop_name,stop_lat,stop_lon\n101S,Good,40.0,-73.0\n102S,Bad".to_vec();
        input.push(0xFF);
        input.extend_from_slice(b",40.1,-73.0\n103S,Also good,40.2,-73.0\n");
        let table = clean_table("stops.txt", input.as_slice()).unwrap().unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(&table.rows[1][0], "103S");
        assert_eq!(table.report.dropped.len(), 1);
        assert_eq!(table.report.dropped[0].line, 3);
        assert_eq!(table.report.dropped[0].reason, "invalid UTF-8");
    }

    #[test]
    fn test_duplicate_ids_keep_the_first_row() {
        let input = "stop_id,stop_name,stop_lat,stop_lon\n\
                     101S,First,40.0,-73.0\n\
                     102S,Other,40.1,-73.0\n\
                     101S,Second,40.2,-73.0\n";
        let table = clean_table("stops.txt", input.as_bytes()).unwrap().unwrap();

        assert_eq!(table.rows.len(), 2);
        assert_eq!(&table.rows[0][1], "First");
        assert_eq!(table.report.dropped[0].reason, "duplicate stop_id \"101S\"");
        assert_eq!(table.report.dropped[0].line, 4);
    }

    #[test]
    fn test_missing_required_column_is_an_error() {
        let input = "trip_id,route_id\nT1,R1\n";
        assert!(clean_table("trips.txt", input.as_bytes()).is_err());
    }

    #[test]
    fn test_unknown_tables_keep_well_formed_rows() {
        let input = "shape_id,shape_pt_lat\nS1,40.0\nS1\n";
        let table = clean_table("shapes.txt", input.as_bytes()).unwrap().unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.report.dropped.len(), 1);
    }
}
