//! Bulk-load staging for spatial index tables.
//!
//! Rows are appended to `|`-delimited text files as `id|minlat|maxlat|minlon|maxlon`
//! with an optional parallel `id|payload` file, then imported into the index
//! and payload tables in one transaction.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

use super::sqlite_store::create_index_table;
use super::{check_table_name, Result};
use crate::types::Point;

const DELIMITER: u8 = b'|';

/// Appends staged rows for a later [`import_staging`]
pub struct StagingWriter {
    rows: csv::Writer<BufWriter<File>>,
    payloads: Option<csv::Writer<BufWriter<File>>>,
    scale: Option<f64>,
    count: usize,
}

impl StagingWriter {
    /// Creates the row file and, when `payload_path` is given, the payload file.
    ///
    /// With `precision` set, coordinates are written as fixed-point integers.
    pub fn create(rows_path: &Path, payload_path: Option<&Path>, precision: Option<u32>) -> Result<Self> {
        let rows = writer(rows_path)?;
        let payloads = payload_path.map(writer).transpose()?;
        Ok(Self {
            rows,
            payloads,
            scale: precision.map(|digits| 10f64.powi(digits as i32)),
            count: 0,
        })
    }

    pub fn append(&mut self, id: i64, point: Point, payload: Option<&str>) -> Result<()> {
        let (lat, lon) = match self.scale {
            Some(scale) => (
                ((point.lat * scale).round() as i64).to_string(),
                ((point.lon * scale).round() as i64).to_string(),
            ),
            None => (point.lat.to_string(), point.lon.to_string()),
        };
        let id = id.to_string();
        self.rows
            .write_record([id.as_str(), lat.as_str(), lat.as_str(), lon.as_str(), lon.as_str()])?;

        if let (Some(payloads), Some(payload)) = (self.payloads.as_mut(), payload) {
            payloads.write_record([id.as_str(), payload])?;
        }
        self.count += 1;
        Ok(())
    }

    /// Flushes both files and returns the number of staged rows
    pub fn finish(mut self) -> Result<usize> {
        self.rows.flush()?;
        if let Some(payloads) = self.payloads.as_mut() {
            payloads.flush()?;
        }
        debug!("staged {} rows", self.count);
        Ok(self.count)
    }
}

fn writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    let file = BufWriter::new(File::create(path)?);
    Ok(csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .from_writer(file))
}

fn reader(path: &Path) -> Result<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(true)
        .from_path(path)?)
}

/// Row counts of one import
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub rows: usize,
    pub payloads: usize,
    pub skipped: usize,
}

/// Imports staged files into `<table>` and `<table>_payload`.
///
/// Rows with the wrong field count or unparsable numbers are skipped; an
/// unreadable stream aborts the import and rolls the transaction back.
pub fn import_staging(
    conn: &mut Connection,
    table: &str,
    rows_path: &Path,
    payload_path: Option<&Path>,
    precision: Option<u32>,
) -> Result<ImportStats> {
    check_table_name(table)?;
    create_index_table(conn, table)?;

    let mut stats = ImportStats::default();
    let tx = conn.transaction()?;
    {
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {table} (id, minlat, maxlat, minlon, maxlon) VALUES (?1, ?2, ?3, ?4, ?5)"
        ))?;
        let mut rows = reader(rows_path)?;
        let mut record = csv::StringRecord::new();
        while rows.read_record(&mut record)? {
            let line = rows.position().line();
            match parse_row(&record, precision.is_some()) {
                Some(StagedRow::Fixed(id, bounds)) => {
                    insert.execute(params![id, bounds[0], bounds[1], bounds[2], bounds[3]])?;
                    stats.rows += 1;
                }
                Some(StagedRow::Float(id, bounds)) => {
                    insert.execute(params![id, bounds[0], bounds[1], bounds[2], bounds[3]])?;
                    stats.rows += 1;
                }
                None => {
                    warn!("skipping staged row at {}:{}", rows_path.display(), line);
                    stats.skipped += 1;
                }
            }
        }

        if let Some(payload_path) = payload_path {
            let mut insert = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {table}_payload (id, payload) VALUES (?1, ?2)"
            ))?;
            let mut payloads = reader(payload_path)?;
            while payloads.read_record(&mut record)? {
                let id = record.get(0).and_then(|s| s.trim().parse::<i64>().ok());
                match (id, record.get(1), record.len()) {
                    (Some(id), Some(payload), 2) => {
                        insert.execute(params![id, payload])?;
                        stats.payloads += 1;
                    }
                    _ => {
                        warn!(
                            "skipping staged payload at {}:{}",
                            payload_path.display(),
                            payloads.position().line()
                        );
                        stats.skipped += 1;
                    }
                }
            }
        }
    }
    tx.commit()?;

    info!(
        "imported {} rows and {} payloads into {} ({} skipped)",
        stats.rows, stats.payloads, table, stats.skipped
    );
    Ok(stats)
}

enum StagedRow {
    Fixed(i64, [i64; 4]),
    Float(i64, [f64; 4]),
}

fn parse_row(record: &csv::StringRecord, fixed: bool) -> Option<StagedRow> {
    if record.len() != 5 {
        return None;
    }
    let id = record.get(0)?.trim().parse::<i64>().ok()?;
    let field = |i: usize| record.get(i).map(str::trim);

    // Staged as id|minlat|minlat|minlon|minlon; the repeated value is the max bound
    if fixed {
        let mut bounds = [0i64; 4];
        for (slot, i) in bounds.iter_mut().zip(1..5) {
            *slot = field(i)?.parse().ok()?;
        }
        Some(StagedRow::Fixed(id, bounds))
    } else {
        let mut bounds = [0f64; 4];
        for (slot, i) in bounds.iter_mut().zip(1..5) {
            let value: f64 = field(i)?.parse().ok()?;
            if !value.is_finite() {
                return None;
            }
            *slot = value;
        }
        Some(StagedRow::Float(id, bounds))
    }
}
