//! Box store over an indexed SQLite table.

use std::sync::Mutex;

use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::{debug, error};

use super::{check_table_name, BoundingBox, BoxStore, Candidate, Result, SpatialConfig, SpatialError};
use crate::types::Point;

pub(crate) fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Creates `<table>` and `<table>_payload` if they do not exist yet
pub fn create_index_table(conn: &Connection, table: &str) -> Result<()> {
    check_table_name(table)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER NOT NULL,
            minlat NUMERIC NOT NULL,
            maxlat NUMERIC NOT NULL,
            minlon NUMERIC NOT NULL,
            maxlon NUMERIC NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {table}_bounds ON {table} (minlat, maxlat, minlon, maxlon);
        CREATE TABLE IF NOT EXISTS {table}_payload (
            id INTEGER PRIMARY KEY,
            payload TEXT
        );"
    ))?;
    Ok(())
}

/// Range queries against `<table>(id, minlat, maxlat, minlon, maxlon)`.
///
/// The statement is prepared once and cached on the connection; the mutex
/// serializes bind/step cycles so one store can serve several threads.
pub struct SqliteBoxStore {
    conn: Mutex<Connection>,
    sql: String,
    scale: Option<f64>,
}

impl SqliteBoxStore {
    pub fn new(conn: Connection, table: &str, config: &SpatialConfig) -> Result<Self> {
        check_table_name(table)?;
        if !table_exists(&conn, table)? {
            error!("spatial table {} does not exist", table);
            return Err(SpatialError::MissingTable(table.to_string()));
        }

        let sql = if config.with_payload {
            let payload = format!("{table}_payload");
            if !table_exists(&conn, &payload)? {
                error!("payload table {} does not exist", payload);
                return Err(SpatialError::MissingTable(payload));
            }
            format!(
                "SELECT t.id, t.minlat, t.minlon, p.payload FROM {table} t
                 LEFT JOIN {payload} p ON p.id = t.id
                 WHERE t.minlat >= ?1 AND t.maxlat <= ?2 AND t.minlon >= ?3 AND t.maxlon <= ?4"
            )
        } else {
            format!(
                "SELECT id, minlat, minlon, NULL FROM {table}
                 WHERE minlat >= ?1 AND maxlat <= ?2 AND minlon >= ?3 AND maxlon <= ?4"
            )
        };

        // Fails early on a table with the wrong columns
        conn.prepare_cached(&sql)?;
        debug!("opened spatial table {} (precision {:?})", table, config.precision);

        Ok(Self {
            conn: Mutex::new(conn),
            sql,
            scale: config.scale(),
        })
    }

    /// Opens the store on a database file
    pub fn open(path: impl AsRef<std::path::Path>, table: &str, config: &SpatialConfig) -> Result<Self> {
        Self::new(Connection::open(path)?, table, config)
    }
}

fn decode(row: &Row<'_>, scale: Option<f64>) -> rusqlite::Result<Candidate> {
    let id: i64 = row.get(0)?;
    let mut lat: f64 = row.get(1)?;
    let mut lon: f64 = row.get(2)?;
    if let Some(scale) = scale {
        lat /= scale;
        lon /= scale;
    }
    Ok(Candidate {
        id,
        point: Point::new(lat, lon),
        payload: row.get(3)?,
    })
}

impl BoxStore for SqliteBoxStore {
    fn query(&self, bbox: &BoundingBox) -> Result<Vec<Candidate>> {
        let conn = self.conn.lock().map_err(|_| SpatialError::Poisoned)?;
        let mut stmt = conn.prepare_cached(&self.sql)?;

        let candidates = match self.scale {
            // Round outward so rows on the box edge are not lost
            Some(scale) => {
                let bounds = [
                    (bbox.min_lat * scale).floor() as i64,
                    (bbox.max_lat * scale).ceil() as i64,
                    (bbox.min_lon * scale).floor() as i64,
                    (bbox.max_lon * scale).ceil() as i64,
                ];
                stmt.query_map(params_from_iter(bounds), |row| decode(row, Some(scale)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => stmt
                .query_map(
                    params![bbox.min_lat, bbox.max_lat, bbox.min_lon, bbox.max_lon],
                    |row| decode(row, None),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(candidates)
    }
}
