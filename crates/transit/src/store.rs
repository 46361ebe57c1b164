//! GTFS-shaped tables in a SQLite store.
//!
//! `stops`, `trips`, `stop_times` and `calendar` are required; `routes` and
//! `calendar_dates` are read when present. Rows that cannot be decoded are
//! logged and skipped, a missing required table fails the whole load.

use chrono::NaiveDate;
use geo::Point;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, Row};
use tracing::{debug, error, info, warn};

use crate::identifiers::*;
use crate::models::{
    format_gtfs_date, format_gtfs_time, parse_gtfs_date, parse_gtfs_time, Result, Route, RouteType,
    ServiceCalendar, Stop, StopTime, TransitError, Trip, WeekdayFlags,
};
use crate::timetable::{Timetable, TimetableBuilder};

const REQUIRED_TABLES: [&str; 4] = ["stops", "trips", "stop_times", "calendar"];

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agency (
    agency_id TEXT PRIMARY KEY,
    agency_name TEXT,
    agency_timezone TEXT
);
CREATE TABLE IF NOT EXISTS stops (
    stop_id TEXT PRIMARY KEY,
    stop_name TEXT,
    stop_lat REAL,
    stop_lon REAL
);
CREATE TABLE IF NOT EXISTS routes (
    route_id TEXT PRIMARY KEY,
    route_short_name TEXT,
    route_long_name TEXT,
    route_type INTEGER
);
CREATE TABLE IF NOT EXISTS trips (
    trip_id TEXT PRIMARY KEY,
    route_id TEXT,
    service_id TEXT,
    shape_id TEXT
);
CREATE TABLE IF NOT EXISTS stop_times (
    trip_id TEXT,
    stop_id TEXT,
    stop_sequence INTEGER,
    arrival_time TEXT,
    departure_time TEXT
);
CREATE TABLE IF NOT EXISTS calendar (
    service_id TEXT PRIMARY KEY,
    monday INTEGER, tuesday INTEGER, wednesday INTEGER, thursday INTEGER,
    friday INTEGER, saturday INTEGER, sunday INTEGER,
    start_date TEXT,
    end_date TEXT
);
CREATE TABLE IF NOT EXISTS calendar_dates (
    service_id TEXT,
    date TEXT,
    exception_type INTEGER
);
CREATE TABLE IF NOT EXISTS shapes (
    shape_id TEXT,
    shape_pt_lat REAL,
    shape_pt_lon REAL,
    shape_pt_sequence INTEGER
);
";

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Creates every GTFS table that does not exist yet
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Reads a complete timetable from the store
pub fn load_timetable(conn: &Connection) -> Result<Timetable> {
    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            error!("transit store is missing required table {}", table);
            return Err(TransitError::MissingTable(table));
        }
    }

    let mut builder = TimetableBuilder::new();

    let (stops, skipped) = read_rows(
        conn,
        "stops",
        "SELECT stop_id, stop_name, stop_lat, stop_lon FROM stops ORDER BY rowid",
        stop_from_row,
    )?;
    for stop in stops {
        builder.add_stop(stop);
    }
    for _ in 0..skipped {
        builder.note_skipped_stop();
    }

    if table_exists(conn, "routes")? {
        let (routes, _) = read_rows(
            conn,
            "routes",
            "SELECT route_id, route_short_name, route_long_name, route_type FROM routes",
            route_from_row,
        )?;
        for route in routes {
            builder.add_route(route);
        }
    }

    let (trips, skipped) = read_rows(
        conn,
        "trips",
        "SELECT trip_id, route_id, service_id, shape_id FROM trips ORDER BY rowid",
        trip_from_row,
    )?;
    for trip in trips {
        builder.add_trip(trip);
    }
    for _ in 0..skipped {
        builder.note_skipped_trip();
    }

    let (calendars, skipped) = read_rows(
        conn,
        "calendar",
        "SELECT service_id, monday, tuesday, wednesday, thursday, friday, saturday, sunday, start_date, end_date FROM calendar",
        calendar_from_row,
    )?;
    for calendar in calendars {
        builder.add_calendar(calendar);
    }
    for _ in 0..skipped {
        builder.note_skipped_calendar();
    }

    if table_exists(conn, "calendar_dates")? {
        let (exceptions, _) = read_rows(
            conn,
            "calendar_dates",
            "SELECT service_id, date, exception_type FROM calendar_dates",
            exception_from_row,
        )?;
        for (service, date, added) in exceptions {
            builder.add_exception(service, date, added);
        }
    }

    let (stop_times, skipped) = read_rows(
        conn,
        "stop_times",
        "SELECT trip_id, stop_id, stop_sequence, arrival_time, departure_time FROM stop_times",
        stop_time_from_row,
    )?;
    for stop_time in stop_times {
        builder.add_stop_time(stop_time);
    }
    for _ in 0..skipped {
        builder.note_skipped_stop_time();
    }

    let timetable = builder.build();
    info!(
        "loaded timetable with {} stops and {} trips",
        timetable.num_stops(),
        timetable.num_trips()
    );
    Ok(timetable)
}

/// Writes a timetable into the GTFS tables inside one transaction
pub fn write_timetable(conn: &mut Connection, timetable: &Timetable) -> Result<()> {
    create_schema(conn)?;
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare("INSERT INTO stops (stop_id, stop_name, stop_lat, stop_lon) VALUES (?1, ?2, ?3, ?4)")?;
        for stop in timetable.stops() {
            stmt.execute(params![stop.id.as_str(), &*stop.name, stop.location.y(), stop.location.x()])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO routes (route_id, route_short_name, route_long_name, route_type) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for route in timetable.routes() {
            stmt.execute(params![
                route.id.as_str(),
                &*route.short_name,
                &*route.long_name,
                route.route_type.map(RouteType::to_gtfs),
            ])?;
        }

        let mut trip_stmt =
            tx.prepare("INSERT INTO trips (trip_id, route_id, service_id, shape_id) VALUES (?1, ?2, ?3, ?4)")?;
        let mut time_stmt = tx.prepare(
            "INSERT INTO stop_times (trip_id, stop_id, stop_sequence, arrival_time, departure_time) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (idx, trip) in timetable.trips().iter().enumerate() {
            trip_stmt.execute(params![
                trip.id.as_str(),
                trip.route_id.as_str(),
                trip.service_id.as_str(),
                trip.shape_id.as_ref().map(|s| s.as_str()),
            ])?;
            for st in timetable.stop_times(idx as TripIndex) {
                time_stmt.execute(params![
                    st.trip_id.as_str(),
                    st.stop_id.as_str(),
                    st.stop_sequence,
                    format_gtfs_time(st.arrival),
                    format_gtfs_time(st.departure),
                ])?;
            }
        }

        let mut cal_stmt = tx.prepare(
            "INSERT INTO calendar (service_id, monday, tuesday, wednesday, thursday, friday, saturday, sunday, start_date, end_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        let mut date_stmt =
            tx.prepare("INSERT INTO calendar_dates (service_id, date, exception_type) VALUES (?1, ?2, ?3)")?;
        for calendar in timetable.calendars() {
            let bits = calendar.weekdays().bits();
            let day = |n: u8| i64::from((bits >> n) & 1);
            cal_stmt.execute(params![
                calendar.service_id().as_str(),
                day(0),
                day(1),
                day(2),
                day(3),
                day(4),
                day(5),
                day(6),
                format_gtfs_date(calendar.start_date()),
                format_gtfs_date(calendar.end_date()),
            ])?;
            for date in calendar.added_dates() {
                date_stmt.execute(params![calendar.service_id().as_str(), format_gtfs_date(*date), 1])?;
            }
            for date in calendar.removed_dates() {
                date_stmt.execute(params![calendar.service_id().as_str(), format_gtfs_date(*date), 2])?;
            }
        }
    }
    tx.commit()?;
    debug!("wrote {} stops and {} trips to store", timetable.num_stops(), timetable.num_trips());
    Ok(())
}

/// Runs `sql`, decoding each row with `decode`.
///
/// Rows that fail to decode are logged and counted; errors from the
/// statement itself abort the read.
fn read_rows<T>(
    conn: &Connection,
    table: &'static str,
    sql: &str,
    decode: fn(&Row<'_>) -> Result<T>,
) -> Result<(Vec<T>, usize)> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| Ok(decode(row)))?;

    let mut values = Vec::new();
    let mut bad = 0usize;
    for row in rows {
        match row? {
            Ok(value) => values.push(value),
            Err(e) => {
                warn!("skipping {} row: {}", table, e);
                bad += 1;
            }
        }
    }
    if bad > 0 {
        info!("skipped {} malformed rows in {}", bad, table);
    }
    Ok((values, bad))
}

fn malformed(table: &'static str, reason: impl Into<String>) -> TransitError {
    TransitError::MalformedRow {
        table,
        reason: reason.into(),
    }
}

fn text(row: &Row<'_>, idx: usize, table: &'static str) -> Result<Option<String>> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        ValueRef::Text(t) => Ok(Some(String::from_utf8_lossy(t).into_owned())),
        ValueRef::Integer(i) => Ok(Some(i.to_string())),
        other => Err(malformed(table, format!("column {} has type {:?}", idx, other.data_type()))),
    }
}

fn required_text(row: &Row<'_>, idx: usize, table: &'static str) -> Result<String> {
    text(row, idx, table)?
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed(table, format!("column {} is empty", idx)))
}

/// Time column as seconds; accepts `HH:MM:SS` text or plain integers
fn time(row: &Row<'_>, idx: usize) -> Result<Option<u32>> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(None),
        ValueRef::Integer(i) => u32::try_from(i)
            .map(Some)
            .map_err(|_| malformed("stop_times", format!("negative time {}", i))),
        ValueRef::Text(t) if t.is_empty() => Ok(None),
        ValueRef::Text(t) => {
            let s = String::from_utf8_lossy(t);
            parse_gtfs_time(&s)
                .map(Some)
                .ok_or_else(|| malformed("stop_times", format!("bad time '{}'", s)))
        }
        other => Err(malformed("stop_times", format!("time has type {:?}", other.data_type()))),
    }
}

/// Date column; accepts `YYYYMMDD` as text or integer
fn date(row: &Row<'_>, idx: usize, table: &'static str) -> Result<NaiveDate> {
    let raw = required_text(row, idx, table)?;
    parse_gtfs_date(&raw).ok_or_else(|| malformed(table, format!("bad date '{}'", raw)))
}

fn stop_from_row(row: &Row<'_>) -> Result<Stop> {
    let id = required_text(row, 0, "stops")?;
    let name = text(row, 1, "stops")?.unwrap_or_default();
    let lat: Option<f64> = row.get(2)?;
    let lon: Option<f64> = row.get(3)?;
    let (Some(lat), Some(lon)) = (lat, lon) else {
        return Err(malformed("stops", format!("stop {} has no location", id)));
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(malformed("stops", format!("stop {} is outside the globe", id)));
    }
    Ok(Stop {
        id: StopIdentifier::new(id),
        name: name.into(),
        location: Point::new(lon, lat),
    })
}

fn route_from_row(row: &Row<'_>) -> Result<Route> {
    let route_type: Option<i64> = row.get(3)?;
    Ok(Route {
        id: RouteIdentifier::new(required_text(row, 0, "routes")?),
        short_name: text(row, 1, "routes")?.unwrap_or_default().into(),
        long_name: text(row, 2, "routes")?.unwrap_or_default().into(),
        route_type: route_type
            .and_then(|t| u16::try_from(t).ok())
            .and_then(RouteType::from_gtfs),
    })
}

fn trip_from_row(row: &Row<'_>) -> Result<Trip> {
    Ok(Trip {
        id: TripIdentifier::new(required_text(row, 0, "trips")?),
        route_id: RouteIdentifier::new(text(row, 1, "trips")?.unwrap_or_default()),
        service_id: ServiceIdentifier::new(required_text(row, 2, "trips")?),
        shape_id: text(row, 3, "trips")?
            .filter(|s| !s.is_empty())
            .map(ShapeIdentifier::new),
    })
}

fn stop_time_from_row(row: &Row<'_>) -> Result<StopTime> {
    let trip_id = required_text(row, 0, "stop_times")?;
    let stop_id = required_text(row, 1, "stop_times")?;
    let sequence: i64 = row.get(2)?;
    let sequence = u32::try_from(sequence)
        .map_err(|_| malformed("stop_times", format!("bad stop_sequence {}", sequence)))?;

    // A missing time falls back to the other one at the same stop
    let (arrival, departure) = match (time(row, 3)?, time(row, 4)?) {
        (Some(a), Some(d)) => (a, d),
        (Some(a), None) => (a, a),
        (None, Some(d)) => (d, d),
        (None, None) => {
            return Err(malformed(
                "stop_times",
                format!("{}@{} has neither arrival nor departure", trip_id, stop_id),
            ))
        }
    };

    Ok(StopTime::new(
        TripIdentifier::new(trip_id),
        StopIdentifier::new(stop_id),
        sequence,
        arrival,
        departure,
    ))
}

fn calendar_from_row(row: &Row<'_>) -> Result<ServiceCalendar> {
    let service_id = ServiceIdentifier::new(required_text(row, 0, "calendar")?);
    let mut mask = 0u8;
    for day in 0..7 {
        let active: Option<i64> = row.get(1 + day)?;
        if active.unwrap_or(0) != 0 {
            mask |= 1 << day;
        }
    }
    let start = date(row, 8, "calendar")?;
    let end = date(row, 9, "calendar")?;
    ServiceCalendar::new(service_id, start, end, WeekdayFlags::from_mask(mask))
}

fn exception_from_row(row: &Row<'_>) -> Result<(ServiceIdentifier, NaiveDate, bool)> {
    let service_id = ServiceIdentifier::new(required_text(row, 0, "calendar_dates")?);
    let date = date(row, 1, "calendar_dates")?;
    let kind: i64 = row.get(2)?;
    match kind {
        1 => Ok((service_id, date, true)),
        2 => Ok((service_id, date, false)),
        other => Err(malformed("calendar_dates", format!("unknown exception_type {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ConnectionScanner;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        conn.execute_batch(
            "
            INSERT INTO stops VALUES ('a', 'Alpha', 47.0, 8.0);
            INSERT INTO stops VALUES ('b', 'Beta', 47.1, 8.0);
            INSERT INTO stops VALUES ('nowhere', 'Ghost', NULL, NULL);
            INSERT INTO routes VALUES ('r1', '1', 'Line One', 3);
            INSERT INTO trips VALUES ('t1', 'r1', 'wk', NULL);
            INSERT INTO stop_times VALUES ('t1', 'a', 1, '08:00:00', '08:00:00');
            INSERT INTO stop_times VALUES ('t1', 'b', 2, '08:10:00', '');
            INSERT INTO stop_times VALUES ('t1', 'b', 3, 'later', 'later');
            INSERT INTO calendar VALUES ('wk', 1, 1, 1, 1, 1, 0, 0, '20240101', '20241231');
            INSERT INTO calendar VALUES ('bad', 1, 1, 1, 1, 1, 0, 0, '20241231', '20240101');
            INSERT INTO calendar_dates VALUES ('wk', '20240309', 1);
            ",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_load_skips_malformed_rows() {
        let conn = seeded();
        let timetable = load_timetable(&conn).unwrap();

        assert_eq!(timetable.num_stops(), 2);
        assert_eq!(timetable.num_trips(), 1);
        assert_eq!(timetable.stop_times(0).len(), 2);
        assert_eq!(timetable.stop_times(0)[1].departure, 8 * 3600 + 600);

        let stats = timetable.stats();
        assert_eq!(stats.skipped_stops, 1);
        assert_eq!(stats.skipped_stop_times, 1);
        assert_eq!(stats.skipped_calendars, 1);

        let route = timetable.route(&RouteIdentifier::new("r1")).unwrap();
        assert_eq!(route.route_type, Some(RouteType::Bus));
    }

    #[test]
    fn test_overflowing_time_is_skipped() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        conn.execute_batch(
            "
            INSERT INTO stops VALUES ('a', 'Alpha', 47.0, 8.0);
            INSERT INTO trips VALUES ('t1', 'r1', 'wk', NULL);
            INSERT INTO stop_times VALUES ('t1', 'a', 1, '1200000:00:00', '1200000:00:00');
            INSERT INTO calendar VALUES ('wk', 1, 1, 1, 1, 1, 0, 0, '20240101', '20241231');
            ",
        )
        .unwrap();

        let timetable = load_timetable(&conn).unwrap();
        assert_eq!(timetable.stats().skipped_stop_times, 1);
        assert!(timetable.stop_times(0).is_empty());
    }

    #[test]
    fn test_calendar_dates_are_applied() {
        let conn = seeded();
        let timetable = load_timetable(&conn).unwrap();
        let calendar = timetable.calendar(&ServiceIdentifier::new("wk")).unwrap();

        // Saturday added through calendar_dates
        assert!(calendar.contains(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()));
        assert!(!calendar.contains(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()));
    }

    #[test]
    fn test_missing_table_fails_fast() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE stops (stop_id TEXT, stop_name TEXT, stop_lat REAL, stop_lon REAL);")
            .unwrap();

        let result = load_timetable(&conn);
        assert!(matches!(result, Err(TransitError::MissingTable("trips"))));
    }

    #[test]
    fn test_written_timetable_loads_back() {
        let source = load_timetable(&seeded()).unwrap();

        let mut copy = Connection::open_in_memory().unwrap();
        write_timetable(&mut copy, &source).unwrap();
        let reloaded = load_timetable(&copy).unwrap();

        assert_eq!(reloaded.num_stops(), source.num_stops());
        assert_eq!(reloaded.stop_times(0), source.stop_times(0));

        let at = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(7, 0, 0).unwrap();
        let scanner = ConnectionScanner::new(&reloaded);
        let connection = scanner.earliest_connection(0, 1, at).unwrap();
        assert_eq!(connection.cost_from(at), 70 * 60);
    }
}
