//! # waypath-transit
//!
//! Schedule data for time-dependent routing.
//!
//! ## Features
//!
//! - **Service calendars**: weekday masks, date ranges and `calendar_dates` exceptions
//! - **Timetables**: immutable per-load stop, trip and hop tables with dense indices
//! - **Connection scanning**: earliest onward trip per neighbouring stop
//! - **Stores**: GTFS-shaped SQLite tables, plus feed import behind the `gtfs` feature
//!
//! ## Example
//!
//! ```
//! use waypath_transit::prelude::*;
//! use chrono::NaiveDate;
//! use geo::Point;
//!
//! let mut builder = TimetableBuilder::new();
//! builder
//!     .add_stop(Stop { id: "a".into(), name: "Alpha".into(), location: Point::new(8.0, 47.0) })
//!     .add_stop(Stop { id: "b".into(), name: "Beta".into(), location: Point::new(8.0, 47.1) })
//!     .add_calendar(
//!         ServiceCalendar::new(
//!             "daily".into(),
//!             NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
//!             NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
//!             WeekdayFlags::ALL,
//!         )
//!         .unwrap(),
//!     )
//!     .add_trip(Trip {
//!         id: "t1".into(),
//!         route_id: "r1".into(),
//!         service_id: "daily".into(),
//!         shape_id: None,
//!     })
//!     .add_stop_time(StopTime::new("t1".into(), "a".into(), 1, 8 * 3600, 8 * 3600))
//!     .add_stop_time(StopTime::new("t1".into(), "b".into(), 2, 8 * 3600 + 600, 8 * 3600 + 600));
//! let timetable = builder.build();
//!
//! let at = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(7, 55, 0).unwrap();
//! let connection = ConnectionScanner::new(&timetable).earliest_connection(0, 1, at).unwrap();
//! assert_eq!(connection.cost_from(at), 15 * 60);
//! ```

pub mod identifiers;
pub mod models;
pub mod scanner;
pub mod spatial;
pub mod store;
pub mod timetable;

#[cfg(feature = "gtfs")]
pub mod gtfs;

// Re-exports for convenience
pub mod prelude {
    pub use crate::identifiers::*;
    pub use crate::models::{calendar::*, types::*};
    pub use crate::scanner::{Connection, ConnectionScanner};
    pub use crate::timetable::{Hop, LoadStats, StopLinks, Timetable, TimetableBuilder};
}

pub use prelude::*;
