//! Transit data models, types, and time literals.

pub mod calendar;
pub mod time;
pub mod types;

// Re-exports for convenience
pub use calendar::{ServiceCalendar, WeekdayFlags};
pub use time::{format_gtfs_date, format_gtfs_time, parse_gtfs_date, parse_gtfs_time};
pub use types::{Result, Route, RouteType, Stop, StopTime, TransitError, Trip};
