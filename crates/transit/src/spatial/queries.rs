//! Great-circle distances for reporting.
//!
//! Ranking uses cheap degree deltas; these are for values shown to callers.

use geo::{HaversineDistance, Point};

/// Haversine distance between two points in meters
pub fn haversine_distance(p1: Point, p2: Point) -> f64 {
    p1.haversine_distance(&p2)
}

/// Meters to degrees of latitude (for sizing search boxes)
pub fn meters_to_degrees_approx(meters: f64) -> f64 {
    meters / 111_320.0
}
