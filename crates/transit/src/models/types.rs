//! Core data types and enums for transit data.

use geo::Point;
use std::sync::Arc;

use crate::identifiers::*;

// ============================================================================
// Enums
// ============================================================================

/// GTFS route types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum RouteType {
    Tram = 0,
    Subway = 1,
    Rail = 2,
    Bus = 3,
    Ferry = 4,
    CableTram = 5,
    AerialLift = 6,
    Funicular = 7,
}

impl RouteType {
    pub fn from_gtfs(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Tram),
            1 => Some(Self::Subway),
            2 => Some(Self::Rail),
            3 => Some(Self::Bus),
            4 => Some(Self::Ferry),
            5 => Some(Self::CableTram),
            6 => Some(Self::AerialLift),
            7 => Some(Self::Funicular),
            _ => None,
        }
    }

    pub fn to_gtfs(self) -> u16 {
        self as u16
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A boarding location
#[derive(Clone, Debug)]
pub struct Stop {
    pub id: StopIdentifier,
    pub name: Arc<str>,
    pub location: Point,
}

/// A transit route (e.g., "Red Line", "Route 66")
#[derive(Clone, Debug)]
pub struct Route {
    pub id: RouteIdentifier,
    pub short_name: Arc<str>,
    pub long_name: Arc<str>,
    pub route_type: Option<RouteType>,
}

/// A single vehicle run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trip {
    pub id: TripIdentifier,
    pub route_id: RouteIdentifier,
    pub service_id: ServiceIdentifier,
    pub shape_id: Option<ShapeIdentifier>,
}

/// A single stop event in a trip (arrival/departure at a stop)
///
/// Times are stored as seconds since midnight of the service day.
/// GTFS times can exceed 24 hours for trips past midnight
/// (e.g., 25:30:00 = 91800 seconds for 1:30am the next day).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopTime {
    pub trip_id: TripIdentifier,
    pub stop_id: StopIdentifier,
    pub stop_sequence: u32,
    pub arrival: u32,   // Seconds since midnight (service day start)
    pub departure: u32, // Seconds since midnight (service day start)
}

impl StopTime {
    pub fn new(
        trip_id: TripIdentifier,
        stop_id: StopIdentifier,
        stop_sequence: u32,
        arrival: u32,
        departure: u32,
    ) -> Self {
        Self {
            trip_id,
            stop_id,
            stop_sequence,
            arrival,
            departure,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Stop not found: {0}")]
    StopNotFound(StopIdentifier),

    #[error("Trip not found: {0}")]
    TripNotFound(TripIdentifier),

    #[error("Missing table: {0}")]
    MissingTable(&'static str),

    #[error("Malformed {table} row: {reason}")]
    MalformedRow { table: &'static str, reason: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, TransitError>;
