//! Value types shared by networks, the engine and the router.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;

/// Dense, zero-based vertex id within one loaded network
pub type VertexId = u32;

/// Latitude/longitude in degrees.
///
/// `361` in either coordinate marks the point as unset.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub const UNSET_COORD: f64 = 361.0;

    pub const UNSET: Point = Point {
        lat: Self::UNSET_COORD,
        lon: Self::UNSET_COORD,
    };

    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_set(&self) -> bool {
        self.lat != Self::UNSET_COORD && self.lon != Self::UNSET_COORD
    }

    /// `|Δlat| + |Δlon|` with the longitude delta taken across the shorter side of the seam
    pub fn manhattan(&self, other: &Point) -> f64 {
        let dlat = (self.lat - other.lat).abs();
        let dlon = (self.lon - other.lon).abs() % 360.0;
        dlat + dlon.min(360.0 - dlon)
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::UNSET
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.7}, {:.7})", self.lat, self.lon)
    }
}

impl From<Point> for geo::Point {
    fn from(p: Point) -> Self {
        geo::Point::new(p.lon, p.lat)
    }
}

impl From<geo::Point> for Point {
    fn from(p: geo::Point) -> Self {
        Point::new(p.y(), p.x())
    }
}

/// Independent edge attribute bits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeFlags(u8);

impl EdgeFlags {
    pub const GEOMETRY: Self = Self(1 << 0);
    pub const ONE_WAY: Self = Self(1 << 1);
    pub const CREATED: Self = Self(1 << 2);
    pub const TURN_RESTRICTED: Self = Self(1 << 3);
    pub const FINAL: Self = Self(1 << 4);

    const ALL_BITS: u8 = 0x1f;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Keeps only the known bits
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    /// `None` if any bit outside the known flags is set
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::ALL_BITS == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for EdgeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Cost dimension of a search
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Metric {
    #[default]
    Distance,
    Time,
}

/// Directed edge of a static network
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    pub target: VertexId,
    pub via: Option<VertexId>,
    pub distance: f64,
    pub time: f64,
    pub flags: EdgeFlags,
    /// Edge id in the source data
    pub original_id: i64,
}

impl Edge {
    pub fn cost(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Distance => self.distance,
            Metric::Time => self.time,
        }
    }
}

/// A query coordinate snapped onto a network.
///
/// `source` and `destination` are the anchors of the element the point was
/// snapped onto; a snap onto a vertex has both anchors equal to `target`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NearestPointResult {
    pub query: Point,
    pub source: VertexId,
    pub destination: VertexId,
    pub target: VertexId,
    pub point: Point,
    /// Great-circle distance from `query` to `point`, for reporting only
    pub distance_m: f64,
    pub payload: Option<String>,
}

impl NearestPointResult {
    pub fn at_vertex(query: Point, vertex: VertexId, point: Point, payload: Option<String>) -> Self {
        let distance_m = waypath_transit::spatial::haversine_distance(query.into(), point.into());
        Self {
            query,
            source: vertex,
            destination: vertex,
            target: vertex,
            point,
            distance_m,
            payload,
        }
    }

    pub fn is_end_point(&self) -> bool {
        self.source == self.destination
    }
}

/// Outcome of a routing or local search. An empty path means no route.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SearchResult {
    pub path: Vec<VertexId>,
    pub cost: f64,
    pub edge_ids: Vec<i64>,
    pub source: Option<NearestPointResult>,
    pub destination: Option<NearestPointResult>,
    /// Number of vertices settled by the search
    pub search_space: usize,
    /// Reached vertex -> cost, filled by local searches
    pub reached: HashMap<VertexId, f64>,
}

impl SearchResult {
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        !self.path.is_empty()
    }
}

/// Per-query parameters
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteQuery {
    pub metric: Metric,
    /// Departure instant; required by time-dependent networks
    pub departure: Option<NaiveDateTime>,
    /// Vertices costlier than this are not expanded
    pub cost_limit: Option<f64>,
}

impl RouteQuery {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            ..Self::default()
        }
    }

    pub fn departing_at(mut self, departure: NaiveDateTime) -> Self {
        self.departure = Some(departure);
        self
    }

    pub fn with_cost_limit(mut self, limit: f64) -> Self {
        self.cost_limit = Some(limit);
        self
    }
}
