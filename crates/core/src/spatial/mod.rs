//! Nearest-vertex lookup by expanding bounding boxes.
//!
//! A store answers "which stored boxes lie inside this box"; the index grows
//! the box around the query point until the store returns something, then
//! ranks candidates by `|Δlat| + |Δlon|`.

use tracing::debug;

use crate::types::Point;

pub mod memory_store;
pub mod sqlite_store;
pub mod staging;

pub use memory_store::MemoryBoxStore;
pub use sqlite_store::SqliteBoxStore;
pub use staging::{import_staging, ImportStats, StagingWriter};

#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    #[error("Missing spatial table: {0}")]
    MissingTable(String),

    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Staging file error: {0}")]
    Staging(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SpatialError>;

/// Search parameters shared by every store
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpatialConfig {
    /// Half-width of the first query box, in degrees
    pub initial_half_width: f64,
    /// Box doublings before giving up
    pub max_attempts: u32,
    /// Decimal digits of fixed-point coordinates; `None` stores floats
    pub precision: Option<u32>,
    /// Join the `<table>_payload` table into results
    pub with_payload: bool,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            initial_half_width: 0.0005,
            max_attempts: 100,
            precision: None,
            with_payload: false,
        }
    }
}

impl SpatialConfig {
    /// Multiplier applied to coordinates stored as fixed-point integers
    pub fn scale(&self) -> Option<f64> {
        self.precision.map(|digits| 10f64.powi(digits as i32))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Square box of `half_width` degrees around `center`.
    ///
    /// Latitude is clamped to the poles. Longitude may run past ±180 until the
    /// box is wide enough to cover the whole world.
    pub fn around(center: Point, half_width: f64) -> Self {
        let lon = wrap_longitude(center.lon);
        let (min_lon, max_lon) = if half_width >= 180.0 {
            (-180.0, 180.0)
        } else {
            (lon - half_width, lon + half_width)
        };
        Self {
            min_lat: (center.lat - half_width).max(-90.0),
            max_lat: (center.lat + half_width).min(90.0),
            min_lon,
            max_lon,
        }
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon < -180.0 || self.max_lon > 180.0
    }

    /// Splits a box running past ±180 into the parts east and west of the seam
    pub fn split_antimeridian(&self) -> Vec<BoundingBox> {
        if self.min_lon < -180.0 {
            vec![
                BoundingBox {
                    min_lon: self.min_lon + 360.0,
                    max_lon: 180.0,
                    ..*self
                },
                BoundingBox {
                    min_lon: -180.0,
                    ..*self
                },
            ]
        } else if self.max_lon > 180.0 {
            vec![
                BoundingBox {
                    max_lon: 180.0,
                    ..*self
                },
                BoundingBox {
                    min_lon: -180.0,
                    max_lon: self.max_lon - 360.0,
                    ..*self
                },
            ]
        } else {
            vec![*self]
        }
    }
}

fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// A stored row matched by a box query
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    /// Id as stored; networks translate it to a vertex id
    pub id: i64,
    pub point: Point,
    pub payload: Option<String>,
}

/// Range query over stored boxes.
///
/// Returns rows whose box lies entirely inside `bbox`. `bbox` never crosses
/// the antimeridian; the index splits such boxes before calling the store.
pub trait BoxStore: Send + Sync {
    fn query(&self, bbox: &BoundingBox) -> Result<Vec<Candidate>>;
}

pub(crate) fn check_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(SpatialError::InvalidTableName(table.to_string()))
    }
}

pub struct SpatialIndex {
    store: Box<dyn BoxStore>,
    config: SpatialConfig,
}

impl SpatialIndex {
    pub fn new(store: Box<dyn BoxStore>, config: SpatialConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SpatialConfig {
        &self.config
    }

    /// All candidates inside `bbox`, querying each side of the seam separately
    pub fn query_box(&self, bbox: &BoundingBox) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();
        for part in bbox.split_antimeridian() {
            candidates.extend(self.store.query(&part)?);
        }
        Ok(candidates)
    }

    /// Closest stored candidate, or `None` once the attempt budget is spent
    pub fn nearest(&self, point: Point) -> Result<Option<Candidate>> {
        if !point.is_set() {
            return Ok(None);
        }

        let mut half_width = self.config.initial_half_width;
        for attempt in 1..=self.config.max_attempts {
            let candidates = self.query_box(&BoundingBox::around(point, half_width))?;

            let mut best: Option<(f64, Candidate)> = None;
            for candidate in candidates {
                let rank = point.manhattan(&candidate.point);
                if best.as_ref().is_none_or(|(best_rank, _)| rank < *best_rank) {
                    best = Some((rank, candidate));
                }
            }
            if let Some((_, candidate)) = best {
                debug!("nearest to {} is {} after {} attempts", point, candidate.id, attempt);
                return Ok(Some(candidate));
            }

            half_width *= 2.0;
        }

        debug!(
            "nothing near {} within {} attempts",
            point, self.config.max_attempts
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn index_of(points: &[(i64, f64, f64)]) -> SpatialIndex {
        let mut store = MemoryBoxStore::new();
        for &(id, lat, lon) in points {
            store.insert(id, Point::new(lat, lon), None);
        }
        SpatialIndex::new(Box::new(store), SpatialConfig::default())
    }

    #[test]
    fn test_box_clamps_latitude() {
        let bbox = BoundingBox::around(Point::new(89.9, 10.0), 1.0);
        assert_relative_eq!(bbox.max_lat, 90.0);
        assert_relative_eq!(bbox.min_lat, 88.9);
    }

    #[test]
    fn test_wide_box_covers_world() {
        let bbox = BoundingBox::around(Point::new(0.0, 170.0), 200.0);
        assert_relative_eq!(bbox.min_lon, -180.0);
        assert_relative_eq!(bbox.max_lon, 180.0);
        assert!(!bbox.crosses_antimeridian());
    }

    #[test]
    fn test_split_east_of_seam() {
        let bbox = BoundingBox::around(Point::new(0.0, 179.5), 1.0);
        assert!(bbox.crosses_antimeridian());

        let parts = bbox.split_antimeridian();
        assert_eq!(parts.len(), 2);
        assert_relative_eq!(parts[0].min_lon, 178.5);
        assert_relative_eq!(parts[0].max_lon, 180.0);
        assert_relative_eq!(parts[1].min_lon, -180.0);
        assert_relative_eq!(parts[1].max_lon, -179.5);
    }

    #[test]
    fn test_split_west_of_seam() {
        let parts = BoundingBox::around(Point::new(0.0, -179.5), 1.0).split_antimeridian();
        assert_eq!(parts.len(), 2);
        assert_relative_eq!(parts[0].min_lon, 179.5);
        assert_relative_eq!(parts[0].max_lon, 180.0);
        assert_relative_eq!(parts[1].min_lon, -180.0);
        assert_relative_eq!(parts[1].max_lon, -178.5);
    }

    #[test]
    fn test_exact_hit_has_zero_distance() {
        let index = index_of(&[(1, 47.0, 8.0), (2, 47.001, 8.0)]);
        let query = Point::new(47.0, 8.0);

        let hit = index.nearest(query).unwrap().unwrap();
        assert_eq!(hit.id, 1);
        assert_relative_eq!(query.manhattan(&hit.point), 0.0);
    }

    #[test]
    fn test_box_grows_until_found() {
        let index = index_of(&[(5, 10.0, 10.0)]);
        let hit = index.nearest(Point::new(0.0, 0.0)).unwrap();
        assert_eq!(hit.map(|c| c.id), Some(5));
    }

    #[test]
    fn test_budget_exhausted_is_none() {
        let mut store = MemoryBoxStore::new();
        store.insert(1, Point::new(40.0, 40.0), None);
        let config = SpatialConfig {
            max_attempts: 3,
            ..SpatialConfig::default()
        };
        let index = SpatialIndex::new(Box::new(store), config);

        assert_eq!(index.nearest(Point::new(0.0, 0.0)).unwrap(), None);
        assert_eq!(index.nearest(Point::UNSET).unwrap(), None);
    }

    #[test]
    fn test_seam_query_sees_both_sides() {
        let index = index_of(&[(1, 0.0, 179.9995), (2, 0.0, -179.9996), (3, 0.0, 170.0)]);
        let bbox = BoundingBox::around(Point::new(0.0, 179.9998), 0.001);

        let mut ids: Vec<i64> = index.query_box(&bbox).unwrap().into_iter().map(|c| c.id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_nearest_ranks_across_seam() {
        // West-side vertex is 0.0007 away across the seam, east one 0.0008
        let index = index_of(&[(1, 0.0, 179.999), (2, 0.0, -179.9995)]);
        let hit = index.nearest(Point::new(0.0, 179.9998)).unwrap().unwrap();
        assert_eq!(hit.id, 2);
    }

    #[test]
    fn test_table_names() {
        assert!(check_table_name("vertex_index").is_ok());
        assert!(check_table_name("idx; DROP TABLE edges").is_err());
        assert!(check_table_name("1abc").is_err());
        assert!(check_table_name("").is_err());
    }
}
