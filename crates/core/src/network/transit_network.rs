//! Time-dependent network over a transit timetable.
//!
//! Vertices are stops. Edges are produced per expansion by the connection
//! scanner: the cost of an edge is the wait plus ride time from the instant
//! the traveller reaches the stop, so accumulated cost is seconds after the
//! query departure.

use std::path::Path;

use chrono::Duration;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use super::{EdgeCost, NetworkError, NetworkModel, QueryContext, Result};
use crate::spatial::{MemoryBoxStore, SpatialConfig, SpatialIndex};
use crate::types::{NearestPointResult, Point, VertexId};
use waypath_transit::store::load_timetable;
use waypath_transit::{ConnectionScanner, Timetable};

struct Loaded {
    timetable: Timetable,
    spatial: SpatialIndex,
}

pub struct TransitNetwork {
    name: String,
    spatial_config: SpatialConfig,
    loaded: Option<Loaded>,
}

impl TransitNetwork {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spatial_config: SpatialConfig::default(),
            loaded: None,
        }
    }

    pub fn with_spatial_config(mut self, config: SpatialConfig) -> Self {
        self.spatial_config = config;
        self
    }

    /// Loads the timetable from the GTFS tables of an open connection
    pub fn parse_connection(&mut self, conn: &Connection) -> Result<()> {
        self.unload();
        let timetable = load_timetable(conn)?;
        self.load_timetable(timetable);
        Ok(())
    }

    /// Adopts an already built timetable
    pub fn load_timetable(&mut self, timetable: Timetable) {
        self.unload();

        let store = MemoryBoxStore::from_points(
            timetable
                .stops()
                .iter()
                .enumerate()
                .map(|(idx, stop)| (idx as i64, Point::from(stop.location))),
        );
        let spatial = SpatialIndex::new(Box::new(store), self.spatial_config.clone());

        let stats = timetable.stats();
        info!(
            "loaded transit network {} with {} stops and {} trips ({} rows skipped)",
            self.name,
            timetable.num_stops(),
            timetable.num_trips(),
            stats.total()
        );
        self.loaded = Some(Loaded { timetable, spatial });
    }

    pub fn timetable(&self) -> Option<&Timetable> {
        self.loaded.as_ref().map(|l| &l.timetable)
    }
}

impl NetworkModel for TransitNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&mut self, source: &Path) -> Result<()> {
        let conn = Connection::open_with_flags(source, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        self.parse_connection(&conn)
    }

    fn unload(&mut self) {
        if self.loaded.take().is_some() {
            debug!("unloaded transit network {}", self.name);
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    fn num_vertices(&self) -> usize {
        self.loaded.as_ref().map_or(0, |l| l.timetable.num_stops())
    }

    fn point(&self, vertex: VertexId) -> Option<Point> {
        let stop = self.loaded.as_ref()?.timetable.stop(vertex)?;
        Some(Point::from(stop.location))
    }

    /// Without a departure instant there are no edges; the metric is ignored
    /// since costs are always seconds.
    fn expand(&self, vertex: VertexId, cost: f64, ctx: &QueryContext, out: &mut Vec<EdgeCost>) {
        let (Some(loaded), Some(departure)) = (self.loaded.as_ref(), ctx.departure) else {
            return;
        };
        let at = departure + Duration::seconds(cost as i64);

        let scanner = ConnectionScanner::new(&loaded.timetable);
        out.extend(scanner.earliest_connections(vertex, at).map(|connection| EdgeCost {
            target: connection.neighbor,
            cost: connection.cost_from(at) as f64,
            original_id: i64::from(connection.trip),
        }));
    }

    /// With `with_payload` set, the payload is the stop name
    fn nearest(&self, point: Point) -> Result<Option<NearestPointResult>> {
        let loaded = self
            .loaded
            .as_ref()
            .ok_or_else(|| NetworkError::NotLoaded(self.name.clone()))?;

        let Some(candidate) = loaded.spatial.nearest(point)? else {
            return Ok(None);
        };
        let vertex = candidate.id as VertexId;
        let Some(stop) = loaded.timetable.stop(vertex) else {
            warn!("spatial index of {} returned unknown stop {}", self.name, candidate.id);
            return Ok(None);
        };
        Ok(Some(NearestPointResult::at_vertex(
            point,
            vertex,
            Point::from(stop.location),
            self.spatial_config.with_payload.then(|| stop.name.to_string()),
        )))
    }
}
