//! Network with fixed edge costs, loaded from `vertices`/`edges` tables.

use std::path::Path;

use rusqlite::{Connection, OpenFlags, Row};
use tracing::{debug, error, info, warn};

use super::{EdgeCost, NetworkError, NetworkModel, QueryContext, Result};
use crate::spatial::sqlite_store::table_exists;
use crate::spatial::{MemoryBoxStore, SpatialConfig, SpatialIndex, SqliteBoxStore};
use crate::types::{Edge, EdgeFlags, NearestPointResult, Point, VertexId};
use waypath_transit::identifiers::IdTable;

/// Spatial table looked up when none is configured
pub const DEFAULT_INDEX_TABLE: &str = "vertex_index";

struct Graph {
    /// Source vertex id -> dense vertex id
    ids: IdTable<i64>,
    points: Vec<Point>,
    /// CSR offsets into `edges`, one past the last vertex
    offsets: Vec<usize>,
    edges: Vec<Edge>,
    spatial: SpatialIndex,
}

pub struct StaticNetwork {
    name: String,
    index_table: String,
    spatial_config: SpatialConfig,
    graph: Option<Graph>,
}

impl StaticNetwork {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index_table: DEFAULT_INDEX_TABLE.to_string(),
            spatial_config: SpatialConfig::default(),
            graph: None,
        }
    }

    pub fn with_index_table(mut self, table: impl Into<String>) -> Self {
        self.index_table = table.into();
        self
    }

    pub fn with_spatial_config(mut self, config: SpatialConfig) -> Self {
        self.spatial_config = config;
        self
    }

    /// Loads from an open connection, which the spatial store may keep
    pub fn parse_connection(&mut self, conn: Connection) -> Result<()> {
        self.unload();

        for table in ["vertices", "edges"] {
            if !table_exists(&conn, table)? {
                error!("network {} is missing table {}", self.name, table);
                return Err(NetworkError::MissingTable(table));
            }
        }

        let (ids, points) = load_vertices(&conn)?;
        let (offsets, edges) = load_edges(&conn, &ids)?;

        let spatial = if table_exists(&conn, &self.index_table)? {
            let store = SqliteBoxStore::new(conn, &self.index_table, &self.spatial_config)?;
            SpatialIndex::new(Box::new(store), self.spatial_config.clone())
        } else {
            debug!("network {} has no {} table, indexing vertices in memory", self.name, self.index_table);
            let store = MemoryBoxStore::from_points(ids.keys().iter().copied().zip(points.iter().copied()));
            SpatialIndex::new(Box::new(store), self.spatial_config.clone())
        };

        info!(
            "loaded network {} with {} vertices and {} edges",
            self.name,
            points.len(),
            edges.len()
        );
        self.graph = Some(Graph {
            ids,
            points,
            offsets,
            edges,
            spatial,
        });
        Ok(())
    }

    /// Dense id of a vertex from the source data
    pub fn vertex_id(&self, source_id: i64) -> Option<VertexId> {
        self.graph.as_ref()?.ids.get(&source_id)
    }

    /// Source-data id of a dense vertex
    pub fn source_id(&self, vertex: VertexId) -> Option<i64> {
        self.graph.as_ref()?.ids.key(vertex).copied()
    }

    pub fn edges(&self, vertex: VertexId) -> &[Edge] {
        let Some(graph) = self.graph.as_ref() else {
            return &[];
        };
        let v = vertex as usize;
        if v + 1 >= graph.offsets.len() {
            return &[];
        }
        &graph.edges[graph.offsets[v]..graph.offsets[v + 1]]
    }

    pub fn num_edges(&self) -> usize {
        self.graph.as_ref().map_or(0, |g| g.edges.len())
    }
}

fn load_vertices(conn: &Connection) -> Result<(IdTable<i64>, Vec<Point>)> {
    let mut stmt = conn.prepare("SELECT id, lat, lon FROM vertices ORDER BY id")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, Option<f64>>(1)?, row.get::<_, Option<f64>>(2)?))
    })?;

    let mut ids = IdTable::new();
    let mut points = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        let (id, lat, lon) = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("skipping vertex row: {}", e);
                skipped += 1;
                continue;
            }
        };
        let point = match (lat, lon) {
            (Some(lat), Some(lon)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) => {
                Point::new(lat, lon)
            }
            _ => {
                warn!("skipping vertex {} with invalid location", id);
                skipped += 1;
                continue;
            }
        };
        if ids.insert_new(id).is_none() {
            warn!("skipping duplicate vertex {}", id);
            skipped += 1;
            continue;
        }
        points.push(point);
    }
    if skipped > 0 {
        info!("skipped {} vertex rows", skipped);
    }
    Ok((ids, points))
}

struct EdgeRow {
    source: i64,
    target: i64,
    via: Option<i64>,
    distance: f64,
    time: f64,
    flags: i64,
    original_id: i64,
}

impl EdgeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            source: row.get(0)?,
            target: row.get(1)?,
            via: row.get(2)?,
            distance: row.get(3)?,
            time: row.get(4)?,
            flags: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
            original_id: row.get(6)?,
        })
    }
}

fn load_edges(conn: &Connection, ids: &IdTable<i64>) -> Result<(Vec<usize>, Vec<Edge>)> {
    let mut stmt = conn.prepare(
        "SELECT source, target, via, distance, time, flags, COALESCE(original_id, rowid) FROM edges",
    )?;
    let rows = stmt.query_map([], EdgeRow::from_row)?;

    let mut by_source: Vec<(VertexId, Edge)> = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("skipping edge row: {}", e);
                skipped += 1;
                continue;
            }
        };
        let (Some(source), Some(target)) = (ids.get(&row.source), ids.get(&row.target)) else {
            warn!("skipping edge {} between unknown vertices {} -> {}", row.original_id, row.source, row.target);
            skipped += 1;
            continue;
        };
        let valid_cost = |c: f64| c.is_finite() && c >= 0.0;
        if !valid_cost(row.distance) || !valid_cost(row.time) {
            warn!("skipping edge {} with negative or non-finite cost", row.original_id);
            skipped += 1;
            continue;
        }
        let Some(flags) = u8::try_from(row.flags).ok().and_then(EdgeFlags::from_bits) else {
            warn!("skipping edge {} with unknown flags {}", row.original_id, row.flags);
            skipped += 1;
            continue;
        };
        let via = row.via.and_then(|v| ids.get(&v));
        by_source.push((
            source,
            Edge {
                target,
                via,
                distance: row.distance,
                time: row.time,
                flags,
                original_id: row.original_id,
            },
        ));
    }
    if skipped > 0 {
        info!("skipped {} edge rows", skipped);
    }

    by_source.sort_by_key(|(source, _)| *source);
    let mut offsets = vec![0usize; ids.len() + 1];
    for (source, _) in &by_source {
        offsets[*source as usize + 1] += 1;
    }
    for i in 1..offsets.len() {
        offsets[i] += offsets[i - 1];
    }
    let edges = by_source.into_iter().map(|(_, edge)| edge).collect();
    Ok((offsets, edges))
}

impl NetworkModel for StaticNetwork {
    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&mut self, source: &Path) -> Result<()> {
        let conn = Connection::open_with_flags(source, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        self.parse_connection(conn)
    }

    fn unload(&mut self) {
        if self.graph.take().is_some() {
            debug!("unloaded network {}", self.name);
        }
    }

    fn is_loaded(&self) -> bool {
        self.graph.is_some()
    }

    fn num_vertices(&self) -> usize {
        self.graph.as_ref().map_or(0, |g| g.points.len())
    }

    fn point(&self, vertex: VertexId) -> Option<Point> {
        self.graph.as_ref()?.points.get(vertex as usize).copied()
    }

    fn expand(&self, vertex: VertexId, _cost: f64, ctx: &QueryContext, out: &mut Vec<EdgeCost>) {
        out.extend(self.edges(vertex).iter().map(|edge| EdgeCost {
            target: edge.target,
            cost: edge.cost(ctx.metric),
            original_id: edge.original_id,
        }));
    }

    fn nearest(&self, point: Point) -> Result<Option<NearestPointResult>> {
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| NetworkError::NotLoaded(self.name.clone()))?;

        let Some(candidate) = graph.spatial.nearest(point)? else {
            return Ok(None);
        };
        let Some(vertex) = graph.ids.get(&candidate.id) else {
            warn!("spatial index of {} returned unknown vertex {}", self.name, candidate.id);
            return Ok(None);
        };
        let vertex_point = graph.points[vertex as usize];
        Ok(Some(NearestPointResult::at_vertex(
            point,
            vertex,
            vertex_point,
            candidate.payload,
        )))
    }
}
