//! Network models the search engine runs over.

use std::path::Path;

use chrono::NaiveDateTime;

use crate::spatial::SpatialError;
use crate::types::{Metric, NearestPointResult, Point, VertexId};
use waypath_transit::TransitError;

pub mod static_network;
pub mod transit_network;

pub use static_network::StaticNetwork;
pub use transit_network::TransitNetwork;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Network {0} is not loaded")]
    NotLoaded(String),

    #[error("Missing table: {0}")]
    MissingTable(&'static str),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Transit error: {0}")]
    Transit(#[from] TransitError),

    #[error("Spatial error: {0}")]
    Spatial(#[from] SpatialError),
}

pub type Result<T> = std::result::Result<T, NetworkError>;

/// What the engine knows about the running query
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QueryContext {
    pub metric: Metric,
    pub departure: Option<NaiveDateTime>,
}

/// One relaxable edge as seen by the engine
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeCost {
    pub target: VertexId,
    pub cost: f64,
    pub original_id: i64,
}

/// A loadable graph with point lookup.
///
/// Loaded networks are read-only; searches share them through `&dyn NetworkModel`.
pub trait NetworkModel: Send + Sync {
    fn name(&self) -> &str;

    /// Loads the network from a store file; on error nothing stays loaded
    fn parse(&mut self, source: &Path) -> Result<()>;

    /// Releases everything `parse` built
    fn unload(&mut self);

    /// Derived data computed once after `parse`
    fn preprocess(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_loaded(&self) -> bool;

    fn num_vertices(&self) -> usize;

    fn point(&self, vertex: VertexId) -> Option<Point>;

    /// Appends the outgoing edges of `vertex`, reached at accumulated `cost`, to `out`
    fn expand(&self, vertex: VertexId, cost: f64, ctx: &QueryContext, out: &mut Vec<EdgeCost>);

    /// Snaps a coordinate onto the closest vertex
    fn nearest(&self, point: Point) -> Result<Option<NearestPointResult>>;
}
