//! # waypath-core
//!
//! Shortest paths over road-like and transit networks.
//!
//! A [`network::NetworkModel`] exposes vertices, outgoing edge costs and
//! nearest-vertex lookup. The [`engine::ShortestPathEngine`] runs Dijkstra
//! over any model, and the [`router::Router`] snaps coordinates to vertices
//! before searching. Loaded networks live in a bounded [`pool::NetworkPool`].

pub mod engine;
pub mod heap;
pub mod network;
pub mod pool;
pub mod router;
pub mod spatial;
pub mod types;

// Re-export transit from the transit crate
pub use waypath_transit as transit;

pub use engine::ShortestPathEngine;
pub use heap::IndexedPriorityQueue;
pub use network::{NetworkError, NetworkModel, QueryContext, StaticNetwork, TransitNetwork};
pub use pool::{NetworkPool, PoolError, SharedNetwork};
pub use router::Router;
pub use spatial::{SpatialConfig, SpatialError, SpatialIndex};
pub use types::{Edge, EdgeFlags, Metric, NearestPointResult, Point, RouteQuery, SearchResult, VertexId};
