//! In-memory box store backed by an R-tree.

use rstar::{RTree, RTreeObject, AABB};

use super::{BoundingBox, BoxStore, Candidate, Result};
use crate::types::Point;

#[derive(Clone, Debug)]
struct VertexNode {
    id: i64,
    payload: Option<String>,
    point: [f64; 2],
}

impl RTreeObject for VertexNode {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// Point store for networks without a persisted index table
pub struct MemoryBoxStore {
    tree: RTree<VertexNode>,
}

impl MemoryBoxStore {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Bulk-loads `(id, point)` pairs, which is faster than repeated inserts
    pub fn from_points(points: impl IntoIterator<Item = (i64, Point)>) -> Self {
        let nodes = points
            .into_iter()
            .map(|(id, point)| VertexNode {
                id,
                payload: None,
                point: [point.lon, point.lat],
            })
            .collect();
        Self {
            tree: RTree::bulk_load(nodes),
        }
    }

    pub fn insert(&mut self, id: i64, point: Point, payload: Option<String>) {
        self.tree.insert(VertexNode {
            id,
            payload,
            point: [point.lon, point.lat],
        });
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl Default for MemoryBoxStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BoxStore for MemoryBoxStore {
    fn query(&self, bbox: &BoundingBox) -> Result<Vec<Candidate>> {
        let envelope = AABB::from_corners([bbox.min_lon, bbox.min_lat], [bbox.max_lon, bbox.max_lat]);
        Ok(self
            .tree
            .locate_in_envelope(&envelope)
            .map(|node| Candidate {
                id: node.id,
                point: Point::new(node.point[1], node.point[0]),
                payload: node.payload.clone(),
            })
            .collect())
    }
}
