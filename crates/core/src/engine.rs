//! Single-source shortest paths over any [`NetworkModel`].
//!
//! The engine owns all per-query state (queue, distances, predecessors) in
//! dense vectors sized to the network, so searches on a shared network never
//! contend with each other.

use std::collections::HashMap;

use tracing::trace;

use crate::heap::IndexedPriorityQueue;
use crate::network::{EdgeCost, NetworkModel, QueryContext};
use crate::types::VertexId;

pub struct ShortestPathEngine<'a> {
    network: &'a dyn NetworkModel,
    ctx: QueryContext,
    cost_limit: Option<f64>,
    queue: IndexedPriorityQueue<f64>,
    dist: Vec<f64>,
    /// Predecessor vertex and the original id of the edge taken from it
    pred: Vec<Option<(VertexId, i64)>>,
    visited: Vec<bool>,
    settled: usize,
    scratch: Vec<EdgeCost>,
}

impl<'a> ShortestPathEngine<'a> {
    pub fn new(network: &'a dyn NetworkModel, ctx: QueryContext) -> Self {
        let n = network.num_vertices();
        Self {
            network,
            ctx,
            cost_limit: None,
            queue: IndexedPriorityQueue::with_capacity(n),
            dist: vec![f64::INFINITY; n],
            pred: vec![None; n],
            visited: vec![false; n],
            settled: 0,
            scratch: Vec::new(),
        }
    }

    /// Turns the search into a local search: nothing costlier than `limit` is queued
    pub fn with_cost_limit(mut self, limit: Option<f64>) -> Self {
        self.cost_limit = limit;
        self
    }

    /// Seeds the queue with `source` at cost zero; ignored for unknown vertices
    pub fn seed(&mut self, source: VertexId) {
        let idx = source as usize;
        if idx >= self.visited.len() || self.visited[idx] {
            return;
        }
        self.visited[idx] = true;
        self.dist[idx] = 0.0;
        self.queue.push(source, 0.0);
    }

    /// Pops the cheapest vertex, relaxes its edges and returns it with its cost
    pub fn step(&mut self) -> Option<(VertexId, f64)> {
        let (vertex, cost) = self.queue.pop()?;
        self.settled += 1;

        self.scratch.clear();
        self.network.expand(vertex, cost, &self.ctx, &mut self.scratch);

        for edge in &self.scratch {
            let target = edge.target as usize;
            if target >= self.visited.len() {
                continue;
            }
            let next = cost + edge.cost;
            if self.cost_limit.is_some_and(|limit| next > limit) {
                continue;
            }

            if !self.visited[target] {
                self.visited[target] = true;
                self.dist[target] = next;
                self.pred[target] = Some((vertex, edge.original_id));
                self.queue.push(edge.target, next);
            } else if next < self.dist[target] && self.queue.decrease_key(edge.target, next) {
                self.dist[target] = next;
                self.pred[target] = Some((vertex, edge.original_id));
            }
        }

        trace!("settled {} at {}", vertex, cost);
        Some((vertex, cost))
    }

    /// Steps until the queue empties or `is_end_reached` accepts a settled vertex
    pub fn run(&mut self, mut is_end_reached: impl FnMut(VertexId) -> bool) -> Option<VertexId> {
        while let Some((vertex, _)) = self.step() {
            if is_end_reached(vertex) {
                return Some(vertex);
            }
        }
        None
    }

    /// Number of vertices popped so far
    pub fn settled(&self) -> usize {
        self.settled
    }

    pub fn distance(&self, vertex: VertexId) -> Option<f64> {
        self.dist
            .get(vertex as usize)
            .copied()
            .filter(|d| d.is_finite())
    }

    /// Vertex path and original edge ids from the source to `destination`
    pub fn path_to(&self, destination: VertexId) -> Option<(Vec<VertexId>, Vec<i64>)> {
        self.distance(destination)?;

        let mut path = vec![destination];
        let mut edges = Vec::new();
        let mut current = destination;
        while let Some((prev, edge)) = self.pred[current as usize] {
            path.push(prev);
            edges.push(edge);
            current = prev;
            if path.len() > self.pred.len() {
                // Cycle in the predecessor chain
                return None;
            }
        }
        path.reverse();
        edges.reverse();
        Some((path, edges))
    }

    /// Every vertex reached so far with its cost
    pub fn reached(&self) -> HashMap<VertexId, f64> {
        self.dist
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_finite())
            .map(|(v, d)| (v as VertexId, *d))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::network::Result;
    use crate::types::{NearestPointResult, Point};
    use std::path::Path;

    /// Undirected weighted graph held in memory
    pub(crate) struct TestGraph {
        adjacency: Vec<Vec<(VertexId, f64)>>,
    }

    impl TestGraph {
        pub(crate) fn new(n: usize, edges: &[(VertexId, VertexId, f64)]) -> Self {
            let mut adjacency = vec![Vec::new(); n];
            for &(a, b, w) in edges {
                adjacency[a as usize].push((b, w));
                adjacency[b as usize].push((a, w));
            }
            Self { adjacency }
        }
    }

    impl NetworkModel for TestGraph {
        fn name(&self) -> &str {
            "test"
        }

        fn parse(&mut self, _source: &Path) -> Result<()> {
            Ok(())
        }

        fn unload(&mut self) {
            self.adjacency.clear();
        }

        fn is_loaded(&self) -> bool {
            !self.adjacency.is_empty()
        }

        fn num_vertices(&self) -> usize {
            self.adjacency.len()
        }

        fn point(&self, vertex: VertexId) -> Option<Point> {
            ((vertex as usize) < self.adjacency.len()).then(|| Point::new(0.0, vertex as f64))
        }

        fn expand(&self, vertex: VertexId, _cost: f64, _ctx: &QueryContext, out: &mut Vec<EdgeCost>) {
            for &(target, cost) in &self.adjacency[vertex as usize] {
                out.push(EdgeCost {
                    target,
                    cost,
                    original_id: i64::from(vertex) * 100 + i64::from(target),
                });
            }
        }

        fn nearest(&self, point: Point) -> Result<Option<NearestPointResult>> {
            let vertex = point.lon.round() as VertexId;
            Ok(self.point(vertex).map(|p| NearestPointResult::at_vertex(point, vertex, p, None)))
        }
    }

    const A: VertexId = 0;
    const B: VertexId = 1;
    const C: VertexId = 2;
    const D: VertexId = 3;

    fn diamond() -> TestGraph {
        TestGraph::new(4, &[(A, B, 5.0), (B, C, 3.0), (A, C, 10.0), (C, D, 2.0)])
    }

    #[test]
    fn test_shortest_path_through_cheaper_detour() {
        let graph = diamond();
        let mut engine = ShortestPathEngine::new(&graph, QueryContext::default());
        engine.seed(A);

        assert_eq!(engine.run(|v| v == D), Some(D));
        assert_eq!(engine.distance(D), Some(10.0));

        let (path, edges) = engine.path_to(D).unwrap();
        assert_eq!(path, vec![A, B, C, D]);
        assert_eq!(edges, vec![1, 102, 203]);
    }

    #[test]
    fn test_popped_costs_never_decrease() {
        let graph = TestGraph::new(
            6,
            &[(0, 1, 7.0), (0, 2, 9.0), (0, 5, 14.0), (1, 2, 10.0), (1, 3, 15.0), (2, 3, 11.0), (2, 5, 2.0), (3, 4, 6.0), (4, 5, 9.0)],
        );
        let mut engine = ShortestPathEngine::new(&graph, QueryContext::default());
        engine.seed(0);

        let mut last = 0.0;
        while let Some((_, cost)) = engine.step() {
            assert!(cost >= last);
            last = cost;
        }
        assert_eq!(engine.settled(), 6);
        assert_eq!(engine.distance(4), Some(20.0));

        let (path, _) = engine.path_to(4).unwrap();
        assert_eq!(path.first(), Some(&0));
        assert_eq!(path.last(), Some(&4));
        let mut unique = path.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), path.len());
    }

    #[test]
    fn test_equal_cost_keeps_first_predecessor() {
        // 0 -> 1 -> 3 and 0 -> 2 -> 3 both cost 2
        let graph = TestGraph::new(4, &[(0, 1, 1.0), (0, 2, 1.0), (1, 3, 1.0), (2, 3, 1.0)]);
        let mut engine = ShortestPathEngine::new(&graph, QueryContext::default());
        engine.seed(0);
        engine.run(|v| v == 3);

        // Vertex 1 is settled first and reaches 3 first; the later tie does not replace it
        let (path, _) = engine.path_to(3).unwrap();
        assert_eq!(path, vec![0, 1, 3]);
        assert_eq!(engine.distance(3), Some(2.0));
    }

    #[test]
    fn test_unreachable_destination() {
        let graph = TestGraph::new(3, &[(0, 1, 1.0)]);
        let mut engine = ShortestPathEngine::new(&graph, QueryContext::default());
        engine.seed(0);

        assert_eq!(engine.run(|v| v == 2), None);
        assert!(engine.path_to(2).is_none());
        assert_eq!(engine.distance(2), None);
    }

    #[test]
    fn test_cost_limit_bounds_reached_set() {
        let graph = diamond();
        let mut engine = ShortestPathEngine::new(&graph, QueryContext::default()).with_cost_limit(Some(8.0));
        engine.seed(A);
        engine.run(|_| false);

        let reached = engine.reached();
        assert_eq!(reached.len(), 3);
        assert_eq!(reached.get(&C), Some(&8.0));
        assert!(!reached.contains_key(&D));
    }

    #[test]
    fn test_unknown_source_is_ignored() {
        let graph = diamond();
        let mut engine = ShortestPathEngine::new(&graph, QueryContext::default());
        engine.seed(42);
        assert_eq!(engine.step(), None);
    }
}
