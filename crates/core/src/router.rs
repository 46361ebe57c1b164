//! Coordinate-to-coordinate routing on top of the engine.

use tracing::debug;

use crate::engine::ShortestPathEngine;
use crate::network::{NetworkModel, QueryContext, Result};
use crate::types::{Point, RouteQuery, SearchResult};

pub struct Router;

impl Router {
    /// Cheapest path between the vertices nearest to `from` and `to`.
    ///
    /// Unsnappable endpoints and unreachable destinations give an invalid
    /// (empty-path) result rather than an error.
    pub fn route(network: &dyn NetworkModel, from: Point, to: Point, query: &RouteQuery) -> Result<SearchResult> {
        let Some(source) = network.nearest(from)? else {
            debug!("no vertex of {} near origin {}", network.name(), from);
            return Ok(SearchResult::invalid());
        };
        let Some(destination) = network.nearest(to)? else {
            debug!("no vertex of {} near destination {}", network.name(), to);
            return Ok(SearchResult::invalid());
        };

        let ctx = QueryContext {
            metric: query.metric,
            departure: query.departure,
        };
        let target = destination.target;
        let mut engine = ShortestPathEngine::new(network, ctx).with_cost_limit(query.cost_limit);
        engine.seed(source.target);
        let found = engine.run(|v| v == target);

        let mut result = SearchResult {
            search_space: engine.settled(),
            ..SearchResult::default()
        };
        match found.and_then(|v| engine.path_to(v)) {
            Some((path, edge_ids)) => {
                result.cost = engine.distance(target).unwrap_or_default();
                result.path = path;
                result.edge_ids = edge_ids;
            }
            None => debug!(
                "no path from {} to {} on {} after {} vertices",
                source.target,
                target,
                network.name(),
                result.search_space
            ),
        }
        result.source = Some(source);
        result.destination = Some(destination);
        Ok(result)
    }

    /// Every vertex reachable from `from` within `limit`, with its cost
    pub fn local(network: &dyn NetworkModel, from: Point, query: &RouteQuery, limit: f64) -> Result<SearchResult> {
        let Some(source) = network.nearest(from)? else {
            debug!("no vertex of {} near origin {}", network.name(), from);
            return Ok(SearchResult::invalid());
        };

        let ctx = QueryContext {
            metric: query.metric,
            departure: query.departure,
        };
        let mut engine = ShortestPathEngine::new(network, ctx).with_cost_limit(Some(limit));
        engine.seed(source.target);
        engine.run(|_| false);

        Ok(SearchResult {
            path: vec![source.target],
            search_space: engine.settled(),
            reached: engine.reached(),
            source: Some(source),
            ..SearchResult::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::static_network::tests::sample_network;
    use crate::network::transit_network::tests::{sample_network as sample_transit, tuesday};
    use crate::network::StaticNetwork;
    use crate::spatial::SpatialConfig;
    use crate::types::Metric;

    #[test]
    fn test_route_between_coordinates() {
        let network = sample_network();
        let query = RouteQuery::new(Metric::Distance);
        let result = Router::route(&network, Point::new(47.0001, 8.0), Point::new(47.0199, 8.0201), &query).unwrap();

        assert!(result.is_valid());
        assert_eq!(result.cost, 10.0);
        assert_eq!(result.edge_ids, vec![1001, 1002, 1004]);
        assert_eq!(result.path.len(), 4);
        assert_eq!(result.search_space, 4);
        assert_eq!(result.destination.as_ref().map(|d| d.target), result.path.last().copied());
    }

    #[test]
    fn test_unreachable_is_invalid_not_error() {
        let network = sample_network();
        // Edges only run away from vertex 10
        let result = Router::route(&network, Point::new(47.02, 8.02), Point::new(47.0, 8.0), &RouteQuery::default()).unwrap();

        assert!(!result.is_valid());
        assert!(result.source.is_some());
        assert_eq!(result.search_space, 1);
    }

    #[test]
    fn test_unsnappable_endpoint() {
        let mut network = StaticNetwork::new("tiny").with_spatial_config(SpatialConfig {
            max_attempts: 1,
            ..SpatialConfig::default()
        });
        network
            .parse_connection(crate::network::static_network::tests::sample_connection())
            .unwrap();

        let result = Router::route(&network, Point::new(0.0, 0.0), Point::new(47.0, 8.0), &RouteQuery::default()).unwrap();
        assert!(!result.is_valid());
        assert!(result.source.is_none());
    }

    #[test]
    fn test_local_search_reports_reached() {
        let network = sample_network();
        let result = Router::local(&network, Point::new(47.0, 8.0), &RouteQuery::new(Metric::Distance), 8.0).unwrap();

        assert_eq!(result.reached.len(), 3);
        let vertex_30 = network.vertex_id(30).unwrap();
        assert_eq!(result.reached.get(&vertex_30), Some(&8.0));
    }

    #[test]
    fn test_transit_route_uses_departure() {
        let network = sample_transit();
        let query = RouteQuery::new(Metric::Time).departing_at(tuesday(7, 50));
        let result = Router::route(&network, Point::new(47.0, 8.0), Point::new(47.02, 8.0), &query).unwrap();

        assert_eq!(result.cost, 30.0 * 60.0);
        assert_eq!(result.path, vec![0, 1, 2]);

        // Saturday: nothing runs until Monday 08:00
        let saturday = tuesday(7, 50) + chrono::Duration::days(4);
        let query = RouteQuery::new(Metric::Time).departing_at(saturday);
        let result = Router::route(&network, Point::new(47.0, 8.0), Point::new(47.02, 8.0), &query).unwrap();
        assert!(result.is_valid());
        assert!(result.cost > 48.0 * 3600.0);
    }
}
