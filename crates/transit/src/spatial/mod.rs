//! Distance helpers shared by stops and network vertices.

pub mod queries;

pub use queries::{haversine_distance, meters_to_degrees_approx};
