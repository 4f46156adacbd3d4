//! Random connected topologies with bounded edge connectivity.

mod generator;
mod graph;

pub use generator::{attempt_budget, connectivity_ceiling, generate};
pub use graph::{Graph, GraphInfo};
