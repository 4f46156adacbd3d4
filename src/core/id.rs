//! Protocol identifier types.

use std::fmt;

/// Distinguishes discovery attempts originating from the same node.
pub type RequestId = u32;

/// A node identifier, unique within a topology.
///
/// Topologies label their nodes with the contiguous range `[0, N)`, so an identifier doubles as
/// an index into per-node collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a new identifier.
    pub const fn new(raw: u32) -> Self {
        NodeId(raw)
    }

    /// Returns the raw integer backing the identifier.
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the identifier as an index into a `[0, N)` labeled collection.
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for NodeId {
    fn from(raw: u32) -> Self {
        NodeId(raw)
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builds a list of identifiers from raw integers, e.g. `ids(&[0, 1, 2])`.
pub fn ids(raw: &[u32]) -> Vec<NodeId> {
    raw.iter().copied().map(NodeId::new).collect()
}
