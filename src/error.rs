//! Error types.

use thiserror::Error;

use crate::{
    config::{MAX_NODES, MIN_NODES},
    core::id::NodeId,
};

/// Malformed input to one of the network's entry points. The simulation state is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidParameter {
    #[error("node count {0} is outside of [{min}, {max}]", min = MIN_NODES, max = MAX_NODES)]
    NodeCount(usize),

    #[error("node {0} is not part of the topology")]
    UnknownNode(NodeId),

    #[error("source and destination are both node {0}")]
    SameEndpoints(NodeId),
}

/// A failure while a node handles a single packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerFault {
    #[error("node {node} is not on the path {path:?}")]
    NotOnPath { node: NodeId, path: Vec<NodeId> },

    #[error("packet carries an empty path")]
    EmptyPath,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(#[from] InvalidParameter),

    /// Contained at the node's task boundary; logged and never propagated to the network.
    #[error("node {node} failed to handle a packet: {fault}")]
    ActorHandlerFault { node: NodeId, fault: HandlerFault },

    #[error("node tasks must be started from within a Tokio runtime")]
    RuntimeUnavailable,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
