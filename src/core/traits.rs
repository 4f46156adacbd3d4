use crate::core::{id::NodeId, packet::Packet};

/// A trait used to surface protocol activity to the outside world.
///
/// The network calls into the observer for trace lines, for every packet a node handles, and once
/// per successful discovery. Calls arrive from the node tasks concurrently.
pub trait Observer: Send + Sync {
    /// Receives a human-readable trace line; the provided implementation is a no-op.
    fn log(&self, _message: &str) {}

    /// Called once per packet handling event (request received or originated, reply received or
    /// originated); the provided implementation is a no-op.
    ///
    /// The network doesn't call this while it is paused.
    fn on_step(&self, _packet: &Packet, _current_node: NodeId) {}

    /// Called when the original requester processes the final reply; the provided implementation
    /// is a no-op.
    fn on_route_found(&self, _path: &[NodeId]) {}
}

/// An observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}
