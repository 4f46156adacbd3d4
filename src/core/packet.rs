//! Protocol packet types.

use std::fmt;

use time::OffsetDateTime;

use crate::core::id::{NodeId, RequestId};

/// The dispatch a node asks of the transport after handling a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Send a single packet to one neighbor (route replies travel this way).
    Unicast(NodeId, Packet),
    /// Send one packet per listed neighbor (route requests flood this way).
    Broadcast(Vec<(NodeId, Packet)>),
    /// The node is the original requester and the reply has arrived: the route is complete.
    RouteFound(Vec<NodeId>),
}

/// DSR control packet variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// RREQ packets flood the network looking for the destination, accumulating the path they
    /// travel along.
    RouteRequest,
    /// RREP packets carry the discovered path back to the requester, hop by hop in reverse.
    RouteReply,
}

impl PacketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketKind::RouteRequest => "RREQ",
            PacketKind::RouteReply => "RREP",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DSR control packet.
///
/// For a route request, `source` is the requester and `destination` the node being searched for.
/// For a route reply the roles flip: `source` is the node that answered and `destination` the
/// original requester, while `path` still reads requester-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub source: NodeId,
    pub destination: NodeId,
    pub path: Vec<NodeId>,
    pub request_id: RequestId,
    // Informational only.
    pub created_at: OffsetDateTime,
}

impl Packet {
    /// Creates a route request. An empty `path` defaults to `[source]`.
    pub fn route_request(
        source: NodeId,
        destination: NodeId,
        path: Vec<NodeId>,
        request_id: RequestId,
    ) -> Self {
        let path = if path.is_empty() { vec![source] } else { path };

        Self {
            kind: PacketKind::RouteRequest,
            source,
            destination,
            path,
            request_id,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Creates a route reply carrying the full discovered path.
    pub fn route_reply(
        source: NodeId,
        destination: NodeId,
        path: Vec<NodeId>,
        request_id: RequestId,
    ) -> Self {
        Self {
            kind: PacketKind::RouteReply,
            source,
            destination,
            path,
            request_id,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// The key used to suppress duplicate route requests.
    pub fn request_key(&self) -> (NodeId, RequestId) {
        (self.source, self.request_id)
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind, PacketKind::RouteRequest)
    }

    /// Returns `true` if `id` already appears on the packet's path.
    pub fn visited(&self, id: NodeId) -> bool {
        self.path.contains(&id)
    }
}

/// Formats a path as `0 -> 1 -> 2`.
pub fn display_path(path: &[NodeId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} (request {}), path: {}",
            self.kind,
            self.source,
            self.destination,
            self.request_id,
            display_path(&self.path)
        )
    }
}
