use std::collections::{BTreeSet, HashMap, HashSet};

use rand::{thread_rng, Rng};
use tracing::trace;

use crate::{
    config::MAX_REQUEST_ID,
    core::{
        id::{NodeId, RequestId},
        packet::{Packet, PacketKind, Response},
    },
    error::HandlerFault,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    /// Not taking part in any discovery at the moment.
    Idle,
    /// Handling a packet, until the resulting dispatch has been carried out.
    Forwarding,
}

/// The result of handling a single packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A request this node has already handled; it doesn't count as a protocol step.
    Dropped,
    /// The packet was handled (and should be reported as a step), with the dispatch it calls for.
    Handled(Option<Response>),
}

/// The per-node DSR state machine.
///
/// The router doesn't do any I/O: it consumes packets and returns the dispatch the node should
/// perform, leaving delivery to whatever drives it.
#[derive(Debug, Clone)]
pub struct DsrRouter {
    // The node's local identifier.
    local_id: NodeId,
    // Adjacent nodes, fixed once the topology is wired.
    neighbors: BTreeSet<NodeId>,
    // Maps the node that answered a discovery to the path discovered to it.
    route_cache: HashMap<NodeId, Vec<NodeId>>,
    // The (source, request id) pairs already handled in the current session.
    seen_requests: HashSet<(NodeId, RequestId)>,
    state: RouterState,
}

impl DsrRouter {
    /// Creates a new router without neighbors.
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_id,
            neighbors: BTreeSet::new(),
            route_cache: HashMap::new(),
            seen_requests: HashSet::new(),
            state: RouterState::Idle,
        }
    }

    /// Creates a new router with the supplied neighbors.
    pub fn with_neighbors(local_id: NodeId, neighbors: impl IntoIterator<Item = NodeId>) -> Self {
        let mut router = Self::new(local_id);
        for neighbor in neighbors {
            router.add_neighbor(neighbor);
        }

        router
    }

    /// Returns this router's local identifier.
    pub fn local_id(&self) -> NodeId {
        self.local_id
    }

    /// Returns the neighbors in ascending order.
    pub fn neighbors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.neighbors.iter().copied()
    }

    /// Returns `true` if the neighbor was added, `false` if it is already known or is our local
    /// identifier.
    pub fn add_neighbor(&mut self, id: NodeId) -> bool {
        if id == self.local_id {
            return false;
        }

        self.neighbors.insert(id)
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    /// Marks the dispatch of the last handled packet as complete.
    pub fn dispatched(&mut self) {
        self.state = RouterState::Idle;
    }

    /// Returns the cached path to the node, if a reply from it passed through this router.
    pub fn cached_route(&self, id: NodeId) -> Option<&[NodeId]> {
        self.route_cache.get(&id).map(Vec::as_slice)
    }

    /// Returns `true` if the request identified by the key was already handled this session.
    pub fn has_seen(&self, key: (NodeId, RequestId)) -> bool {
        self.seen_requests.contains(&key)
    }

    /// Forgets the routes and requests of the previous session.
    pub fn reset_session(&mut self) {
        self.route_cache.clear();
        self.seen_requests.clear();
    }

    /// Starts a new discovery towards the destination with a random request identifier.
    ///
    /// Returns the originating request along with the broadcast to every neighbor.
    pub fn start_discovery(&mut self, destination: NodeId) -> (Packet, Response) {
        let request_id = thread_rng().gen_range(1..=MAX_REQUEST_ID);
        self.start_discovery_with_id(destination, request_id)
    }

    /// Starts a new discovery towards the destination with the supplied request identifier.
    pub fn start_discovery_with_id(
        &mut self,
        destination: NodeId,
        request_id: RequestId,
    ) -> (Packet, Response) {
        // Cached routes are never reused: every discovery floods again.
        self.reset_session();

        let request = Packet::route_request(self.local_id, destination, vec![], request_id);
        // Copies flooding back to us get dropped as duplicates.
        self.seen_requests.insert(request.request_key());

        let broadcast = self
            .neighbors()
            .map(|neighbor| (neighbor, request.clone()))
            .collect();

        (request, Response::Broadcast(broadcast))
    }

    // PACKET PROCESSING

    /// Processes a packet delivered to this node.
    pub fn process_packet(&mut self, packet: Packet) -> Result<Outcome, HandlerFault> {
        if packet.path.is_empty() {
            return Err(HandlerFault::EmptyPath);
        }

        self.state = RouterState::Forwarding;

        let outcome = match packet.kind {
            PacketKind::RouteRequest => self.process_route_request(packet),
            PacketKind::RouteReply => self.process_route_reply(packet),
        };

        if !matches!(outcome, Ok(Outcome::Handled(Some(_)))) {
            self.state = RouterState::Idle;
        }

        outcome
    }

    fn process_route_request(&mut self, packet: Packet) -> Result<Outcome, HandlerFault> {
        if !self.seen_requests.insert(packet.request_key()) {
            trace!(node = %self.local_id, %packet, "duplicate request dropped");
            return Ok(Outcome::Dropped);
        }

        if packet.destination == self.local_id {
            return Ok(Outcome::Handled(self.reply(packet)));
        }

        // Can't happen through flooding given the duplicate check above, but a malformed
        // forward could still loop back.
        if packet.visited(self.local_id) {
            trace!(node = %self.local_id, %packet, "looping request dropped");
            return Ok(Outcome::Handled(None));
        }

        let mut path = packet.path;
        path.push(self.local_id);

        let forwards: Vec<_> = self
            .neighbors
            .iter()
            .filter(|neighbor| !path.contains(neighbor))
            .map(|&neighbor| {
                (
                    neighbor,
                    Packet::route_request(
                        packet.source,
                        packet.destination,
                        path.clone(),
                        packet.request_id,
                    ),
                )
            })
            .collect();

        Ok(Outcome::Handled(Some(Response::Broadcast(forwards))))
    }

    // Answers a request that reached its destination: the reply retraces the request's path.
    fn reply(&self, request: Packet) -> Option<Response> {
        let mut path = request.path;
        path.push(self.local_id);

        // Second to last on the path, i.e. the hop right after us in reverse order.
        let next_hop = path.iter().rev().nth(1).copied()?;
        let reply = Packet::route_reply(self.local_id, request.source, path, request.request_id);

        Some(Response::Unicast(next_hop, reply))
    }

    fn process_route_reply(&mut self, packet: Packet) -> Result<Outcome, HandlerFault> {
        self.route_cache.insert(packet.source, packet.path.clone());

        if packet.destination == self.local_id {
            return Ok(Outcome::Handled(Some(Response::RouteFound(packet.path))));
        }

        let position = packet
            .path
            .iter()
            .rposition(|&id| id == self.local_id)
            .ok_or_else(|| HandlerFault::NotOnPath {
                node: self.local_id,
                path: packet.path.clone(),
            })?;

        // The reply walks the path backwards; the requester sits at index 0.
        if position == 0 {
            return Ok(Outcome::Handled(None));
        }

        let next_hop = packet.path[position - 1];
        Ok(Outcome::Handled(Some(Response::Unicast(next_hop, packet))))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::{
        core::id::ids,
        topology::{generate, Graph},
    };

    fn id(raw: u32) -> NodeId {
        NodeId::new(raw)
    }

    fn routers(graph: &Graph) -> Vec<DsrRouter> {
        graph
            .nodes()
            .map(|node| DsrRouter::with_neighbors(node, graph.neighbors(node)))
            .collect()
    }

    struct Flood {
        route: Option<Vec<NodeId>>,
        routes_found: usize,
        steps: usize,
        // Every (receiver, packet) pair handed to the transport.
        sent: Vec<(NodeId, Packet)>,
    }

    // Drives a discovery to completion with a FIFO queue standing in for the network.
    fn flood(graph: &Graph, source: NodeId, destination: NodeId) -> Flood {
        let mut routers = routers(graph);
        let mut queue = VecDeque::new();
        let mut result = Flood {
            route: None,
            routes_found: 0,
            steps: 1,
            sent: vec![],
        };

        let (_, response) = routers[source.index()].start_discovery(destination);
        queue.push_back((source, response));

        while let Some((from, response)) = queue.pop_front() {
            let packets = match response {
                Response::Unicast(to, packet) => vec![(to, packet)],
                Response::Broadcast(packets) => packets,
                Response::RouteFound(route) => {
                    assert_eq!(from, source);
                    result.routes_found += 1;
                    result.route = Some(route);
                    continue;
                }
            };

            for (to, packet) in packets {
                assert!(graph.has_edge(from, to), "{from} -> {to} isn't an edge");
                result.sent.push((to, packet.clone()));

                match routers[to.index()].process_packet(packet).unwrap() {
                    Outcome::Dropped => {}
                    Outcome::Handled(response) => {
                        result.steps += 1;
                        if let Some(response) = response {
                            queue.push_back((to, response));
                        }
                    }
                }
            }
        }

        result
    }

    fn assert_valid_route(graph: &Graph, route: &[NodeId], source: NodeId, destination: NodeId) {
        assert_eq!(route.first(), Some(&source));
        assert_eq!(route.last(), Some(&destination));
        assert!(route.windows(2).all(|hop| graph.has_edge(hop[0], hop[1])));

        let unique: HashSet<_> = route.iter().collect();
        assert_eq!(unique.len(), route.len());
    }

    #[test]
    fn add_neighbor() {
        let mut router = DsrRouter::new(id(0));
        assert!(router.add_neighbor(id(1)));
        assert!(!router.add_neighbor(id(1)));
        assert!(!router.add_neighbor(id(0)));
        assert_eq!(router.neighbors().collect::<Vec<_>>(), ids(&[1]));
    }

    #[test]
    fn start_discovery_broadcasts_to_every_neighbor() {
        let mut router = DsrRouter::with_neighbors(id(0), ids(&[1, 2, 3]));
        let (request, response) = router.start_discovery_with_id(id(5), 77);

        assert_eq!(request.path, ids(&[0]));
        assert_eq!(request.kind, PacketKind::RouteRequest);
        assert!(router.has_seen((id(0), 77)));

        let Response::Broadcast(packets) = response else {
            panic!("expected a broadcast");
        };
        assert_eq!(
            packets.iter().map(|(to, _)| *to).collect::<Vec<_>>(),
            ids(&[1, 2, 3])
        );
        assert!(packets.iter().all(|(_, packet)| *packet == request));
    }

    #[test]
    fn start_discovery_draws_request_ids_in_range() {
        let mut router = DsrRouter::with_neighbors(id(0), ids(&[1]));
        for _ in 0..100 {
            let (request, _) = router.start_discovery(id(1));
            assert!((1..=MAX_REQUEST_ID).contains(&request.request_id));
        }
    }

    #[test]
    fn start_discovery_resets_session() {
        let mut router = DsrRouter::with_neighbors(id(1), ids(&[0, 2]));

        let reply = Packet::route_reply(id(2), id(0), ids(&[0, 1, 2]), 5);
        router.process_packet(reply).unwrap();
        assert_eq!(router.cached_route(id(2)), Some(ids(&[0, 1, 2]).as_slice()));

        let request = Packet::route_request(id(0), id(2), ids(&[0]), 5);
        router.process_packet(request).unwrap();
        assert!(router.has_seen((id(0), 5)));

        router.start_discovery_with_id(id(2), 6);
        assert_eq!(router.cached_route(id(2)), None);
        assert!(!router.has_seen((id(0), 5)));
    }

    #[test]
    fn request_is_forwarded_to_neighbors_off_the_path() {
        let mut router = DsrRouter::with_neighbors(id(1), ids(&[0, 2, 3]));
        let request = Packet::route_request(id(0), id(9), ids(&[0]), 1);

        let outcome = router.process_packet(request).unwrap();
        let Outcome::Handled(Some(Response::Broadcast(packets))) = outcome else {
            panic!("expected a broadcast, got {outcome:?}");
        };

        assert_eq!(
            packets.iter().map(|(to, _)| *to).collect::<Vec<_>>(),
            ids(&[2, 3])
        );
        for (_, packet) in packets {
            assert_eq!(packet.path, ids(&[0, 1]));
            assert_eq!(packet.request_key(), (id(0), 1));
            assert_eq!(packet.destination, id(9));
        }
        assert_eq!(router.state(), RouterState::Forwarding);

        router.dispatched();
        assert_eq!(router.state(), RouterState::Idle);
    }

    #[test]
    fn duplicate_request_is_dropped() {
        let mut router = DsrRouter::with_neighbors(id(1), ids(&[0, 2]));
        let request = Packet::route_request(id(0), id(2), ids(&[0]), 3);

        assert!(matches!(
            router.process_packet(request.clone()).unwrap(),
            Outcome::Handled(Some(_))
        ));
        // Same key along a different path.
        let mut detour = request.clone();
        detour.path = ids(&[0, 4]);
        assert_eq!(router.process_packet(detour).unwrap(), Outcome::Dropped);
        assert_eq!(router.process_packet(request).unwrap(), Outcome::Dropped);
        assert_eq!(router.state(), RouterState::Idle);
    }

    #[test]
    fn looping_request_is_dropped() {
        let mut router = DsrRouter::with_neighbors(id(1), ids(&[0, 2]));
        let request = Packet::route_request(id(0), id(2), ids(&[0, 1, 3]), 3);

        assert_eq!(
            router.process_packet(request).unwrap(),
            Outcome::Handled(None)
        );
        // Still recorded, so later copies don't count as steps.
        assert!(router.has_seen((id(0), 3)));
    }

    #[test]
    fn destination_replies_along_the_reverse_path() {
        let mut router = DsrRouter::with_neighbors(id(3), ids(&[2, 4]));
        let request = Packet::route_request(id(0), id(3), ids(&[0, 1, 2]), 8);

        let outcome = router.process_packet(request).unwrap();
        let Outcome::Handled(Some(Response::Unicast(next_hop, reply))) = outcome else {
            panic!("expected a unicast, got {outcome:?}");
        };

        assert_eq!(next_hop, id(2));
        assert_eq!(reply.kind, PacketKind::RouteReply);
        assert_eq!(reply.source, id(3));
        assert_eq!(reply.destination, id(0));
        assert_eq!(reply.path, ids(&[0, 1, 2, 3]));
        assert_eq!(reply.request_id, 8);
    }

    #[test]
    fn reply_is_forwarded_and_cached() {
        let mut router = DsrRouter::with_neighbors(id(1), ids(&[0, 2]));
        let reply = Packet::route_reply(id(3), id(0), ids(&[0, 1, 2, 3]), 8);

        let outcome = router.process_packet(reply.clone()).unwrap();
        assert_eq!(
            outcome,
            Outcome::Handled(Some(Response::Unicast(id(0), reply)))
        );
        assert_eq!(
            router.cached_route(id(3)),
            Some(ids(&[0, 1, 2, 3]).as_slice())
        );
    }

    #[test]
    fn reply_reaching_the_requester_completes_the_route() {
        let mut router = DsrRouter::with_neighbors(id(0), ids(&[1]));
        let reply = Packet::route_reply(id(3), id(0), ids(&[0, 1, 2, 3]), 8);

        assert_eq!(
            router.process_packet(reply).unwrap(),
            Outcome::Handled(Some(Response::RouteFound(ids(&[0, 1, 2, 3]))))
        );
    }

    #[test]
    fn reply_off_the_path_is_a_fault() {
        let mut router = DsrRouter::with_neighbors(id(7), ids(&[0]));
        let reply = Packet::route_reply(id(3), id(0), ids(&[0, 1, 2, 3]), 8);

        assert_eq!(
            router.process_packet(reply),
            Err(HandlerFault::NotOnPath {
                node: id(7),
                path: ids(&[0, 1, 2, 3])
            })
        );
        assert_eq!(router.state(), RouterState::Idle);
    }

    #[test]
    fn empty_path_is_a_fault() {
        let mut router = DsrRouter::new(id(0));
        let mut request = Packet::route_request(id(1), id(0), vec![], 1);
        request.path.clear();

        assert_eq!(router.process_packet(request), Err(HandlerFault::EmptyPath));
    }

    #[test]
    fn flood_over_a_path_graph() {
        let graph = Graph::from_edges(4, &[(0, 1), (1, 2), (2, 3)]).unwrap();
        let flood = flood(&graph, id(0), id(3));

        assert_eq!(flood.route, Some(ids(&[0, 1, 2, 3])));
        assert_eq!(flood.routes_found, 1);
    }

    #[test]
    fn flood_over_a_single_edge() {
        let graph = Graph::from_edges(2, &[(0, 1)]).unwrap();
        let flood = flood(&graph, id(0), id(1));

        assert_eq!(flood.route, Some(ids(&[0, 1])));
        let requests = flood.sent.iter().filter(|(_, p)| p.is_request()).count();
        let replies = flood.sent.iter().filter(|(_, p)| !p.is_request()).count();
        assert_eq!((requests, replies), (1, 1));
        // Origination, request at 1, reply at 0.
        assert_eq!(flood.steps, 3);
    }

    #[test]
    fn flood_over_random_graphs_is_loop_free() {
        for n in [3, 8, 20, 50] {
            for allow_bridges in [true, false] {
                let graph = generate(n, allow_bridges).unwrap();
                let destination = id(n as u32 - 1);
                let flood = flood(&graph, id(0), destination);

                for (to, packet) in flood.sent.iter().filter(|(_, p)| p.is_request()) {
                    let unique: HashSet<_> = packet.path.iter().collect();
                    assert_eq!(unique.len(), packet.path.len());
                    // Nobody forwards a request to a node already on its path.
                    assert!(!packet.visited(*to));
                }

                assert_eq!(flood.routes_found, 1);
                let route = flood.route.unwrap();
                assert_valid_route(&graph, &route, id(0), destination);
            }
        }
    }

    #[test]
    fn each_node_handles_a_request_at_most_once() {
        // A complete graph maximises duplicate arrivals.
        let edges: Vec<_> = (0..6u32)
            .flat_map(|u| (u + 1..6).map(move |v| (u, v)))
            .collect();
        let graph = Graph::from_edges(6, &edges).unwrap();
        let flood = flood(&graph, id(0), id(5));

        // Origination plus at most one handled request per other node, plus the reply hops.
        let reply_hops = flood.route.as_ref().map_or(0, |route| route.len() - 1);
        assert!(flood.steps <= 1 + 5 + reply_hops);
    }
}
