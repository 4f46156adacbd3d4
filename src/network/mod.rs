//! The network coordinator, running one task per node.

mod actor;

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::RwLock;
use tokio::{runtime::Handle, time::Instant};
use tracing::{debug, info, trace, warn};

use self::actor::{Envelope, NodeHandle};
use crate::{
    config::Config,
    core::{
        id::NodeId,
        packet::Packet,
        traits::{NoopObserver, Observer},
    },
    dsr::DsrRouter,
    error::{Error, InvalidParameter, Result},
    topology::{generate, Graph, GraphInfo},
};

#[derive(Default)]
struct Topology {
    graph: Graph,
    nodes: BTreeMap<NodeId, NodeHandle>,
    // Bumped on every replacement, so a stop racing a rebuild doesn't park stale actors.
    generation: u64,
}

/// The state shared between the coordinator and the node tasks.
pub(crate) struct Shared {
    config: Config,
    observer: Arc<dyn Observer>,
    topology: RwLock<Topology>,
    paused: AtomicBool,
    delay: RwLock<Duration>,
    discovered_route: RwLock<Option<Vec<NodeId>>>,
}

impl Shared {
    pub(crate) fn log(&self, message: &str) {
        self.observer.log(message);
    }

    pub(crate) async fn deliver(&self, from: NodeId, to: NodeId, packet: Packet) {
        let delay = *self.delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.paused.load(Ordering::Acquire) {
            trace!(%from, %to, %packet, "paused, packet dropped");
            return;
        }

        let topology = self.topology.read();
        match topology.nodes.get(&to) {
            Some(node) => node.enqueue(Envelope::Packet(packet)),
            None => trace!(%from, %to, "unknown destination, packet dropped"),
        }
    }

    pub(crate) fn notify_step(&self, packet: &Packet, at_node: NodeId) {
        if !self.paused.load(Ordering::Acquire) {
            self.observer.on_step(packet, at_node);
        }
    }

    pub(crate) fn report_route(&self, path: Vec<NodeId>) {
        *self.discovered_route.write() = Some(path.clone());
        self.observer.on_route_found(&path);
    }
}

fn node_handle(shared: &Arc<Shared>, graph: &Graph, id: NodeId) -> NodeHandle {
    NodeHandle::new(
        DsrRouter::with_neighbors(id, graph.neighbors(id)),
        shared.config.mailbox_capacity,
        shared.config.poll_interval,
        Arc::downgrade(shared),
    )
}

/// A simulated network of DSR nodes.
///
/// Every node runs as its own Tokio task reading a private mailbox; nodes only ever talk through
/// [`Network::deliver`]. The network is cheap to clone, clones share the same nodes and session.
///
/// Typical use:
///
/// 1. [`build_topology`](Network::build_topology) (or [`load_topology`](Network::load_topology)),
/// 2. [`start_all`](Network::start_all),
/// 3. [`begin_discovery`](Network::begin_discovery), and wait for
///    [`Observer::on_route_found`].
#[cfg_attr(doc_cfg, doc(cfg(feature = "sync")))]
#[derive(Clone)]
pub struct Network {
    shared: Arc<Shared>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new(Config::default(), Arc::new(NoopObserver))
    }
}

impl Network {
    /// Creates an empty network reporting to the supplied observer.
    pub fn new(config: Config, observer: Arc<dyn Observer>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                observer,
                topology: RwLock::new(Topology::default()),
                paused: AtomicBool::new(false),
                delay: RwLock::new(config.propagation_delay),
                discovered_route: RwLock::new(None),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    // TOPOLOGY

    /// Generates a random topology of `n` nodes and installs it, replacing the current one.
    ///
    /// The new nodes aren't started. On an invalid `n` the current topology is left untouched.
    pub async fn build_topology(&self, n: usize, allow_bridges: bool) -> Result<GraphInfo> {
        let graph = generate(n, allow_bridges)?;
        let info = self.load_topology(graph).await;

        if !allow_bridges && info.has_bridges {
            warn!(%info, "topology generation incomplete");
            self.shared
                .log("Warning: could not eliminate every bridge, the topology still has bridges");
        }

        Ok(info)
    }

    /// Installs the graph as the topology, stopping and replacing every current node.
    pub async fn load_topology(&self, graph: Graph) -> GraphInfo {
        self.stop_all().await;

        let info = graph.info();
        let nodes = graph
            .nodes()
            .map(|id| (id, node_handle(&self.shared, &graph, id)))
            .collect();

        {
            let mut topology = self.shared.topology.write();
            topology.graph = graph;
            topology.nodes = nodes;
            topology.generation += 1;
        }
        *self.shared.discovered_route.write() = None;

        info!(%info, "topology built");
        self.shared.log(&format!(
            "Created topology with {} nodes and {} edges",
            info.nodes, info.edges
        ));
        self.shared
            .log(&format!("Edge connectivity: {}", info.edge_connectivity));
        self.shared.log(&format!(
            "Bridges: {}",
            if info.has_bridges { "present" } else { "none" }
        ));

        info
    }

    /// Stops every node and clears the topology and the discovered route.
    pub async fn reset(&self) {
        self.stop_all().await;

        {
            let mut topology = self.shared.topology.write();
            topology.graph = Graph::default();
            topology.nodes.clear();
            topology.generation += 1;
        }
        *self.shared.discovered_route.write() = None;

        debug!("network reset");
    }

    /// Returns a copy of the current topology.
    pub fn graph(&self) -> Graph {
        self.shared.topology.read().graph.clone()
    }

    pub fn node_count(&self) -> usize {
        self.shared.topology.read().nodes.len()
    }

    /// Returns the node's neighbors in ascending order, empty if the node doesn't exist.
    pub fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        self.shared.topology.read().graph.neighbors(id).collect()
    }

    // LIFECYCLE

    /// Starts every node that isn't running yet, returning the number of tasks spawned.
    ///
    /// Nodes that are in the middle of being stopped are skipped. Must be called from within a
    /// Tokio runtime.
    pub fn start_all(&self) -> Result<usize> {
        let runtime = Handle::try_current().map_err(|_| Error::RuntimeUnavailable)?;

        let mut topology = self.shared.topology.write();
        let started = topology
            .nodes
            .values_mut()
            .filter(|node| !node.is_running())
            .map(|node| node.start(&runtime))
            .filter(|&spawned| spawned)
            .count();

        debug!(started, "started nodes");

        Ok(started)
    }

    /// Stops every running node, waiting at most [`Config::stop_grace_period`] before aborting the
    /// ones that haven't exited yet.
    ///
    /// Stopped nodes keep their state and can be started again.
    pub async fn stop_all(&self) {
        let (generation, tasks) = {
            let mut topology = self.shared.topology.write();
            let tasks: Vec<_> = topology
                .nodes
                .iter_mut()
                .filter_map(|(&id, node)| node.signal_stop().map(|task| (id, task)))
                .collect();

            (topology.generation, tasks)
        };

        if tasks.is_empty() {
            return;
        }

        let deadline = Instant::now() + self.shared.config.stop_grace_period;
        let mut stopped = Vec::with_capacity(tasks.len());
        for (id, task) in tasks {
            stopped.push((id, actor::join(id, task, deadline).await));
        }

        let mut topology = self.shared.topology.write();
        if topology.generation != generation {
            return;
        }

        let Topology { graph, nodes, .. } = &mut *topology;
        for (id, actor) in stopped {
            let Some(node) = nodes.get_mut(&id) else {
                continue;
            };

            match actor {
                Some(actor) => node.park(actor),
                // The task was lost, start over with a fresh node.
                None => *node = node_handle(&self.shared, graph, id),
            }
        }

        debug!(count = nodes.len(), "stopped nodes");
    }

    /// Returns the number of nodes with a running task.
    pub fn running_nodes(&self) -> usize {
        self.shared
            .topology
            .read()
            .nodes
            .values()
            .filter(|node| node.is_running())
            .count()
    }

    // PROTOCOL

    /// Starts a route discovery from `source` to `destination`.
    ///
    /// Every node forgets its previous session first. Progress is reported through the observer;
    /// a discovery that can't complete simply never reports a route.
    ///
    /// Packets of an earlier discovery that are still in flight aren't cancelled. Since the nodes
    /// forgot which requests they handled, such packets are handled again: a discovery begun
    /// while another one is under way may flood twice and report more than one route.
    pub fn begin_discovery(&self, source: NodeId, destination: NodeId) -> Result<()> {
        let topology = self.shared.topology.read();

        for id in [source, destination] {
            if !topology.nodes.contains_key(&id) {
                self.shared
                    .log("Error: invalid source or destination node");
                return Err(InvalidParameter::UnknownNode(id).into());
            }
        }

        if source == destination {
            self.shared
                .log("Error: source and destination are the same node");
            return Err(InvalidParameter::SameEndpoints(source).into());
        }

        *self.shared.discovered_route.write() = None;

        // Mailboxes are FIFO: every reset lands before any request of the new session.
        for node in topology.nodes.values() {
            node.enqueue(Envelope::Reset);
        }
        if let Some(node) = topology.nodes.get(&source) {
            node.enqueue(Envelope::Discover(destination));
        }

        info!(%source, %destination, "route discovery requested");

        Ok(())
    }

    /// Hands the packet to the destination's mailbox after the propagation delay.
    ///
    /// The delay is spent on the caller's task. Packets are dropped while the network is paused
    /// and when the destination isn't part of the topology.
    pub async fn deliver(&self, from: NodeId, to: NodeId, packet: Packet) {
        self.shared.deliver(from, to, packet).await
    }

    /// Reports a protocol step to the observer, unless the network is paused.
    pub fn notify_step(&self, packet: &Packet, at_node: NodeId) {
        self.shared.notify_step(packet, at_node)
    }

    /// Records the route and reports it to the observer.
    pub fn report_route(&self, path: Vec<NodeId>) {
        self.shared.report_route(path)
    }

    /// Returns the route reported by the last completed discovery, if any.
    pub fn discovered_route(&self) -> Option<Vec<NodeId>> {
        self.shared.discovered_route.read().clone()
    }

    // SESSION

    pub fn delay(&self) -> Duration {
        *self.shared.delay.read()
    }

    /// Sets the propagation delay for deliveries starting from now on.
    pub fn set_delay(&self, delay: Duration) {
        *self.shared.delay.write() = delay;
    }

    /// Sets the propagation delay in seconds, clamping negative values to zero.
    pub fn set_delay_secs(&self, secs: f64) {
        // `f64::max` also maps NaN to zero.
        let delay = Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX);
        self.set_delay(delay);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Pauses or resumes the network. Packets delivered while paused are lost, not replayed.
    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Release);
    }
}
