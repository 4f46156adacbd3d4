//! Random topology generation.

use rand::{
    seq::{IteratorRandom, SliceRandom},
    thread_rng, Rng,
};
use tracing::{debug, warn};

use crate::{
    config::{MAX_NODES, MIN_NODES},
    core::id::NodeId,
    error::InvalidParameter,
    topology::graph::Graph,
};

/// Returns the highest edge connectivity a generated topology of `n` nodes may have.
///
/// The nominal ceiling is `(n - 1) / 2`, raised to what the requested kind of graph needs at
/// minimum: 1 for any connected graph, 2 for one without bridges.
pub fn connectivity_ceiling(n: usize, allow_bridges: bool) -> usize {
    let floor = if allow_bridges { 1 } else { 2 };
    (n.saturating_sub(1) / 2).max(floor)
}

/// Returns the number of random edge candidates each generation phase may draw.
pub fn attempt_budget(n: usize) -> usize {
    n * n * 2
}

/// Generates a random connected topology over `n` nodes labeled `[0, n)`.
///
/// The graph starts as a random spanning tree. When `allow_bridges` is `false`, random edges are
/// added until no bridge is left. Further edges are then added as long as the edge connectivity
/// stays within [`connectivity_ceiling`], up to `2n` edges in total.
///
/// Each phase draws at most [`attempt_budget`] candidate edges. If bridges remain once the budget
/// is spent the best-effort graph is still returned; callers can check
/// [`Graph::has_bridges`] and regenerate if needed.
pub fn generate(n: usize, allow_bridges: bool) -> Result<Graph, InvalidParameter> {
    if !(MIN_NODES..=MAX_NODES).contains(&n) {
        return Err(InvalidParameter::NodeCount(n));
    }

    let mut rng = thread_rng();
    let ceiling = connectivity_ceiling(n, allow_bridges);
    let budget = attempt_budget(n);

    let mut graph = spanning_tree(n, &mut rng);

    if !allow_bridges {
        let mut attempts = 0;
        while graph.has_bridges() && attempts < budget {
            attempts += 1;
            match random_non_edge(&graph, &mut rng) {
                Some((u, v)) => graph.add_edge(u, v),
                // Complete graph.
                None => break,
            };
        }

        if graph.has_bridges() {
            warn!(
                n,
                bridges = graph.bridges().len(),
                "bridge elimination ran out of attempts"
            );
        }
    }

    let max_edges = 2 * n;
    let mut connectivity = graph.edge_connectivity();
    let mut attempts = 0;

    while connectivity < ceiling && graph.edge_count() < max_edges && attempts < budget {
        attempts += 1;

        let Some((u, v)) = random_non_edge(&graph, &mut rng) else {
            break;
        };

        let mut candidate = graph.clone();
        candidate.add_edge(u, v);

        // Connectivity never exceeds the minimum degree: skip the min-cut while that bound is
        // still below the ceiling.
        let candidate_connectivity = if candidate.min_degree() < ceiling {
            connectivity.min(candidate.min_degree())
        } else {
            candidate.edge_connectivity()
        };
        if candidate_connectivity > ceiling {
            continue;
        }

        if !allow_bridges && introduces_bridge(&graph, &candidate) {
            continue;
        }

        graph = candidate;
        connectivity = candidate_connectivity;
    }

    debug!(
        n,
        edges = graph.edge_count(),
        connectivity = graph.edge_connectivity(),
        ceiling,
        "generated topology"
    );

    Ok(graph)
}

// Shuffles the nodes and attaches each one to a uniformly chosen node earlier in the order.
fn spanning_tree<R: Rng>(n: usize, rng: &mut R) -> Graph {
    let mut graph = Graph::new(n);
    let mut order: Vec<NodeId> = graph.nodes().collect();
    order.shuffle(rng);

    for i in 1..order.len() {
        let earlier = order[rng.gen_range(0..i)];
        graph.add_edge(order[i], earlier);
    }

    graph
}

// Picks a uniformly random pair of distinct, non-adjacent nodes, `None` if the graph is complete.
fn random_non_edge<R: Rng>(graph: &Graph, rng: &mut R) -> Option<(NodeId, NodeId)> {
    graph
        .nodes()
        .flat_map(|u| graph.nodes().filter(move |&v| u < v).map(move |v| (u, v)))
        .filter(|&(u, v)| !graph.has_edge(u, v))
        .choose(rng)
}

fn introduces_bridge(before: &Graph, after: &Graph) -> bool {
    let existing = before.bridges();
    after
        .bridges()
        .iter()
        .any(|bridge| !existing.contains(bridge))
}
