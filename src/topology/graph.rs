//! Simple undirected graphs over `[0, N)` labeled nodes.

use std::{collections::BTreeSet, fmt};

use crate::{core::id::NodeId, error::InvalidParameter};

/// Summary figures for a topology.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphInfo {
    pub nodes: usize,
    pub edges: usize,
    pub is_connected: bool,
    pub avg_degree: f64,
    pub has_bridges: bool,
    pub edge_connectivity: usize,
}

impl fmt::Display for GraphInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes, {} edges, edge connectivity {}, {}",
            self.nodes,
            self.edges,
            self.edge_connectivity,
            if self.has_bridges {
                "has bridges"
            } else {
                "no bridges"
            }
        )
    }
}

/// A simple undirected graph: no self-loops, no parallel edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    // Neighbor sets indexed by node; ordered so iteration is stable.
    adjacency: Vec<BTreeSet<NodeId>>,
    edge_count: usize,
}

impl Graph {
    /// Creates a graph with `n` nodes and no edges.
    pub fn new(n: usize) -> Self {
        Self {
            adjacency: vec![BTreeSet::new(); n],
            edge_count: 0,
        }
    }

    /// Creates a graph with `n` nodes from an edge list.
    ///
    /// Duplicate edges are ignored; self-loops and edges to nodes outside `[0, n)` are rejected.
    pub fn from_edges(n: usize, edges: &[(u32, u32)]) -> Result<Self, InvalidParameter> {
        let mut graph = Self::new(n);

        for &(u, v) in edges {
            let (u, v) = (NodeId::new(u), NodeId::new(v));
            for id in [u, v] {
                if !graph.contains(id) {
                    return Err(InvalidParameter::UnknownNode(id));
                }
            }
            if u == v {
                return Err(InvalidParameter::SameEndpoints(u));
            }

            graph.add_edge(u, v);
        }

        Ok(graph)
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Returns `true` if the node is part of the graph.
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.adjacency.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.adjacency.len()).map(|i| NodeId::new(i as u32))
    }

    /// Returns the node's neighbors in ascending order, empty if the node doesn't exist.
    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency.get(id.index()).into_iter().flatten().copied()
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.adjacency.get(id.index()).map_or(0, BTreeSet::len)
    }

    pub fn min_degree(&self) -> usize {
        self.adjacency.iter().map(BTreeSet::len).min().unwrap_or(0)
    }

    pub fn has_edge(&self, u: NodeId, v: NodeId) -> bool {
        self.adjacency
            .get(u.index())
            .map_or(false, |neighbors| neighbors.contains(&v))
    }

    /// Inserts the undirected edge `{u, v}`, returning `false` if it would be a self-loop, touches
    /// a node outside the graph, or already exists.
    pub fn add_edge(&mut self, u: NodeId, v: NodeId) -> bool {
        if u == v || !self.contains(u) || !self.contains(v) || self.has_edge(u, v) {
            return false;
        }

        self.adjacency[u.index()].insert(v);
        self.adjacency[v.index()].insert(u);
        self.edge_count += 1;

        true
    }

    /// Returns every edge once, as `(u, v)` with `u < v`, in ascending order.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes()
            .flat_map(|u| self.neighbors(u).filter(move |&v| u < v).map(move |v| (u, v)))
            .collect()
    }

    /// Returns `true` if every node can reach every other. A graph without nodes is not
    /// considered connected.
    pub fn is_connected(&self) -> bool {
        let n = self.node_count();
        if n == 0 {
            return false;
        }

        let mut visited = vec![false; n];
        let mut stack = vec![0];
        visited[0] = true;
        let mut reached = 1;

        while let Some(u) = stack.pop() {
            for v in &self.adjacency[u] {
                if !visited[v.index()] {
                    visited[v.index()] = true;
                    reached += 1;
                    stack.push(v.index());
                }
            }
        }

        reached == n
    }

    /// Returns the edges whose removal would disconnect their component, as `(u, v)` with `u < v`.
    pub fn bridges(&self) -> Vec<(NodeId, NodeId)> {
        // Iterative DFS low-link: an edge (parent, u) of the DFS tree is a bridge when nothing in
        // u's subtree reaches back to parent or above.
        const UNVISITED: usize = usize::MAX;

        let n = self.node_count();
        let adjacency: Vec<Vec<usize>> = self
            .adjacency
            .iter()
            .map(|neighbors| neighbors.iter().map(NodeId::index).collect())
            .collect();

        let mut discovered = vec![UNVISITED; n];
        let mut low = vec![0; n];
        let mut timer = 0;
        let mut bridges = vec![];

        for root in 0..n {
            if discovered[root] != UNVISITED {
                continue;
            }

            discovered[root] = timer;
            low[root] = timer;
            timer += 1;

            // (node, parent, index of the next neighbor to explore)
            let mut stack = vec![(root, UNVISITED, 0)];

            while let Some(frame) = stack.last_mut() {
                let (u, parent) = (frame.0, frame.1);

                if let Some(&v) = adjacency[u].get(frame.2) {
                    frame.2 += 1;

                    // No parallel edges, so skipping the parent skips exactly the tree edge.
                    if v == parent {
                        continue;
                    }

                    if discovered[v] == UNVISITED {
                        discovered[v] = timer;
                        low[v] = timer;
                        timer += 1;
                        stack.push((v, u, 0));
                    } else {
                        low[u] = low[u].min(discovered[v]);
                    }
                } else {
                    stack.pop();

                    if parent != UNVISITED {
                        low[parent] = low[parent].min(low[u]);
                        if low[u] > discovered[parent] {
                            let (a, b) = (parent.min(u), parent.max(u));
                            bridges.push((NodeId::new(a as u32), NodeId::new(b as u32)));
                        }
                    }
                }
            }
        }

        bridges.sort_unstable();
        bridges
    }

    pub fn has_bridges(&self) -> bool {
        !self.bridges().is_empty()
    }

    /// Returns the global edge connectivity: the minimum number of edges whose removal
    /// disconnects the graph. Zero for disconnected graphs and graphs with fewer than two nodes.
    pub fn edge_connectivity(&self) -> usize {
        let n = self.node_count();
        if n < 2 || !self.is_connected() {
            return 0;
        }

        // Stoer-Wagner minimum cut with unit edge weights. Merged vertices accumulate weights in
        // the row and column of the surviving representative.
        let mut weights = vec![vec![0usize; n]; n];
        for (u, v) in self.edges() {
            weights[u.index()][v.index()] = 1;
            weights[v.index()][u.index()] = 1;
        }

        let mut active: Vec<usize> = (0..n).collect();
        let mut best = usize::MAX;

        while active.len() > 1 {
            let m = active.len();
            let mut added = vec![false; m];
            let mut attachment = vec![0usize; m];
            let mut previous = 0;

            for step in 0..m {
                let Some(selected) = (0..m)
                    .filter(|&j| !added[j])
                    .max_by_key(|&j| attachment[j])
                else {
                    break;
                };
                added[selected] = true;

                if step + 1 == m {
                    // Cut of the phase: separates the last added vertex from the rest.
                    best = best.min(attachment[selected]);

                    let (s, t) = (active[previous], active[selected]);
                    for k in 0..n {
                        weights[s][k] += weights[t][k];
                        weights[k][s] = weights[s][k];
                    }
                    active.remove(selected);
                } else {
                    previous = selected;
                    let from = active[selected];
                    for j in 0..m {
                        if !added[j] {
                            attachment[j] += weights[from][active[j]];
                        }
                    }
                }
            }
        }

        best
    }

    /// Collects the summary figures for the graph.
    pub fn info(&self) -> GraphInfo {
        let nodes = self.node_count();

        GraphInfo {
            nodes,
            edges: self.edge_count,
            is_connected: self.is_connected(),
            avg_degree: if nodes > 0 {
                (2 * self.edge_count) as f64 / nodes as f64
            } else {
                0.0
            },
            // Two nodes joined by their only edge aren't reported as bridged.
            has_bridges: nodes > 2 && self.has_bridges(),
            edge_connectivity: self.edge_connectivity(),
        }
    }
}
