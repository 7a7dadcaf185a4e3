//! Directed reference graph over named-region indices.
//!
//! Built during the reference pass as two parallel bitset matrices (forward
//! and reverse adjacency) sized to the named-region count, then converted
//! once into a petgraph `DiGraph` for traversal and reachability queries
//! (import-cycle detection, dependency ordering).

use fixedbitset::FixedBitSet;
use petgraph::Direction;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;

/// Accumulates "A references B" edges as bitset rows during the walk.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    forward: Vec<FixedBitSet>,
    reverse: Vec<FixedBitSet>,
}

impl GraphBuilder {
    /// A builder for a graph over `node_count` named regions.
    pub fn new(node_count: usize) -> Self {
        Self {
            forward: vec![FixedBitSet::with_capacity(node_count); node_count],
            reverse: vec![FixedBitSet::with_capacity(node_count); node_count],
        }
    }

    /// Record that the named region `from` references `to`.
    pub fn add_edge(&mut self, from: u32, to: u32) {
        self.forward[from as usize].insert(to as usize);
        self.reverse[to as usize].insert(from as usize);
    }

    /// Convert the matrices into the final directed graph.
    pub fn build(self) -> ReferenceGraph {
        let node_count = self.forward.len();
        let mut graph = DiGraph::with_capacity(node_count, 0);
        for i in 0..node_count {
            graph.add_node(i as u32);
        }
        for (from, row) in self.forward.iter().enumerate() {
            for to in row.ones() {
                debug_assert!(self.reverse[to].contains(from));
                graph.add_edge(NodeIndex::new(from), NodeIndex::new(to), ());
            }
        }
        ReferenceGraph { graph }
    }
}

/// Directed graph of "references" edges among named regions.
///
/// Nodes are named-region indices (node `i` is the canonical region with
/// index `i` in the owning collection).
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    graph: DiGraph<u32, ()>,
}

impl ReferenceGraph {
    /// Rebuild a graph from its serialized node count and edge list.
    pub(crate) fn from_edges(node_count: u32, edges: &[(u32, u32)]) -> Self {
        let mut builder = GraphBuilder::new(node_count as usize);
        for &(from, to) in edges {
            builder.add_edge(from, to);
        }
        builder.build()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn has_edge(&self, from: u32, to: u32) -> bool {
        self.graph
            .find_edge(NodeIndex::new(from as usize), NodeIndex::new(to as usize))
            .is_some()
    }

    /// Regions directly referenced by `from`.
    pub fn references_from(&self, from: u32) -> Vec<u32> {
        self.neighbors(from, Direction::Outgoing)
    }

    /// Regions that directly reference `to`.
    pub fn referencers_of(&self, to: u32) -> Vec<u32> {
        self.neighbors(to, Direction::Incoming)
    }

    /// Everything reachable from `from` along reference edges, excluding
    /// `from` itself unless it lies on a cycle back to itself.
    pub fn closure_of(&self, from: u32) -> Vec<u32> {
        let start = NodeIndex::new(from as usize);
        let mut reached = Vec::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(node) = dfs.next(&self.graph) {
            if node != start {
                reached.push(node.index() as u32);
            }
        }
        // A self-loop or cycle through `from` puts it in its own closure.
        if self
            .references_from(from)
            .iter()
            .any(|&n| n == from || self.closure_contains(n, from))
        {
            reached.push(from);
        }
        reached.sort_unstable();
        reached
    }

    /// Everything that can reach `to`, excluding `to` itself unless it lies
    /// on a cycle.
    pub fn reverse_closure_of(&self, to: u32) -> Vec<u32> {
        let target = NodeIndex::new(to as usize);
        let reversed = petgraph::visit::Reversed(&self.graph);
        let mut reached = Vec::new();
        let mut dfs = Dfs::new(&reversed, target);
        while let Some(node) = dfs.next(&reversed) {
            if node != target {
                reached.push(node.index() as u32);
            }
        }
        reached.sort_unstable();
        reached
    }

    /// True when the graph contains at least one reference cycle.
    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Dependency order: every region appears after everything it
    /// references. `None` when the graph is cyclic.
    pub fn topological_order(&self) -> Option<Vec<u32>> {
        let order = toposort(&self.graph, None).ok()?;
        // toposort yields referencers before referees; dependency order is
        // the reverse.
        Some(order.iter().rev().map(|n| n.index() as u32).collect())
    }

    /// All edges as (from, to) pairs, for the external form.
    pub fn edges(&self) -> Vec<(u32, u32)> {
        let mut edges: Vec<(u32, u32)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (a.index() as u32, b.index() as u32))
            .collect();
        edges.sort_unstable();
        edges
    }

    fn neighbors(&self, node: u32, dir: Direction) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .graph
            .neighbors_directed(NodeIndex::new(node as usize), dir)
            .map(|n| n.index() as u32)
            .collect();
        out.sort_unstable();
        out
    }

    fn closure_contains(&self, from: u32, needle: u32) -> bool {
        let start = NodeIndex::new(from as usize);
        let target = NodeIndex::new(needle as usize);
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(node) = dfs.next(&self.graph) {
            if node == target {
                return true;
            }
        }
        false
    }
}

impl PartialEq for ReferenceGraph {
    fn eq(&self, other: &Self) -> bool {
        self.node_count() == other.node_count() && self.edges() == other.edges()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(n: usize, edges: &[(u32, u32)]) -> ReferenceGraph {
        let mut builder = GraphBuilder::new(n);
        for &(a, b) in edges {
            builder.add_edge(a, b);
        }
        builder.build()
    }

    #[test]
    fn test_edges_and_neighbors() {
        let g = graph(3, &[(0, 1), (0, 2), (1, 2)]);
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 3);
        assert!(g.has_edge(0, 1));
        assert!(!g.has_edge(1, 0));
        assert_eq!(g.references_from(0), vec![1, 2]);
        assert_eq!(g.referencers_of(2), vec![0, 1]);
    }

    #[test]
    fn test_closures() {
        let g = graph(4, &[(0, 1), (1, 2)]);
        assert_eq!(g.closure_of(0), vec![1, 2]);
        assert_eq!(g.closure_of(2), Vec::<u32>::new());
        assert_eq!(g.reverse_closure_of(2), vec![0, 1]);
        assert_eq!(g.reverse_closure_of(3), Vec::<u32>::new());
    }

    #[test]
    fn test_cycle_detection_and_topo() {
        let acyclic = graph(3, &[(0, 1), (1, 2)]);
        assert!(!acyclic.is_cyclic());
        let order = acyclic.topological_order().unwrap();
        // 2 depends on nothing, 0 depends (transitively) on everything.
        assert_eq!(order, vec![2, 1, 0]);

        let cyclic = graph(2, &[(0, 1), (1, 0)]);
        assert!(cyclic.is_cyclic());
        assert!(cyclic.topological_order().is_none());
        // Cycle members appear in their own closure.
        assert!(cyclic.closure_of(0).contains(&0));
    }

    #[test]
    fn test_round_trip_equality() {
        let g = graph(3, &[(0, 1), (2, 0)]);
        let rebuilt = ReferenceGraph::from_edges(3, &g.edges());
        assert_eq!(g, rebuilt);
    }
}
