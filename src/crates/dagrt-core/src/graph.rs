//! The immutable graph: node/edge attributes, invariant validation and a
//! stable topological sort.

use crate::error::BuildError;
use crate::node::NodeTable;
use std::collections::{BTreeSet, HashMap, HashSet};

pub type NodeId = String;

/// Per-node attributes describing its role in switch/one-of/recurrence
/// constructs.
#[derive(Debug, Clone, Default)]
pub struct NodeAttrs {
    pub is_switch: bool,
    pub is_oneof_head: bool,
    pub is_oneof_child: bool,
    pub oneof_nodes: Vec<NodeId>,
    pub start_node: Option<NodeId>,
    pub max_iterations: Option<usize>,
}

/// Per-edge attributes describing argument binding and conditional wiring.
#[derive(Debug, Clone, Default)]
pub struct EdgeAttrs {
    pub kwarg_name: Option<String>,
    pub is_switch: bool,
    pub case_branch: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub attrs: EdgeAttrs,
}

/// Immutable directed acyclic digraph over `NodeId`s.
///
/// Cloning a `Graph` is cheap-ish (it's plain owned data, no shared
/// interior); reduced views produced by `crate::subgraph` are themselves
/// ordinary `Graph`s, not lazy filters, since the graphs in this domain are
/// small and it keeps the selector functions pure and easy to test.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<NodeId>,
    attrs: HashMap<NodeId, NodeAttrs>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<NodeId>) {
        self.add_node_with_attrs(id, NodeAttrs::default());
    }

    pub fn add_node_with_attrs(&mut self, id: impl Into<NodeId>, attrs: NodeAttrs) {
        let id = id.into();
        if !self.attrs.contains_key(&id) {
            self.nodes.push(id.clone());
        }
        self.attrs.insert(id, attrs);
    }

    pub fn add_edge(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>, attrs: EdgeAttrs) {
        self.edges.push(Edge { from: from.into(), to: to.into(), attrs });
    }

    pub fn contains(&self, id: &str) -> bool {
        self.attrs.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    pub fn attrs(&self, id: &str) -> Option<&NodeAttrs> {
        self.attrs.get(id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn predecessors(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.to == id)
    }

    pub fn successors(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.from == id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Induce a subgraph on exactly `keep`, dropping edges with either
    /// endpoint outside the set.
    pub fn induce(&self, keep: &HashSet<NodeId>) -> Graph {
        let mut g = Graph::new();
        for id in &self.nodes {
            if keep.contains(id) {
                g.add_node_with_attrs(id.clone(), self.attrs[id].clone());
            }
        }
        for e in &self.edges {
            if keep.contains(&e.from) && keep.contains(&e.to) {
                g.add_edge(e.from.clone(), e.to.clone(), e.attrs.clone());
            }
        }
        g
    }

    /// Kahn's algorithm over a min-heap of ready ids so ties break by
    /// lexicographic `NodeId`, per the tie-break requirement on subgraph
    /// selectors.
    pub fn topo_sort(&self) -> Result<Vec<NodeId>, BuildError> {
        let mut indegree: HashMap<&str, usize> = self.nodes.iter().map(|n| (n.as_str(), 0)).collect();
        for e in &self.edges {
            if let Some(c) = indegree.get_mut(e.to.as_str()) {
                *c += 1;
            }
        }

        let mut ready: BTreeSet<&str> =
            indegree.iter().filter(|(_, &c)| c == 0).map(|(n, _)| *n).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(&id) = ready.iter().next() {
            ready.remove(id);
            order.push(id.to_string());
            for e in self.successors(id) {
                if let Some(c) = indegree.get_mut(e.to.as_str()) {
                    *c -= 1;
                    if *c == 0 {
                        ready.insert(self.nodes.iter().find(|n| n.as_str() == e.to).unwrap().as_str());
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(BuildError::Cycle);
        }
        Ok(order)
    }

    /// Validate the graph's structural invariants (decider/case wiring,
    /// one-of/recurrence attributes, node-table completeness, output
    /// reachability) against a node table and a chosen input/output pair.
    pub fn validate(&self, table: &NodeTable, input_node: &str, output_node: &str) -> Result<(), BuildError> {
        self.topo_sort()?;

        for id in &self.nodes {
            let attrs = &self.attrs[id];
            if attrs.is_switch || attrs.is_oneof_head {
                continue;
            }
            if !table.contains_key(id) {
                return Err(BuildError::MissingNode(id.clone()));
            }
        }

        for id in &self.nodes {
            let attrs = &self.attrs[id];
            if attrs.is_switch {
                let mut deciders = 0;
                let mut labels = HashSet::new();
                for e in self.predecessors(id) {
                    if e.attrs.is_switch {
                        deciders += 1;
                    } else if let Some(label) = &e.attrs.case_branch {
                        if !labels.insert(label.clone()) {
                            return Err(BuildError::DuplicateCaseLabel(id.clone(), label.clone()));
                        }
                    }
                }
                if deciders != 1 {
                    return Err(BuildError::MissingDecider(id.clone()));
                }
            }

            if attrs.is_oneof_head && attrs.oneof_nodes.is_empty() {
                return Err(BuildError::EmptyOneOf(id.clone()));
            }

            if attrs.start_node.is_some() || attrs.max_iterations.is_some() {
                let start = attrs.start_node.clone().ok_or_else(|| BuildError::MissingStartNode(id.clone()))?;
                if !self.contains(&start) {
                    return Err(BuildError::MissingStartNode(id.clone()));
                }
                if attrs.max_iterations == Some(0) {
                    return Err(BuildError::ZeroIterations(id.clone()));
                }
            }
        }

        if !self.reachable(input_node, output_node) {
            return Err(BuildError::OutputUnreachable(output_node.to_string(), input_node.to_string()));
        }

        Ok(())
    }

    fn reachable(&self, source: &str, dest: &str) -> bool {
        if source == dest {
            return self.contains(source);
        }
        let mut seen = HashSet::new();
        let mut stack = vec![source.to_string()];
        while let Some(n) = stack.pop() {
            if n == dest {
                return true;
            }
            if !seen.insert(n.clone()) {
                continue;
            }
            for e in self.successors(&n) {
                stack.push(e.to.clone());
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> Graph {
        let mut g = Graph::new();
        g.add_node("a");
        g.add_node("b");
        g.add_node("c");
        g.add_edge("a", "b", EdgeAttrs { kwarg_name: Some("x".into()), ..Default::default() });
        g.add_edge("b", "c", EdgeAttrs { kwarg_name: Some("x".into()), ..Default::default() });
        g
    }

    #[test]
    fn topo_sort_is_stable_under_ties() {
        let mut g = Graph::new();
        g.add_node("c");
        g.add_node("b");
        g.add_node("a");
        assert_eq!(g.topo_sort().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn topo_sort_respects_edges() {
        let g = linear();
        assert_eq!(g.topo_sort().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn topo_sort_detects_cycles() {
        let mut g = Graph::new();
        g.add_node("a");
        g.add_node("b");
        g.add_edge("a", "b", EdgeAttrs::default());
        g.add_edge("b", "a", EdgeAttrs::default());
        assert!(matches!(g.topo_sort(), Err(BuildError::Cycle)));
    }

    #[test]
    fn induce_drops_edges_with_missing_endpoint() {
        let g = linear();
        let mut keep = HashSet::new();
        keep.insert("a".to_string());
        keep.insert("c".to_string());
        let sub = g.induce(&keep);
        assert_eq!(sub.node_count(), 2);
        assert_eq!(sub.edges().count(), 0);
    }

    #[test]
    fn reachable_detects_disconnected_output() {
        let mut g = Graph::new();
        g.add_node("a");
        g.add_node("b");
        assert!(!g.reachable("a", "b"));
    }
}
