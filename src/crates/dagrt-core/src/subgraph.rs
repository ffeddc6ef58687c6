//! Pure subgraph selectors: reduced views of the graph for a normal run, a
//! resolved switch, a one-of candidate, or a recurrence loop.
//!
//! Every selector bottoms out in [`connected_subgraph`], the union of all
//! simple paths between a source and a destination over some filtered view
//! of the full graph, regardless of which construct is asking for a reduced
//! view.

use crate::graph::{Graph, NodeId};
use std::collections::HashSet;

/// A reduced view plus the marker flags the scheduler needs to interpret it
/// (is this a one-of branch? nested inside another one-of? a recurrence
/// iteration?).
#[derive(Debug, Clone)]
pub struct ReducedGraph {
    pub graph: Graph,
    pub is_recurrent: bool,
    pub is_one_of: bool,
    pub is_nested_one_of: bool,
}

impl ReducedGraph {
    fn plain(graph: Graph) -> Self {
        Self { graph, is_recurrent: false, is_one_of: false, is_nested_one_of: false }
    }
}

/// Strip inactive case-branch edges (not yet chosen by any switch) and
/// one-of-child nodes not in `allowed` (not yet selected by their head).
fn base_filtered(graph: &Graph, allowed_oneof_children: &HashSet<NodeId>) -> Graph {
    let keep: HashSet<NodeId> = graph
        .nodes()
        .filter(|id| {
            let attrs = graph.attrs(id).expect("node listed without attrs");
            !attrs.is_oneof_child || allowed_oneof_children.contains(id.as_str())
        })
        .cloned()
        .collect();

    let mut filtered = graph.induce(&keep);
    // `induce` copies all edges between kept endpoints; drop the inactive
    // case-branch ones separately since `induce` has no edge predicate.
    let live_edges: Vec<_> = filtered
        .edges()
        .filter(|e| e.attrs.case_branch.is_none())
        .cloned()
        .collect();
    let mut rebuilt = Graph::new();
    for id in filtered.nodes() {
        rebuilt.add_node_with_attrs(id.clone(), filtered.attrs(id).cloned().unwrap());
    }
    for e in live_edges {
        rebuilt.add_edge(e.from, e.to, e.attrs);
    }
    std::mem::swap(&mut filtered, &mut rebuilt);
    filtered
}

/// Union of nodes on all simple paths from `source` to `dest`, induced as a
/// subgraph. A single-node graph (`source == dest`) short-circuits.
pub fn connected_subgraph(graph: &Graph, source: &str, dest: &str) -> Graph {
    if source == dest {
        let mut keep = HashSet::new();
        keep.insert(source.to_string());
        return graph.induce(&keep);
    }

    let mut kept: HashSet<NodeId> = HashSet::new();
    let mut path: Vec<NodeId> = vec![source.to_string()];
    let mut on_path: HashSet<NodeId> = path.iter().cloned().collect();

    fn visit(
        graph: &Graph,
        current: &str,
        dest: &str,
        path: &mut Vec<NodeId>,
        on_path: &mut HashSet<NodeId>,
        kept: &mut HashSet<NodeId>,
    ) {
        for edge in graph.successors(current) {
            if edge.to == dest {
                kept.extend(path.iter().cloned());
                kept.insert(dest.to_string());
                continue;
            }
            if on_path.contains(&edge.to) {
                continue;
            }
            path.push(edge.to.clone());
            on_path.insert(edge.to.clone());
            visit(graph, &edge.to, dest, path, on_path, kept);
            on_path.remove(&edge.to);
            path.pop();
        }
    }

    visit(graph, source, dest, &mut path, &mut on_path, &mut kept);
    graph.induce(&kept)
}

/// Reduced graph for a normal run (or for targeting a resolved switch
/// branch, which uses the same filters from the pipeline's input node).
pub fn reduced_for_run(graph: &Graph, source: &str, dest: &str) -> Graph {
    let filtered = base_filtered(graph, &HashSet::new());
    connected_subgraph(&filtered, source, dest)
}

/// Reduced graph targeting a resolved switch's chosen branch.
pub fn reduced_for_switch(graph: &Graph, pipeline_input: &str, chosen_branch: &str) -> Graph {
    reduced_for_run(graph, pipeline_input, chosen_branch)
}

/// Reduced graph covering one one-of candidate's ancestry, from `source` to
/// `candidate`. The candidate is let through the one-of-child filter so its
/// own ancestry (which may include other, unrelated one-of heads) becomes
/// reachable.
pub fn reduced_for_one_of(graph: &Graph, source: &str, candidate: &str, nested: bool) -> ReducedGraph {
    let mut allowed = HashSet::new();
    allowed.insert(candidate.to_string());
    let filtered = base_filtered(graph, &allowed);
    let g = connected_subgraph(&filtered, source, candidate);
    ReducedGraph { graph: g, is_recurrent: false, is_one_of: true, is_nested_one_of: nested }
}

/// Reduced graph covering the recurrent subgraph's nodes, from `start` to
/// `dest`.
pub fn reduced_for_recurrence(graph: &Graph, start: &str, dest: &str) -> ReducedGraph {
    let filtered = base_filtered(graph, &HashSet::new());
    let g = connected_subgraph(&filtered, start, dest);
    ReducedGraph { graph: g, is_recurrent: true, is_one_of: false, is_nested_one_of: false }
}

pub fn plain(graph: Graph) -> ReducedGraph {
    ReducedGraph::plain(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeAttrs;

    fn diamond() -> Graph {
        let mut g = Graph::new();
        for n in ["a", "b", "c", "d"] {
            g.add_node(n);
        }
        g.add_edge("a", "b", EdgeAttrs::default());
        g.add_edge("a", "c", EdgeAttrs::default());
        g.add_edge("b", "d", EdgeAttrs::default());
        g.add_edge("c", "d", EdgeAttrs::default());
        g
    }

    #[test]
    fn connected_subgraph_keeps_all_simple_paths() {
        let g = diamond();
        let sub = connected_subgraph(&g, "a", "d");
        assert_eq!(sub.node_count(), 4);
    }

    #[test]
    fn connected_subgraph_drops_unrelated_branches() {
        let mut g = diamond();
        g.add_node("dead_end");
        g.add_edge("a", "dead_end", EdgeAttrs::default());
        let sub = connected_subgraph(&g, "a", "d");
        assert!(!sub.contains("dead_end"));
    }

    #[test]
    fn base_filtered_strips_inactive_case_branches() {
        let mut g = Graph::new();
        g.add_node("decider");
        g.add_node("branch_a");
        g.add_node("branch_b");
        g.add_node("switch_node");
        g.add_edge("decider", "switch_node", EdgeAttrs { is_switch: true, ..Default::default() });
        g.add_edge("branch_a", "switch_node", EdgeAttrs { case_branch: Some("a".into()), ..Default::default() });
        g.add_edge("branch_b", "switch_node", EdgeAttrs { case_branch: Some("b".into()), ..Default::default() });

        let filtered = base_filtered(&g, &HashSet::new());
        assert_eq!(filtered.predecessors("switch_node").count(), 1);
    }

    #[test]
    fn reduced_for_one_of_admits_the_chosen_candidate() {
        let mut g = Graph::new();
        g.add_node("input");
        g.add_node_with_attrs(
            "cand",
            crate::graph::NodeAttrs { is_oneof_child: true, ..Default::default() },
        );
        g.add_edge("input", "cand", EdgeAttrs::default());
        let reduced = reduced_for_one_of(&g, "input", "cand", false);
        assert!(reduced.graph.contains("cand"));
        assert!(reduced.is_one_of);
    }
}
