//! A small fluent builder for assembling a `Graph` + `NodeTable` by hand:
//! nodes, plain dependency edges, and the switch/one-of/recurrent wiring
//! constructs. Produces a validated `(Graph, NodeTable)` pair, which is all
//! the scheduler consumes.

use crate::error::BuildError;
use crate::graph::{EdgeAttrs, Graph, NodeAttrs, NodeId};
use crate::node::{NodeDescriptor, NodeTable};

#[derive(Default)]
pub struct GraphBuilder {
    graph: Graph,
    table: NodeTable,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node's descriptor (callable, retry policy, tags). Must be
    /// called once per node before it participates in any edge.
    pub fn node(mut self, descriptor: NodeDescriptor) -> Self {
        let id = descriptor.id.clone();
        self.graph.add_node(id.clone());
        self.table.insert(id, descriptor);
        self
    }

    /// A plain dependency edge: `consumer`'s `kwarg` is bound to `producer`'s
    /// result.
    pub fn edge(mut self, producer: impl Into<NodeId>, kwarg: impl Into<String>, consumer: impl Into<NodeId>) -> Self {
        self.graph.add_edge(
            producer,
            consumer,
            EdgeAttrs { kwarg_name: Some(kwarg.into()), ..Default::default() },
        );
        self
    }

    /// Declare `switch_node` as a switch head: `decider` produces the case
    /// label, and `cases` lists `(label, producer)` pairs whose value is
    /// substituted for the chosen label.
    pub fn switch(
        mut self,
        switch_node: impl Into<NodeId>,
        decider: impl Into<NodeId>,
        cases: Vec<(String, NodeId)>,
    ) -> Self {
        let switch_node = switch_node.into();
        self.graph.add_node_with_attrs(switch_node.clone(), NodeAttrs { is_switch: true, ..Default::default() });
        self.graph.add_edge(decider, switch_node.clone(), EdgeAttrs { is_switch: true, ..Default::default() });
        for (label, producer) in cases {
            self.graph.add_edge(
                producer,
                switch_node.clone(),
                EdgeAttrs { case_branch: Some(label), ..Default::default() },
            );
        }
        self
    }

    /// Declare `head_node` as a one-of head over an ordered, non-empty
    /// `candidates` list, whose first successful result is bound to
    /// `consumer`'s `kwarg`.
    pub fn one_of(
        mut self,
        head_node: impl Into<NodeId>,
        candidates: Vec<NodeId>,
        consumer: impl Into<NodeId>,
        kwarg: impl Into<String>,
    ) -> Self {
        let head_node = head_node.into();
        self.graph.add_node_with_attrs(
            head_node.clone(),
            NodeAttrs { is_oneof_head: true, oneof_nodes: candidates.clone(), ..Default::default() },
        );
        for c in &candidates {
            let mut attrs = self.graph.attrs(c).cloned().unwrap_or_default();
            attrs.is_oneof_child = true;
            self.graph.add_node_with_attrs(c.clone(), attrs);
        }
        self.graph.add_edge(
            head_node.clone(),
            consumer,
            EdgeAttrs { kwarg_name: Some(kwarg.into()), ..Default::default() },
        );
        self
    }

    /// Mark `dest` as the destination of a recurrent subgraph restarting at
    /// `start` with at most `max_iterations` repeat executions.
    pub fn recurrent(mut self, start: impl Into<NodeId>, dest: impl Into<NodeId>, max_iterations: usize) -> Self {
        let dest = dest.into();
        let mut attrs = self.graph.attrs(&dest).cloned().unwrap_or_default();
        attrs.start_node = Some(start.into());
        attrs.max_iterations = Some(max_iterations);
        self.graph.add_node_with_attrs(dest, attrs);
        self
    }

    pub fn build(self, input_node: impl Into<NodeId>, output_node: impl Into<NodeId>) -> Result<(Graph, NodeTable), BuildError> {
        let input_node = input_node.into();
        let output_node = output_node.into();
        self.graph.validate(&self.table, &input_node, &output_node)?;
        Ok((self.graph, self.table))
    }
}
