//! Graph runtime: validation and execution of node/edge graphs.

use std::sync::Arc;

use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;

use crate::error::{Error, Result};

use super::edge::Edge;
use super::node::{Node, ProcessContext};

/// Default bound on node executions per run.
pub const DEFAULT_MAX_STEPS: usize = 10_000;

/// Outcome of one [`Graph::run`].
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Last output of every node that ran.
    pub outputs: FxHashMap<String, Value>,
    /// Nodes without outgoing forward edges that were reached, in order.
    pub terminals: Vec<String>,
    /// How many times each node ran.
    pub visits: FxHashMap<String, usize>,
    /// Total node executions.
    pub steps: usize,
}

impl RunReport {
    pub fn output(&self, node_id: &str) -> Option<&Value> {
        self.outputs.get(node_id)
    }

    pub fn reached(&self, node_id: &str) -> bool {
        self.visits.contains_key(node_id)
    }

    pub fn visits(&self, node_id: &str) -> usize {
        self.visits.get(node_id).copied().unwrap_or(0)
    }
}

/// A directed graph of nodes joined by conditional edges.
///
/// Forward edges must be acyclic; back-edges are declared with
/// [`Edge::looping`].
pub struct Graph {
    graph: DiGraph<Arc<dyn Node>, Edge>,
    index: FxHashMap<String, NodeIndex>,
    max_steps: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: FxHashMap::default(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Bound the number of node executions in one run.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn add_node(&mut self, node: impl Node + 'static) -> Result<()> {
        self.add_shared_node(Arc::new(node))
    }

    pub fn add_shared_node(&mut self, node: Arc<dyn Node>) -> Result<()> {
        let id = node.id().to_string();
        if self.index.contains_key(&id) {
            return Err(Error::InvalidOperation(format!("duplicate node id '{}'", id)));
        }
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        Ok(())
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<()> {
        let from = self.node_index(edge.from())?;
        let to = self.node_index(edge.to())?;
        tracing::debug!(
            "edge {}{}{}",
            edge,
            if edge.is_loop() { " (loop)" } else { "" },
            if edge.is_optional() { " (optional)" } else { "" }
        );
        self.graph.add_edge(from, to, edge);
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&Arc<dyn Node>> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn node_index(&self, id: &str) -> Result<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))
    }

    /// The graph restricted to forward edges, with identical node indices.
    fn forward_graph(&self) -> DiGraph<(), ()> {
        let mut forward = DiGraph::with_capacity(self.graph.node_count(), self.graph.edge_count());
        for _ in self.graph.node_indices() {
            forward.add_node(());
        }
        for edge in self.graph.edge_references() {
            if !edge.weight().is_loop() {
                forward.add_edge(edge.source(), edge.target(), ());
            }
        }
        forward
    }

    /// Check that forward edges are acyclic.
    pub fn validate(&self) -> Result<()> {
        use petgraph::algo::kosaraju_scc;

        let forward = self.forward_graph();
        for scc in kosaraju_scc(&forward) {
            let self_loop = scc.len() == 1 && forward.contains_edge(scc[0], scc[0]);
            if scc.len() > 1 || self_loop {
                let names: Vec<&str> = scc.iter().map(|&idx| self.graph[idx].id()).collect();
                return Err(Error::CyclicEdges(format!(
                    "{} → {}",
                    names.join(" → "),
                    names[0]
                )));
            }
        }
        Ok(())
    }

    /// Node ids in execution order.
    pub fn execution_order(&self) -> Result<Vec<String>> {
        Ok(self
            .topological_order()?
            .into_iter()
            .map(|idx| self.graph[idx].id().to_string())
            .collect())
    }

    fn topological_order(&self) -> Result<Vec<NodeIndex>> {
        use petgraph::algo::toposort;

        self.validate()?;
        toposort(&self.forward_graph(), None).map_err(|cycle| {
            Error::CyclicEdges(format!("cycle at node '{}'", self.graph[cycle.node_id()].id()))
        })
    }

    /// Outgoing edges of `idx` in insertion order.
    fn outgoing(&self, idx: NodeIndex) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges
    }

    fn is_terminal(&self, idx: NodeIndex) -> bool {
        !self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .any(|e| !e.weight().is_loop())
    }

    /// Execute the graph once, feeding `input` to every entry node.
    ///
    /// Nodes run in topological order of the forward edges. After a node
    /// runs, its loop edges are evaluated first; a firing loop edge
    /// re-enters its target and the forward edges are not taken. Otherwise
    /// each forward edge is evaluated and activates its target with the
    /// output (or, for a failed optional edge, with no value).
    pub fn run(&self, input: Value, ctx: &ProcessContext) -> Result<RunReport> {
        let order = self.topological_order()?;
        for edge in self.graph.edge_weights() {
            edge.reset();
        }
        let rank: FxHashMap<NodeIndex, usize> =
            order.iter().enumerate().map(|(pos, &idx)| (idx, pos)).collect();

        let mut activated: FxHashSet<NodeIndex> = FxHashSet::default();
        let mut pending: FxHashMap<NodeIndex, Vec<Value>> = FxHashMap::default();
        for &idx in &order {
            let has_forward_input = self
                .graph
                .edges_directed(idx, Direction::Incoming)
                .any(|e| !e.weight().is_loop());
            if !has_forward_input {
                activated.insert(idx);
                pending.insert(idx, vec![input.clone()]);
            }
        }

        let mut report = RunReport::default();
        let mut cursor = 0;

        while cursor < order.len() {
            let idx = order[cursor];
            cursor += 1;
            if !activated.remove(&idx) {
                continue;
            }

            ctx.check()?;
            if report.steps >= self.max_steps {
                return Err(Error::InvalidOperation(format!(
                    "graph exceeded {} steps",
                    self.max_steps
                )));
            }

            let node = &self.graph[idx];
            let inputs = pending.remove(&idx).unwrap_or_default();
            tracing::debug!("running node '{}' with {} input(s)", node.id(), inputs.len());
            let output = node.process(ctx, &inputs)?;

            report.steps += 1;
            *report.visits.entry(node.id().to_string()).or_insert(0) += 1;
            report.outputs.insert(node.id().to_string(), output.clone());
            if self.is_terminal(idx) && !report.terminals.iter().any(|t| t == node.id()) {
                report.terminals.push(node.id().to_string());
            }

            let edges = self.outgoing(idx);

            let mut looped = false;
            for &edge_idx in edges.iter().filter(|&&e| self.graph[e].is_loop()) {
                let edge = &self.graph[edge_idx];
                if self.condition_holds(edge, &output)? {
                    let Some((_, target)) = self.graph.edge_endpoints(edge_idx) else {
                        continue;
                    };
                    tracing::debug!("loop edge {} fired", edge);
                    activated.insert(target);
                    pending.entry(target).or_default().push(output.clone());
                    cursor = cursor.min(rank[&target]);
                    looped = true;
                    break;
                }
            }
            if looped {
                continue;
            }

            for &edge_idx in edges.iter().filter(|&&e| !self.graph[e].is_loop()) {
                let edge = &self.graph[edge_idx];
                let Some((_, target)) = self.graph.edge_endpoints(edge_idx) else {
                    continue;
                };
                if self.condition_holds(edge, &output)? {
                    activated.insert(target);
                    pending.entry(target).or_default().push(output.clone());
                } else if edge.is_optional() {
                    tracing::debug!("optional edge {} skipped", edge);
                    activated.insert(target);
                    pending.entry(target).or_default();
                } else {
                    return Err(Error::ConditionNotMet(edge.to_string()));
                }
            }
        }

        tracing::info!(
            "graph run finished: {} step(s), terminals [{}]",
            report.steps,
            report.terminals.join(", ")
        );
        Ok(report)
    }

    /// Evaluate `edge`; on an optional edge, recoverable failures count as
    /// "condition false".
    fn condition_holds(&self, edge: &Edge, output: &Value) -> Result<bool> {
        match edge.evaluate(output) {
            Ok(holds) => Ok(holds),
            Err(e) if edge.is_optional() && e.is_recoverable() => {
                tracing::warn!("optional edge {} condition failed: {}", edge, e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Release every node.
    pub fn release(&self) {
        for node in self.graph.node_weights() {
            node.release();
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("max_steps", &self.max_steps)
            .finish()
    }
}
