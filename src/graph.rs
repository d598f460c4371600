//! Signal graph - fixed topology of nodes and connections
//!
//! A [`SignalGraph`] is built once, validated once and then compiled into a
//! flat render plan. Nothing about the topology changes after that, so the
//! render context walks plain index vectors and never touches petgraph.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use hashbrown::HashMap;
use itertools::Itertools;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use tracing::{debug, info};

use crate::error::GraphError;
use crate::node::{AudioNode, NodeId, NodeKind, ParamName};
use crate::nodes::NodeVariant;
use crate::param::Param;

/// Where a connection lands on its destination node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Port {
    /// The node's audio input. Multiple connections are summed.
    Audio,
    /// Added to the parameter's ramped value on every sample.
    Param(ParamName),
}

/// A single edge of the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
    pub port: Port,
}

/// A node together with its identity and parameter state.
pub struct Node {
    id: NodeId,
    label: String,
    variant: NodeVariant,
    params: Vec<Param>,
}

impl Node {
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.variant.kind()
    }

    pub fn param_names(&self) -> impl Iterator<Item = ParamName> + '_ {
        self.params.iter().map(|p| p.spec().name)
    }
}

type InnerGraph = petgraph::graph::Graph<Node, Port>;

/// The full set of nodes and connections, before validation.
///
/// ```
/// use schwebung::graph::SignalGraph;
/// use schwebung::node::ParamName;
/// use schwebung::nodes::{ControlOscillator, Gain, ToneOscillator};
///
/// let mut graph = SignalGraph::new();
/// let saw = graph.add("saw", ToneOscillator::new(220.0));
/// let lfo = graph.add("lfo", ControlOscillator::new(4.0));
/// let depth = graph.add("depth", Gain::new(6.0).with_range(0.0, 100.0));
/// let out = graph.add("master", Gain::new(0.25));
///
/// graph.connect(lfo, depth).unwrap();
/// graph.connect_param(depth, saw, ParamName::Frequency).unwrap();
/// graph.connect(saw, out).unwrap();
/// graph.set_output(out).unwrap();
///
/// assert!(graph.validate().is_ok());
/// ```
pub struct SignalGraph {
    graph: InnerGraph,
    output: Option<NodeId>,
}

impl Default for SignalGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalGraph {
    pub fn new() -> Self {
        Self {
            graph: InnerGraph::with_capacity(16, 32),
            output: None,
        }
    }

    /// Add a node, returns its id
    pub fn add<N: Into<NodeVariant>>(&mut self, label: &str, node: N) -> NodeId {
        let variant = node.into();
        let params = variant.param_specs().iter().map(|spec| Param::new(*spec)).collect();
        let id = NodeId(self.graph.node_count() as u32);
        let idx = self.graph.add_node(Node {
            id,
            label: label.to_string(),
            variant,
            params,
        });
        debug_assert_eq!(idx.index(), id.index());
        id
    }

    /// Connect the output of `from` to the audio input of `to`
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.check_node(from)?;
        let dest = self.check_node(to)?;
        if !dest.kind().has_audio_input() {
            return Err(GraphError::NoAudioInput {
                node: to,
                label: dest.label.clone(),
            });
        }
        self.graph.add_edge(index(from), index(to), Port::Audio);
        Ok(())
    }

    /// Connect the output of `from` to the parameter `param` of `to`
    pub fn connect_param(&mut self, from: NodeId, to: NodeId, param: ParamName) -> Result<(), GraphError> {
        self.check_node(from)?;
        let dest = self.check_node(to)?;
        if !dest.param_names().any(|p| p == param) {
            return Err(GraphError::UnknownParameter { node: to, param });
        }
        self.graph.add_edge(index(from), index(to), Port::Param(param));
        Ok(())
    }

    /// Set which node feeds the output device
    pub fn set_output(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.check_node(id)?;
        if node.kind().is_control_only() {
            return Err(GraphError::ControlSignalAtOutput(id));
        }
        self.output = Some(id);
        Ok(())
    }

    pub fn output(&self) -> Option<NodeId> {
        self.output
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(index(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.raw_nodes().iter().map(|n| &n.weight)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connections(&self) -> impl Iterator<Item = Connection> + '_ {
        self.graph.edge_references().map(|e| Connection {
            from: NodeId(e.source().index() as u32),
            to: NodeId(e.target().index() as u32),
            port: *e.weight(),
        })
    }

    /// Check the topology and return the render order.
    ///
    /// At most one cycle is allowed, and it has to be broken by a delay
    /// line: the graph with every audio edge into a delay removed must be
    /// acyclic. Edges into a delay's parameters are kept, since the delay's
    /// output for a block depends on them.
    pub fn validate(&self) -> Result<Vec<NodeId>, GraphError> {
        let output = self.output.ok_or(GraphError::NoOutput)?;
        if self.check_node(output)?.kind().is_control_only() {
            return Err(GraphError::ControlSignalAtOutput(output));
        }

        let cycles: Vec<Vec<NodeIndex>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .collect();
        let independent: usize = cycles.iter().map(|scc| self.independent_cycles(scc)).sum();
        if independent > 1 {
            return Err(GraphError::MultipleCycles(independent));
        }

        let mut causal = petgraph::graph::Graph::<(), ()>::with_capacity(self.graph.node_count(), self.graph.edge_count());
        for _ in self.graph.node_indices() {
            causal.add_node(());
        }
        for edge in self.graph.edge_references() {
            let breaks_cycle = *edge.weight() == Port::Audio && self.graph[edge.target()].variant.is_delay_line();
            if !breaks_cycle {
                causal.add_edge(edge.source(), edge.target(), ());
            }
        }

        match toposort(&causal, None) {
            Ok(order) => {
                if let Some(cycle) = cycles.first() {
                    debug!(nodes = %self.describe(cycle), "feedback cycle broken by delay line");
                }
                Ok(order.into_iter().map(|idx| NodeId(idx.index() as u32)).collect())
            }
            Err(_) => {
                let cycle = cycles.first().map(|c| self.describe(c)).unwrap_or_default();
                Err(GraphError::CycleWithoutDelay(cycle))
            }
        }
    }

    /// Validate and flatten into the render plan.
    pub(crate) fn compile(self) -> Result<CompiledGraph, GraphError> {
        let order = self.validate()?;
        let count = self.graph.node_count();

        let mut audio_inputs = vec![Vec::new(); count];
        let mut param_inputs: Vec<Vec<Vec<usize>>> = self
            .nodes()
            .map(|n| vec![Vec::new(); n.params.len()])
            .collect();

        for edge in self.graph.edge_references() {
            let (src, dst) = (edge.source().index(), edge.target().index());
            match *edge.weight() {
                Port::Audio => audio_inputs[dst].push(src),
                Port::Param(name) => {
                    // connect_param already checked the parameter exists
                    if let Some(slot) = self.graph[edge.target()].param_names().position(|p| p == name) {
                        param_inputs[dst][slot].push(src);
                    }
                }
            }
        }

        let output = self.output.ok_or(GraphError::NoOutput)?.index();
        let (nodes, _) = self.graph.into_nodes_edges();
        let mut variants = Vec::with_capacity(count);
        let mut params = Vec::with_capacity(count);
        let mut labels = Vec::with_capacity(count);
        for node in nodes.into_iter().map(|n| n.weight) {
            labels.push(node.label);
            params.push(node.params);
            variants.push(node.variant);
        }

        let delay_lines = variants
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_delay_line())
            .map(|(i, _)| i)
            .collect();

        info!(nodes = count, output = %labels[output], "signal graph compiled");

        Ok(CompiledGraph {
            nodes: variants,
            params,
            labels,
            order: order.into_iter().map(NodeId::index).collect(),
            audio_inputs,
            param_inputs,
            delay_lines,
            output,
        })
    }

    fn check_node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.graph.node_weight(index(id)).ok_or(GraphError::UnknownNode(id))
    }

    /// Cyclomatic number of a strongly connected component: `edges - nodes + 1`.
    ///
    /// A component holds exactly one elementary cycle iff this is 1; any
    /// second loop, even through the same nodes, raises it.
    fn independent_cycles(&self, scc: &[NodeIndex]) -> usize {
        let edges = self
            .graph
            .edge_references()
            .filter(|e| scc.contains(&e.source()) && scc.contains(&e.target()))
            .count();
        (edges + 1).saturating_sub(scc.len())
    }

    fn describe(&self, nodes: &[NodeIndex]) -> String {
        nodes.iter().map(|&idx| self.graph[idx].label.as_str()).sorted().join(", ")
    }
}

#[inline]
fn index(id: NodeId) -> NodeIndex {
    NodeIndex::new(id.index())
}

/// Flat, index-based render plan produced by [`SignalGraph::compile`].
pub(crate) struct CompiledGraph {
    pub nodes: Vec<NodeVariant>,
    pub params: Vec<Vec<Param>>,
    pub labels: Vec<String>,
    /// Topological order with audio edges into delay lines ignored
    pub order: Vec<usize>,
    /// Sources summed into each node's audio input
    pub audio_inputs: Vec<Vec<usize>>,
    /// Sources summed into each node's parameters, by parameter slot
    pub param_inputs: Vec<Vec<Vec<usize>>>,
    pub delay_lines: Vec<usize>,
    pub output: usize,
}

impl CompiledGraph {
    /// Label to node id lookup for the control side.
    pub fn label_map(&self) -> HashMap<String, NodeId> {
        let mut map = HashMap::with_capacity(self.labels.len());
        for (i, label) in self.labels.iter().enumerate() {
            map.entry(label.clone()).or_insert(NodeId(i as u32));
        }
        map
    }
}
