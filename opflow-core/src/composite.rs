//! Capabilities that turn a node into a composite ("macro") node.
//!
//! A node carrying [`CompositeNode`] defers its behavior to an internal
//! sub-graph, executed by the processor descending into it. The optional
//! [`Publishable`] capability maps the composite's own ports onto internal
//! node fields, and [`CustomProcessing`] overrides the visit order over
//! the internal graph.

use crate::dag::VertexId;
use crate::graph::OpGraph;
use std::fmt;

/// Capability: this node's behavior is an internal sub-graph.
pub struct CompositeNode {
    graph: OpGraph,
}

impl CompositeNode {
    /// Wrap a sub-graph.
    #[must_use]
    pub fn new(graph: OpGraph) -> Self {
        Self { graph }
    }

    /// The internal graph.
    #[must_use]
    pub fn graph(&self) -> &OpGraph {
        &self.graph
    }

    /// The internal graph, mutably.
    pub fn graph_mut(&mut self) -> &mut OpGraph {
        &mut self.graph
    }

    /// Unwrap into the internal graph.
    #[must_use]
    pub fn into_graph(self) -> OpGraph {
        self.graph
    }
}

impl fmt::Debug for CompositeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeNode")
            .field("nodes", &self.graph.node_count())
            .finish_non_exhaustive()
    }
}

/// One entry in a composite's port-mapping table: a field on the
/// composite itself, bound to a field of a node inside its sub-graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    /// Field key on the composite node.
    pub key: String,
    /// String id of the internal node.
    pub node_id: String,
    /// Field key on the internal node.
    pub field: String,
}

impl PublishedPort {
    /// Create a port mapping.
    pub fn new(
        key: impl Into<String>,
        node_id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            node_id: node_id.into(),
            field: field.into(),
        }
    }
}

/// Capability: port-mapping table consumed by macro entry/exit bridging.
///
/// At macro entry every published input with a value on the composite's
/// context is copied to the mapped internal field; at exit every published
/// output is copied back out.
#[derive(Debug, Clone, Default)]
pub struct Publishable {
    /// Published inputs: composite input field -> internal node input.
    pub inputs: Vec<PublishedPort>,
    /// Published outputs: internal node output -> composite output field.
    pub outputs: Vec<PublishedPort>,
}

impl Publishable {
    /// Create an empty port-mapping table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an input mapping, builder style.
    #[must_use]
    pub fn publish_input(mut self, port: PublishedPort) -> Self {
        self.inputs.push(port);
        self
    }

    /// Publish an output mapping, builder style.
    #[must_use]
    pub fn publish_output(mut self, port: PublishedPort) -> Self {
        self.outputs.push(port);
        self
    }
}

/// Capability: custom visit order over a composite's internal graph,
/// replacing plain topological order when the processor steps into it.
pub struct CustomProcessing {
    order: Box<dyn Fn(&OpGraph) -> Vec<VertexId>>,
}

impl CustomProcessing {
    /// Wrap an order-producing function.
    pub fn new(order: impl Fn(&OpGraph) -> Vec<VertexId> + 'static) -> Self {
        Self {
            order: Box::new(order),
        }
    }

    /// Compute the visit order for the given internal graph.
    #[must_use]
    pub fn processing_order(&self, graph: &OpGraph) -> Vec<VertexId> {
        (self.order)(graph)
    }
}

impl fmt::Debug for CustomProcessing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomProcessing").finish_non_exhaustive()
    }
}
