//! The operation graph: nodes and typed links over an acyclic core.

use crate::composite::CompositeNode;
use crate::dag::{Dag, EdgeId, VertexId};
use crate::error::{DagError, GraphError};
use crate::link::OpLink;
use crate::node::OpNode;
use fxhash::FxHashMap;
use std::fmt;
use tracing::{debug, trace};

/// Change notification emitted by a graph to registered listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// A node was inserted.
    NodeAdded {
        /// Handle of the new node.
        vertex: VertexId,
    },
    /// A node was removed, together with its incident links.
    NodeRemoved {
        /// Handle the node occupied.
        vertex: VertexId,
        /// The node's string id.
        id: String,
    },
    /// A link was inserted.
    LinkAdded {
        /// Handle of the new link.
        edge: EdgeId,
    },
    /// A link was removed.
    LinkRemoved {
        /// Handle the link occupied.
        edge: EdgeId,
    },
}

type GraphListener = Box<dyn FnMut(&GraphEvent)>;

/// A graph of [`OpNode`]s connected by typed [`OpLink`]s.
///
/// Wraps the acyclic [`Dag`] core and layers the node data model on top:
/// string-id uniqueness, field existence and type checks on every link,
/// duplicate-link rejection, and change events. Every mutation that the
/// core rejects leaves the graph exactly as it was.
#[derive(Default)]
pub struct OpGraph {
    dag: Dag<OpNode, OpLink>,
    by_id: FxHashMap<String, VertexId>,
    listeners: Vec<GraphListener>,
}

impl OpGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.dag.vertex_count()
    }

    /// Number of links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.dag.edge_count()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dag.is_empty()
    }

    /// Insert a node.
    ///
    /// # Errors
    ///
    /// `GraphError::DuplicateNodeId` if another node in this graph already
    /// carries the same string id.
    pub fn add_node(&mut self, node: OpNode) -> Result<VertexId, GraphError> {
        if self.by_id.contains_key(node.id()) {
            return Err(GraphError::DuplicateNodeId {
                id: node.id().to_string(),
            });
        }
        let id = node.id().to_string();
        let vertex = self.dag.add_vertex(node);
        self.by_id.insert(id, vertex);
        trace!(%vertex, "node added");
        self.emit(GraphEvent::NodeAdded { vertex });
        Ok(vertex)
    }

    /// Remove a node, cascading removal of its incident links.
    ///
    /// Returns the node and the removed links, or `None` when the handle
    /// is not present.
    pub fn remove_node(&mut self, vertex: VertexId) -> Option<(OpNode, Vec<(EdgeId, OpLink)>)> {
        let (node, links) = self.dag.remove_vertex(vertex)?;
        self.by_id.remove(node.id());
        for (edge, _) in &links {
            self.emit(GraphEvent::LinkRemoved { edge: *edge });
        }
        trace!(%vertex, id = node.id(), links = links.len(), "node removed");
        self.emit(GraphEvent::NodeRemoved {
            vertex,
            id: node.id().to_string(),
        });
        Some((node, links))
    }

    /// Look up a node by handle.
    #[must_use]
    pub fn node(&self, vertex: VertexId) -> Option<&OpNode> {
        self.dag.vertex(vertex)
    }

    /// Look up a node by handle, mutably.
    pub fn node_mut(&mut self, vertex: VertexId) -> Option<&mut OpNode> {
        self.dag.vertex_mut(vertex)
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = (VertexId, &OpNode)> {
        self.dag.vertices()
    }

    /// Resolve a string id to a handle within this graph only.
    #[must_use]
    pub fn node_by_id(&self, id: &str) -> Option<VertexId> {
        self.by_id.get(id).copied()
    }

    /// Find a node by string id, descending into composite sub-graphs.
    ///
    /// The search is depth-first: this graph's own nodes first, then each
    /// composite's internal graph in turn.
    #[must_use]
    pub fn find_node_by_id(&self, id: &str) -> Option<&OpNode> {
        if let Some(vertex) = self.node_by_id(id) {
            return self.node(vertex);
        }
        for (_, node) in self.nodes() {
            if let Some(composite) = node.extension::<CompositeNode>() {
                if let Some(found) = composite.graph().find_node_by_id(id) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Insert a link after validating it end to end.
    ///
    /// Validation order: both endpoints must exist, the named output and
    /// input fields must exist, the destination validator must accept the
    /// full declared output type, the link must not structurally duplicate
    /// an existing one, and the result must stay acyclic.
    ///
    /// # Errors
    ///
    /// `FieldNotFound`, `IncompatibleLink`, `DuplicateLink`, or a
    /// [`DagError`](crate::error::DagError) from the acyclic core.
    pub fn add_link(&mut self, link: OpLink) -> Result<EdgeId, GraphError> {
        let source = self
            .dag
            .vertex(link.source)
            .ok_or(DagError::VertexNotFound {
                vertex: link.source,
            })?;
        let dest = self
            .dag
            .vertex(link.dest)
            .ok_or(DagError::VertexNotFound { vertex: link.dest })?;

        let output = source
            .output(&link.source_field)
            .ok_or_else(|| GraphError::FieldNotFound {
                node: source.name().to_string(),
                direction: "output",
                field: link.source_field.clone(),
            })?;
        let input = dest
            .input(&link.dest_field)
            .ok_or_else(|| GraphError::FieldNotFound {
                node: dest.name().to_string(),
                direction: "input",
                field: link.dest_field.clone(),
            })?;

        if !input.validator.accepts_spec(&output.output_type) {
            return Err(GraphError::IncompatibleLink {
                source_field: link.source_field.clone(),
                declared: output.output_type.to_string(),
                dest_field: link.dest_field.clone(),
                accepted: input.validator.to_string(),
            });
        }

        if self
            .dag
            .outgoing_edges(link.source)
            .iter()
            .any(|e| self.dag.edge(*e) == Some(&link))
        {
            return Err(GraphError::DuplicateLink {
                source_field: link.source_field.clone(),
                dest_field: link.dest_field.clone(),
            });
        }

        let edge = self.dag.add_edge(link.source, link.dest, link)?;
        trace!(%edge, "link added");
        self.emit(GraphEvent::LinkAdded { edge });
        Ok(edge)
    }

    /// Convenience wrapper around [`OpGraph::add_link`] that logs and
    /// swallows the failure reason.
    pub fn connect(
        &mut self,
        source: VertexId,
        source_field: &str,
        dest: VertexId,
        dest_field: &str,
    ) -> Option<EdgeId> {
        let link = OpLink::new(source, source_field, dest, dest_field);
        match self.add_link(link) {
            Ok(edge) => Some(edge),
            Err(e) => {
                debug!(error = %e, "connect rejected");
                None
            }
        }
    }

    /// Remove a link by handle.
    pub fn remove_link(&mut self, edge: EdgeId) -> Option<OpLink> {
        let link = self.dag.remove_edge(edge)?;
        trace!(%edge, "link removed");
        self.emit(GraphEvent::LinkRemoved { edge });
        Some(link)
    }

    /// Look up a link by handle.
    #[must_use]
    pub fn link(&self, edge: EdgeId) -> Option<&OpLink> {
        self.dag.edge(edge)
    }

    /// Iterate over all links.
    pub fn links(&self) -> impl Iterator<Item = (EdgeId, &OpLink)> {
        self.dag.edges()
    }

    /// Links arriving at a node.
    #[must_use]
    pub fn incoming_links(&self, vertex: VertexId) -> &[EdgeId] {
        self.dag.incoming_edges(vertex)
    }

    /// Links leaving a node.
    #[must_use]
    pub fn outgoing_links(&self, vertex: VertexId) -> &[EdgeId] {
        self.dag.outgoing_edges(vertex)
    }

    /// Whether a link between the two nodes would keep the graph acyclic.
    ///
    /// Pure: never mutates the graph or its memoized order.
    #[must_use]
    pub fn can_connect(&self, source: VertexId, dest: VertexId) -> bool {
        self.dag.can_add_edge(source, dest)
    }

    /// The memoized topological order over all nodes.
    #[must_use]
    pub fn topological_order(&self) -> Vec<VertexId> {
        self.dag.topological_order()
    }

    /// The dependency level of a node (0 for sources).
    #[must_use]
    pub fn level(&self, vertex: VertexId) -> Option<u32> {
        self.dag.level(vertex)
    }

    /// Register a change listener.
    pub fn add_listener(&mut self, listener: impl FnMut(&GraphEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: GraphEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

impl fmt::Debug for OpGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpGraph")
            .field("nodes", &self.node_count())
            .field("links", &self.link_count())
            .finish_non_exhaustive()
    }
}
