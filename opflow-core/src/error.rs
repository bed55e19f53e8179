//! Error types for Opflow.
//!
//! Two families, matching the two phases in which things go wrong:
//!
//! - **Structural** errors are raised synchronously by a mutating call
//!   (`add_edge`, `add_node`, `put_input`, ...) and always leave the graph
//!   unchanged — every failing mutation is atomic.
//! - **Processing** errors occur while stepping. They are never thrown
//!   across the stepping API; the `Processor` captures them as its terminal
//!   error for the caller to inspect afterwards.
//!
//! Every error carries a stable code (`G...` structural, `P...` processing)
//! to aid log correlation.

use crate::dag::VertexId;
use thiserror::Error;

/// Structural error from the generic DAG container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DagError {
    /// Adding the edge would close a cycle.
    ///
    /// The endpoints are named `from`/`to` rather than source/target:
    /// a field named `source` is claimed by the derived `Error::source`.
    #[error("G001: edge {from} -> {to} would close a cycle")]
    CycleDetected {
        /// Source vertex of the rejected edge.
        from: VertexId,
        /// Target vertex of the rejected edge.
        to: VertexId,
    },

    /// An endpoint is not a member of the graph.
    #[error("G002: vertex {vertex} is not a member of this graph")]
    VertexNotFound {
        /// The missing vertex.
        vertex: VertexId,
    },
}

impl DagError {
    /// Get the error code (e.g., "G001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CycleDetected { .. } => "G001",
            Self::VertexNotFound { .. } => "G002",
        }
    }
}

/// Structural error from the node/link layer.
#[derive(Error, Debug)]
pub enum GraphError {
    /// Error bubbled up from the underlying DAG.
    #[error(transparent)]
    Dag(#[from] DagError),

    /// A second node with an already-used string id was added.
    #[error("G010: a node with id '{id}' is already in the graph")]
    DuplicateNodeId {
        /// The colliding id.
        id: String,
    },

    /// A link referenced a field the endpoint node does not declare.
    #[error("G011: node '{node}' has no {direction} field '{field}'")]
    FieldNotFound {
        /// Name of the node that was searched.
        node: String,
        /// "input" or "output".
        direction: &'static str,
        /// The missing field key.
        field: String,
    },

    /// Attempted to overwrite or remove a fixed field.
    #[error("G012: field '{field}' on node '{node}' is fixed and cannot be replaced or removed")]
    FixedField {
        /// Name of the owning node.
        node: String,
        /// The fixed field key.
        field: String,
    },

    /// The destination field's validator rejects the source field's type.
    #[error(
        "G013: incompatible link: '{source_field}' declares {declared} but '{dest_field}' accepts {accepted}"
    )]
    IncompatibleLink {
        /// Source output field key.
        source_field: String,
        /// Declared output type of the source field.
        declared: String,
        /// Destination input field key.
        dest_field: String,
        /// Accepted types of the destination field.
        accepted: String,
    },

    /// A structurally identical link already exists.
    #[error("G014: an identical link from '{source_field}' to '{dest_field}' already exists")]
    DuplicateLink {
        /// Source output field key.
        source_field: String,
        /// Destination input field key.
        dest_field: String,
    },
}

impl GraphError {
    /// Get the error code (e.g., "G010").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Dag(e) => e.code(),
            Self::DuplicateNodeId { .. } => "G010",
            Self::FieldNotFound { .. } => "G011",
            Self::FixedField { .. } => "G012",
            Self::IncompatibleLink { .. } => "G013",
            Self::DuplicateLink { .. } => "G014",
        }
    }
}

/// Fatal condition raised while stepping a processor.
///
/// These halt the processor that encountered them and are exposed through
/// `Processor::error()` rather than being returned from `step()`.
#[derive(Error, Debug, Clone)]
pub enum ProcessingError {
    /// A non-optional input had neither a preset value nor a satisfied link.
    #[error("P001: required input '{field}' of node '{node}' has no value")]
    RequiredInputMissing {
        /// Name of the node whose input is unsatisfied.
        node: String,
        /// The required input field key.
        field: String,
    },

    /// A value flowing through a link failed the destination validator.
    #[error("P002: input '{field}' of node '{node}' rejected a {actual} value (accepts {accepted})")]
    InvalidInputType {
        /// Name of the destination node.
        node: String,
        /// The destination input field key.
        field: String,
        /// Kind of the offending value.
        actual: String,
        /// Accepted types of the destination field.
        accepted: String,
    },

    /// A node's `operate` returned an error.
    #[error("P003: node '{node}' failed: {cause}")]
    NodeExecution {
        /// Name of the failing node.
        node: String,
        /// Stringified failure from the node implementation.
        cause: String,
    },

    /// A node's `operate` panicked.
    #[error("P004: node '{node}' panicked: {message}")]
    NodePanic {
        /// Name of the panicking node.
        node: String,
        /// Recovered panic payload, if it was a string.
        message: String,
    },
}

impl ProcessingError {
    /// Get the error code (e.g., "P001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RequiredInputMissing { .. } => "P001",
            Self::InvalidInputType { .. } => "P002",
            Self::NodeExecution { .. } => "P003",
            Self::NodePanic { .. } => "P004",
        }
    }
}

/// Error type returned by a node's `operate` implementation.
///
/// Nodes surface failures as anything implementing `std::error::Error`;
/// the processor stringifies the cause into `ProcessingError::NodeExecution`.
pub type NodeError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for structural graph operations.
pub type Result<T, E = GraphError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_codes() {
        let err = DagError::CycleDetected {
            from: VertexId::new(0),
            to: VertexId::new(1),
        };
        assert_eq!(err.code(), "G001");
        assert!(format!("{err}").contains("v0 -> v1"));

        let err = GraphError::DuplicateNodeId {
            id: "split".to_string(),
        };
        assert_eq!(err.code(), "G010");

        let err: GraphError = DagError::VertexNotFound {
            vertex: VertexId::new(3),
        }
        .into();
        assert_eq!(err.code(), "G002");
    }

    #[test]
    fn processing_display_includes_code_and_node() {
        let err = ProcessingError::RequiredInputMissing {
            node: "sum".to_string(),
            field: "lhs".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("P001"));
        assert!(msg.contains("sum"));
        assert!(msg.contains("lhs"));
    }
}
