//! Typed links binding an output field to a downstream input field.

use crate::dag::VertexId;
use std::fmt;

/// A typed connection from one node's output field to another node's
/// input field.
///
/// Equality is structural over all four components. Identity — what makes
/// two parallel links between the same nodes distinct — is the `EdgeId`
/// the owning graph assigns on insertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpLink {
    /// Source node.
    pub source: VertexId,
    /// Output field key on the source node.
    pub source_field: String,
    /// Destination node.
    pub dest: VertexId,
    /// Input field key on the destination node.
    pub dest_field: String,
}

impl OpLink {
    /// Create a link description.
    pub fn new(
        source: VertexId,
        source_field: impl Into<String>,
        dest: VertexId,
        dest_field: impl Into<String>,
    ) -> Self {
        Self {
            source,
            source_field: source_field.into(),
            dest,
            dest_field: dest_field.into(),
        }
    }
}

impl fmt::Display for OpLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.source, self.source_field, self.dest, self.dest_field
        )
    }
}
