//! Prelude for convenient imports.
//!
//! This module re-exports the most commonly used types and traits.
//!
//! # Example
//!
//! ```
//! use opflow_core::prelude::*;
//! ```

// Graph structure
pub use crate::dag::{Dag, EdgeId, VertexId};
pub use crate::graph::{GraphEvent, OpGraph};
pub use crate::link::OpLink;

// Nodes and fields
pub use crate::field::{FieldDirection, InputField, OutputField, TypeSpec};
pub use crate::node::{NodeEvent, OpNode, Operation, ENABLED_FIELD};

// Composite capabilities
pub use crate::composite::{CompositeNode, CustomProcessing, Publishable, PublishedPort};
pub use crate::extensions::ExtensionMap;

// Execution context
pub use crate::context::{ContextId, OpContext, Scope};

// Values
pub use crate::value::{Value, ValueKind};

// Error handling
pub use crate::error::{DagError, GraphError, NodeError, ProcessingError, Result};
