//! Opflow Core Library
//!
//! This crate provides the data model and structural guarantees for the
//! Opflow dataflow engine: an acyclic graph container with memoized
//! topological leveling, nodes with typed input/output fields, validated
//! links, composite (macro) capabilities, and the hierarchical execution
//! context nodes read and write at run time.
//!
//! # Key Components
//!
//! - **Dag**: generic acyclic container; every insertion that would close
//!   a cycle is rejected atomically
//! - **OpGraph**: the node/link layer with field and type validation
//! - **OpNode**: unit of computation with ordered typed fields and a
//!   capability bag of extensions
//! - **OpContext**: hierarchical key/value state with parent fallback
//!
//! Stepping a graph is the `opflow-executor` crate's job; this crate is
//! purely the model.
//!
//! # Example
//!
//! ```
//! use opflow_core::prelude::*;
//!
//! let mut graph = OpGraph::new();
//! let a = graph.add_node(
//!     OpNode::with_id("gen", "generator")
//!         .with_output(OutputField::new("out").with_type(ValueKind::Number)),
//! )?;
//! let b = graph.add_node(
//!     OpNode::with_id("sink", "sink")
//!         .with_input(InputField::new("in").with_validator(ValueKind::Number)),
//! )?;
//!
//! graph.add_link(OpLink::new(a, "out", b, "in"))?;
//! assert_eq!(graph.topological_order(), vec![a, b]);
//! # Ok::<(), opflow_core::GraphError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod composite;
pub mod context;
pub mod dag;
pub mod error;
pub mod extensions;
pub mod field;
pub mod graph;
pub mod link;
pub mod node;
pub mod prelude;
pub mod value;

// Re-export key types at crate root for convenience
pub use composite::{CompositeNode, CustomProcessing, Publishable, PublishedPort};
pub use context::{ContextId, OpContext, Scope};
pub use dag::{Dag, EdgeId, VertexId};
pub use error::{DagError, GraphError, NodeError, ProcessingError, Result};
pub use field::{FieldDirection, InputField, OutputField, TypeSpec};
pub use graph::{GraphEvent, OpGraph};
pub use link::OpLink;
pub use node::{NodeEvent, OpNode, Operation, ENABLED_FIELD};
pub use value::{Value, ValueKind};
