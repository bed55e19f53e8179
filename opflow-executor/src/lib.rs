//! Opflow Executor Library
//!
//! Step-wise execution over graphs from `opflow-core`: the [`Processor`]
//! walks a borrowed graph in topological order with full debugger-style
//! control (single steps, descent into composites, level jumps, run to a
//! node), and the [`NodeRegistry`] instantiates nodes by type name from
//! serialized parameters.
//!
//! # Example
//!
//! ```
//! use opflow_core::prelude::*;
//! use opflow_executor::Processor;
//!
//! let mut graph = OpGraph::new();
//! graph.add_node(
//!     OpNode::with_id("hello", "hello").with_operation(|scope: &mut Scope<'_>| {
//!         scope.set("out", Value::string("hi"));
//!         Ok(())
//!     }),
//! )?;
//!
//! let mut processor = Processor::new(&graph);
//! processor.step_all();
//! assert!(processor.error().is_none());
//! # Ok::<(), opflow_core::GraphError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod processor;
pub mod registry;

pub use processor::{Processor, ProcessorState};
pub use registry::{NodeFactory, NodeRegistry, RegistryError};
