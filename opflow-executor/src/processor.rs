//! Step-wise execution of an operation graph.
//!
//! A [`Processor`] borrows a graph immutably for its whole lifetime, so the
//! structure cannot change under a run. Execution is pull-based and
//! cursor-driven: each `step` executes the next node in topological order,
//! first copying values across its incoming links into the node's private
//! context, then running its operation. Composite nodes either execute
//! their sub-graph to completion within one step, or are descended into
//! with [`Processor::step_into`], which pushes a frame and lets the caller
//! step the internal nodes one by one.
//!
//! Processing failures are terminal but never thrown across the stepping
//! API: the stepping calls return `false` and the failure stays available
//! through [`Processor::error`] until [`Processor::reset`].

use opflow_core::{
    CompositeNode, ContextId, CustomProcessing, OpContext, OpGraph, OpNode, ProcessingError,
    Publishable, Value, VertexId, ENABLED_FIELD,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Observable phase of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// No node has executed yet.
    Idle,
    /// Mid-run at the top level.
    Stepping,
    /// Mid-run inside at least one descended composite.
    InMacro,
    /// A processing failure halted the run; see `error()`.
    Errored,
    /// Every node has executed.
    Exhausted,
}

/// A processing failure paired with the context scope of the node that
/// raised it, kept for post-mortem inspection of the values in flight.
struct Halt {
    error: ProcessingError,
    ctx: ContextId,
}

/// One level of the descent stack: a graph being stepped, the context its
/// nodes hang their private scopes off, and a cursor into its visit order.
struct Frame<'g> {
    graph: &'g OpGraph,
    ctx: ContextId,
    order: Vec<VertexId>,
    cursor: usize,
    /// The composite node this frame descends into; `None` for the root.
    owner: Option<&'g OpNode>,
}

impl<'g> Frame<'g> {
    fn root(graph: &'g OpGraph) -> Self {
        Self {
            graph,
            ctx: OpContext::ROOT,
            order: graph.topological_order(),
            cursor: 0,
            owner: None,
        }
    }

    fn exhausted(&self) -> bool {
        self.cursor >= self.order.len()
    }
}

/// Cursor-driven executor over a borrowed [`OpGraph`].
pub struct Processor<'g> {
    graph: &'g OpGraph,
    contexts: OpContext,
    frames: Vec<Frame<'g>>,
    error: Option<ProcessingError>,
    error_ctx: Option<ContextId>,
}

impl<'g> Processor<'g> {
    /// Create a processor positioned before the first node.
    #[must_use]
    pub fn new(graph: &'g OpGraph) -> Self {
        Self {
            graph,
            contexts: OpContext::new(),
            frames: vec![Frame::root(graph)],
            error: None,
            error_ctx: None,
        }
    }

    /// The graph under execution.
    #[must_use]
    pub fn graph(&self) -> &'g OpGraph {
        self.graph
    }

    /// The context tree values flow through.
    #[must_use]
    pub fn contexts(&self) -> &OpContext {
        &self.contexts
    }

    /// The context tree, mutably. Presetting input values before stepping
    /// goes through here.
    pub fn contexts_mut(&mut self) -> &mut OpContext {
        &mut self.contexts
    }

    /// The failure that halted this run, if any.
    #[must_use]
    pub fn error(&self) -> Option<&ProcessingError> {
        self.error.as_ref()
    }

    /// The private context scope of the node whose failure halted the run,
    /// for post-mortem inspection of the values in flight (including
    /// inputs pulled just before the failure).
    #[must_use]
    pub fn error_context(&self) -> Option<ContextId> {
        self.error.as_ref()?;
        self.error_ctx
    }

    /// Descent depth: 1 at the top level, +1 per entered composite.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The next node the active frame would execute.
    #[must_use]
    pub fn current_node(&self) -> Option<VertexId> {
        let frame = self.frames.last()?;
        frame.order.get(frame.cursor).copied()
    }

    /// Observable phase.
    #[must_use]
    pub fn state(&self) -> ProcessorState {
        if self.error.is_some() {
            return ProcessorState::Errored;
        }
        if self.frames.len() > 1 {
            return ProcessorState::InMacro;
        }
        match self.frames.last() {
            Some(frame) if frame.exhausted() => ProcessorState::Exhausted,
            Some(frame) if frame.cursor == 0 => ProcessorState::Idle,
            _ => ProcessorState::Stepping,
        }
    }

    /// Execute the next node of the active frame.
    ///
    /// A composite node executes its whole sub-graph within this one step.
    /// Returns `false` when nothing ran: the run is exhausted or a failure
    /// halted it (check [`Processor::error`] to tell the two apart).
    pub fn step(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        self.normalize();
        if self.error.is_some() {
            return false;
        }
        let (graph, ctx, vertex) = {
            let Some(frame) = self.frames.last() else {
                return false;
            };
            if frame.exhausted() {
                return false;
            }
            (frame.graph, frame.ctx, frame.order[frame.cursor])
        };
        match self.execute_node(graph, ctx, vertex) {
            Ok(()) => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.cursor += 1;
                }
                self.normalize();
                self.error.is_none()
            }
            Err(e) => {
                self.halt(e);
                false
            }
        }
    }

    /// Like [`Processor::step`], but when the next node is a composite,
    /// descend into it instead of running it atomically: subsequent steps
    /// execute its internal nodes one by one.
    ///
    /// On a non-composite (or disabled) node this is a plain step. Entry
    /// bridging of published inputs happens at descent.
    pub fn step_into(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        self.normalize();
        let (graph, ctx, vertex) = {
            let Some(frame) = self.frames.last() else {
                return false;
            };
            if frame.exhausted() {
                return false;
            }
            (frame.graph, frame.ctx, frame.order[frame.cursor])
        };
        let Some(node) = graph.node(vertex) else {
            return self.step();
        };
        if node.extension::<CompositeNode>().is_none() {
            return self.step();
        }

        let child = self.contexts.child_for(ctx, node);
        if let Err(error) = self.pull_inputs(graph, ctx, vertex, node, child) {
            self.halt(Halt { error, ctx: child });
            return false;
        }
        if self.disabled(child) {
            return self.step();
        }
        if let Err(error) = self.check_required(node, child) {
            self.halt(Halt { error, ctx: child });
            return false;
        }

        let composite = match node.extension::<CompositeNode>() {
            Some(c) => c,
            None => return self.step(),
        };
        self.bridge_inputs(node, composite, child);
        let inner = composite.graph();
        let order = match node.extension::<CustomProcessing>() {
            Some(custom) => custom.processing_order(inner),
            None => inner.topological_order(),
        };
        debug!(node = node.name(), depth = self.frames.len() + 1, "descending into composite");
        self.frames.push(Frame {
            graph: inner,
            ctx: child,
            order,
            cursor: 0,
            owner: Some(node),
        });
        // An empty composite completes immediately.
        self.normalize();
        self.error.is_none()
    }

    /// Run the active frame to completion and surface back to its parent.
    ///
    /// At the top level this is equivalent to [`Processor::step_all`].
    /// Returns `false` if a failure halted the run on the way out.
    pub fn step_out_of(&mut self) -> bool {
        if self.frames.len() <= 1 {
            self.step_all();
            return self.error.is_none();
        }
        let depth = self.frames.len();
        while self.frames.len() >= depth {
            if !self.step() {
                return false;
            }
        }
        true
    }

    /// Step until the run is exhausted or halted.
    pub fn step_all(&mut self) {
        while self.step() {}
    }

    /// Step the active frame until `target` (a node of that frame) has
    /// executed. Returns `false` if the frame finishes, or the run halts,
    /// before reaching it.
    pub fn step_to_node(&mut self, target: VertexId) -> bool {
        let depth = self.frames.len();
        loop {
            if self.error.is_some() || self.frames.len() < depth {
                return false;
            }
            let frame = &self.frames[depth - 1];
            if self.frames.len() == depth && frame.exhausted() {
                return false;
            }
            let at_target =
                self.frames.len() == depth && frame.order.get(frame.cursor) == Some(&target);
            if at_target {
                return self.step();
            }
            if !self.step() {
                return false;
            }
        }
    }

    /// Step until the active frame's next node sits on a deeper level than
    /// the one about to run, leaving the cursor on the first node of the
    /// next level. Returns `false` when nothing ran.
    pub fn step_to_next_level(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        self.normalize();
        let depth = self.frames.len();
        let Some(start) = self.peek_level() else {
            return false;
        };
        loop {
            if !self.step() {
                return false;
            }
            if self.frames.len() < depth {
                return true;
            }
            match self.peek_level() {
                Some(level) if level == start => {}
                _ => return true,
            }
        }
    }

    /// Rewind to the initial position: the descent stack collapses to the
    /// root frame, every node's private context is reclaimed, and the
    /// captured error clears. Values set directly on the root scope
    /// survive, so preset ambient inputs carry over to the next run.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.frames.push(Frame::root(self.graph));
        self.contexts.clear_children(OpContext::ROOT);
        self.error = None;
        self.error_ctx = None;
        debug!("processor reset");
    }

    fn halt(&mut self, halt: Halt) {
        warn!(code = halt.error.code(), error = %halt.error, "processor halted");
        self.error_ctx = Some(halt.ctx);
        self.error = Some(halt.error);
    }

    fn peek_level(&self) -> Option<u32> {
        let frame = self.frames.last()?;
        let vertex = frame.order.get(frame.cursor)?;
        frame.graph.level(*vertex)
    }

    /// Pop every exhausted non-root frame, bridging outputs and running the
    /// owning composite's own operation on the way out.
    fn normalize(&mut self) {
        while self.frames.len() > 1 {
            let done = self.frames.last().is_some_and(Frame::exhausted);
            if !done {
                break;
            }
            if let Err(e) = self.pop_frame() {
                self.halt(e);
                break;
            }
        }
    }

    fn pop_frame(&mut self) -> Result<(), Halt> {
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };
        if let Some(owner) = frame.owner {
            if let Some(composite) = owner.extension::<CompositeNode>() {
                self.bridge_outputs(owner, composite, frame.ctx);
            }
            debug!(node = owner.name(), "composite complete");
            self.run_operation(owner, frame.ctx)
                .map_err(|error| Halt {
                    error,
                    ctx: frame.ctx,
                })?;
        }
        if let Some(parent) = self.frames.last_mut() {
            parent.cursor += 1;
        }
        Ok(())
    }

    /// Execute one node of `graph` whose private context hangs under
    /// `parent_ctx`. Composites recurse through their whole sub-graph.
    fn execute_node(
        &mut self,
        graph: &'g OpGraph,
        parent_ctx: ContextId,
        vertex: VertexId,
    ) -> Result<(), Halt> {
        let Some(node) = graph.node(vertex) else {
            // Stale handle from a custom processing order.
            return Ok(());
        };
        let ctx = self.contexts.child_for(parent_ctx, node);
        self.pull_inputs(graph, parent_ctx, vertex, node, ctx)
            .map_err(|error| Halt { error, ctx })?;

        if self.disabled(ctx) {
            debug!(node = node.name(), "disabled, skipping");
            return Ok(());
        }
        self.check_required(node, ctx)
            .map_err(|error| Halt { error, ctx })?;

        if let Some(composite) = node.extension::<CompositeNode>() {
            self.bridge_inputs(node, composite, ctx);
            let inner = composite.graph();
            let order = match node.extension::<CustomProcessing>() {
                Some(custom) => custom.processing_order(inner),
                None => inner.topological_order(),
            };
            for v in order {
                self.execute_node(inner, ctx, v)?;
            }
            self.bridge_outputs(node, composite, ctx);
        }
        self.run_operation(node, ctx)
            .map_err(|error| Halt { error, ctx })
    }

    /// Copy values across the node's incoming links into its context,
    /// validating each against the destination field.
    fn pull_inputs(
        &mut self,
        graph: &'g OpGraph,
        parent_ctx: ContextId,
        vertex: VertexId,
        node: &OpNode,
        ctx: ContextId,
    ) -> Result<(), ProcessingError> {
        for &edge in graph.incoming_links(vertex) {
            let Some(link) = graph.link(edge) else {
                continue;
            };
            let Some(source) = graph.node(link.source) else {
                continue;
            };
            // No child context means the source never executed (e.g. it
            // was skipped); no value flows.
            let Some(source_ctx) = self.contexts.find_child(parent_ctx, source) else {
                continue;
            };
            let Some(value) = self.contexts.get_local(source_ctx, &link.source_field).cloned()
            else {
                continue;
            };
            let Some(input) = node.input(&link.dest_field) else {
                continue;
            };
            if !input.validator.accepts(&value) {
                return Err(ProcessingError::InvalidInputType {
                    node: node.name().to_string(),
                    field: link.dest_field.clone(),
                    actual: value.kind().to_string(),
                    accepted: input.validator.to_string(),
                });
            }
            self.contexts.set(ctx, link.dest_field.clone(), value);
        }
        Ok(())
    }

    fn check_required(&self, node: &OpNode, ctx: ContextId) -> Result<(), ProcessingError> {
        for field in node.inputs() {
            if !field.optional && !self.contexts.contains_key(ctx, &field.key) {
                return Err(ProcessingError::RequiredInputMissing {
                    node: node.name().to_string(),
                    field: field.key.clone(),
                });
            }
        }
        Ok(())
    }

    /// Whether the node's context carries a local `enabled: false`.
    fn disabled(&self, ctx: ContextId) -> bool {
        self.contexts
            .get_local(ctx, ENABLED_FIELD)
            .and_then(Value::as_bool)
            == Some(false)
    }

    /// Copy published input values from the composite's context onto the
    /// mapped internal node contexts.
    fn bridge_inputs(&mut self, owner: &OpNode, composite: &'g CompositeNode, ctx: ContextId) {
        let Some(publishable) = owner.extension::<Publishable>() else {
            return;
        };
        let inner = composite.graph();
        for port in &publishable.inputs {
            let Some(value) = self.contexts.get(ctx, &port.key).cloned() else {
                continue;
            };
            let Some(vertex) = inner.node_by_id(&port.node_id) else {
                warn!(
                    composite = owner.name(),
                    node_id = %port.node_id,
                    "published input maps to an unknown internal node"
                );
                continue;
            };
            let Some(target) = inner.node(vertex) else {
                continue;
            };
            let target_ctx = self.contexts.child_for(ctx, target);
            self.contexts.set(target_ctx, port.field.clone(), value);
        }
    }

    /// Copy published output values from internal node contexts back onto
    /// the composite's own context.
    fn bridge_outputs(&mut self, owner: &OpNode, composite: &'g CompositeNode, ctx: ContextId) {
        let Some(publishable) = owner.extension::<Publishable>() else {
            return;
        };
        let inner = composite.graph();
        for port in &publishable.outputs {
            let Some(vertex) = inner.node_by_id(&port.node_id) else {
                warn!(
                    composite = owner.name(),
                    node_id = %port.node_id,
                    "published output maps to an unknown internal node"
                );
                continue;
            };
            let Some(source) = inner.node(vertex) else {
                continue;
            };
            let Some(source_ctx) = self.contexts.find_child(ctx, source) else {
                continue;
            };
            let Some(value) = self.contexts.get_local(source_ctx, &port.field).cloned() else {
                continue;
            };
            self.contexts.set(ctx, port.key.clone(), value);
        }
    }

    fn run_operation(&mut self, node: &OpNode, ctx: ContextId) -> Result<(), ProcessingError> {
        if !node.has_operation() {
            return Ok(());
        }
        let mut scope = self.contexts.scope(ctx);
        let outcome = catch_unwind(AssertUnwindSafe(|| node.operate(&mut scope)));
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ProcessingError::NodeExecution {
                node: node.name().to_string(),
                cause: e.to_string(),
            }),
            // `as_ref` matters: `&payload` would coerce the Box itself to
            // `dyn Any` and both downcasts below would always miss.
            Err(payload) => Err(ProcessingError::NodePanic {
                node: node.name().to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opflow_core::prelude::*;

    fn emitter(id: &str, value: i64) -> OpNode {
        OpNode::with_id(id, id)
            .with_output(OutputField::new("out").with_type(ValueKind::Number))
            .with_operation(move |scope: &mut Scope<'_>| {
                scope.set("out", Value::int(value));
                Ok(())
            })
    }

    fn adder(id: &str) -> OpNode {
        OpNode::with_id(id, id)
            .with_input(InputField::new("lhs").with_validator(ValueKind::Number))
            .with_input(InputField::new("rhs").with_validator(ValueKind::Number))
            .with_output(OutputField::new("sum").with_type(ValueKind::Number))
            .with_operation(|scope: &mut Scope<'_>| {
                let lhs = scope.get("lhs").and_then(Value::as_i64).unwrap_or(0);
                let rhs = scope.get("rhs").and_then(Value::as_i64).unwrap_or(0);
                scope.set("sum", Value::int(lhs + rhs));
                Ok(())
            })
    }

    fn output_of(processor: &Processor<'_>, node: &OpNode, key: &str) -> Option<i64> {
        let ctx = processor.contexts().find_child(OpContext::ROOT, node)?;
        processor.contexts().get_local(ctx, key).and_then(Value::as_i64)
    }

    #[test]
    fn values_flow_across_links() {
        let mut graph = OpGraph::new();
        let a = graph.add_node(emitter("a", 2)).unwrap();
        let b = graph.add_node(emitter("b", 3)).unwrap();
        let sum = graph.add_node(adder("sum")).unwrap();
        graph.add_link(OpLink::new(a, "out", sum, "lhs")).unwrap();
        graph.add_link(OpLink::new(b, "out", sum, "rhs")).unwrap();

        let mut processor = Processor::new(&graph);
        assert_eq!(processor.state(), ProcessorState::Idle);
        processor.step_all();
        assert_eq!(processor.state(), ProcessorState::Exhausted);

        let node = graph.node(sum).unwrap();
        assert_eq!(output_of(&processor, node, "sum"), Some(5));
    }

    #[test]
    fn missing_required_input_halts() {
        let mut graph = OpGraph::new();
        graph.add_node(adder("sum")).unwrap();

        let mut processor = Processor::new(&graph);
        assert!(!processor.step());
        assert_eq!(processor.state(), ProcessorState::Errored);
        let error = processor.error().unwrap();
        assert_eq!(error.code(), "P001");
        // Halted for good: further stepping is a no-op.
        assert!(!processor.step());

        // The failing node's own scope is exposed for post-mortems.
        let node = graph.nodes().next().unwrap().1;
        let ctx = processor.contexts().find_child(OpContext::ROOT, node);
        assert_eq!(processor.error_context(), ctx);
    }

    #[test]
    fn link_value_failing_the_validator_halts() {
        let mut graph = OpGraph::new();
        // Declares Number, produces String: caught at run time.
        let liar = graph
            .add_node(
                OpNode::with_id("liar", "liar")
                    .with_output(OutputField::new("out").with_type(ValueKind::Number))
                    .with_operation(|scope: &mut Scope<'_>| {
                        scope.set("out", Value::string("surprise"));
                        Ok(())
                    }),
            )
            .unwrap();
        let sum = graph.add_node(adder("sum")).unwrap();
        graph.add_link(OpLink::new(liar, "out", sum, "lhs")).unwrap();

        let mut processor = Processor::new(&graph);
        let node = graph.node(sum).unwrap();
        let ctx_seed = {
            // Satisfy rhs so only the pulled value can fail.
            let ctx = processor.contexts_mut().child_for(OpContext::ROOT, node);
            processor.contexts_mut().set(ctx, "rhs", Value::int(1));
            ctx
        };
        processor.step_all();

        assert_eq!(processor.error().unwrap().code(), "P002");
        assert!(processor.contexts().get_local(ctx_seed, "sum").is_none());

        // error_context points at the failing node's scope; the preset
        // value that did pass is still inspectable there.
        assert_eq!(processor.error_context(), Some(ctx_seed));
        assert_eq!(
            processor
                .contexts()
                .get_local(ctx_seed, "rhs")
                .and_then(Value::as_i64),
            Some(1)
        );
    }

    #[test]
    fn disabled_node_is_skipped_without_error() {
        let mut graph = OpGraph::new();
        let a = graph.add_node(emitter("a", 7)).unwrap();
        let sum = graph.add_node(adder("sum")).unwrap();
        graph.add_link(OpLink::new(a, "out", sum, "lhs")).unwrap();

        let mut processor = Processor::new(&graph);
        let node = graph.node(sum).unwrap();
        let ctx = processor.contexts_mut().child_for(OpContext::ROOT, node);
        processor.contexts_mut().set(ctx, "rhs", Value::int(1));
        processor.contexts_mut().set(ctx, ENABLED_FIELD, Value::bool(false));
        processor.step_all();

        assert_eq!(processor.state(), ProcessorState::Exhausted);
        assert!(processor.error().is_none());
        assert!(processor.contexts().get_local(ctx, "sum").is_none());
    }

    #[test]
    fn panicking_operation_is_captured() {
        let mut graph = OpGraph::new();
        graph
            .add_node(
                OpNode::with_id("boom", "boom").with_operation(|_: &mut Scope<'_>| {
                    panic!("kaboom");
                }),
            )
            .unwrap();

        let mut processor = Processor::new(&graph);
        assert!(!processor.step());
        match processor.error().unwrap() {
            ProcessingError::NodePanic { message, .. } => assert_eq!(message, "kaboom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn formatted_panic_payload_is_captured() {
        let mut graph = OpGraph::new();
        graph
            .add_node(
                OpNode::with_id("boom", "boom").with_operation(|_: &mut Scope<'_>| {
                    panic!("bad value: {}", 3);
                }),
            )
            .unwrap();

        let mut processor = Processor::new(&graph);
        assert!(!processor.step());
        match processor.error().unwrap() {
            ProcessingError::NodePanic { message, .. } => assert_eq!(message, "bad value: 3"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failing_operation_is_captured_with_cause() {
        let mut graph = OpGraph::new();
        graph
            .add_node(
                OpNode::with_id("bad", "bad")
                    .with_operation(|_: &mut Scope<'_>| Err("disk on fire".into())),
            )
            .unwrap();

        let mut processor = Processor::new(&graph);
        processor.step_all();
        let error = processor.error().unwrap();
        assert_eq!(error.code(), "P003");
        assert!(format!("{error}").contains("disk on fire"));
    }

    #[test]
    fn reset_clears_error_and_node_state_but_keeps_root_values() {
        let mut graph = OpGraph::new();
        let sum = graph.add_node(adder("sum")).unwrap();

        let mut processor = Processor::new(&graph);
        processor
            .contexts_mut()
            .set(OpContext::ROOT, "ambient", Value::int(9));
        processor.step_all();
        assert_eq!(processor.state(), ProcessorState::Errored);

        processor.reset();
        assert_eq!(processor.state(), ProcessorState::Idle);
        assert!(processor.error().is_none());
        assert_eq!(
            processor
                .contexts()
                .get(OpContext::ROOT, "ambient")
                .and_then(Value::as_i64),
            Some(9)
        );
        let node = graph.node(sum).unwrap();
        assert!(processor.contexts().find_child(OpContext::ROOT, node).is_none());
    }
}
