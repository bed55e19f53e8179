//! Operation nodes: the unit of computation in a graph.

use crate::context::Scope;
use crate::error::{GraphError, NodeError};
use crate::extensions::ExtensionMap;
use crate::field::{FieldDirection, InputField, OutputField};
use crate::value::ValueKind;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Key of the built-in boolean input every node carries.
///
/// When it resolves to `false` at step time, the node's `operate` is
/// skipped and no outputs are produced.
pub const ENABLED_FIELD: &str = "enabled";

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// The computation contract a node fulfills.
///
/// Implementations read inputs and write outputs through the node's
/// context scope, and must not retain the scope beyond the call.
/// Implemented for plain closures as a convenience:
///
/// ```
/// use opflow_core::prelude::*;
///
/// let node = OpNode::new("double").with_operation(|scope: &mut Scope<'_>| {
///     let x = scope.get("x").and_then(Value::as_i64).unwrap_or(0);
///     scope.set("out", Value::int(x * 2));
///     Ok(())
/// });
/// assert!(node.has_operation());
/// ```
pub trait Operation {
    /// Execute the node against its private context scope.
    ///
    /// # Errors
    ///
    /// Any error is converted by the processor into its fatal
    /// node-execution condition.
    fn operate(&self, scope: &mut Scope<'_>) -> Result<(), NodeError>;
}

impl<F> Operation for F
where
    F: Fn(&mut Scope<'_>) -> Result<(), NodeError>,
{
    fn operate(&self, scope: &mut Scope<'_>) -> Result<(), NodeError> {
        self(scope)
    }
}

/// Change notification emitted by a node to registered listeners.
///
/// Listener fan-out exists for editor reactivity; nothing in the core
/// requires a listener to be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A field was added or replaced.
    FieldAdded {
        /// Direction of the field.
        direction: FieldDirection,
        /// Key of the field.
        key: String,
    },
    /// A field was removed.
    FieldRemoved {
        /// Direction of the field.
        direction: FieldDirection,
        /// Key of the field.
        key: String,
    },
    /// A node property (name, category, description) changed.
    PropertyChanged {
        /// Name of the property.
        property: &'static str,
    },
}

type NodeListener = Box<dyn FnMut(&NodeEvent)>;

/// A node in an operation graph.
///
/// Owns ordered input and output field lists (inputs are always seeded
/// with the fixed [`ENABLED_FIELD`]), a capability bag of extensions, and
/// an optional [`Operation`]. The string id is unique per graph and is
/// generated when the caller supplies none; the instance id is unique per
/// process and is what gives two nodes with equal string ids distinct
/// identities.
pub struct OpNode {
    id: String,
    instance: u64,
    name: String,
    category: String,
    description: String,
    inputs: Vec<InputField>,
    outputs: Vec<OutputField>,
    extensions: ExtensionMap,
    operation: Option<Box<dyn Operation>>,
    listeners: Vec<NodeListener>,
}

impl OpNode {
    /// Create a node with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name)
    }

    /// Create a node with an explicit id.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        let enabled = InputField::new(ENABLED_FIELD)
            .with_description("Whether this node executes")
            .with_validator(ValueKind::Bool)
            .optional()
            .fixed();
        Self {
            id: id.into(),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            category: String::new(),
            description: String::new(),
            inputs: vec![enabled],
            outputs: Vec::new(),
            extensions: ExtensionMap::new(),
            operation: None,
            listeners: Vec::new(),
        }
    }

    /// Set the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Add an input field.
    ///
    /// # Panics
    ///
    /// Panics if `field` collides with a fixed field; use
    /// [`OpNode::put_input`] to handle that case as an error.
    #[must_use]
    pub fn with_input(mut self, field: InputField) -> Self {
        match self.put_input(field) {
            Ok(()) => self,
            Err(e) => panic!("with_input: {e}"),
        }
    }

    /// Add an output field.
    ///
    /// # Panics
    ///
    /// Panics if `field` collides with a fixed field; use
    /// [`OpNode::put_output`] to handle that case as an error.
    #[must_use]
    pub fn with_output(mut self, field: OutputField) -> Self {
        match self.put_output(field) {
            Ok(()) => self,
            Err(e) => panic!("with_output: {e}"),
        }
    }

    /// Attach the operation implementation.
    #[must_use]
    pub fn with_operation(mut self, op: impl Operation + 'static) -> Self {
        self.operation = Some(Box::new(op));
        self
    }

    /// The node's string id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The node's process-unique instance id.
    ///
    /// Contexts key per-node private state by this, so two distinct node
    /// instances never share state even with identical string ids.
    #[must_use]
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// The node's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the node.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.emit(NodeEvent::PropertyChanged { property: "name" });
    }

    /// The node's category.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Set the category.
    pub fn set_category(&mut self, category: impl Into<String>) {
        self.category = category.into();
        self.emit(NodeEvent::PropertyChanged {
            property: "category",
        });
    }

    /// The node's description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Set the description.
    pub fn set_description(&mut self, desc: impl Into<String>) {
        self.description = desc.into();
        self.emit(NodeEvent::PropertyChanged {
            property: "description",
        });
    }

    /// Ordered input fields.
    #[must_use]
    pub fn inputs(&self) -> &[InputField] {
        &self.inputs
    }

    /// Ordered output fields.
    #[must_use]
    pub fn outputs(&self) -> &[OutputField] {
        &self.outputs
    }

    /// Look up an input field by key.
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&InputField> {
        self.inputs.iter().find(|f| f.key == key)
    }

    /// Look up an output field by key.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&OutputField> {
        self.outputs.iter().find(|f| f.key == key)
    }

    /// Add or replace an input field, keyed by `field.key`.
    ///
    /// # Errors
    ///
    /// `GraphError::FixedField` if a fixed field with the same key exists.
    pub fn put_input(&mut self, field: InputField) -> Result<(), GraphError> {
        let key = field.key.clone();
        if let Some(existing) = self.inputs.iter_mut().find(|f| f.key == field.key) {
            if existing.fixed {
                return Err(GraphError::FixedField {
                    node: self.name.clone(),
                    field: key,
                });
            }
            *existing = field;
        } else {
            self.inputs.push(field);
        }
        self.emit(NodeEvent::FieldAdded {
            direction: FieldDirection::Input,
            key,
        });
        Ok(())
    }

    /// Add or replace an output field, keyed by `field.key`.
    ///
    /// # Errors
    ///
    /// `GraphError::FixedField` if a fixed field with the same key exists.
    pub fn put_output(&mut self, field: OutputField) -> Result<(), GraphError> {
        let key = field.key.clone();
        if let Some(existing) = self.outputs.iter_mut().find(|f| f.key == field.key) {
            if existing.fixed {
                return Err(GraphError::FixedField {
                    node: self.name.clone(),
                    field: key,
                });
            }
            *existing = field;
        } else {
            self.outputs.push(field);
        }
        self.emit(NodeEvent::FieldAdded {
            direction: FieldDirection::Output,
            key,
        });
        Ok(())
    }

    /// Remove an input field by key, returning it.
    ///
    /// # Errors
    ///
    /// `GraphError::FixedField` if the field is fixed.
    pub fn remove_input(&mut self, key: &str) -> Result<Option<InputField>, GraphError> {
        let Some(index) = self.inputs.iter().position(|f| f.key == key) else {
            return Ok(None);
        };
        if self.inputs[index].fixed {
            return Err(GraphError::FixedField {
                node: self.name.clone(),
                field: key.to_string(),
            });
        }
        let field = self.inputs.remove(index);
        self.emit(NodeEvent::FieldRemoved {
            direction: FieldDirection::Input,
            key: key.to_string(),
        });
        Ok(Some(field))
    }

    /// Remove an output field by key, returning it.
    ///
    /// # Errors
    ///
    /// `GraphError::FixedField` if the field is fixed.
    pub fn remove_output(&mut self, key: &str) -> Result<Option<OutputField>, GraphError> {
        let Some(index) = self.outputs.iter().position(|f| f.key == key) else {
            return Ok(None);
        };
        if self.outputs[index].fixed {
            return Err(GraphError::FixedField {
                node: self.name.clone(),
                field: key.to_string(),
            });
        }
        let field = self.outputs.remove(index);
        self.emit(NodeEvent::FieldRemoved {
            direction: FieldDirection::Output,
            key: key.to_string(),
        });
        Ok(Some(field))
    }

    /// The node's capability bag.
    #[must_use]
    pub fn extensions(&self) -> &ExtensionMap {
        &self.extensions
    }

    /// The node's capability bag, mutably.
    pub fn extensions_mut(&mut self) -> &mut ExtensionMap {
        &mut self.extensions
    }

    /// Shorthand for `extensions().get::<T>()`.
    #[must_use]
    pub fn extension<T: std::any::Any>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    /// Install a capability, builder style.
    #[must_use]
    pub fn with_extension<T: std::any::Any>(mut self, extension: T) -> Self {
        self.extensions.put(extension);
        self
    }

    /// Whether an operation implementation is attached.
    #[must_use]
    pub fn has_operation(&self) -> bool {
        self.operation.is_some()
    }

    /// Run the attached operation, if any.
    ///
    /// A node without an operation is a no-op; composite behavior comes
    /// from the processor descending into the composite extension instead.
    ///
    /// # Errors
    ///
    /// Whatever the operation itself reports.
    pub fn operate(&self, scope: &mut Scope<'_>) -> Result<(), NodeError> {
        match &self.operation {
            Some(op) => op.operate(scope),
            None => Ok(()),
        }
    }

    /// Register a change listener.
    pub fn add_listener(&mut self, listener: impl FnMut(&NodeEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&mut self, event: NodeEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

impl fmt::Debug for OpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpNode")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("name", &self.name)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("has_operation", &self.operation.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::TypeSpec;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn enabled_field_is_built_in() {
        let node = OpNode::new("n");
        let enabled = node.input(ENABLED_FIELD).unwrap();
        assert!(enabled.fixed);
        assert!(enabled.optional);
        assert_eq!(enabled.validator, TypeSpec::One(ValueKind::Bool));
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = OpNode::new("a");
        let b = OpNode::new("b");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn equal_ids_distinct_instances() {
        let a = OpNode::with_id("same", "a");
        let b = OpNode::with_id("same", "b");
        assert_eq!(a.id(), b.id());
        assert_ne!(a.instance(), b.instance());
    }

    #[test]
    fn put_field_replaces_by_key() {
        let mut node = OpNode::new("n").with_input(InputField::new("x"));
        assert_eq!(node.inputs().len(), 2); // enabled + x

        node.put_input(InputField::new("x").optional()).unwrap();
        assert_eq!(node.inputs().len(), 2);
        assert!(node.input("x").unwrap().optional);
    }

    #[test]
    fn fixed_field_cannot_be_replaced_or_removed() {
        let mut node = OpNode::new("n");
        let err = node.put_input(InputField::new(ENABLED_FIELD)).unwrap_err();
        assert!(matches!(err, GraphError::FixedField { .. }));

        let err = node.remove_input(ENABLED_FIELD).unwrap_err();
        assert!(matches!(err, GraphError::FixedField { .. }));
        assert!(node.input(ENABLED_FIELD).is_some());
    }

    #[test]
    fn remove_missing_field_is_none() {
        let mut node = OpNode::new("n");
        assert!(node.remove_input("ghost").unwrap().is_none());
        assert!(node.remove_output("ghost").unwrap().is_none());
    }

    #[test]
    fn listeners_observe_field_changes() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);

        let mut node = OpNode::new("n");
        node.add_listener(move |event| sink.borrow_mut().push(event.clone()));

        node.put_input(InputField::new("x")).unwrap();
        node.remove_input("x").unwrap();
        node.set_name("renamed");

        let events = events.borrow();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], NodeEvent::FieldAdded { key, .. } if key == "x"));
        assert!(matches!(&events[1], NodeEvent::FieldRemoved { key, .. } if key == "x"));
        assert!(matches!(
            &events[2],
            NodeEvent::PropertyChanged { property: "name" }
        ));
    }
}
