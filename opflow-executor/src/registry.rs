//! Node factories and the type registry.
//!
//! Editors and loaders instantiate nodes by type name rather than by
//! constructor. A [`NodeFactory`] builds one node type from JSON
//! parameters; the [`NodeRegistry`] maps type names to factories.

use opflow_core::{NodeError, OpNode};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Builds nodes of one type from serialized parameters.
pub trait NodeFactory {
    /// Stable type name this factory is registered under.
    fn type_name(&self) -> &str;

    /// Construct a node with the given string id.
    ///
    /// # Errors
    ///
    /// Any error the construction surfaces (e.g. malformed parameters).
    fn create(&self, id: &str, params: &JsonValue) -> Result<OpNode, NodeError>;
}

/// Error from registry-driven instantiation.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No factory is registered under the requested type name.
    #[error("R001: no factory registered for node type '{type_name}'")]
    UnknownType {
        /// The unresolved type name.
        type_name: String,
    },

    /// The factory itself failed.
    #[error("R002: factory for '{type_name}' failed: {cause}")]
    Construction {
        /// Type name of the failing factory.
        type_name: String,
        /// Stringified failure from the factory.
        cause: String,
    },
}

impl RegistryError {
    /// Get the error code (e.g., "R001").
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownType { .. } => "R001",
            Self::Construction { .. } => "R002",
        }
    }
}

struct FnFactory<F> {
    type_name: String,
    build: F,
}

impl<F> NodeFactory for FnFactory<F>
where
    F: Fn(&str, &JsonValue) -> Result<OpNode, NodeError>,
{
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn create(&self, id: &str, params: &JsonValue) -> Result<OpNode, NodeError> {
        (self.build)(id, params)
    }
}

/// Maps node type names to their factories.
#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Box<dyn NodeFactory>>,
}

impl NodeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its own type name, replacing any previous
    /// registration for that name.
    pub fn register(&mut self, factory: impl NodeFactory + 'static) {
        let name = factory.type_name().to_string();
        if self.factories.insert(name.clone(), Box::new(factory)).is_some() {
            debug!(type_name = %name, "factory replaced");
        }
    }

    /// Register a closure as a factory.
    pub fn register_fn(
        &mut self,
        type_name: impl Into<String>,
        build: impl Fn(&str, &JsonValue) -> Result<OpNode, NodeError> + 'static,
    ) {
        self.register(FnFactory {
            type_name: type_name.into(),
            build,
        });
    }

    /// Whether a factory is registered under `type_name`.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no factories are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate a node of the named type.
    ///
    /// # Errors
    ///
    /// `RegistryError::UnknownType` when nothing is registered under
    /// `type_name`; `RegistryError::Construction` when the factory fails.
    pub fn create(
        &self,
        type_name: &str,
        id: &str,
        params: &JsonValue,
    ) -> Result<OpNode, RegistryError> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| RegistryError::UnknownType {
                type_name: type_name.to_string(),
            })?;
        factory
            .create(id, params)
            .map_err(|e| RegistryError::Construction {
                type_name: type_name.to_string(),
                cause: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opflow_core::prelude::*;
    use serde_json::json;

    fn constant_factory(registry: &mut NodeRegistry) {
        registry.register_fn("constant", |id, params| {
            let value = params
                .get("value")
                .and_then(serde_json::Value::as_i64)
                .ok_or("constant requires a numeric 'value' parameter")?;
            Ok(OpNode::with_id(id, "constant")
                .with_output(OutputField::new("out").with_type(ValueKind::Number))
                .with_operation(move |scope: &mut Scope<'_>| {
                    scope.set("out", Value::int(value));
                    Ok(())
                }))
        });
    }

    #[test]
    fn create_by_type_name() {
        let mut registry = NodeRegistry::new();
        constant_factory(&mut registry);

        let node = registry
            .create("constant", "c1", &json!({ "value": 4 }))
            .unwrap();
        assert_eq!(node.id(), "c1");
        assert!(node.has_operation());
    }

    #[test]
    fn unknown_type_is_an_error() {
        let registry = NodeRegistry::new();
        let err = registry.create("ghost", "g", &json!({})).unwrap_err();
        assert_eq!(err.code(), "R001");
    }

    #[test]
    fn factory_failure_carries_the_cause() {
        let mut registry = NodeRegistry::new();
        constant_factory(&mut registry);

        let err = registry.create("constant", "c1", &json!({})).unwrap_err();
        assert_eq!(err.code(), "R002");
        assert!(format!("{err}").contains("numeric"));
    }

    #[test]
    fn type_names_are_sorted() {
        let mut registry = NodeRegistry::new();
        registry.register_fn("zeta", |id, _| Ok(OpNode::with_id(id, "zeta")));
        registry.register_fn("alpha", |id, _| Ok(OpNode::with_id(id, "alpha")));
        assert_eq!(registry.type_names(), vec!["alpha", "zeta"]);
    }
}
