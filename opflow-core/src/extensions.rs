//! Type-indexed capability registry for nodes.
//!
//! Optional node behaviors (composite sub-graph ownership, published ports,
//! custom step order) attach as extensions instead of forcing every node
//! kind into an inheritance hierarchy. At most one instance per capability
//! type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Map from capability type to its single instance.
#[derive(Default)]
pub struct ExtensionMap {
    map: HashMap<TypeId, Box<dyn Any>>,
}

impl ExtensionMap {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a capability, returning the previously installed instance
    /// of the same type if one was present.
    pub fn put<T: Any>(&mut self, extension: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(extension))
            .map(|prev| *prev.downcast::<T>().expect("keyed by TypeId"))
    }

    /// Get a capability by type.
    #[must_use]
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|ext| ext.downcast_ref::<T>())
    }

    /// Get a capability mutably.
    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|ext| ext.downcast_mut::<T>())
    }

    /// Remove and return a capability.
    pub fn remove<T: Any>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .map(|ext| *ext.downcast::<T>().expect("keyed by TypeId"))
    }

    /// Whether a capability of the given type is installed.
    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    /// Number of installed capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no capability is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for ExtensionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionMap")
            .field("len", &self.map.len())
            .finish_non_exhaustive()
    }
}
