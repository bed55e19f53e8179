//! Hierarchical key/value contexts for graph execution.
//!
//! A context tree is arena-allocated: `ContextId` handles index slots
//! owned by one `OpContext`. Lookups resolve locally first and then walk
//! the parent chain, modelling lexical scoping so a nested macro execution
//! still sees ambient values from its enclosing scope. Each node gets a
//! private child context keyed by its instance id; removing the child
//! explicitly reclaims its whole subtree (the arena replaces the original
//! design's collector-assisted weak maps).

use crate::node::OpNode;
use crate::value::Value;
use fxhash::FxHashMap;
use std::fmt;

/// Handle to a context slot within one [`OpContext`] tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u32);

impl ContextId {
    const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

struct ContextSlot {
    parent: Option<ContextId>,
    values: FxHashMap<String, Value>,
    /// Child contexts keyed by node instance id. Lazily created, at most
    /// one per node, never shared with another context.
    children: FxHashMap<u64, ContextId>,
}

impl ContextSlot {
    fn new(parent: Option<ContextId>) -> Self {
        Self {
            parent,
            values: FxHashMap::default(),
            children: FxHashMap::default(),
        }
    }
}

/// A tree of hierarchical key/value scopes.
pub struct OpContext {
    slots: Vec<Option<ContextSlot>>,
    free: Vec<u32>,
}

impl Default for OpContext {
    fn default() -> Self {
        Self::new()
    }
}

impl OpContext {
    /// Handle of the root scope every tree starts with.
    pub const ROOT: ContextId = ContextId(0);

    /// Create a tree containing only the root scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: vec![Some(ContextSlot::new(None))],
            free: Vec::new(),
        }
    }

    fn slot(&self, id: ContextId) -> Option<&ContextSlot> {
        self.slots.get(id.index())?.as_ref()
    }

    fn slot_mut(&mut self, id: ContextId) -> Option<&mut ContextSlot> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Parent of a scope, `None` for the root or a dead handle.
    #[must_use]
    pub fn parent(&self, id: ContextId) -> Option<ContextId> {
        self.slot(id)?.parent
    }

    /// Resolve a key, falling through the parent chain when absent locally.
    #[must_use]
    pub fn get(&self, id: ContextId, key: &str) -> Option<&Value> {
        let mut current = Some(id);
        while let Some(ctx) = current {
            let slot = self.slot(ctx)?;
            if let Some(value) = slot.values.get(key) {
                return Some(value);
            }
            current = slot.parent;
        }
        None
    }

    /// Resolve a key in the given scope only, without parent fallthrough.
    #[must_use]
    pub fn get_local(&self, id: ContextId, key: &str) -> Option<&Value> {
        self.slot(id)?.values.get(key)
    }

    /// Whether a key resolves, consistent with [`OpContext::get`].
    #[must_use]
    pub fn contains_key(&self, id: ContextId, key: &str) -> bool {
        self.get(id, key).is_some()
    }

    /// Set a key in the given scope.
    pub fn set(&mut self, id: ContextId, key: impl Into<String>, value: Value) {
        if let Some(slot) = self.slot_mut(id) {
            slot.values.insert(key.into(), value);
        } else {
            debug_assert!(false, "set on dead context {id}");
        }
    }

    /// Remove a key from the given scope (local only), returning it.
    pub fn remove(&mut self, id: ContextId, key: &str) -> Option<Value> {
        self.slot_mut(id)?.values.remove(key)
    }

    /// The private child scope of `node` under `id`, created on first use.
    ///
    /// Idempotent: repeated calls return the same handle.
    pub fn child_for(&mut self, id: ContextId, node: &OpNode) -> ContextId {
        if let Some(existing) = self.find_child(id, node) {
            return existing;
        }
        let child = self.allocate(ContextSlot::new(Some(id)));
        if let Some(slot) = self.slot_mut(id) {
            slot.children.insert(node.instance(), child);
        } else {
            debug_assert!(false, "child_for on dead context {id}");
        }
        child
    }

    /// The private child scope of `node` under `id`, if it exists.
    #[must_use]
    pub fn find_child(&self, id: ContextId, node: &OpNode) -> Option<ContextId> {
        self.slot(id)?.children.get(&node.instance()).copied()
    }

    /// Reclaim `node`'s private child scope and its whole subtree.
    pub fn remove_child(&mut self, id: ContextId, node: &OpNode) {
        let child = self
            .slot_mut(id)
            .and_then(|slot| slot.children.remove(&node.instance()));
        if let Some(child) = child {
            self.free_subtree(child);
        }
    }

    /// Reclaim every child scope under `id`, keeping its own values.
    pub fn clear_children(&mut self, id: ContextId) {
        let children: Vec<ContextId> = self
            .slot_mut(id)
            .map(|slot| slot.children.drain().map(|(_, c)| c).collect())
            .unwrap_or_default();
        for child in children {
            self.free_subtree(child);
        }
    }

    /// Collect the values stored under `key` in `id` and every child
    /// scope it recursively holds. Debugging aid; local values only, no
    /// parent fallthrough.
    #[must_use]
    pub fn collect_values(&self, id: ContextId, key: &str) -> Vec<Value> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(ctx) = stack.pop() {
            if let Some(slot) = self.slot(ctx) {
                if let Some(value) = slot.values.get(key) {
                    out.push(value.clone());
                }
                let mut children: Vec<ContextId> = slot.children.values().copied().collect();
                children.sort_by_key(|c| c.0);
                stack.extend(children.into_iter().rev());
            }
        }
        out
    }

    /// Borrow a mutable view of one scope for an `operate` call.
    pub fn scope(&mut self, id: ContextId) -> Scope<'_> {
        Scope { tree: self, id }
    }

    fn allocate(&mut self, slot: ContextSlot) -> ContextId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                ContextId(index)
            }
            None => {
                self.slots.push(Some(slot));
                ContextId((self.slots.len() - 1) as u32)
            }
        }
    }

    fn free_subtree(&mut self, id: ContextId) {
        let mut stack = vec![id];
        while let Some(ctx) = stack.pop() {
            if let Some(slot) = self.slots.get_mut(ctx.index()).and_then(Option::take) {
                stack.extend(slot.children.values().copied());
                self.free.push(ctx.index() as u32);
            }
        }
    }
}

impl fmt::Debug for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let live = self.slots.iter().filter(|s| s.is_some()).count();
        f.debug_struct("OpContext")
            .field("live_scopes", &live)
            .finish_non_exhaustive()
    }
}

/// Mutable view of one scope, handed to a node's `operate`.
pub struct Scope<'a> {
    tree: &'a mut OpContext,
    id: ContextId,
}

impl Scope<'_> {
    /// Handle of the scope this view covers.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Resolve a key through the parent chain.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.tree.get(self.id, key)
    }

    /// Resolve a key in this scope only.
    #[must_use]
    pub fn get_local(&self, key: &str) -> Option<&Value> {
        self.tree.get_local(self.id, key)
    }

    /// Whether a key resolves through the parent chain.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.tree.contains_key(self.id, key)
    }

    /// Write an output value into this scope.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.tree.set(self.id, key, value);
    }

    /// Remove a key from this scope.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.tree.remove(self.id, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_chain_resolution() {
        let mut ctx = OpContext::new();
        let node = OpNode::new("n");
        let child = ctx.child_for(OpContext::ROOT, &node);

        ctx.set(OpContext::ROOT, "ambient", Value::int(1));
        ctx.set(child, "local", Value::int(2));

        assert_eq!(ctx.get(child, "local"), Some(&Value::int(2)));
        assert_eq!(ctx.get(child, "ambient"), Some(&Value::int(1)));
        assert_eq!(ctx.get(OpContext::ROOT, "local"), None);
        assert!(ctx.contains_key(child, "ambient"));
        assert!(!ctx.contains_key(OpContext::ROOT, "local"));
    }

    #[test]
    fn local_shadows_parent() {
        let mut ctx = OpContext::new();
        let node = OpNode::new("n");
        let child = ctx.child_for(OpContext::ROOT, &node);

        ctx.set(OpContext::ROOT, "k", Value::string("outer"));
        ctx.set(child, "k", Value::string("inner"));

        assert_eq!(ctx.get(child, "k"), Some(&Value::string("inner")));
        assert_eq!(ctx.get_local(child, "k"), Some(&Value::string("inner")));
        assert_eq!(ctx.get(OpContext::ROOT, "k"), Some(&Value::string("outer")));
    }

    #[test]
    fn child_for_is_idempotent() {
        let mut ctx = OpContext::new();
        let node = OpNode::new("n");
        let a = ctx.child_for(OpContext::ROOT, &node);
        let b = ctx.child_for(OpContext::ROOT, &node);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_instances_get_distinct_children() {
        let mut ctx = OpContext::new();
        let a = OpNode::with_id("same", "a");
        let b = OpNode::with_id("same", "b");
        let ca = ctx.child_for(OpContext::ROOT, &a);
        let cb = ctx.child_for(OpContext::ROOT, &b);
        assert_ne!(ca, cb);
    }

    #[test]
    fn remove_child_reclaims_subtree() {
        let mut ctx = OpContext::new();
        let outer = OpNode::new("outer");
        let inner = OpNode::new("inner");
        let c1 = ctx.child_for(OpContext::ROOT, &outer);
        let c2 = ctx.child_for(c1, &inner);
        ctx.set(c2, "k", Value::int(1));

        ctx.remove_child(OpContext::ROOT, &outer);
        assert_eq!(ctx.get(c1, "k"), None);
        assert_eq!(ctx.get(c2, "k"), None);
        assert!(ctx.find_child(OpContext::ROOT, &outer).is_none());
    }

    #[test]
    fn collect_values_walks_children() {
        let mut ctx = OpContext::new();
        let a = OpNode::new("a");
        let b = OpNode::new("b");
        let ca = ctx.child_for(OpContext::ROOT, &a);
        let cb = ctx.child_for(OpContext::ROOT, &b);

        ctx.set(OpContext::ROOT, "x", Value::int(0));
        ctx.set(ca, "x", Value::int(1));
        ctx.set(cb, "x", Value::int(2));
        ctx.set(cb, "y", Value::int(3));

        let mut values: Vec<i64> = ctx
            .collect_values(OpContext::ROOT, "x")
            .iter()
            .filter_map(Value::as_i64)
            .collect();
        values.sort_unstable();
        assert_eq!(values, vec![0, 1, 2]);
        assert_eq!(ctx.collect_values(OpContext::ROOT, "y").len(), 1);
    }

    #[test]
    fn scope_view() {
        let mut ctx = OpContext::new();
        let node = OpNode::new("n");
        let child = ctx.child_for(OpContext::ROOT, &node);
        ctx.set(OpContext::ROOT, "in", Value::int(5));

        let mut scope = ctx.scope(child);
        let doubled = scope.get("in").and_then(Value::as_i64).unwrap() * 2;
        scope.set("out", Value::int(doubled));

        assert_eq!(ctx.get_local(child, "out"), Some(&Value::int(10)));
        assert_eq!(ctx.get_local(OpContext::ROOT, "out"), None);
    }
}
