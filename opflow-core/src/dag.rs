//! Generic directed acyclic graph container.
//!
//! `Dag<V, E>` owns vertices and edges in index-addressed arenas and
//! maintains a memoized topological ordering with per-vertex levels. The
//! ordering invariant holds whenever it is read: no committed edge ever
//! points from a later vertex to an earlier one, and a mutation that would
//! break the invariant is rolled back before it becomes observable.
//!
//! Identity is the arena index. Two edges with equal payloads are still
//! distinct edges, which is what allows parallel links between the same
//! pair of nodes with different field bindings.

use crate::error::DagError;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::fmt;

/// Stable handle to a vertex slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(u32);

impl VertexId {
    /// Create a vertex id from a raw slot index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Stable handle to an edge slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u32);

impl EdgeId {
    /// Create an edge id from a raw slot index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

struct VertexSlot<V> {
    payload: V,
    /// Incoming edge ids, maintained eagerly on every mutation that
    /// touches this endpoint. `SmallVec` avoids heap alloc for <= 4 edges.
    incoming: SmallVec<[EdgeId; 4]>,
    /// Outgoing edge ids, same maintenance discipline.
    outgoing: SmallVec<[EdgeId; 4]>,
}

struct EdgeSlot<E> {
    source: VertexId,
    target: VertexId,
    payload: E,
}

/// Memoized result of the ordering pass.
#[derive(Clone, Default)]
struct Topology {
    /// Vertices in topological order (sources first).
    order: Vec<VertexId>,
    /// Level per vertex slot index; meaningful only for live slots.
    levels: Vec<u32>,
}

/// A directed acyclic graph with vertex payloads `V` and edge payloads `E`.
pub struct Dag<V, E> {
    vertices: Vec<Option<VertexSlot<V>>>,
    edges: Vec<Option<EdgeSlot<E>>>,
    free_vertices: Vec<u32>,
    free_edges: Vec<u32>,
    vertex_count: usize,
    edge_count: usize,
    /// `None` means stale; recomputed lazily on read. Interior mutability
    /// so reads of the ordering work through `&self`.
    topology: RwLock<Option<Topology>>,
}

impl<V, E> Default for Dag<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> Dag<V, E> {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            edges: Vec::new(),
            free_vertices: Vec::new(),
            free_edges: Vec::new(),
            vertex_count: 0,
            edge_count: 0,
            topology: RwLock::new(Some(Topology::default())),
        }
    }

    /// Number of live vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Number of live edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Whether the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertex_count == 0
    }

    /// Add a vertex and return its handle.
    pub fn add_vertex(&mut self, payload: V) -> VertexId {
        let slot = VertexSlot {
            payload,
            incoming: SmallVec::new(),
            outgoing: SmallVec::new(),
        };
        let id = match self.free_vertices.pop() {
            Some(index) => {
                self.vertices[index as usize] = Some(slot);
                VertexId(index)
            }
            None => {
                self.vertices.push(Some(slot));
                VertexId((self.vertices.len() - 1) as u32)
            }
        };
        self.vertex_count += 1;
        self.invalidate_topology();
        id
    }

    /// Whether `id` refers to a live vertex.
    #[must_use]
    pub fn contains_vertex(&self, id: VertexId) -> bool {
        self.vertices.get(id.index()).is_some_and(Option::is_some)
    }

    /// Get a vertex payload.
    #[must_use]
    pub fn vertex(&self, id: VertexId) -> Option<&V> {
        self.vertices.get(id.index())?.as_ref().map(|s| &s.payload)
    }

    /// Get a vertex payload mutably.
    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut V> {
        self.vertices
            .get_mut(id.index())?
            .as_mut()
            .map(|s| &mut s.payload)
    }

    /// Iterate over live vertices in slot order.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &V)> {
        self.vertices.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref()
                .map(|s| (VertexId(i as u32), &s.payload))
        })
    }

    /// Remove a vertex, cascading removal of every edge touching it.
    ///
    /// Returns the vertex payload and the removed edges, or `None` if the
    /// vertex was not a member.
    pub fn remove_vertex(&mut self, id: VertexId) -> Option<(V, Vec<(EdgeId, E)>)> {
        if !self.contains_vertex(id) {
            return None;
        }

        let slot = self.vertices[id.index()].as_ref().expect("checked live");
        let mut incident: Vec<EdgeId> = slot.incoming.iter().copied().collect();
        incident.extend(slot.outgoing.iter().copied());
        incident.sort_unstable();
        incident.dedup();

        let mut removed = Vec::with_capacity(incident.len());
        for edge_id in incident {
            if let Some(payload) = self.remove_edge(edge_id) {
                removed.push((edge_id, payload));
            }
        }

        let slot = self.vertices[id.index()].take().expect("checked live");
        self.free_vertices.push(id.index() as u32);
        self.vertex_count -= 1;
        self.invalidate_topology();
        Some((slot.payload, removed))
    }

    /// Get an edge payload.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&E> {
        self.edges.get(id.index())?.as_ref().map(|s| &s.payload)
    }

    /// Get the `(source, target)` endpoints of an edge.
    #[must_use]
    pub fn endpoints(&self, id: EdgeId) -> Option<(VertexId, VertexId)> {
        self.edges
            .get(id.index())?
            .as_ref()
            .map(|s| (s.source, s.target))
    }

    /// Iterate over live edges in slot order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &E)> {
        self.edges.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref().map(|s| (EdgeId(i as u32), &s.payload))
        })
    }

    /// Incoming edge ids of a vertex, in insertion order.
    #[must_use]
    pub fn incoming_edges(&self, id: VertexId) -> &[EdgeId] {
        self.vertices
            .get(id.index())
            .and_then(Option::as_ref)
            .map_or(&[], |s| s.incoming.as_slice())
    }

    /// Outgoing edge ids of a vertex, in insertion order.
    #[must_use]
    pub fn outgoing_edges(&self, id: VertexId) -> &[EdgeId] {
        self.vertices
            .get(id.index())
            .and_then(Option::as_ref)
            .map_or(&[], |s| s.outgoing.as_slice())
    }

    /// Add an edge from `source` to `target`.
    ///
    /// The edge is inserted speculatively, the ordering is recomputed, and
    /// the insertion is rolled back if the ordering fails — the graph is
    /// never observably cyclic and a failed add leaves order and levels
    /// exactly as they were.
    ///
    /// # Errors
    ///
    /// `DagError::VertexNotFound` if either endpoint is not a member;
    /// `DagError::CycleDetected` if the edge would close a cycle.
    pub fn add_edge(&mut self, source: VertexId, target: VertexId, payload: E) -> Result<EdgeId, DagError> {
        if !self.contains_vertex(source) {
            return Err(DagError::VertexNotFound { vertex: source });
        }
        if !self.contains_vertex(target) {
            return Err(DagError::VertexNotFound { vertex: target });
        }

        let id = self.insert_edge_slot(source, target, payload);
        match self.compute_topology(None) {
            Some(topology) => {
                // The ordering was recomputed for validation anyway; keep it.
                *self.topology.get_mut() = Some(topology);
                Ok(id)
            }
            None => {
                self.remove_edge(id);
                Err(DagError::CycleDetected {
                    from: source,
                    to: target,
                })
            }
        }
    }

    /// Pure cycle test: whether an edge from `source` to `target` could be
    /// added without closing a cycle. Commits nothing.
    #[must_use]
    pub fn can_add_edge(&self, source: VertexId, target: VertexId) -> bool {
        self.contains_vertex(source)
            && self.contains_vertex(target)
            && self.compute_topology(Some((source, target))).is_some()
    }

    /// Remove an edge, returning its payload.
    pub fn remove_edge(&mut self, id: EdgeId) -> Option<E> {
        let slot = self.edges.get_mut(id.index())?.take()?;
        // Only the two touched endpoints are updated.
        if let Some(v) = self.vertices[slot.source.index()].as_mut() {
            v.outgoing.retain(|e| *e != id);
        }
        if let Some(v) = self.vertices[slot.target.index()].as_mut() {
            v.incoming.retain(|e| *e != id);
        }
        self.free_edges.push(id.index() as u32);
        self.edge_count -= 1;
        self.invalidate_topology();
        Some(slot.payload)
    }

    /// Vertices in topological order, sources first.
    ///
    /// Recomputes lazily if a structural mutation invalidated the memoized
    /// ordering.
    #[must_use]
    pub fn topological_order(&self) -> Vec<VertexId> {
        self.with_topology(|t| t.order.clone())
    }

    /// Topological level of a vertex: 0 for sources, else one more than the
    /// maximum level over incoming neighbours.
    #[must_use]
    pub fn level(&self, id: VertexId) -> Option<u32> {
        if !self.contains_vertex(id) {
            return None;
        }
        Some(self.with_topology(|t| t.levels[id.index()]))
    }

    fn insert_edge_slot(&mut self, source: VertexId, target: VertexId, payload: E) -> EdgeId {
        let slot = EdgeSlot {
            source,
            target,
            payload,
        };
        let id = match self.free_edges.pop() {
            Some(index) => {
                self.edges[index as usize] = Some(slot);
                EdgeId(index)
            }
            None => {
                self.edges.push(Some(slot));
                EdgeId((self.edges.len() - 1) as u32)
            }
        };
        self.vertices[source.index()]
            .as_mut()
            .expect("source checked live")
            .outgoing
            .push(id);
        self.vertices[target.index()]
            .as_mut()
            .expect("target checked live")
            .incoming
            .push(id);
        self.edge_count += 1;
        id
    }

    fn invalidate_topology(&mut self) {
        *self.topology.get_mut() = None;
    }

    fn with_topology<R>(&self, f: impl FnOnce(&Topology) -> R) -> R {
        {
            let cached = self.topology.read();
            if let Some(topology) = cached.as_ref() {
                return f(topology);
            }
        }
        let mut cached = self.topology.write();
        if cached.is_none() {
            // The committed edge set is acyclic by construction, so the
            // recomputation cannot fail here.
            *cached = Some(
                self.compute_topology(None)
                    .expect("committed edge set is acyclic"),
            );
        }
        f(cached.as_ref().expect("just computed"))
    }

    /// Kahn's algorithm, level by level.
    ///
    /// Each wave collects every vertex whose remaining in-degree is zero;
    /// the wave number is the vertex's level. Waves are sorted by slot
    /// index so the order is deterministic. Returns `None` when residual
    /// vertices remain, i.e. the edge set (plus the optional speculative
    /// `extra` edge) contains a cycle.
    fn compute_topology(&self, extra: Option<(VertexId, VertexId)>) -> Option<Topology> {
        let mut in_degree = vec![0u32; self.vertices.len()];
        for slot in self.edges.iter().flatten() {
            in_degree[slot.target.index()] += 1;
        }
        if let Some((_, target)) = extra {
            in_degree[target.index()] += 1;
        }

        let mut frontier: Vec<usize> = self
            .vertices
            .iter()
            .enumerate()
            .filter(|(i, slot)| slot.is_some() && in_degree[*i] == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.vertex_count);
        let mut levels = vec![0u32; self.vertices.len()];
        let mut level = 0u32;

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for index in frontier {
                order.push(VertexId(index as u32));
                levels[index] = level;

                let slot = self.vertices[index].as_ref().expect("frontier is live");
                for edge_id in &slot.outgoing {
                    let target = self.edges[edge_id.index()]
                        .as_ref()
                        .expect("adjacency holds live edges")
                        .target;
                    in_degree[target.index()] -= 1;
                    if in_degree[target.index()] == 0 {
                        next.push(target.index());
                    }
                }
                if let Some((source, target)) = extra {
                    if source.index() == index {
                        in_degree[target.index()] -= 1;
                        if in_degree[target.index()] == 0 {
                            next.push(target.index());
                        }
                    }
                }
            }
            next.sort_unstable();
            frontier = next;
            level += 1;
        }

        if order.len() < self.vertex_count {
            return None;
        }
        Some(Topology { order, levels })
    }
}

impl<V, E> fmt::Debug for Dag<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dag")
            .field("vertex_count", &self.vertex_count)
            .field("edge_count", &self.edge_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (Dag<&'static str, ()>, [VertexId; 4]) {
        // a -> b -> d, a -> c -> d
        let mut dag = Dag::new();
        let a = dag.add_vertex("a");
        let b = dag.add_vertex("b");
        let c = dag.add_vertex("c");
        let d = dag.add_vertex("d");
        dag.add_edge(a, b, ()).unwrap();
        dag.add_edge(a, c, ()).unwrap();
        dag.add_edge(b, d, ()).unwrap();
        dag.add_edge(c, d, ()).unwrap();
        (dag, [a, b, c, d])
    }

    fn assert_topological(dag: &Dag<&'static str, ()>) {
        let order = dag.topological_order();
        let position = |v: VertexId| order.iter().position(|x| *x == v).unwrap();
        for (id, _) in dag.edges() {
            let (s, t) = dag.endpoints(id).unwrap();
            assert!(position(s) < position(t), "edge {id} violates order");
        }
    }

    #[test]
    fn order_is_topological() {
        let (dag, _) = diamond();
        assert_topological(&dag);
        assert_eq!(dag.topological_order().len(), 4);
    }

    #[test]
    fn levels_follow_longest_path() {
        let (mut dag, [a, b, c, d]) = diamond();
        assert_eq!(dag.level(a), Some(0));
        assert_eq!(dag.level(b), Some(1));
        assert_eq!(dag.level(c), Some(1));
        assert_eq!(dag.level(d), Some(2));

        // Lengthening one arm pushes the join deeper.
        let e = dag.add_vertex("e");
        dag.add_edge(b, e, ()).unwrap();
        dag.add_edge(e, d, ()).unwrap();
        assert_eq!(dag.level(e), Some(2));
        assert_eq!(dag.level(d), Some(3));
    }

    #[test]
    fn level_zero_iff_no_incoming() {
        let (dag, verts) = diamond();
        for v in verts {
            let is_source = dag.incoming_edges(v).is_empty();
            assert_eq!(dag.level(v) == Some(0), is_source);
        }
    }

    #[test]
    fn cycle_rejected_and_rolled_back() {
        let (mut dag, [a, _, _, d]) = diamond();
        let order_before = dag.topological_order();
        let edges_before: Vec<_> = dag.edges().map(|(id, _)| id).collect();

        let err = dag.add_edge(d, a, ()).unwrap_err();
        assert!(matches!(err, DagError::CycleDetected { .. }));

        let edges_after: Vec<_> = dag.edges().map(|(id, _)| id).collect();
        assert_eq!(edges_before, edges_after);
        assert_eq!(order_before, dag.topological_order());
    }

    #[test]
    fn self_loop_rejected() {
        let mut dag: Dag<&str, ()> = Dag::new();
        let a = dag.add_vertex("a");
        assert!(!dag.can_add_edge(a, a));
        assert!(dag.add_edge(a, a, ()).is_err());
        assert_eq!(dag.edge_count(), 0);
    }

    #[test]
    fn can_add_edge_commits_nothing() {
        let (dag, [a, _, _, d]) = diamond();
        assert!(!dag.can_add_edge(d, a));
        assert!(dag.can_add_edge(a, d));
        assert_eq!(dag.edge_count(), 4);
    }

    #[test]
    fn missing_endpoint_rejected() {
        let mut dag: Dag<&str, ()> = Dag::new();
        let a = dag.add_vertex("a");
        let b = dag.add_vertex("b");
        dag.remove_vertex(b);
        let err = dag.add_edge(a, b, ()).unwrap_err();
        assert!(matches!(err, DagError::VertexNotFound { vertex } if vertex == b));
    }

    #[test]
    fn remove_vertex_cascades_exactly_incident_edges() {
        let (mut dag, [_, b, _, d]) = diamond();
        let (payload, removed) = dag.remove_vertex(b).unwrap();
        assert_eq!(payload, "b");
        assert_eq!(removed.len(), 2); // a->b and b->d
        assert_eq!(dag.edge_count(), 2); // a->c, c->d survive
        assert!(dag.incoming_edges(d).len() == 1);
        assert_topological(&dag);
    }

    #[test]
    fn reconnect_after_removal_restores_connectivity() {
        let (mut dag, [a, b, _, d]) = diamond();
        let ab = dag.outgoing_edges(a)[0];
        dag.remove_edge(ab).unwrap();
        dag.add_edge(a, b, ()).unwrap();
        assert_eq!(dag.incoming_edges(b).len(), 1);
        assert_eq!(dag.level(d), Some(2));
        assert_topological(&dag);
    }

    #[test]
    fn parallel_edges_are_distinct() {
        let mut dag: Dag<&str, u8> = Dag::new();
        let a = dag.add_vertex("a");
        let b = dag.add_vertex("b");
        let e1 = dag.add_edge(a, b, 1).unwrap();
        let e2 = dag.add_edge(a, b, 2).unwrap();
        assert_ne!(e1, e2);
        assert_eq!(dag.outgoing_edges(a).len(), 2);
        assert_eq!(dag.edge(e1), Some(&1));
        assert_eq!(dag.edge(e2), Some(&2));
    }

    #[test]
    fn vertex_slots_are_reused() {
        let mut dag: Dag<&str, ()> = Dag::new();
        let a = dag.add_vertex("a");
        dag.remove_vertex(a);
        let b = dag.add_vertex("b");
        assert_eq!(a.index(), b.index());
        assert_eq!(dag.vertex(b), Some(&"b"));
    }
}
