//! Memoized registry of [`IndexNode`]s.
//!
//! # Phases
//!
//! A pool starts in [`Phase::Population`]: any number of threads may create
//! nodes, add edges and record liveness reasons. Once every population unit
//! has finished, the owner calls [`IndexNodePool::analyze`], which takes
//! `&mut self` and moves the pool to [`Phase::Analysis`]. From then on edges
//! and reasons are frozen; only deletion state changes.
//!
//! # Locking
//!
//! Identity → id lookups go through a `DashMap`, whose entry API makes
//! get-or-create atomic per key. Node storage is an arena behind a
//! `parking_lot::RwLock`, write-locked briefly per mutation. The identity map
//! may lock the arena (to push a new node) but never the other way round.

use dashmap::DashMap;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use tracing::debug;

use super::node::{IndexNode, LivenessReason, NodeId};
use crate::error::GraphError;
use crate::identity::{BuildCoordinates, ModuleIdentity, PlatformModule};

/// Lifecycle of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Nodes, edges and reasons may be added concurrently.
    Population,
    /// Edges and reasons are frozen; nodes may only be deleted.
    Analysis,
}

/// Owner of every node of one indexing run.
#[derive(Debug)]
pub struct IndexNodePool {
    pub(crate) phase: Phase,
    interned: DashMap<ModuleIdentity, ()>,
    ids: DashMap<ModuleIdentity, NodeId>,
    pub(crate) nodes: RwLock<Vec<IndexNode>>,
    deleted: DashMap<ModuleIdentity, NodeId>,
}

impl Default for IndexNodePool {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexNodePool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: Phase::Population,
            interned: DashMap::new(),
            ids: DashMap::new(),
            nodes: RwLock::new(Vec::new()),
            deleted: DashMap::new(),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Interned identity for `(coords, path, platform:module)`.
    ///
    /// Repeated calls with equal arguments return handles to one allocation.
    pub fn identity(
        &self,
        coords: &BuildCoordinates,
        project_path: &str,
        platform_module: &PlatformModule,
    ) -> ModuleIdentity {
        let candidate =
            ModuleIdentity::new(coords.clone(), project_path, platform_module.clone());
        self.interned.entry(candidate).or_insert(()).key().clone()
    }

    /// Get or create the node for `identity`.
    pub fn node(&self, identity: &ModuleIdentity) -> NodeId {
        if let Some(id) = self.ids.get(identity) {
            return *id;
        }
        *self.ids.entry(identity.clone()).or_insert_with(|| {
            let mut nodes = self.nodes.write();
            let id = NodeId::from_index(nodes.len());
            nodes.push(IndexNode::new(identity.clone()));
            id
        })
    }

    /// Look up an existing node without creating one.
    #[must_use]
    pub fn lookup(&self, identity: &ModuleIdentity) -> Option<NodeId> {
        self.ids.get(identity).map(|id| *id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every node id in creation order.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        (0..self.len()).map(NodeId::from_index).collect()
    }

    /// Read access to one node.
    ///
    /// Do not call [`node`](Self::node) while holding the guard.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<MappedRwLockReadGuard<'_, IndexNode>> {
        RwLockReadGuard::try_map(self.nodes.read(), |nodes| nodes.get(id.index())).ok()
    }

    #[must_use]
    pub fn identity_of(&self, id: NodeId) -> Option<ModuleIdentity> {
        self.get(id).map(|node| node.identity().clone())
    }

    /// Record that `from` aggregates `to`.
    ///
    /// # Errors
    ///
    /// [`GraphError::SelfDependency`] when `from == to`,
    /// [`GraphError::Sealed`] once analysis has begun,
    /// [`GraphError::UnknownNode`] for ids from another pool.
    pub fn include(&self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.add_edge("include", from, to, |node| &mut node.includes)
    }

    /// Record that `from` hard-depends on `to`.
    ///
    /// # Errors
    ///
    /// Same as [`include`](Self::include).
    pub fn require(&self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.add_edge("require", from, to, |node| &mut node.requires)
    }

    /// Record a liveness reason, returning `true` if it is new for the node.
    ///
    /// # Errors
    ///
    /// [`GraphError::Sealed`] once analysis has begun,
    /// [`GraphError::UnknownNode`] for ids from another pool.
    pub fn add_liveness(&self, id: NodeId, reason: LivenessReason) -> Result<bool, GraphError> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(id.index())
            .ok_or(GraphError::UnknownNode(id.index()))?;
        if self.phase != Phase::Population {
            return Err(GraphError::Sealed {
                operation: "add liveness",
                module: node.identity().clone(),
            });
        }
        Ok(node.add_liveness(reason))
    }

    fn add_edge(
        &self,
        operation: &'static str,
        from: NodeId,
        to: NodeId,
        edges: impl FnOnce(&mut IndexNode) -> &mut indexmap::IndexSet<NodeId>,
    ) -> Result<(), GraphError> {
        let mut nodes = self.nodes.write();
        let len = nodes.len();
        for id in [from, to] {
            if id.index() >= len {
                return Err(GraphError::UnknownNode(id.index()));
            }
        }
        let source = &mut nodes[from.index()];
        if self.phase != Phase::Population {
            return Err(GraphError::Sealed {
                operation,
                module: source.identity().clone(),
            });
        }
        if from == to {
            return Err(GraphError::SelfDependency {
                module: source.identity().clone(),
            });
        }
        edges(source).insert(to);
        nodes[to.index()].outgoing.insert(from);
        Ok(())
    }

    /// Whether `id` is currently live.
    ///
    /// Read-only: an include-only node with no live includes reports dead
    /// here, but its reasons are only cleared by [`analyze`](Self::analyze).
    #[must_use]
    pub fn is_live(&self, id: NodeId) -> bool {
        let nodes = self.nodes.read();
        if id.index() >= nodes.len() {
            return false;
        }
        let mut state = vec![Visit::Pending; nodes.len()];
        live_readonly(&nodes, id, &mut state)
    }

    /// Soft-delete a node and cascade to include-only dependencies that no
    /// longer have anyone pointing at them.
    ///
    /// Returns how many nodes were newly deleted (0 when `id` already was).
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownNode`] for ids from another pool.
    pub fn delete(&mut self, id: NodeId) -> Result<usize, GraphError> {
        let nodes = self.nodes.get_mut();
        if id.index() >= nodes.len() {
            return Err(GraphError::UnknownNode(id.index()));
        }

        let mut removed = 0;
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let node = &mut nodes[current.index()];
            if node.deleted {
                continue;
            }
            node.deleted = true;
            node.reasons.clear();
            self.deleted.insert(node.identity().clone(), current);
            removed += 1;

            let dependencies: Vec<NodeId> = node.dependencies().collect();
            for dependency in dependencies {
                let target = &mut nodes[dependency.index()];
                target.remove_outgoing(current);
                if !target.deleted && target.is_include_only() && !target.has_outgoing() {
                    debug!(
                        module = %target.identity(),
                        "cascading delete of orphaned aggregator"
                    );
                    pending.push(dependency);
                }
            }
        }
        Ok(removed)
    }

    #[must_use]
    pub fn is_deleted(&self, identity: &ModuleIdentity) -> bool {
        self.deleted.contains_key(identity)
    }

    /// The id of a deleted node, if `identity` has been deleted.
    #[must_use]
    pub fn deleted_node(&self, identity: &ModuleIdentity) -> Option<NodeId> {
        self.deleted.get(identity).map(|id| *id)
    }

    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    /// Identities of the analysed compressed dependencies of `id`.
    ///
    /// Empty until [`analyze`](Self::analyze) has run.
    #[must_use]
    pub fn compressed_identities(&self, id: NodeId) -> Vec<ModuleIdentity> {
        self.resolve_identities(id, IndexNode::compressed_dependencies)
    }

    /// Identities of the analysed flattened dependencies of `id`.
    #[must_use]
    pub fn all_dependency_identities(&self, id: NodeId) -> Vec<ModuleIdentity> {
        self.resolve_identities(id, IndexNode::all_dependencies)
    }

    fn resolve_identities(
        &self,
        id: NodeId,
        select: impl Fn(&IndexNode) -> Option<&indexmap::IndexSet<NodeId>>,
    ) -> Vec<ModuleIdentity> {
        let nodes = self.nodes.read();
        nodes
            .get(id.index())
            .and_then(|node| select(node))
            .map(|set| {
                set.iter()
                    .map(|dep| nodes[dep.index()].identity().clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
    Pending,
    InProgress,
    Done(bool),
}

fn live_readonly(nodes: &[IndexNode], id: NodeId, state: &mut [Visit]) -> bool {
    match state[id.index()] {
        Visit::Done(live) => return live,
        // an include loop cannot keep itself alive
        Visit::InProgress => return false,
        Visit::Pending => {}
    }
    state[id.index()] = Visit::InProgress;
    let node = &nodes[id.index()];
    let live = if node.deleted || node.reasons.is_empty() {
        false
    } else if node.is_include_only() {
        node.includes
            .iter()
            .any(|include| live_readonly(nodes, *include, state))
    } else {
        true
    };
    state[id.index()] = Visit::Done(live);
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn coords() -> BuildCoordinates {
        BuildCoordinates::new("demo", "com.example", "1.0")
    }

    fn add(pool: &IndexNodePool, project: &str) -> NodeId {
        let identity = pool.identity(&coords(), project, &PlatformModule::new("main", "main"));
        pool.node(&identity)
    }

    #[test]
    fn identities_are_interned() {
        let pool = IndexNodePool::new();
        let pm = PlatformModule::new("main", "api");
        let a = pool.identity(&coords(), ":app", &pm);
        let b = pool.identity(&coords(), ":app", &pm);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn node_is_memoized() {
        let pool = IndexNodePool::new();
        let a = add(&pool, ":a");
        let again = add(&pool, ":a");
        let b = add(&pool, ":b");
        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn concurrent_get_or_create_yields_one_node_per_identity() {
        let pool = Arc::new(IndexNodePool::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                thread::spawn(move || {
                    (0..50)
                        .map(|i| add(&pool, &format!(":p{i}")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<NodeId>> = handles
            .into_iter()
            .map(|h| h.join().expect("worker thread"))
            .collect();

        assert_eq!(pool.len(), 50);
        for ids in &results[1..] {
            assert_eq!(ids, &results[0]);
        }
    }

    #[test]
    fn self_edges_are_rejected() {
        let pool = IndexNodePool::new();
        let a = add(&pool, ":a");
        assert!(matches!(
            pool.include(a, a),
            Err(GraphError::SelfDependency { .. })
        ));
        assert!(matches!(
            pool.require(a, a),
            Err(GraphError::SelfDependency { .. })
        ));
    }

    #[test]
    fn edges_register_reverse_edges() {
        let pool = IndexNodePool::new();
        let a = add(&pool, ":a");
        let b = add(&pool, ":b");
        let c = add(&pool, ":c");
        pool.require(a, b).expect("require");
        pool.include(c, b).expect("include");

        let b_node = pool.get(b).expect("node b");
        assert_eq!(b_node.outgoing().len(), 2);
        assert!(b_node.outgoing().contains(&a));
        assert!(b_node.outgoing().contains(&c));
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let pool = IndexNodePool::new();
        let a = add(&pool, ":a");
        let foreign = NodeId::from_index(42);
        assert!(matches!(
            pool.include(a, foreign),
            Err(GraphError::UnknownNode(42))
        ));
    }

    #[test]
    fn delete_cascades_to_orphaned_aggregators() {
        let mut pool = IndexNodePool::new();
        let root = add(&pool, ":root");
        let agg = add(&pool, ":agg");
        let inner = add(&pool, ":inner");
        let leaf = add(&pool, ":leaf");
        pool.include(root, agg).expect("include");
        pool.include(agg, inner).expect("include");
        pool.require(inner, leaf).expect("require");
        pool.add_liveness(agg, LivenessReason::HasIncludes).expect("reason");
        pool.add_liveness(inner, LivenessReason::HasIncludes).expect("reason");
        pool.add_liveness(leaf, LivenessReason::HasSource).expect("reason");

        let removed = pool.delete(root).expect("delete");
        assert_eq!(removed, 3);

        let agg_id = pool.identity_of(agg).expect("identity");
        let inner_id = pool.identity_of(inner).expect("identity");
        let leaf_id = pool.identity_of(leaf).expect("identity");
        assert!(pool.is_deleted(&agg_id));
        assert!(pool.is_deleted(&inner_id));
        assert!(!pool.is_deleted(&leaf_id));
        assert_eq!(pool.deleted_node(&inner_id), Some(inner));
        assert!(!pool.get(leaf).expect("leaf").has_outgoing());
        assert!(pool.get(agg).expect("agg").reasons().is_empty());
    }

    #[test]
    fn delete_keeps_aggregators_that_are_still_referenced() {
        let mut pool = IndexNodePool::new();
        let a = add(&pool, ":a");
        let b = add(&pool, ":b");
        let agg = add(&pool, ":agg");
        pool.include(a, agg).expect("include");
        pool.include(b, agg).expect("include");
        pool.add_liveness(agg, LivenessReason::HasIncludes).expect("reason");

        assert_eq!(pool.delete(a).expect("delete"), 1);
        assert_eq!(pool.delete(a).expect("delete twice"), 0);
        let agg_node = pool.get(agg).expect("agg");
        assert!(!agg_node.is_deleted());
        assert_eq!(agg_node.outgoing().len(), 1);
    }

    #[test]
    fn readonly_liveness_follows_includes() {
        let pool = IndexNodePool::new();
        let agg = add(&pool, ":agg");
        let lib = add(&pool, ":lib");
        pool.include(agg, lib).expect("include");
        pool.add_liveness(agg, LivenessReason::HasIncludes).expect("reason");
        assert!(!pool.is_live(agg));
        pool.add_liveness(lib, LivenessReason::HasSource).expect("reason");
        assert!(pool.is_live(agg));
    }
}
