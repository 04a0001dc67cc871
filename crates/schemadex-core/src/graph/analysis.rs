//! Liveness resolution and graph compression.
//!
//! # Overview
//!
//! [`IndexNodePool::analyze`] runs once every population unit has finished.
//! It seals the pool, rejects cycles, and then repeats three steps until a
//! round deletes nothing:
//!
//! 1. resolve liveness bottom-up, clearing the reasons of aggregators whose
//!    includes are all dead;
//! 2. flatten `requires ∪ includes` into `all_dependencies` and derive
//!    `compressed_dependencies` from it;
//! 3. delete dead nodes and aggregators that are empty or unreferenced.
//!
//! Deleting one aggregator can orphan another, which in turn changes the
//! flattened sets of its former dependents, hence the loop. A pool that has
//! already been analysed finishes in a single round with no deletions.
//!
//! # Compression
//!
//! Compression is a greedy transitive reduction over include edges only.
//! Require edges always survive. Include candidates are visited widest
//! first (by size of their flattened dependency set); each one that is not
//! already reachable through a require edge graduates and hides every later
//! candidate it covers. The result is not minimal, but it is stable, and the
//! persisted index depends on exactly this output.

#![allow(clippy::module_name_repetitions)]

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use fixedbitset::FixedBitSet;
use indexmap::IndexSet;
use tracing::{debug, info, instrument};

use super::cycles;
use super::node::{IndexNode, LivenessReason, NodeId};
use super::pool::{IndexNodePool, Phase};
use crate::error::GraphError;

// ---------------------------------------------------------------------------
// AnalysisReport
// ---------------------------------------------------------------------------

/// Summary of one [`IndexNodePool::analyze`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    /// Nodes in the pool, deleted ones included.
    pub nodes: usize,
    /// Nodes live after the pass.
    pub live: usize,
    /// Nodes deleted by this call.
    pub deleted: usize,
    /// Total size of every live node's compressed dependency set.
    pub compressed_edges: usize,
    /// Resolve/delete rounds until nothing changed.
    pub rounds: usize,
    pub elapsed: Duration,
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} nodes, {} live, {} deleted, {} compressed edges in {} round(s) ({:?})",
            self.nodes, self.live, self.deleted, self.compressed_edges, self.rounds, self.elapsed
        )
    }
}

// ---------------------------------------------------------------------------
// Pass
// ---------------------------------------------------------------------------

impl IndexNodePool {
    /// Seal the pool and compute liveness and compressed dependencies.
    ///
    /// # Errors
    ///
    /// [`GraphError::CycleDetected`] when `requires ∪ includes` contains a
    /// loop. The pool stays sealed.
    #[instrument(skip_all, fields(nodes = self.len()))]
    pub fn analyze(&mut self) -> Result<AnalysisReport, GraphError> {
        let started = Instant::now();
        self.phase = Phase::Analysis;

        let order = cycles::dependency_order(self.nodes.get_mut())?;

        let mut rounds = 0;
        let mut deleted = 0;
        let live = loop {
            rounds += 1;
            let nodes = self.nodes.get_mut();
            let live = resolve_liveness(nodes, &order);
            flatten(nodes, &order, &live);
            for id in &order {
                let compressed = compress(nodes, &live, *id);
                nodes[id.index()].compressed_dependencies = Some(compressed);
            }

            let removed = self.prune()?;
            debug!(round = rounds, removed, "analysis round complete");
            if removed == 0 {
                break live;
            }
            deleted += removed;
        };

        let nodes = self.nodes.get_mut();
        let compressed_edges = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| live[*i])
            .filter_map(|(_, node)| node.compressed_dependencies.as_ref())
            .map(IndexSet::len)
            .sum();
        let report = AnalysisReport {
            nodes: nodes.len(),
            live: live.iter().filter(|l| **l).count(),
            deleted,
            compressed_edges,
            rounds,
            elapsed: started.elapsed(),
        };
        info!(%report, "index graph analysed");
        Ok(report)
    }

    /// Delete nodes that cannot be live, returning how many went away.
    fn prune(&mut self) -> Result<usize, GraphError> {
        let mut removed = 0;
        for index in 0..self.len() {
            let id = NodeId::from_index(index);
            let doomed = {
                let node = &self.nodes.get_mut()[index];
                if node.deleted {
                    false
                } else if node.reasons.is_empty() {
                    true
                } else {
                    node.is_include_only()
                        && (node
                            .compressed_dependencies
                            .as_ref()
                            .is_none_or(IndexSet::is_empty)
                            || !node.has_outgoing())
                }
            };
            if doomed {
                debug!(module = %self.nodes.get_mut()[index].identity(), "deleting dead module");
                removed += self.delete(id)?;
            }
        }
        Ok(removed)
    }
}

/// Liveness of every node, indexed by position.
///
/// `order` must list dependencies before dependents. Aggregators whose
/// includes are all dead lose their reasons here.
fn resolve_liveness(nodes: &mut [IndexNode], order: &[NodeId]) -> Vec<bool> {
    let mut live = vec![false; nodes.len()];
    for id in order {
        let node = &nodes[id.index()];
        let is_live = if node.deleted || node.reasons.is_empty() {
            false
        } else if node.reasons.is_only(LivenessReason::HasIncludes) {
            node.includes.iter().any(|include| live[include.index()])
        } else {
            true
        };
        if !is_live && node.is_include_only() {
            nodes[id.index()].reasons.clear();
        }
        live[id.index()] = is_live;
    }
    live
}

/// Fill in `all_dependencies` for every node.
///
/// A live dependency is kept as is; a dead one is replaced by its own
/// flattened set, which `order` guarantees is already computed.
fn flatten(nodes: &mut [IndexNode], order: &[NodeId], live: &[bool]) {
    for id in order {
        let mut all = IndexSet::new();
        for dep in nodes[id.index()].dependencies() {
            if live[dep.index()] {
                all.insert(dep);
            } else if let Some(nested) = &nodes[dep.index()].all_dependencies {
                all.extend(nested.iter().copied());
            }
        }
        nodes[id.index()].all_dependencies = Some(all);
    }
}

fn all_of(nodes: &[IndexNode], id: NodeId) -> &IndexSet<NodeId> {
    static EMPTY: std::sync::LazyLock<IndexSet<NodeId>> = std::sync::LazyLock::new(IndexSet::new);
    nodes[id.index()].all_dependencies.as_ref().unwrap_or(&EMPTY)
}

/// `check` is reachable from `owner` through a require edge.
fn is_requirement(nodes: &[IndexNode], owner: &IndexNode, check: NodeId) -> bool {
    owner.requires.contains(&check)
        || owner
            .requires
            .iter()
            .any(|required| all_of(nodes, *required).contains(&check))
}

/// Live includes of `node`, with dead includes replaced by their own.
///
/// Each dead include is expanded once; a repeat visit could only re-insert
/// members already in `out`.
fn live_includes(
    nodes: &[IndexNode],
    live: &[bool],
    node: &IndexNode,
    expanded: &mut FixedBitSet,
    out: &mut IndexSet<NodeId>,
) {
    for include in &node.includes {
        if live[include.index()] {
            out.insert(*include);
        } else if !expanded.put(include.index()) {
            live_includes(nodes, live, &nodes[include.index()], expanded, out);
        }
    }
}

fn compress(nodes: &[IndexNode], live: &[bool], id: NodeId) -> IndexSet<NodeId> {
    let node = &nodes[id.index()];
    let mut result = node.requires.clone();

    let mut candidates = IndexSet::new();
    let mut expanded = FixedBitSet::with_capacity(nodes.len());
    live_includes(nodes, live, node, &mut expanded, &mut candidates);

    let mut buckets: BTreeMap<Reverse<usize>, Vec<NodeId>> = BTreeMap::new();
    for candidate in candidates {
        buckets
            .entry(Reverse(all_of(nodes, candidate).len()))
            .or_default()
            .push(candidate);
    }
    let ordered: Vec<NodeId> = buckets.into_values().flatten().collect();

    let mut skip = FixedBitSet::with_capacity(ordered.len());
    for (i, &candidate) in ordered.iter().enumerate() {
        if skip.contains(i) || is_requirement(nodes, node, candidate) {
            continue;
        }
        result.insert(candidate);

        let covering = &nodes[candidate.index()];
        let covered = all_of(nodes, candidate);
        for (j, &check) in ordered.iter().enumerate().skip(i) {
            if covered.contains(&check)
                || covering
                    .requires
                    .iter()
                    .any(|required| is_requirement(nodes, &nodes[required.index()], check))
            {
                skip.insert(j);
            }
        }
    }
    result
}
