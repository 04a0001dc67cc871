//! Cycle detection over `requires ∪ includes`.
//!
//! # Overview
//!
//! Flattening closures and compressing edges both assume an acyclic graph.
//! Before either runs, [`dependency_order`] walks every node with a tri-colour
//! DFS. It either reports the first back-edge it meets, or hands back a
//! post-order in which every node follows its dependencies, which the
//! analysis pass then uses to resolve nodes bottom-up.
//!
//! Deleted nodes are still walked: their edges remain in the arena and a
//! cycle through them is a declaration error either way.

#![allow(clippy::module_name_repetitions)]

use std::fmt;

use super::node::{IndexNode, NodeId};
use crate::error::GraphError;
use crate::identity::ModuleIdentity;

// ---------------------------------------------------------------------------
// Cycle
// ---------------------------------------------------------------------------

/// A dependency loop found in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    /// Nodes forming the loop, starting and ending at the same node.
    pub path: Vec<NodeId>,
}

impl Cycle {
    /// Number of distinct nodes in the loop.
    #[must_use]
    pub fn len(&self) -> usize {
        self.path.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The back-edge `(from, to)` that closes the loop.
    #[must_use]
    pub fn closing_edge(&self) -> Option<(NodeId, NodeId)> {
        match self.path.as_slice() {
            [.., from, to] => Some((*from, *to)),
            _ => None,
        }
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Gray,
    Black,
}

/// Depth-first walk over every node, yielding dependencies before their
/// dependents, or the first loop found.
///
/// Iterative so that very deep aggregator chains cannot overflow the stack.
fn walk(nodes: &[IndexNode]) -> Result<Vec<NodeId>, Cycle> {
    let mut colour = vec![Colour::White; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    // (node, position of the next dependency to visit)
    let mut stack: Vec<(NodeId, usize)> = Vec::new();

    for start in 0..nodes.len() {
        if colour[start] != Colour::White {
            continue;
        }
        let start = NodeId::from_index(start);
        colour[start.index()] = Colour::Gray;
        stack.push((start, 0));

        while let Some((current, cursor)) = stack.last_mut() {
            let node = &nodes[current.index()];
            let next = node.dependency_at(*cursor);
            *cursor += 1;
            let current = *current;

            match next {
                None => {
                    colour[current.index()] = Colour::Black;
                    order.push(current);
                    stack.pop();
                }
                Some(dep) => match colour[dep.index()] {
                    Colour::White => {
                        colour[dep.index()] = Colour::Gray;
                        stack.push((dep, 0));
                    }
                    Colour::Gray => {
                        let from = stack
                            .iter()
                            .position(|(id, _)| *id == dep)
                            .unwrap_or(0);
                        let mut path: Vec<NodeId> =
                            stack[from..].iter().map(|(id, _)| *id).collect();
                        path.push(dep);
                        return Err(Cycle { path });
                    }
                    Colour::Black => {}
                },
            }
        }
    }
    Ok(order)
}

/// Find one cycle in `nodes`, if any.
#[must_use]
pub fn find_cycle(nodes: &[IndexNode]) -> Option<Cycle> {
    walk(nodes).err()
}

/// Every node, ordered so that each one comes after all of its dependencies.
///
/// # Errors
///
/// [`GraphError::CycleDetected`] naming the closing edge of the first loop.
pub fn dependency_order(nodes: &[IndexNode]) -> Result<Vec<NodeId>, GraphError> {
    walk(nodes).map_err(|cycle| {
        let (from, to) = cycle
            .closing_edge()
            .unwrap_or((cycle.path[0], cycle.path[0]));
        tracing::warn!(cycle = %cycle, "dependency cycle in index graph");
        let identity = |id: NodeId| -> ModuleIdentity { nodes[id.index()].identity().clone() };
        GraphError::CycleDetected {
            from: identity(from),
            to: identity(to),
        }
    })
}
