//! A single `project:platform:module` vertex of the index graph.
//!
//! Every node records its outgoing edges (`includes`, `requires`), the
//! reverse edges pointing at it, and the evidence collected for why the
//! module should exist. Only nodes that end up live become real modules in
//! the host build. A module is live when it:
//!
//! - has files under its source directory,
//! - has a non-default build script,
//! - declares explicit project or external dependencies,
//! - is the target of another module's project dependency,
//! - is forced live by a marker file or a configured property,
//! - or includes at least one other live module.
//!
//! Nodes are owned by [`IndexNodePool`](super::pool::IndexNodePool) and
//! addressed by [`NodeId`]; all mutation goes through the pool.

use std::fmt;

use indexmap::IndexSet;

use crate::identity::ModuleIdentity;

/// Evidence that a module has to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LivenessReason {
    HasIncludes,
    HasSource,
    HasBuildscript,
    HasDependencies,
    IsDependency,
    Forced,
}

impl LivenessReason {
    pub const ALL: [Self; 6] = [
        Self::HasIncludes,
        Self::HasSource,
        Self::HasBuildscript,
        Self::HasDependencies,
        Self::IsDependency,
        Self::Forced,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HasIncludes => "has_includes",
            Self::HasSource => "has_source",
            Self::HasBuildscript => "has_buildscript",
            Self::HasDependencies => "has_dependencies",
            Self::IsDependency => "is_dependency",
            Self::Forced => "forced",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for LivenessReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact set of [`LivenessReason`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReasonSet(u8);

impl ReasonSet {
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Insert a reason, returning `true` if it was not present yet.
    pub const fn insert(&mut self, reason: LivenessReason) -> bool {
        let had = self.contains(reason);
        self.0 |= reason.bit();
        !had
    }

    #[must_use]
    pub const fn contains(self, reason: LivenessReason) -> bool {
        self.0 & reason.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// `true` when `reason` is the one and only member.
    #[must_use]
    pub const fn is_only(self, reason: LivenessReason) -> bool {
        self.0 == reason.bit()
    }

    pub const fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn iter(self) -> impl Iterator<Item = LivenessReason> {
        LivenessReason::ALL
            .into_iter()
            .filter(move |reason| self.contains(*reason))
    }
}

impl fmt::Display for ReasonSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, reason) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(reason.as_str())?;
        }
        f.write_str("]")
    }
}

impl FromIterator<LivenessReason> for ReasonSet {
    fn from_iter<I: IntoIterator<Item = LivenessReason>>(iter: I) -> Self {
        let mut set = Self::new();
        for reason in iter {
            set.insert(reason);
        }
        set
    }
}

/// Position of a node in its pool's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One module of the index graph.
#[derive(Debug, Clone)]
pub struct IndexNode {
    identity: ModuleIdentity,
    pub(crate) includes: IndexSet<NodeId>,
    pub(crate) requires: IndexSet<NodeId>,
    /// Reverse edges: the nodes that include or require this one.
    pub(crate) outgoing: IndexSet<NodeId>,
    pub(crate) reasons: ReasonSet,
    pub(crate) deleted: bool,
    pub(crate) all_dependencies: Option<IndexSet<NodeId>>,
    pub(crate) compressed_dependencies: Option<IndexSet<NodeId>>,
}

impl IndexNode {
    pub(crate) fn new(identity: ModuleIdentity) -> Self {
        Self {
            identity,
            includes: IndexSet::new(),
            requires: IndexSet::new(),
            outgoing: IndexSet::new(),
            reasons: ReasonSet::new(),
            deleted: false,
            all_dependencies: None,
            compressed_dependencies: None,
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    /// Soft edges: modules this one aggregates.
    #[must_use]
    pub const fn includes(&self) -> &IndexSet<NodeId> {
        &self.includes
    }

    /// Hard edges: never removed by compression.
    #[must_use]
    pub const fn requires(&self) -> &IndexSet<NodeId> {
        &self.requires
    }

    /// Nodes that include or require this one.
    #[must_use]
    pub const fn outgoing(&self) -> &IndexSet<NodeId> {
        &self.outgoing
    }

    #[must_use]
    pub const fn reasons(&self) -> ReasonSet {
        self.reasons
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// The only thing keeping this node alive is that it includes others.
    #[must_use]
    pub const fn is_include_only(&self) -> bool {
        self.reasons.is_only(LivenessReason::HasIncludes)
    }

    #[must_use]
    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// `requires ∪ includes` with dead members flattened away.
    ///
    /// `None` until the pool has been analysed.
    #[must_use]
    pub const fn all_dependencies(&self) -> Option<&IndexSet<NodeId>> {
        self.all_dependencies.as_ref()
    }

    /// `requires` plus the include candidates that survived compression.
    ///
    /// `None` until the pool has been analysed.
    #[must_use]
    pub const fn compressed_dependencies(&self) -> Option<&IndexSet<NodeId>> {
        self.compressed_dependencies.as_ref()
    }

    /// All direct dependencies, requires first.
    pub fn dependencies(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.requires.iter().chain(self.includes.iter()).copied()
    }

    /// The dependency at `position` in [`dependencies`](Self::dependencies)
    /// order, without walking the ones before it.
    pub(crate) fn dependency_at(&self, position: usize) -> Option<NodeId> {
        match position.checked_sub(self.requires.len()) {
            None => self.requires.get_index(position).copied(),
            Some(offset) => self.includes.get_index(offset).copied(),
        }
    }

    pub(crate) fn add_liveness(&mut self, reason: LivenessReason) -> bool {
        self.reasons.insert(reason)
    }

    /// Drop a reverse edge, returning whether it was present.
    pub(crate) fn remove_outgoing(&mut self, node: NodeId) -> bool {
        self.outgoing.shift_remove(&node)
    }
}

impl PartialEq for IndexNode {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for IndexNode {}

impl fmt::Display for IndexNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{{includes: {}, requires: {}, liveness: {}}}",
            self.identity,
            self.includes.len(),
            self.requires.len(),
            self.reasons
        )
    }
}
