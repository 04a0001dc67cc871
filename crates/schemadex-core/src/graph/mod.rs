//! The in-memory index graph.
//!
//! ## Submodules
//!
//! - [`node`]: one module vertex, its edges and liveness reasons.
//! - [`pool`]: the memoized, thread-safe registry of nodes.
//! - [`cycles`]: loop detection and dependency-first ordering.
//! - [`analysis`]: the sealed liveness and compression pass.

pub mod analysis;
pub mod cycles;
pub mod node;
pub mod pool;

pub use analysis::AnalysisReport;
pub use node::{IndexNode, LivenessReason, NodeId, ReasonSet};
pub use pool::{IndexNodePool, Phase};
