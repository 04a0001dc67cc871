#![forbid(unsafe_code)]
//! schemadex-core library.
//!
//! Module identities, the index graph and its analysis pass.
//!
//! # Conventions
//!
//! - **Errors**: Each layer returns its own `thiserror` enum; every variant
//!   maps to a stable [`error::ErrorCode`].
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`). The
//!   library never installs a subscriber.

pub mod error;
pub mod graph;
pub mod identity;
pub mod lock;

pub use error::{ErrorCode, GraphError};
pub use graph::{AnalysisReport, IndexNode, IndexNodePool, LivenessReason, NodeId, Phase};
pub use identity::{BuildCoordinates, ModuleIdentity, PlatformModule, mangle_project_path};
