#![forbid(unsafe_code)]
//! schemadex-index library.
//!
//! Turns a build's declarations into a liveness-annotated dependency graph
//! and a persisted directory index that later runs can query cheaply.
//!
//! # Conventions
//!
//! - **Errors**: Fallible index operations return [`IndexError`]; graph and
//!   lock errors convert into it with `?`. Configuration loading uses
//!   `anyhow` with context.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`). The
//!   library never installs a subscriber.
//! - **Threads**: Population runs on a caller-supplied `rayon` pool; the
//!   library never builds its own.

pub mod config;
pub mod coords;
pub mod decl;
pub mod error;
pub mod orchestrator;
pub mod population;
pub mod sources;
pub mod store;

pub use config::{IndexerConfig, load_config};
pub use coords::{CoordinateResolver, DefaultCoordinateResolver};
pub use decl::{BuildDecl, DependencyDecl, ModuleDecl, ProjectDecl};
pub use error::IndexError;
pub use orchestrator::{IndexOutcome, Indexer};
pub use store::{IndexEntries, IndexLayout, IndexReader, IndexStatus, IndexWriter, LiveModule};
