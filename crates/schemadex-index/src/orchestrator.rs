//! # Overview
//!
//! One indexing run over a whole build:
//!
//! 1. take the advisory lock on the index root and mark it `running`;
//! 2. run one population unit per project on the caller's thread pool;
//! 3. wait for every unit, waking every `poll_interval`, up to `max_wait`;
//! 4. analyse the graph and propagate liveness into the index;
//! 5. mark the index `done`, or `failed` if anything above went wrong.
//!
//! Unit failures are collected rather than failing fast, so one run reports
//! every broken project at once. Partial files left by a failed or timed-out
//! run are not rolled back; the next run rewrites them.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Instant;

use schemadex_core::lock::IndexLock;
use schemadex_core::{AnalysisReport, IndexNodePool};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{IndexerConfig, load_config};
use crate::coords::{CoordinateResolver, DefaultCoordinateResolver};
use crate::decl::BuildDecl;
use crate::error::IndexError;
use crate::population::{UnitContext, populate_project};
use crate::store::propagate::propagate;
use crate::store::{IndexLayout, IndexReader, IndexStatus, IndexWriter, LiveModule, PropagationReport};

/// Result of a successful run.
#[derive(Debug)]
pub struct IndexOutcome {
    /// The analysed graph, owned exclusively.
    pub pool: IndexNodePool,
    /// Modules population found live, ordered by identity.
    pub live_modules: Vec<LiveModule>,
    pub report: AnalysisReport,
    pub propagation: PropagationReport,
    layout: IndexLayout,
}

impl IndexOutcome {
    #[must_use]
    pub const fn layout(&self) -> &IndexLayout {
        &self.layout
    }

    /// A fresh reader over the index this run wrote.
    #[must_use]
    pub fn reader(&self) -> IndexReader {
        IndexReader::new(self.layout.clone())
    }
}

/// Builds the index for one build at a time.
pub struct Indexer {
    config: Arc<IndexerConfig>,
    threads: Arc<rayon::ThreadPool>,
    resolver: Arc<dyn CoordinateResolver>,
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("config", &self.config)
            .field("threads", &self.threads.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl Indexer {
    #[must_use]
    pub fn new(config: IndexerConfig, threads: Arc<rayon::ThreadPool>) -> Self {
        Self {
            config: Arc::new(config),
            threads,
            resolver: Arc::new(DefaultCoordinateResolver),
        }
    }

    /// Indexer configured from `<build_root>/.schemadex/config.toml`.
    ///
    /// # Errors
    ///
    /// See [`load_config`].
    pub fn from_build_root(
        build_root: &Path,
        threads: Arc<rayon::ThreadPool>,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(load_config(build_root)?, threads))
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn CoordinateResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Index `build` into `<index_dir>`.
    ///
    /// # Errors
    ///
    /// - [`IndexError::CreateDir`] when the index root cannot be created;
    /// - [`IndexError::Lock`] when another run holds the index;
    /// - [`IndexError::Timeout`] when units outlive `max_wait`;
    /// - the single unit failure, or [`IndexError::Multiple`] for several;
    /// - [`IndexError::Graph`] for cycles found by analysis.
    #[instrument(skip_all, fields(build = %build.name, projects = build.projects.len()))]
    pub fn index(&self, build: &BuildDecl) -> Result<IndexOutcome, IndexError> {
        let started = Instant::now();
        let layout = IndexLayout::new(self.config.index_dir(&build.root_dir));
        let writer = Arc::new(IndexWriter::new(layout.clone()));
        writer.ensure_dir(layout.root())?;
        let lock = IndexLock::acquire(&layout.lock_file(), self.config.lock_timeout())?;
        writer.set_status(IndexStatus::Running)?;

        match self.run(build, &writer) {
            Ok(outcome) => {
                writer.set_status(IndexStatus::Done)?;
                lock.release();
                info!(
                    report = %outcome.report,
                    live = outcome.live_modules.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "index built"
                );
                Ok(outcome)
            }
            Err(err) => {
                if let Err(status_err) = writer.set_status(IndexStatus::Failed) {
                    warn!(error = %status_err, "unable to mark index as failed");
                }
                warn!(code = %err.code(), error = %err, "indexing failed");
                Err(err)
            }
        }
    }

    fn run(&self, build: &BuildDecl, writer: &Arc<IndexWriter>) -> Result<IndexOutcome, IndexError> {
        let pool = Arc::new(IndexNodePool::new());
        let live_modules = self.populate(build, &pool, writer)?;

        let mut pool = Arc::into_inner(pool).ok_or_else(|| {
            IndexError::Internal("population units still hold the node pool".to_string())
        })?;
        let report = pool.analyze()?;
        let propagation = propagate(writer, &live_modules)?;

        Ok(IndexOutcome {
            pool,
            live_modules,
            report,
            propagation,
            layout: writer.layout().clone(),
        })
    }

    fn populate(
        &self,
        build: &BuildDecl,
        pool: &Arc<IndexNodePool>,
        writer: &Arc<IndexWriter>,
    ) -> Result<Vec<LiveModule>, IndexError> {
        let ctx = UnitContext {
            pool: Arc::clone(pool),
            writer: Arc::clone(writer),
            coords: build.coordinates(),
            config: Arc::clone(&self.config),
            resolver: Arc::clone(&self.resolver),
        };
        let (tx, rx) = mpsc::channel();
        for project in &build.projects {
            let ctx = ctx.clone();
            let tx = tx.clone();
            let project = project.clone();
            self.threads.spawn(move || {
                let result =
                    panic::catch_unwind(AssertUnwindSafe(|| populate_project(&ctx, &project)));
                // the orchestrator takes the pool back once every unit has reported
                drop(ctx);
                let result = result.unwrap_or_else(|payload| {
                    Err(IndexError::UnitPanicked {
                        project: project.path.clone(),
                        message: panic_message(payload.as_ref()),
                    })
                });
                let _ = tx.send((project.path, result));
            });
        }
        drop(ctx);
        drop(tx);

        let deadline = Instant::now() + self.config.max_wait();
        let mut pending = build.projects.len();
        let mut live = Vec::new();
        let mut failures = Vec::new();
        while pending > 0 {
            let now = Instant::now();
            if now >= deadline {
                return Err(IndexError::Timeout {
                    build: build.name.clone(),
                    root: build.root_dir.clone(),
                    waited: self.config.max_wait(),
                });
            }
            match rx.recv_timeout(self.config.poll_interval().min(deadline - now)) {
                Ok((project, Ok(modules))) => {
                    pending -= 1;
                    debug!(%project, live = modules.len(), pending, "unit finished");
                    live.extend(modules);
                }
                Ok((project, Err(err))) => {
                    pending -= 1;
                    warn!(%project, code = %err.code(), error = %err, "unit failed");
                    failures.push(err);
                }
                Err(RecvTimeoutError::Timeout) => trace!(pending, "waiting for population units"),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(IndexError::Internal(
                        "population units exited without reporting".to_string(),
                    ));
                }
            }
        }

        let mut failures = failures.into_iter();
        match (failures.next(), failures.next()) {
            (None, _) => {
                live.sort_by(|a, b| a.identity.cmp(&b.identity));
                Ok(live)
            }
            (Some(only), None) => Err(only),
            (Some(first), Some(second)) => Err(IndexError::Multiple {
                build: build.name.clone(),
                root: build.root_dir.clone(),
                failures: [first, second].into_iter().chain(failures).collect(),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
