//! Liveness propagation over the persisted `out/` edges.
//!
//! Runs once the in-memory graph has been analysed. Every module recorded
//! live during population gets its level written, then every module that
//! depends on it (transitively, through `out/` links) is raised to at least
//! [`TRANSITIVE`](super::level::TRANSITIVE). Finally, any project with more
//! than one live module is marked multiplatform.

use std::path::PathBuf;

use schemadex_core::{ModuleIdentity, PlatformModule};
use tracing::{debug, info, instrument};

use super::writer::IndexWriter;
use super::{child_dirs, level};
use crate::error::IndexError;

/// A module found live by population, with what propagation needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveModule {
    pub identity: ModuleIdentity,
    pub platform_module: PlatformModule,
    pub mangled_project: String,
    /// Set when the module is live because it has sources.
    pub source_dir: Option<PathBuf>,
    /// Live by force marker, explicit dependencies or property.
    pub explicit: bool,
    pub project_force: bool,
    pub multiplatform: bool,
    pub is_virtual: bool,
}

impl LiveModule {
    /// Level written to this module's `live` file.
    #[must_use]
    pub const fn level(&self) -> u8 {
        if self.project_force {
            level::FORCED
        } else if self.explicit {
            level::EXPLICIT
        } else {
            level::SOURCE
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Modules written with their own level.
    pub live_modules: usize,
    /// Dependents raised to the transitive level.
    pub elevated: usize,
    /// Projects marked multiplatform for having several live modules.
    pub multiplatform_projects: usize,
}

/// Write levels and markers for `live`, then raise their dependents.
///
/// # Errors
///
/// Any read or write failure inside the index root.
#[instrument(skip_all, fields(modules = live.len()))]
pub fn propagate(writer: &IndexWriter, live: &[LiveModule]) -> Result<PropagationReport, IndexError> {
    let layout = writer.layout();
    let mut report = PropagationReport::default();

    for module in live {
        let dir = layout.module_dir(&module.mangled_project, &module.platform_module);
        writer.write_level(&dir, module.level())?;
        report.live_modules += 1;

        writer.write_marker(&dir, "multiplatform", module.multiplatform)?;
        writer.write_marker(&dir, "virtual", module.is_virtual)?;
        if module.project_force {
            writer.write_marker(&dir, "force", true)?;
        } else {
            writer.remove(&dir.join("force"))?;
        }

        let raised = mark_out_edges(writer, dir)?;
        if raised > 0 {
            debug!(module = %module.identity, raised, "raised dependents to transitive");
        }
        report.elevated += raised;
    }

    report.multiplatform_projects = mark_multiplatform_projects(writer)?;
    info!(?report, "liveness propagated");
    Ok(report)
}

/// Raise every dead module reachable through `out/` links to transitive.
///
/// Stops at modules already at level 1 or above.
fn mark_out_edges(writer: &IndexWriter, start: PathBuf) -> Result<usize, IndexError> {
    let layout = writer.layout();
    let mut raised = 0;
    let mut pending = vec![start];

    while let Some(dir) = pending.pop() {
        for project in child_dirs(&dir.join("out"))? {
            for platform_module in child_dirs(&project)? {
                let Some(link) = writer.read(&platform_module.join("link"))? else {
                    continue;
                };
                let target = layout.resolve_link(&link);
                if writer.read_level(&target)? < level::TRANSITIVE {
                    writer.write_level(&target, level::TRANSITIVE)?;
                    raised += 1;
                    pending.push(target);
                }
            }
        }
    }
    Ok(raised)
}

/// Write `multiplatform = true` on every project directory holding more
/// than one live module, returning how many were marked.
///
/// # Errors
///
/// Any read or write failure inside `<root>/path`.
pub fn mark_multiplatform_projects(writer: &IndexWriter) -> Result<usize, IndexError> {
    let mut marked = 0;
    for project in child_dirs(&writer.layout().path_dir())? {
        let mut live_modules = 0;
        for module in child_dirs(&project)? {
            if writer.read_level(&module)? > level::DEAD {
                live_modules += 1;
            }
        }
        if live_modules > 1 {
            writer.write_marker(&project, "multiplatform", true)?;
            marked += 1;
        }
    }
    Ok(marked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EdgeEnd, IndexLayout};
    use schemadex_core::BuildCoordinates;

    fn live_module(project: &str, pm: &PlatformModule) -> LiveModule {
        LiveModule {
            identity: ModuleIdentity::new(
                BuildCoordinates::new("demo", "g", "1"),
                project,
                pm.clone(),
            ),
            platform_module: pm.clone(),
            mangled_project: schemadex_core::mangle_project_path(project),
            source_dir: None,
            explicit: false,
            project_force: false,
            multiplatform: false,
            is_virtual: false,
        }
    }

    fn edge<'a>(project: &'a str, pm: &'a PlatformModule) -> EdgeEnd<'a> {
        EdgeEnd {
            mangled_project: project,
            platform_module: pm,
        }
    }

    #[test]
    fn levels_follow_force_then_explicit_then_source() {
        let pm = PlatformModule::new("main", "main");
        let mut module = live_module(":a", &pm);
        assert_eq!(module.level(), level::SOURCE);
        module.explicit = true;
        assert_eq!(module.level(), level::EXPLICIT);
        module.project_force = true;
        assert_eq!(module.level(), level::FORCED);
    }

    #[test]
    fn dependents_are_raised_transitively_but_not_lowered() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = IndexWriter::new(IndexLayout::new(dir.path()));
        let main = PlatformModule::new("main", "main");
        // app -> svc -> core, and tool -> core with tool already explicit
        writer.record_edge(edge("_app", &main), edge("_svc", &main)).expect("edge");
        writer.record_edge(edge("_svc", &main), edge("_core", &main)).expect("edge");
        writer.record_edge(edge("_tool", &main), edge("_core", &main)).expect("edge");
        let layout = writer.layout().clone();
        writer
            .write_level(&layout.module_dir("_tool", &main), level::EXPLICIT)
            .expect("seed");

        let report = propagate(&writer, &[live_module(":core", &main)]).expect("propagate");

        let level_of = |p: &str| writer.read_level(&layout.module_dir(p, &main)).expect("level");
        assert_eq!(level_of("_core"), level::SOURCE);
        assert_eq!(level_of("_svc"), level::TRANSITIVE);
        assert_eq!(level_of("_app"), level::TRANSITIVE);
        assert_eq!(level_of("_tool"), level::EXPLICIT);
        assert_eq!(report.elevated, 2);
        assert_eq!(report.live_modules, 1);
    }

    #[test]
    fn force_marker_follows_project_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = IndexWriter::new(IndexLayout::new(dir.path()));
        let main = PlatformModule::new("main", "main");
        let module_dir = writer.layout().module_dir("_a", &main);
        writer.write_marker(&module_dir, "force", true).expect("stale force");

        propagate(&writer, &[live_module(":a", &main)]).expect("propagate");
        assert_eq!(writer.read(&module_dir.join("force")).expect("read"), None);
        assert_eq!(
            writer.read(&module_dir.join("virtual")).expect("read").as_deref(),
            Some("false")
        );

        let mut forced = live_module(":a", &main);
        forced.project_force = true;
        propagate(&writer, &[forced]).expect("propagate");
        assert_eq!(
            writer.read(&module_dir.join("force")).expect("read").as_deref(),
            Some("true")
        );
        assert_eq!(writer.read_level(&module_dir).expect("level"), level::FORCED);
    }

    #[test]
    fn projects_with_two_live_modules_become_multiplatform() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = IndexWriter::new(IndexLayout::new(dir.path()));
        let layout = writer.layout().clone();
        let main = PlatformModule::new("main", "main");
        let api = PlatformModule::new("main", "api");
        let jre = PlatformModule::new("jre", "main");
        writer.write_level(&layout.module_dir("_multi", &main), 2).expect("level");
        writer.write_level(&layout.module_dir("_multi", &api), 1).expect("level");
        writer.write_level(&layout.module_dir("_single", &main), 4).expect("level");
        writer.write_level(&layout.module_dir("_single", &jre), 0).expect("level");

        assert_eq!(mark_multiplatform_projects(&writer).expect("mark"), 1);
        assert_eq!(
            writer
                .read(&layout.project_dir("_multi").join("multiplatform"))
                .expect("read")
                .as_deref(),
            Some("true")
        );
        assert_eq!(
            writer
                .read(&layout.project_dir("_single").join("multiplatform"))
                .expect("read"),
            None
        );
    }
}
