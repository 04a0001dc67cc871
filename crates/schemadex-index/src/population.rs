//! Per-project population units.
//!
//! One unit runs per project, concurrently with every other project. For
//! each of the project's modules it gathers liveness evidence, adds graph
//! edges for its dependencies and writes the module's files into the index.
//!
//! Evidence is a priority chain; the first match wins:
//!
//! 1. files under the module's source directory;
//! 2. a `force` marker left in the index that is not `"false"`;
//! 3. declared project or external dependencies;
//! 4. a `live_<project>_<platform:module>` property set to `"true"`.
//!
//! A non-default build script is recorded regardless of the chain.

use std::sync::Arc;

use schemadex_core::{
    BuildCoordinates, IndexNodePool, LivenessReason, ModuleIdentity, NodeId, PlatformModule,
    mangle_project_path,
};
use tracing::{debug, instrument};

use crate::config::IndexerConfig;
use crate::coords::CoordinateResolver;
use crate::decl::{DependencyDecl, ModuleDecl, ProjectDecl};
use crate::error::IndexError;
use crate::sources::find_sources;
use crate::store::{EdgeEnd, IndexWriter, LiveModule, level};

/// Everything a unit needs besides its project.
#[derive(Clone)]
pub struct UnitContext {
    pub pool: Arc<IndexNodePool>,
    pub writer: Arc<IndexWriter>,
    pub coords: BuildCoordinates,
    pub config: Arc<IndexerConfig>,
    pub resolver: Arc<dyn CoordinateResolver>,
}

impl std::fmt::Debug for UnitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitContext")
            .field("coords", &self.coords)
            .field("index", &self.writer.layout().root())
            .finish_non_exhaustive()
    }
}

/// Populate the graph and the index for one project.
///
/// Returns the project's modules that were found live.
///
/// # Errors
///
/// Graph violations (self-dependencies) and index write failures.
#[instrument(skip_all, fields(project = %project.path))]
pub fn populate_project(
    ctx: &UnitContext,
    project: &ProjectDecl,
) -> Result<Vec<LiveModule>, IndexError> {
    let mangled = mangle_project_path(&project.path);
    let layout = ctx.writer.layout();
    ctx.writer.ensure_dir(&layout.project_dir(&mangled))?;
    if project.multiplatform {
        ctx.writer
            .write_marker(&layout.project_dir(&mangled), "multiplatform", true)?;
    }

    let mut live = Vec::new();
    for module in &project.modules {
        if let Some(record) = populate_module(ctx, project, &mangled, module)? {
            live.push(record);
        }
    }
    debug!(modules = project.modules.len(), live = live.len(), "project populated");
    Ok(live)
}

fn populate_module(
    ctx: &UnitContext,
    project: &ProjectDecl,
    mangled: &str,
    module: &ModuleDecl,
) -> Result<Option<LiveModule>, IndexError> {
    let pool = &ctx.pool;
    let writer = &ctx.writer;
    let platform_module = module.platform_module();
    let identity = pool.identity(&ctx.coords, &project.path, &platform_module);
    let id = pool.node(&identity);
    let module_dir = writer.layout().module_dir(mangled, &platform_module);
    writer.ensure_dir(&module_dir)?;

    // read before this run rewrites the module's markers
    let force_marker = writer.read(&module_dir.join("force"))?;

    let evidence = if let Some(source_dir) = find_sources(&project.dir, &platform_module) {
        writer.write(&module_dir.join("sources"), &source_dir.to_string_lossy())?;
        Some((LivenessReason::HasSource, Some(source_dir)))
    } else if force_marker.as_deref().is_some_and(|value| value != "false") {
        Some((LivenessReason::Forced, None))
    } else if module.has_explicit_dependencies() {
        Some((LivenessReason::HasDependencies, None))
    } else if ctx
        .config
        .is_forced_live(mangled, &platform_module.to_string())
    {
        Some((LivenessReason::Forced, None))
    } else {
        None
    };
    if let Some((reason, _)) = &evidence {
        pool.add_liveness(id, *reason)?;
    }
    if module.buildscript {
        pool.add_liveness(id, LivenessReason::HasBuildscript)?;
    }

    for dependency in &module.dependencies {
        record_dependency(ctx, project, mangled, module, id, dependency)?;
    }
    if module.is_published() {
        record_coordinates(ctx, project, module)?;
    }
    write_markers(writer, &module_dir, module)?;

    Ok(evidence.map(|(reason, source_dir)| LiveModule {
        identity,
        platform_module,
        mangled_project: mangled.to_string(),
        explicit: reason != LivenessReason::HasSource,
        source_dir,
        project_force: project.force,
        multiplatform: project.multiplatform,
        is_virtual: project.is_virtual,
    }))
}

fn record_dependency(
    ctx: &UnitContext,
    project: &ProjectDecl,
    mangled: &str,
    module: &ModuleDecl,
    id: NodeId,
    dependency: &DependencyDecl,
) -> Result<(), IndexError> {
    let declaring = module.platform_module();
    let target_pm = dependency.target(&declaring);
    let target_path = match dependency {
        DependencyDecl::Project { path, .. } => path.as_str(),
        DependencyDecl::Internal { .. } => project.path.as_str(),
        DependencyDecl::External { .. } => return Ok(()),
    };

    let target_identity: ModuleIdentity = ctx.pool.identity(&ctx.coords, target_path, &target_pm);
    let target = ctx.pool.node(&target_identity);
    if matches!(dependency, DependencyDecl::Project { .. }) {
        ctx.pool.require(id, target)?;
        ctx.pool.add_liveness(target, LivenessReason::IsDependency)?;
    } else {
        ctx.pool.include(id, target)?;
        ctx.pool.add_liveness(id, LivenessReason::HasIncludes)?;
    }

    let target_mangled = mangle_project_path(target_path);
    ctx.writer.record_edge(
        EdgeEnd {
            mangled_project: mangled,
            platform_module: &declaring,
        },
        EdgeEnd {
            mangled_project: &target_mangled,
            platform_module: &target_pm,
        },
    )
}

fn record_coordinates(
    ctx: &UnitContext,
    project: &ProjectDecl,
    module: &ModuleDecl,
) -> Result<(), IndexError> {
    let group = ctx.resolver.group(&ctx.coords, project, &module.platform);
    let name = ctx
        .resolver
        .name(&ctx.coords, project, &module.platform, &module.module);
    let version_dir = ctx
        .writer
        .layout()
        .version_dir(&group, &name, ctx.coords.version());
    ctx.writer.ensure_dir(&version_dir)?;

    let declaring = module.platform_module();
    for dependency in &module.dependencies {
        let target: PlatformModule = dependency.target(&declaring);
        match dependency {
            DependencyDecl::Project { path, .. } => {
                ctx.writer.record_project_dependency(
                    &version_dir,
                    &mangle_project_path(path),
                    &target,
                )?;
            }
            DependencyDecl::Internal { .. } => {
                ctx.writer.record_internal_dependency(&version_dir, &target)?;
            }
            DependencyDecl::External {
                group,
                name,
                version,
                extras,
                ..
            } => {
                let mut gnv = format!("{group}:{name}:{version}");
                if let Some(extras) = extras.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
                    gnv.push(':');
                    gnv.push_str(extras);
                }
                ctx.writer
                    .record_external_dependency(&version_dir, &gnv, &target)?;
            }
        }
    }
    Ok(())
}

/// `test`/`publish`/`force` markers and the module's starting level.
fn write_markers(
    writer: &IndexWriter,
    module_dir: &std::path::Path,
    module: &ModuleDecl,
) -> Result<(), IndexError> {
    if module.test {
        writer.write_marker(module_dir, "test", true)?;
    } else {
        writer.remove(&module_dir.join("test"))?;
    }
    if module.publish {
        writer.write_marker(module_dir, "publish", true)?;
    } else {
        writer.remove(&module_dir.join("publish"))?;
    }
    if module.force {
        writer.write_marker(module_dir, "force", true)?;
        writer.write_level(module_dir, level::FORCED)
    } else {
        writer.remove(&module_dir.join("force"))?;
        writer.write_level(module_dir, level::DEAD)
    }
}
