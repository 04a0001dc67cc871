//! Cached queries over a persisted index.
//!
//! The reader assumes the index does not change underneath it. Call
//! [`IndexReader::clear`] after re-indexing to drop cached answers.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use schemadex_core::{PlatformModule, mangle_project_path};
use tracing::debug;

use super::writer::IndexStatus;
use super::{IndexLayout, child_dirs, level, read_level, read_value};
use crate::error::IndexError;

/// Coordinate records of one published `group:name:version`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexEntries {
    /// `internal/<platform>:<module>` records.
    pub internal: Vec<PathBuf>,
    /// `project/<project>` records.
    pub project: Vec<PathBuf>,
    /// `<g>:<n>:<v>` records for artifacts outside the build.
    pub external: Vec<PathBuf>,
    /// Directories this reader does not recognise.
    pub unknown: Vec<PathBuf>,
}

impl IndexEntries {
    /// Any project or external dependency is recorded.
    #[must_use]
    pub fn has_explicit_dependencies(&self) -> bool {
        !self.project.is_empty() || !self.external.is_empty()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.internal.is_empty()
            && self.project.is_empty()
            && self.external.is_empty()
            && self.unknown.is_empty()
    }
}

#[derive(Debug)]
pub struct IndexReader {
    layout: IndexLayout,
    live: DashMap<String, bool>,
    entries: DashMap<PathBuf, Arc<IndexEntries>>,
}

impl IndexReader {
    #[must_use]
    pub fn new(layout: IndexLayout) -> Self {
        Self {
            layout,
            live: DashMap::new(),
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub const fn layout(&self) -> &IndexLayout {
        &self.layout
    }

    /// Drop every cached answer.
    pub fn clear(&self) {
        self.live.clear();
        self.entries.clear();
    }

    /// # Errors
    ///
    /// [`IndexError::Read`] when the status file exists but cannot be read.
    pub fn status(&self) -> Result<Option<IndexStatus>, IndexError> {
        Ok(read_value(&self.layout.status_file())?.and_then(|raw| IndexStatus::parse(&raw)))
    }

    /// Stored level of a module, `0` when nothing was recorded.
    ///
    /// # Errors
    ///
    /// [`IndexError::Read`] or [`IndexError::InvalidLevel`].
    pub fn liveness(
        &self,
        project_path: &str,
        platform_module: &PlatformModule,
    ) -> Result<u8, IndexError> {
        read_level(
            &self
                .layout
                .module_dir(&mangle_project_path(project_path), platform_module),
        )
    }

    /// Whether a module should be realized.
    ///
    /// Level 0 is dead and level 2 or above is live. A transitive module
    /// (level 1) is live only when it both depends on and is depended on
    /// by live modules. Answers are cached; unreadable levels count as dead.
    pub fn check_live(&self, mangled_project: &str, platform_module: &str) -> bool {
        let key = format!("{mangled_project}@{platform_module}");
        if let Some(known) = self.live.get(&key) {
            return *known;
        }
        // provisional answer, so loops through in/ and out/ terminate
        self.live.insert(key.clone(), false);

        let dir = self.layout.project_dir(mangled_project).join(platform_module);
        let value = read_level(&dir).unwrap_or_else(|err| {
            debug!(error = %err, "treating unreadable level as dead");
            level::DEAD
        });
        let live = match value {
            level::DEAD => false,
            level::TRANSITIVE => {
                self.any_link_live(&dir.join("in")) && self.any_link_live(&dir.join("out"))
            }
            _ => true,
        };
        self.live.insert(key, live);
        live
    }

    fn any_link_live(&self, edges: &std::path::Path) -> bool {
        let Ok(projects) = child_dirs(edges) else {
            return false;
        };
        projects.iter().any(|project| {
            let (Ok(modules), Some(project_name)) = (child_dirs(project), file_name(project)) else {
                return false;
            };
            modules.iter().any(|module| {
                module.join("link").is_file()
                    && file_name(module)
                        .is_some_and(|platform_module| self.check_live(&project_name, &platform_module))
            })
        })
    }

    /// Whether a dependency on this module should address a per-module
    /// artifact rather than the plain project.
    ///
    /// True when the project holds several modules (other than exactly
    /// `main:main` plus `main:test`), or when the project or module carries
    /// a `multiplatform = true` marker.
    pub fn is_multiplatform(&self, project_path: &str, platform_module: &PlatformModule) -> bool {
        let project_dir = self.layout.project_dir(&mangle_project_path(project_path));
        let modules: Vec<String> = child_dirs(&project_dir)
            .unwrap_or_default()
            .iter()
            .filter_map(|dir| file_name(dir))
            .collect();
        if modules.len() > 2
            || (modules.len() == 2
                && !modules
                    .iter()
                    .all(|name| name == "main:main" || name == "main:test"))
        {
            return true;
        }
        let marked = |dir: PathBuf| {
            read_value(&dir.join("multiplatform"))
                .ok()
                .flatten()
                .is_some_and(|value| value == "true")
        };
        marked(project_dir.clone()) || marked(project_dir.join(platform_module.to_string()))
    }

    /// Whether the module's `virtual` marker is set.
    pub fn is_virtual(&self, project_path: &str, platform_module: &PlatformModule) -> bool {
        let dir = self
            .layout
            .module_dir(&mangle_project_path(project_path), platform_module);
        read_value(&dir.join("virtual"))
            .ok()
            .flatten()
            .is_some_and(|value| value == "true")
    }

    /// The module was recorded and is not dead.
    pub fn dependency_exists(&self, project_path: &str, platform_module: &PlatformModule) -> bool {
        self.liveness(project_path, platform_module)
            .is_ok_and(|value| value > level::DEAD)
    }

    /// Coordinate records stored under `group:name:version`.
    ///
    /// # Errors
    ///
    /// [`IndexError::Read`] when the version directory cannot be listed.
    pub fn entries(
        &self,
        group: &str,
        name: &str,
        version: &str,
    ) -> Result<Arc<IndexEntries>, IndexError> {
        let version_dir = self.layout.version_dir(group, name, version);
        if let Some(cached) = self.entries.get(&version_dir) {
            return Ok(Arc::clone(&cached));
        }

        let mut entries = IndexEntries::default();
        let listing = match std::fs::read_dir(&version_dir) {
            Ok(listing) => Some(listing),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(IndexError::Read {
                    path: version_dir,
                    source,
                });
            }
        };
        for entry in listing.into_iter().flatten().flatten() {
            let path = entry.path();
            if !path.is_dir() {
                entries.external.push(path);
                continue;
            }
            let bucket = match entry.file_name().to_str() {
                Some("internal") => &mut entries.internal,
                Some("project") => &mut entries.project,
                _ => {
                    entries.unknown.push(path);
                    continue;
                }
            };
            bucket.extend(files_in(&path)?);
        }
        for list in [
            &mut entries.internal,
            &mut entries.project,
            &mut entries.external,
            &mut entries.unknown,
        ] {
            list.sort();
        }

        let entries = Arc::new(entries);
        self.entries.insert(version_dir, Arc::clone(&entries));
        Ok(entries)
    }
}

fn file_name(path: &std::path::Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

fn files_in(dir: &std::path::Path) -> Result<Vec<PathBuf>, IndexError> {
    let listing = std::fs::read_dir(dir).map_err(|source| IndexError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(listing
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EdgeEnd;
    use crate::store::writer::IndexWriter;

    fn setup() -> (tempfile::TempDir, IndexWriter, IndexReader) {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = IndexLayout::new(dir.path());
        (dir, IndexWriter::new(layout.clone()), IndexReader::new(layout))
    }

    fn end<'a>(project: &'a str, pm: &'a PlatformModule) -> EdgeEnd<'a> {
        EdgeEnd {
            mangled_project: project,
            platform_module: pm,
        }
    }

    #[test]
    fn transitive_modules_need_live_neighbours_on_both_sides() {
        let (_dir, writer, reader) = setup();
        let main = PlatformModule::new("main", "main");
        writer.record_edge(end("_app", &main), end("_mid", &main)).expect("edge");
        writer.record_edge(end("_mid", &main), end("_core", &main)).expect("edge");
        let layout = writer.layout().clone();
        writer.write_level(&layout.module_dir("_core", &main), 2).expect("level");
        writer.write_level(&layout.module_dir("_mid", &main), 1).expect("level");

        // nothing live depends on mid yet
        assert!(!reader.check_live("_mid", "main:main"));

        writer.write_level(&layout.module_dir("_app", &main), 4).expect("level");
        reader.clear();
        assert!(reader.check_live("_mid", "main:main"));
        assert!(reader.check_live("_core", "main:main"));
        assert!(!reader.check_live("_missing", "main:main"));
    }

    #[test]
    fn mutually_linked_transitive_modules_terminate() {
        let (_dir, writer, reader) = setup();
        let main = PlatformModule::new("main", "main");
        let api = PlatformModule::new("main", "api");
        writer.record_edge(end("_a", &main), end("_a", &api)).expect("edge");
        writer.record_edge(end("_a", &api), end("_a", &main)).expect("edge");
        let layout = writer.layout().clone();
        writer.write_level(&layout.module_dir("_a", &main), 1).expect("level");
        writer.write_level(&layout.module_dir("_a", &api), 1).expect("level");

        assert!(!reader.check_live("_a", "main:main"));
    }

    #[test]
    fn multiplatform_detection_ignores_main_plus_test() {
        let (_dir, writer, reader) = setup();
        let layout = writer.layout().clone();
        let main = PlatformModule::new("main", "main");
        let test = PlatformModule::new("main", "test");
        let jre = PlatformModule::new("jre", "main");
        for pm in [&main, &test] {
            writer.write_level(&layout.module_dir("_plain", pm), 2).expect("level");
        }
        for pm in [&main, &jre] {
            writer.write_level(&layout.module_dir("_multi", pm), 2).expect("level");
        }
        writer.write_level(&layout.module_dir("_flagged", &main), 2).expect("level");
        writer
            .write_marker(&layout.module_dir("_flagged", &main), "multiplatform", true)
            .expect("marker");

        assert!(!reader.is_multiplatform(":plain", &main));
        assert!(reader.is_multiplatform(":multi", &main));
        assert!(reader.is_multiplatform(":flagged", &main));
        assert!(reader.dependency_exists(":plain", &test));
        assert!(!reader.dependency_exists(":plain", &jre));
    }

    #[test]
    fn entries_are_bucketed_by_record_kind() {
        let (_dir, writer, reader) = setup();
        let version_dir = writer.layout().version_dir("com.example", "app", "1.0");
        let main = PlatformModule::new("main", "main");
        writer
            .record_project_dependency(&version_dir, "_core", &main)
            .expect("project");
        writer
            .record_internal_dependency(&version_dir, &PlatformModule::new("main", "api"))
            .expect("internal");
        writer
            .record_external_dependency(&version_dir, "org.x:x:2", &main)
            .expect("external");

        let entries = reader.entries("com.example", "app", "1.0").expect("entries");
        assert_eq!(entries.project.len(), 1);
        assert_eq!(entries.internal.len(), 1);
        assert_eq!(entries.external.len(), 1);
        assert!(entries.unknown.is_empty());
        assert!(entries.has_explicit_dependencies());

        let missing = reader.entries("com.example", "nope", "1.0").expect("entries");
        assert!(missing.is_empty());
    }
}
