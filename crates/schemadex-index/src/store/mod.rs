//! The persisted directory index.
//!
//! # Layout
//!
//! ```text
//! <root>/lock                                   advisory lock
//! <root>/status                                 running | done | failed
//! <root>/path/<project>/multiplatform           project-level marker
//! <root>/path/<project>/<platform>:<module>/
//!     live                                      liveness level 0-4
//!     force multiplatform virtual test publish  "true"/"false" markers
//!     sources                                   absolute source dir
//!     in/<project>/<platform>:<module>/link     a dependency of this module
//!     out/<project>/<platform>:<module>/link    a dependent of this module
//! <root>/coord/<group>/<name>/<version>/
//!     project/<project>                         "platform:module"
//!     internal/<platform>:<module>              empty
//!     <g>:<n>:<v>[:<extras>]                    "platform:module"
//! ```
//!
//! `<project>` is the mangled project path (see
//! [`mangle_project_path`](schemadex_core::mangle_project_path)). Link files
//! hold the target module directory relative to `<root>/path`.
//!
//! Every file is a single value, so other tooling can register individual
//! files as cache inputs and read one fact with one read.

pub mod propagate;
pub mod reader;
pub mod writer;

use std::path::{Path, PathBuf};

use schemadex_core::PlatformModule;

use crate::error::IndexError;

pub use propagate::{LiveModule, PropagationReport};
pub use reader::{IndexEntries, IndexReader};
pub use writer::{IndexStatus, IndexWriter};

/// Liveness levels stored in `live` files.
pub mod level {
    pub const DEAD: u8 = 0;
    pub const TRANSITIVE: u8 = 1;
    pub const SOURCE: u8 = 2;
    pub const FORCED: u8 = 3;
    pub const EXPLICIT: u8 = 4;
}

/// Path arithmetic for one index root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    root: PathBuf,
}

impl IndexLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join("lock")
    }

    #[must_use]
    pub fn status_file(&self) -> PathBuf {
        self.root.join("status")
    }

    /// `<root>/path`, the base every link is relative to.
    #[must_use]
    pub fn path_dir(&self) -> PathBuf {
        self.root.join("path")
    }

    #[must_use]
    pub fn coord_dir(&self) -> PathBuf {
        self.root.join("coord")
    }

    #[must_use]
    pub fn project_dir(&self, mangled_project: &str) -> PathBuf {
        self.path_dir().join(mangled_project)
    }

    #[must_use]
    pub fn module_dir(&self, mangled_project: &str, platform_module: &PlatformModule) -> PathBuf {
        self.project_dir(mangled_project)
            .join(platform_module.to_string())
    }

    /// Link content naming a module: `<project>/<platform>:<module>`.
    #[must_use]
    pub fn link_value(mangled_project: &str, platform_module: &PlatformModule) -> String {
        format!("{mangled_project}/{platform_module}")
    }

    /// Module directory a link value points at.
    #[must_use]
    pub fn resolve_link(&self, link: &str) -> PathBuf {
        self.path_dir().join(link.trim())
    }

    #[must_use]
    pub fn version_dir(&self, group: &str, name: &str, version: &str) -> PathBuf {
        self.coord_dir().join(group).join(name).join(version)
    }
}

/// Trimmed contents of `path`, `None` when it does not exist.
pub(crate) fn read_value(path: &Path) -> Result<Option<String>, IndexError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw.trim().to_string())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(IndexError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Level stored in `module_dir/live`; missing or empty means dead.
pub(crate) fn read_level(module_dir: &Path) -> Result<u8, IndexError> {
    let path = module_dir.join("live");
    match read_value(&path)? {
        None => Ok(level::DEAD),
        Some(raw) if raw.is_empty() => Ok(level::DEAD),
        Some(raw) => match raw.parse::<u8>() {
            Ok(value) if value <= level::EXPLICIT => Ok(value),
            _ => Err(IndexError::InvalidLevel { path, value: raw }),
        },
    }
}

/// Sorted child directories of `dir`; a missing `dir` has none.
pub(crate) fn child_dirs(dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(IndexError::Read {
                path: dir.to_path_buf(),
                source,
            });
        }
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Both ends of one recorded edge.
#[derive(Debug, Clone, Copy)]
pub struct EdgeEnd<'a> {
    pub mangled_project: &'a str,
    pub platform_module: &'a PlatformModule,
}

impl EdgeEnd<'_> {
    fn dir(&self, layout: &IndexLayout) -> PathBuf {
        layout.module_dir(self.mangled_project, self.platform_module)
    }

    fn link(&self) -> String {
        IndexLayout::link_value(self.mangled_project, self.platform_module)
    }

    /// `<base>/<project>/<platform>:<module>/link`
    fn link_file(&self, base: &Path) -> PathBuf {
        base.join(self.mangled_project)
            .join(self.platform_module.to_string())
            .join("link")
    }
}
