//! Idempotent writes into the index directory.
//!
//! Population units run concurrently and may touch the same files (both
//! ends of an edge, shared coordinate directories). Every operation here is
//! safe to repeat and to race:
//!
//! - directories are created with `create_dir_all`;
//! - initial values are written with `create_new`, losing a race is fine;
//! - links are checked before they are created, and an existing link that
//!   disagrees is logged and left alone.

use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use schemadex_core::PlatformModule;
use tracing::{trace, warn};

use super::{EdgeEnd, IndexLayout, level};
use crate::error::IndexError;

/// Value of the `<root>/status` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Running,
    Done,
    Failed,
}

impl IndexStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexWriter {
    layout: IndexLayout,
}

impl IndexWriter {
    #[must_use]
    pub const fn new(layout: IndexLayout) -> Self {
        Self { layout }
    }

    #[must_use]
    pub const fn layout(&self) -> &IndexLayout {
        &self.layout
    }

    // -----------------------------------------------------------------------
    // Primitives
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// [`IndexError::CreateDir`] naming `path`.
    pub fn ensure_dir(&self, path: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(path).map_err(|source| IndexError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
    }

    fn ensure_parent(&self, path: &Path) -> Result<(), IndexError> {
        match path.parent() {
            Some(parent) => self.ensure_dir(parent),
            None => Ok(()),
        }
    }

    /// Overwrite `path` with `contents`.
    ///
    /// # Errors
    ///
    /// [`IndexError::CreateDir`] or [`IndexError::Write`].
    pub fn write(&self, path: &Path, contents: &str) -> Result<(), IndexError> {
        self.ensure_parent(path)?;
        fs::write(path, contents).map_err(|source| IndexError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write `contents` unless `path` already exists. Returns whether this
    /// call created the file.
    ///
    /// # Errors
    ///
    /// [`IndexError::CreateDir`] or [`IndexError::Write`].
    pub fn write_if_missing(&self, path: &Path, contents: &str) -> Result<bool, IndexError> {
        self.ensure_parent(path)?;
        let write_err = |source| IndexError::Write {
            path: path.to_path_buf(),
            source,
        };
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(contents.as_bytes()).map_err(write_err)?;
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(write_err(err)),
        }
    }

    /// Remove `path` if present. Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// [`IndexError::Write`] for failures other than the file being absent.
    pub fn remove(&self, path: &Path) -> Result<bool, IndexError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(IndexError::Write {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// # Errors
    ///
    /// [`IndexError::Read`] for failures other than the file being absent.
    pub fn read(&self, path: &Path) -> Result<Option<String>, IndexError> {
        super::read_value(path)
    }

    // -----------------------------------------------------------------------
    // Module files
    // -----------------------------------------------------------------------

    /// Write a `"true"`/`"false"` marker file.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn write_marker(&self, dir: &Path, name: &str, value: bool) -> Result<(), IndexError> {
        self.write(&dir.join(name), if value { "true" } else { "false" })
    }

    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn write_level(&self, module_dir: &Path, value: u8) -> Result<(), IndexError> {
        self.write(&module_dir.join("live"), &value.to_string())
    }

    /// Level stored in `module_dir/live`; a missing or empty file is dead.
    ///
    /// # Errors
    ///
    /// [`IndexError::Read`] or [`IndexError::InvalidLevel`].
    pub fn read_level(&self, module_dir: &Path) -> Result<u8, IndexError> {
        super::read_level(module_dir)
    }

    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn set_status(&self, status: IndexStatus) -> Result<(), IndexError> {
        self.write(&self.layout.status_file(), status.as_str())
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Record that `from` depends on `to`: an `in/` link under `from`, an
    /// `out/` link under `to`, and a dead `live` file on both ends unless
    /// one is already there.
    ///
    /// # Errors
    ///
    /// [`IndexError::CreateDir`], [`IndexError::Write`] or
    /// [`IndexError::Read`].
    pub fn record_edge(&self, from: EdgeEnd<'_>, to: EdgeEnd<'_>) -> Result<(), IndexError> {
        let from_dir = from.dir(&self.layout);
        let to_dir = to.dir(&self.layout);

        for dir in [&from_dir, &to_dir] {
            self.write_if_missing(&dir.join("live"), &level::DEAD.to_string())?;
        }

        self.write_link(&to.link_file(&from_dir.join("in")), &to.link())?;
        self.write_link(&from.link_file(&to_dir.join("out")), &from.link())?;
        trace!(from = %from.link(), to = %to.link(), "recorded edge");
        Ok(())
    }

    fn write_link(&self, path: &Path, value: &str) -> Result<(), IndexError> {
        if let Some(existing) = self.read(path)? {
            if existing != value {
                warn!(
                    link = %path.display(),
                    existing = %existing,
                    expected = %value,
                    "index link disagrees with declaration; leaving it in place"
                );
            }
            return Ok(());
        }
        self.write_if_missing(path, value)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Coordinate records
    // -----------------------------------------------------------------------

    /// `project/<project>` holding the target `platform:module`.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn record_project_dependency(
        &self,
        version_dir: &Path,
        mangled_project: &str,
        target: &PlatformModule,
    ) -> Result<PathBuf, IndexError> {
        let path = version_dir.join("project").join(mangled_project);
        self.write(&path, &target.to_string())?;
        Ok(path)
    }

    /// Empty `internal/<platform>:<module>` file; the name is the record.
    ///
    /// # Errors
    ///
    /// See [`write_if_missing`](Self::write_if_missing).
    pub fn record_internal_dependency(
        &self,
        version_dir: &Path,
        target: &PlatformModule,
    ) -> Result<PathBuf, IndexError> {
        let path = version_dir.join("internal").join(target.to_string());
        self.write_if_missing(&path, "")?;
        Ok(path)
    }

    /// `<g>:<n>:<v>[:<extras>]` holding the declaring `platform:module`.
    ///
    /// # Errors
    ///
    /// See [`write`](Self::write).
    pub fn record_external_dependency(
        &self,
        version_dir: &Path,
        gnv: &str,
        target: &PlatformModule,
    ) -> Result<PathBuf, IndexError> {
        let path = version_dir.join(gnv);
        self.write(&path, &target.to_string())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn writer() -> (tempfile::TempDir, IndexWriter) {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = IndexWriter::new(IndexLayout::new(dir.path().join("index")));
        (dir, writer)
    }

    #[test]
    fn write_if_missing_keeps_the_first_value() {
        let (_dir, writer) = writer();
        let path = writer.layout().root().join("a/b/live");
        assert!(writer.write_if_missing(&path, "0").expect("first"));
        assert!(!writer.write_if_missing(&path, "4").expect("second"));
        assert_eq!(writer.read(&path).expect("read").as_deref(), Some("0"));
    }

    #[test]
    fn remove_tolerates_missing_files() {
        let (_dir, writer) = writer();
        let path = writer.layout().root().join("force");
        assert!(!writer.remove(&path).expect("absent"));
        writer.write(&path, "true").expect("write");
        assert!(writer.remove(&path).expect("present"));
    }

    #[test]
    fn record_edge_writes_both_directions_once() {
        let (_dir, writer) = writer();
        let main = PlatformModule::new("main", "main");
        let api = PlatformModule::new("main", "api");
        let app = EdgeEnd {
            mangled_project: "_app",
            platform_module: &main,
        };
        let core = EdgeEnd {
            mangled_project: "_core",
            platform_module: &api,
        };

        writer.record_edge(app, core).expect("record");
        writer.record_edge(app, core).expect("record again");

        let layout = writer.layout();
        let app_dir = layout.module_dir("_app", &main);
        let core_dir = layout.module_dir("_core", &api);
        assert_eq!(
            writer.read(&app_dir.join("in/_core/main:api/link")).expect("read").as_deref(),
            Some("_core/main:api")
        );
        assert_eq!(
            writer.read(&core_dir.join("out/_app/main:main/link")).expect("read").as_deref(),
            Some("_app/main:main")
        );
        assert_eq!(writer.read_level(&app_dir).expect("level"), 0);
        assert_eq!(writer.read_level(&core_dir).expect("level"), 0);
    }

    #[test]
    fn disagreeing_link_is_left_in_place() {
        let (_dir, writer) = writer();
        let link = writer.layout().root().join("path/_a/main:main/in/_b/main:main/link");
        writer.write(&link, "_elsewhere/main:main").expect("seed");
        let main = PlatformModule::new("main", "main");
        writer
            .record_edge(
                EdgeEnd {
                    mangled_project: "_a",
                    platform_module: &main,
                },
                EdgeEnd {
                    mangled_project: "_b",
                    platform_module: &main,
                },
            )
            .expect("record");
        assert_eq!(
            writer.read(&link).expect("read").as_deref(),
            Some("_elsewhere/main:main")
        );
    }

    #[test]
    fn unwritable_root_names_the_directory() {
        let (dir, _) = writer();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").expect("write");
        let writer = IndexWriter::new(IndexLayout::new(blocker.join("index")));
        let err = writer.set_status(IndexStatus::Running).expect_err("must fail");
        assert!(matches!(err, IndexError::CreateDir { ref path, .. } if path.starts_with(&blocker)));
    }

    #[test]
    fn status_round_trips_through_its_file() {
        let (_dir, writer) = writer();
        writer.set_status(IndexStatus::Failed).expect("status");
        let raw = writer.read(&writer.layout().status_file()).expect("read");
        assert_eq!(raw.as_deref().and_then(IndexStatus::parse), Some(IndexStatus::Failed));
    }
}
