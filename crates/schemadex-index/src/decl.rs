//! Declarations handed to the indexer by the build's schema parser.
//!
//! These are plain data: which projects exist, which platform/module pairs
//! they declare, and what each module depends on. The indexer never parses
//! build files itself. Every type is `serde`-friendly so a parser running in
//! another process can hand a build over as TOML or JSON.

use std::path::PathBuf;

use schemadex_core::PlatformModule;
use serde::{Deserialize, Serialize};

/// One build: its coordinates and every project in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDecl {
    pub name: String,
    pub group: String,
    pub version: String,
    pub root_dir: PathBuf,
    #[serde(default)]
    pub projects: Vec<ProjectDecl>,
}

impl BuildDecl {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        group: impl Into<String>,
        version: impl Into<String>,
        root_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            version: version.into(),
            root_dir: root_dir.into(),
            projects: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_project(mut self, project: ProjectDecl) -> Self {
        self.projects.push(project);
        self
    }

    #[must_use]
    pub fn coordinates(&self) -> schemadex_core::BuildCoordinates {
        schemadex_core::BuildCoordinates::new(&self.name, &self.group, &self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDecl {
    /// Project path, `:` for the root project.
    pub path: String,
    /// Directory holding the project's `src/`.
    pub dir: PathBuf,
    /// Base artifact name; defaults to the last path segment.
    #[serde(default)]
    pub published_name: Option<String>,
    #[serde(default)]
    pub multiplatform: bool,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub modules: Vec<ModuleDecl>,
}

impl ProjectDecl {
    #[must_use]
    pub fn new(path: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dir: dir.into(),
            published_name: None,
            multiplatform: false,
            is_virtual: false,
            force: false,
            modules: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_module(mut self, module: ModuleDecl) -> Self {
        self.modules.push(module);
        self
    }

    /// Published base name: explicit, else the last path segment, else the
    /// build name for the root project.
    #[must_use]
    pub fn published_name<'a>(&'a self, build_name: &'a str) -> &'a str {
        if let Some(name) = &self.published_name {
            return name;
        }
        match self.path.rsplit(':').next() {
            Some(last) if !last.is_empty() => last,
            _ => build_name,
        }
    }
}

/// One `platform:module` of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDecl {
    pub platform: String,
    pub module: String,
    /// Has a non-default build script.
    #[serde(default)]
    pub buildscript: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub test: bool,
    #[serde(default = "default_true")]
    pub publish: bool,
    #[serde(default = "default_true")]
    pub platform_published: bool,
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,
}

impl ModuleDecl {
    #[must_use]
    pub fn new(platform: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            module: module.into(),
            buildscript: false,
            force: false,
            test: false,
            publish: true,
            platform_published: true,
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_dependency(mut self, dependency: DependencyDecl) -> Self {
        self.dependencies.push(dependency);
        self
    }

    #[must_use]
    pub fn platform_module(&self) -> PlatformModule {
        PlatformModule::new(&self.platform, &self.module)
    }

    /// Declares at least one project or external dependency.
    #[must_use]
    pub fn has_explicit_dependencies(&self) -> bool {
        self.dependencies
            .iter()
            .any(|dep| !matches!(dep, DependencyDecl::Internal { .. }))
    }

    /// Both the platform and the module are published.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        self.publish && self.platform_published
    }
}

/// A dependency of one module.
///
/// `target` strings are `platform:module` or a bare `module`; unset, they
/// default to the declaring module's own platform and module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyDecl {
    /// A module of another project in this build: a hard `require` edge.
    Project {
        path: String,
        #[serde(default)]
        target: Option<String>,
    },
    /// Another module of the same project: a soft `include` edge.
    Internal { target: String },
    /// A published artifact outside the build.
    External {
        group: String,
        name: String,
        version: String,
        #[serde(default)]
        extras: Option<String>,
        #[serde(default)]
        target: Option<String>,
    },
}

impl DependencyDecl {
    #[must_use]
    pub fn project(path: impl Into<String>) -> Self {
        Self::Project {
            path: path.into(),
            target: None,
        }
    }

    #[must_use]
    pub fn project_module(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Project {
            path: path.into(),
            target: Some(target.into()),
        }
    }

    #[must_use]
    pub fn internal(target: impl Into<String>) -> Self {
        Self::Internal {
            target: target.into(),
        }
    }

    #[must_use]
    pub fn external(
        group: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self::External {
            group: group.into(),
            name: name.into(),
            version: version.into(),
            extras: None,
            target: None,
        }
    }

    /// The `platform:module` this dependency resolves to, as seen from
    /// `declaring`.
    #[must_use]
    pub fn target(&self, declaring: &PlatformModule) -> PlatformModule {
        let raw = match self {
            Self::Project { target, .. } | Self::External { target, .. } => target.as_deref(),
            Self::Internal { target } => Some(target.as_str()),
        };
        match raw {
            Some(raw) if raw.contains(':') => PlatformModule::parse(raw, declaring.platform()),
            Some(raw) if !raw.trim().is_empty() => {
                PlatformModule::new(declaring.platform(), raw.trim())
            }
            _ => declaring.clone(),
        }
    }
}

const fn default_true() -> bool {
    true
}
