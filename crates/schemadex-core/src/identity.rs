//! Value keys for modules in a multi-project build.
//!
//! A module is addressed by the build it belongs to, the project path inside
//! that build (`:app:api`, `:` for the root project) and a
//! [`PlatformModule`] pair. [`ModuleIdentity`] bundles the three behind an
//! `Arc`, so identities are cheap to clone and hash and can be used freely as
//! map keys across threads.

use std::fmt;
use std::sync::Arc;

/// Coordinates of the build that owns a set of projects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildCoordinates {
    build_name: String,
    group: String,
    version: String,
}

impl BuildCoordinates {
    #[must_use]
    pub fn new(
        build_name: impl Into<String>,
        group: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            build_name: build_name.into(),
            group: group.into(),
            version: version.into(),
        }
    }

    #[must_use]
    pub fn build_name(&self) -> &str {
        &self.build_name
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

/// A `(platform, module)` pair, rendered as `platform:module`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatformModule {
    platform: String,
    module: String,
}

impl PlatformModule {
    #[must_use]
    pub fn new(platform: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            module: module.into(),
        }
    }

    /// Parse `platform:module`, or a bare `module` which then lives on
    /// `default_platform`.
    #[must_use]
    pub fn parse(raw: &str, default_platform: &str) -> Self {
        match raw.trim().split_once(':') {
            Some((platform, module)) if !platform.is_empty() => Self::new(platform, module),
            Some((_, module)) => Self::new(default_platform, module),
            None => Self::new(default_platform, raw.trim()),
        }
    }

    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }
}

impl fmt::Display for PlatformModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.module)
    }
}

/// Turn a project path into a single directory name.
///
/// `:` becomes `_`, and the result always starts with `_`, so the root
/// project `:` maps to `_` and `:app:api` maps to `_app_api`.
#[must_use]
pub fn mangle_project_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == ":" {
        return "_".to_string();
    }
    let mangled = trimmed.replace(':', "_");
    if mangled.starts_with('_') {
        mangled
    } else {
        format!("_{mangled}")
    }
}

#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
struct IdentityInner {
    coords: BuildCoordinates,
    project_path: String,
    platform_module: PlatformModule,
}

/// Immutable key of one module: (coordinates, project path, platform, module).
///
/// Equality and hashing are by value; clones share one allocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleIdentity(Arc<IdentityInner>);

impl ModuleIdentity {
    #[must_use]
    pub fn new(
        coords: BuildCoordinates,
        project_path: impl Into<String>,
        platform_module: PlatformModule,
    ) -> Self {
        Self(Arc::new(IdentityInner {
            coords,
            project_path: project_path.into(),
            platform_module,
        }))
    }

    #[must_use]
    pub fn coords(&self) -> &BuildCoordinates {
        &self.0.coords
    }

    #[must_use]
    pub fn project_path(&self) -> &str {
        &self.0.project_path
    }

    #[must_use]
    pub fn platform_module(&self) -> &PlatformModule {
        &self.0.platform_module
    }

    #[must_use]
    pub fn platform(&self) -> &str {
        self.0.platform_module.platform()
    }

    #[must_use]
    pub fn module(&self) -> &str {
        self.0.platform_module.module()
    }

    /// Directory name of this module's project inside the index.
    #[must_use]
    pub fn mangled_project(&self) -> String {
        mangle_project_path(&self.0.project_path)
    }

    /// Whether both handles point at the same interned allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}@{}",
            self.0.coords.build_name, self.0.project_path, self.0.platform_module
        )
    }
}

impl fmt::Debug for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModuleIdentity")
            .field(&format_args!("{self}"))
            .finish()
    }
}
