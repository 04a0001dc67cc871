//! Publish coordinates of indexed modules.

use schemadex_core::BuildCoordinates;

use crate::decl::ProjectDecl;

/// Decides the `group` and `name` a module is published under.
///
/// Builds with custom publishing patterns plug in their own resolver.
pub trait CoordinateResolver: Send + Sync {
    fn group(&self, build: &BuildCoordinates, project: &ProjectDecl, platform: &str) -> String;

    fn name(
        &self,
        build: &BuildCoordinates,
        project: &ProjectDecl,
        platform: &str,
        module: &str,
    ) -> String;
}

/// Group is the build's group; name is the project's published name with
/// `-<platform>` and `-<module>` appended unless they are `main`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCoordinateResolver;

impl CoordinateResolver for DefaultCoordinateResolver {
    fn group(&self, build: &BuildCoordinates, _project: &ProjectDecl, _platform: &str) -> String {
        build.group().to_string()
    }

    fn name(
        &self,
        build: &BuildCoordinates,
        project: &ProjectDecl,
        platform: &str,
        module: &str,
    ) -> String {
        let mut name = project.published_name(build.build_name()).to_string();
        for part in [platform, module] {
            if part != "main" {
                name.push('-');
                name.push_str(part);
            }
        }
        name
    }
}
