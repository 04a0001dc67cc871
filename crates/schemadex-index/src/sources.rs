//! Source-directory probing.
//!
//! A module has sources when `<projectDir>/src/<sourceSet>/` contains any
//! directory other than `build`, or when `<projectDir>/src/gradle/<sourceSet>/`
//! is non-empty.

use std::fs;
use std::path::{Path, PathBuf};

use schemadex_core::PlatformModule;

/// Source-set directory name for a module.
///
/// `main:main` → `main`, `main:api` → `api`, `jre:main` → `jre`,
/// `jre:api` → `jreApi`.
#[must_use]
pub fn source_set_name(platform_module: &PlatformModule) -> String {
    let (platform, module) = (platform_module.platform(), platform_module.module());
    match (platform == "main", module == "main") {
        (true, _) => module.to_string(),
        (false, true) => platform.to_string(),
        (false, false) => {
            let mut chars = module.chars();
            chars.next().map_or_else(
                || platform.to_string(),
                |first| format!("{platform}{}{}", first.to_uppercase(), chars.as_str()),
            )
        }
    }
}

/// The module's source directory, if it holds anything worth building.
#[must_use]
pub fn find_sources(project_dir: &Path, platform_module: &PlatformModule) -> Option<PathBuf> {
    let name = source_set_name(platform_module);
    let src = project_dir.join("src");

    let generated = src.join("gradle").join(&name);
    if fs::read_dir(&generated).is_ok_and(|mut entries| entries.next().is_some()) {
        return Some(absolute(&generated));
    }

    let module_src = src.join(&name);
    let has_content = fs::read_dir(&module_src).is_ok_and(|entries| {
        entries.flatten().any(|entry| {
            entry.file_type().is_ok_and(|kind| kind.is_dir()) && entry.file_name() != "build"
        })
    });
    has_content.then(|| absolute(&module_src))
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_set_names_follow_platform_and_module() {
        assert_eq!(source_set_name(&PlatformModule::new("main", "main")), "main");
        assert_eq!(source_set_name(&PlatformModule::new("main", "api")), "api");
        assert_eq!(source_set_name(&PlatformModule::new("jre", "main")), "jre");
        assert_eq!(source_set_name(&PlatformModule::new("jre", "api")), "jreApi");
    }

    #[test]
    fn build_output_alone_is_not_source() {
        let project = tempfile::tempdir().expect("tempdir");
        let main = PlatformModule::new("main", "main");
        assert_eq!(find_sources(project.path(), &main), None);

        fs::create_dir_all(project.path().join("src/main/build/classes")).expect("mkdir");
        assert_eq!(find_sources(project.path(), &main), None);

        fs::create_dir_all(project.path().join("src/main/java")).expect("mkdir");
        let found = find_sources(project.path(), &main).expect("sources");
        assert!(found.ends_with("src/main"));
        assert!(found.is_absolute());
    }

    #[test]
    fn plain_files_do_not_count_but_generated_sources_do() {
        let project = tempfile::tempdir().expect("tempdir");
        let api = PlatformModule::new("main", "api");
        fs::create_dir_all(project.path().join("src/api")).expect("mkdir");
        fs::write(project.path().join("src/api/README"), "notes").expect("write");
        assert_eq!(find_sources(project.path(), &api), None);

        fs::create_dir_all(project.path().join("src/gradle/api")).expect("mkdir");
        assert_eq!(find_sources(project.path(), &api), None);
        fs::write(project.path().join("src/gradle/api/build.gradle"), "").expect("write");
        let found = find_sources(project.path(), &api).expect("generated sources");
        assert!(found.ends_with("src/gradle/api"));
    }
}
