//! Gradle projects: settings includes, per-module build scripts, and the
//! module cache under `<gradle_home>/caches/modules-2/files-2.1`.

use super::{ResolvedClasspath, compare_versions, maven};
use groovyscope_groovy::gradle::project_dir;
use groovyscope_groovy::{GradleDependency, parse_dependencies, parse_settings};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const SETTINGS_FILES: &[&str] = &["settings.gradle", "settings.gradle.kts"];
const BUILD_FILES: &[&str] = &["build.gradle", "build.gradle.kts"];
const MODULE_CACHE: &str = "caches/modules-2/files-2.1";

fn first_existing(dir: &Path, names: &[&str]) -> Option<PathBuf> {
    names.iter().map(|n| dir.join(n)).find(|p| p.is_file())
}

/// Module directories (root first) and the descriptors that define them.
pub(super) fn layout(dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut modules = vec![dir.to_path_buf()];
    let mut descriptors = Vec::new();

    if let Some(settings_path) = first_existing(dir, SETTINGS_FILES) {
        match fs::read_to_string(&settings_path)
            .map_err(|e| e.to_string())
            .and_then(|text| parse_settings(&text).map_err(|e| e.to_string()))
        {
            Ok(settings) => {
                for include in &settings.included_projects {
                    let module = dir.join(project_dir(include));
                    if !modules.contains(&module) {
                        modules.push(module);
                    }
                }
            }
            Err(e) => warn!("Ignoring includes of {}: {}", settings_path.display(), e),
        }
        descriptors.push(settings_path);
    }

    descriptors.extend(modules.iter().filter_map(|m| first_existing(m, BUILD_FILES)));
    (modules, descriptors)
}

pub(super) fn resolve(
    dir: &Path,
    modules: &[PathBuf],
    gradle_home: &Path,
    maven_repo: &Path,
    classpath: &mut ResolvedClasspath,
) {
    let cache = gradle_home.join(MODULE_CACHE);

    for module in modules {
        let Some(build_file) = first_existing(module, BUILD_FILES) else {
            continue;
        };
        let dependencies = match fs::read_to_string(&build_file)
            .map_err(|e| e.to_string())
            .and_then(|text| parse_dependencies(&text).map_err(|e| e.to_string()))
        {
            Ok(deps) => deps,
            Err(e) => {
                classpath.warn(
                    build_file.display().to_string(),
                    format!("unreadable build script: {e}"),
                );
                continue;
            }
        };
        debug!(
            "{} declares {} dependencies",
            build_file.display(),
            dependencies.len()
        );

        for dep in dependencies {
            if dep.is_test_only() {
                continue;
            }
            if dep.is_project {
                resolve_project(dir, &dep, classpath);
            } else {
                resolve_external(&cache, maven_repo, &dep, classpath);
            }
        }
    }
}

fn resolve_project(dir: &Path, dep: &GradleDependency, classpath: &mut ResolvedClasspath) {
    let classes = dir.join(project_dir(&dep.name)).join("build/classes");
    if classes.is_dir() {
        classpath.push(classes);
    } else {
        classpath.warn(dep.coordinate(), "project has no compiled classes yet");
    }
}

/// `1.+`, `latest.release` and friends pick the newest cached version.
fn is_dynamic(version: &str) -> bool {
    version.ends_with('+') || version.starts_with("latest.") || version.starts_with('[')
}

fn resolve_external(
    cache: &Path,
    maven_repo: &Path,
    dep: &GradleDependency,
    classpath: &mut ResolvedClasspath,
) {
    let Some(group) = dep.group.as_deref() else {
        classpath.warn(dep.coordinate(), "coordinate has no group");
        return;
    };
    let artifact_dir = cache.join(group).join(&dep.name);

    let version = match dep.version.as_deref().filter(|v| !is_dynamic(v)) {
        Some(v) => Some(v.to_string()),
        None => latest_version(&artifact_dir),
    };
    let Some(version) = version else {
        classpath.warn(dep.coordinate(), "no version declared or cached");
        return;
    };

    let jars = collect_jars(&artifact_dir.join(&version));
    if !jars.is_empty() {
        for jar in jars {
            classpath.push(jar);
        }
        return;
    }

    let fallback = maven::artifact_path(maven_repo, group, &dep.name, &version, None);
    if fallback.is_file() {
        classpath.push(fallback);
    } else {
        classpath.warn(
            format!("{group}:{}:{version}", dep.name),
            "not found in the Gradle cache or the Maven repository",
        );
    }
}

fn latest_version(artifact_dir: &Path) -> Option<String> {
    fs::read_dir(artifact_dir)
        .ok()?
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .max_by(|a, b| compare_versions(a, b))
}

/// Binary jars under `<version>/<hash>/`, without sources and javadoc.
fn collect_jars(version_dir: &Path) -> Vec<PathBuf> {
    if !version_dir.is_dir() {
        return Vec::new();
    }
    let mut jars: Vec<PathBuf> = WalkDir::new(version_dir)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name.ends_with(".jar")
                && !name.ends_with("-sources.jar")
                && !name.ends_with("-javadoc.jar")
        })
        .collect();
    jars.sort();
    jars
}

#[cfg(test)]
mod tests {
    use super::super::DependencyResolver;
    use groovyscope_api::BuildSystemKind;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    fn cache_jar(home: &Path, group: &str, name: &str, version: &str, file: &str) -> PathBuf {
        let dir = home
            .join("caches/modules-2/files-2.1")
            .join(group)
            .join(name)
            .join(version)
            .join("0f3a9c");
        fs::create_dir_all(&dir).unwrap();
        let jar = dir.join(file);
        fs::write(&jar, b"PK").unwrap();
        jar
    }

    #[test]
    fn test_gradle_cache_lookup_and_fallbacks() {
        let ws = tempdir().unwrap();
        let home = tempdir().unwrap();
        let gradle_home = home.path().join("gradle");
        let m2 = home.path().join("m2");

        let guava = cache_jar(&gradle_home, "com.google.guava", "guava", "31.1-jre", "guava-31.1-jre.jar");
        cache_jar(&gradle_home, "com.google.guava", "guava", "31.1-jre", "guava-31.1-jre-sources.jar");
        cache_jar(&gradle_home, "org.acme", "tool", "1.2.0", "tool-1.2.0.jar");
        let newest = cache_jar(&gradle_home, "org.acme", "tool", "1.10.0", "tool-1.10.0.jar");
        let from_m2 = m2.join("org/slf4j/slf4j-api/2.0.9/slf4j-api-2.0.9.jar");
        fs::create_dir_all(from_m2.parent().unwrap()).unwrap();
        fs::write(&from_m2, b"PK").unwrap();

        fs::write(
            ws.path().join("build.gradle"),
            r#"
            dependencies {
                implementation 'com.google.guava:guava:31.1-jre'
                implementation 'org.acme:tool:1.+'
                implementation 'org.slf4j:slf4j-api:2.0.9'
                implementation 'org.missing:nothing:0.1'
                testImplementation 'junit:junit:4.13.2'
            }
            "#,
        )
        .unwrap();

        let resolver = DependencyResolver::with_locations(ws.path(), gradle_home, m2);
        let classpath = resolver.resolve();
        assert_eq!(classpath.build_system, BuildSystemKind::Gradle);
        assert_eq!(classpath.entries, vec![guava, newest, from_m2]);
        assert_eq!(classpath.warnings.len(), 1);
        assert_eq!(classpath.warnings[0].coordinate, "org.missing:nothing:0.1");
    }

    #[test]
    fn test_multi_project_build() {
        let ws = tempdir().unwrap();
        let home = tempdir().unwrap();
        let root = ws.path();
        fs::write(root.join("settings.gradle"), "include ':app', ':lib'\n").unwrap();
        fs::create_dir_all(root.join("app")).unwrap();
        fs::create_dir_all(root.join("lib/build/classes")).unwrap();
        fs::write(
            root.join("app/build.gradle"),
            "dependencies { implementation project(':lib') }\n",
        )
        .unwrap();
        fs::create_dir_all(root.join("app/src/main/groovy")).unwrap();
        fs::create_dir_all(root.join("lib/src/main/java")).unwrap();

        let resolver = DependencyResolver::with_locations(
            root,
            home.path().join("gradle"),
            home.path().join("m2"),
        );
        let classpath = resolver.resolve();
        assert_eq!(classpath.entries, vec![root.join("lib/build/classes")]);
        assert!(classpath.warnings.is_empty());
        assert_eq!(classpath.archives().count(), 0);
        assert_eq!(classpath.class_directories().count(), 1);

        assert_eq!(
            resolver.source_directories(),
            vec![root.join("app/src/main/groovy"), root.join("lib/src/main/java")]
        );
    }

    #[test]
    fn test_unparsable_build_script_is_a_warning() {
        let ws = tempdir().unwrap();
        let home = tempdir().unwrap();
        fs::write(
            ws.path().join("build.gradle"),
            "dependencies {\n implementation 'a:b:1\n}",
        )
        .unwrap();
        let resolver = DependencyResolver::with_locations(
            ws.path(),
            home.path().join("gradle"),
            home.path().join("m2"),
        );
        let classpath = resolver.resolve();
        assert!(classpath.entries.is_empty());
        assert_eq!(classpath.warnings.len(), 1);
    }
}
