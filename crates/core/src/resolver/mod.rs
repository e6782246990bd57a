//! Dependency Resolver: finds the build descriptor and turns its declared
//! libraries into archive paths on the local machine.
//!
//! Nothing here talks to the network or runs the build tool. Coordinates are
//! looked up in the Gradle module cache and the Maven local repository, and
//! anything that cannot be found is reported as a [`ResolutionWarning`].

mod gradle;
mod maven;

use crate::config::WorkspaceConfig;
use groovyscope_api::BuildSystemKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::Xxh3;

pub(crate) const GRADLE_MARKERS: &[&str] = &[
    "build.gradle",
    "build.gradle.kts",
    "settings.gradle",
    "settings.gradle.kts",
];
pub(crate) const MAVEN_MARKER: &str = "pom.xml";

const SOURCE_LAYOUT: &[&str] = &["src/main/groovy", "src/main/java", "src/test/groovy", "src/test/java"];
const FALLBACK_SOURCE_DIRS: &[&str] = &["src", "groovy", "java"];

/// A coordinate that could not be mapped to a local archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionWarning {
    pub coordinate: String,
    pub reason: String,
}

/// The outcome of one resolution pass. Always usable, possibly partial.
#[derive(Debug, Clone, Default)]
pub struct ResolvedClasspath {
    pub build_system: BuildSystemKind,
    /// Archives and class directories, deduplicated, in declaration order.
    pub entries: Vec<PathBuf>,
    pub warnings: Vec<ResolutionWarning>,
}

impl ResolvedClasspath {
    /// Entries that are archives rather than class directories.
    pub fn archives(&self) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .filter(|p| p.extension().is_some_and(|e| e == "jar"))
            .map(PathBuf::as_path)
    }

    /// Compiler output directories of referenced projects and modules.
    pub fn class_directories(&self) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .filter(|p| p.extension().is_none_or(|e| e != "jar"))
            .map(PathBuf::as_path)
    }

    pub(crate) fn push(&mut self, path: PathBuf) {
        if !self.entries.contains(&path) {
            self.entries.push(path);
        }
    }

    pub(crate) fn warn(&mut self, coordinate: impl Into<String>, reason: impl Into<String>) {
        let warning = ResolutionWarning {
            coordinate: coordinate.into(),
            reason: reason.into(),
        };
        warn!(
            coordinate = %warning.coordinate,
            "Skipping dependency: {}", warning.reason
        );
        self.warnings.push(warning);
    }
}

/// Where the project lives and which files describe it.
#[derive(Debug, Clone)]
struct ProjectLayout {
    kind: BuildSystemKind,
    /// Directory holding the root descriptor.
    dir: PathBuf,
    /// Root first, then each included module.
    modules: Vec<PathBuf>,
    descriptors: Vec<PathBuf>,
}

pub struct DependencyResolver {
    root: PathBuf,
    gradle_home: PathBuf,
    maven_repo: PathBuf,
    memo: Mutex<Option<(u64, Arc<ResolvedClasspath>)>>,
}

impl DependencyResolver {
    pub fn new(root: &Path, config: &WorkspaceConfig) -> Self {
        Self::with_locations(root, config.gradle_home(), config.maven_repo())
    }

    pub fn with_locations(root: &Path, gradle_home: PathBuf, maven_repo: PathBuf) -> Self {
        Self {
            root: root.to_path_buf(),
            gradle_home,
            maven_repo,
            memo: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walks from the workspace root upward; Gradle markers win over `pom.xml`
    /// in the same directory.
    pub fn detect_build_system(&self) -> BuildSystemKind {
        self.locate().map(|(kind, _)| kind).unwrap_or_default()
    }

    fn locate(&self) -> Option<(BuildSystemKind, PathBuf)> {
        for dir in self.root.ancestors() {
            if GRADLE_MARKERS.iter().any(|m| dir.join(m).is_file()) {
                return Some((BuildSystemKind::Gradle, dir.to_path_buf()));
            }
            if dir.join(MAVEN_MARKER).is_file() {
                return Some((BuildSystemKind::Maven, dir.to_path_buf()));
            }
        }
        None
    }

    fn layout(&self) -> ProjectLayout {
        match self.locate() {
            Some((BuildSystemKind::Gradle, dir)) => {
                let (modules, descriptors) = gradle::layout(&dir);
                ProjectLayout {
                    kind: BuildSystemKind::Gradle,
                    dir,
                    modules,
                    descriptors,
                }
            }
            Some((BuildSystemKind::Maven, dir)) => {
                let (modules, descriptors) = maven::layout(&dir);
                ProjectLayout {
                    kind: BuildSystemKind::Maven,
                    dir,
                    modules,
                    descriptors,
                }
            }
            _ => ProjectLayout {
                kind: BuildSystemKind::None,
                dir: self.root.clone(),
                modules: vec![self.root.clone()],
                descriptors: Vec::new(),
            },
        }
    }

    /// Resolves the classpath, reusing the previous result while no build
    /// descriptor has changed.
    pub fn resolve(&self) -> Arc<ResolvedClasspath> {
        let layout = self.layout();
        let hash = descriptor_hash(&layout);

        if let Some((memo_hash, cached)) = self.lock_memo().as_ref() {
            if *memo_hash == hash {
                debug!("Build descriptors unchanged, reusing classpath");
                return cached.clone();
            }
        }

        let mut classpath = ResolvedClasspath {
            build_system: layout.kind,
            ..ResolvedClasspath::default()
        };
        match layout.kind {
            BuildSystemKind::Gradle => gradle::resolve(
                &layout.dir,
                &layout.modules,
                &self.gradle_home,
                &self.maven_repo,
                &mut classpath,
            ),
            BuildSystemKind::Maven => {
                maven::resolve(&layout.dir, &layout.modules, &self.maven_repo, &mut classpath)
            }
            BuildSystemKind::None => {
                info!("No build system detected at {}", self.root.display());
            }
        }
        info!(
            "Resolved {} classpath entries for {} build at {} ({} warnings)",
            classpath.entries.len(),
            layout.kind,
            layout.dir.display(),
            classpath.warnings.len()
        );

        let classpath = Arc::new(classpath);
        *self.lock_memo() = Some((hash, classpath.clone()));
        classpath
    }

    pub fn resolve_dependencies(&self) -> Vec<PathBuf> {
        self.resolve().entries.clone()
    }

    /// Conventional source roots of every module that exist on disk.
    pub fn source_directories(&self) -> Vec<PathBuf> {
        let layout = self.layout();
        let candidates: &[&str] = match layout.kind {
            BuildSystemKind::None => FALLBACK_SOURCE_DIRS,
            _ => SOURCE_LAYOUT,
        };
        layout
            .modules
            .iter()
            .flat_map(|module| candidates.iter().map(move |rel| module.join(rel)))
            .filter(|dir| dir.is_dir())
            .collect()
    }

    /// Forgets the memoized classpath so the next [`resolve`](Self::resolve)
    /// starts over, e.g. after the module cache was populated.
    pub fn invalidate(&self) {
        *self.lock_memo() = None;
    }

    fn lock_memo(&self) -> std::sync::MutexGuard<'_, Option<(u64, Arc<ResolvedClasspath>)>> {
        self.memo.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Whether editing `path` can change the resolved classpath.
pub fn is_build_descriptor(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name == MAVEN_MARKER || GRADLE_MARKERS.contains(&name))
}

fn descriptor_hash(layout: &ProjectLayout) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(layout.kind.to_string().as_bytes());
    hasher.update(layout.dir.to_string_lossy().as_bytes());
    for path in &layout.descriptors {
        hasher.update(path.to_string_lossy().as_bytes());
        if let Ok(bytes) = std::fs::read(path) {
            hasher.update(&bytes);
        }
    }
    hasher.digest()
}

/// Compares dotted versions segment by segment, numerically where both
/// segments are numbers.
pub(crate) fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let split = |v: &str| -> Vec<String> {
        v.split(['.', '-', '_'])
            .map(str::to_string)
            .collect()
    };
    let (left, right) = (split(a), split(b));
    for (l, r) in left.iter().zip(right.iter()) {
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => l.cmp(r),
        };
        if ordering.is_ne() {
            return ordering;
        }
    }
    left.len().cmp(&right.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;
    use std::fs;
    use tempfile::tempdir;

    fn resolver(root: &Path, home: &Path) -> DependencyResolver {
        DependencyResolver::with_locations(root, home.join("gradle"), home.join("m2"))
    }

    #[test]
    fn test_detect_build_system() {
        let dir = tempdir().unwrap();
        let home = tempdir().unwrap();
        let root = dir.path();
        assert_eq!(resolver(root, home.path()).detect_build_system(), BuildSystemKind::None);

        fs::write(root.join("pom.xml"), "<project/>").unwrap();
        assert_eq!(resolver(root, home.path()).detect_build_system(), BuildSystemKind::Maven);

        fs::write(root.join("settings.gradle"), "").unwrap();
        assert_eq!(resolver(root, home.path()).detect_build_system(), BuildSystemKind::Gradle);
    }

    #[test]
    fn test_detect_walks_up_to_the_descriptor() {
        let dir = tempdir().unwrap();
        let home = tempdir().unwrap();
        fs::write(dir.path().join("build.gradle.kts"), "").unwrap();
        let nested = dir.path().join("module/src");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(
            resolver(&nested, home.path()).detect_build_system(),
            BuildSystemKind::Gradle
        );
    }

    #[test]
    fn test_source_directories() {
        let dir = tempdir().unwrap();
        let home = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        assert_eq!(
            resolver(root, home.path()).source_directories(),
            vec![root.join("src")]
        );

        fs::write(root.join("build.gradle"), "").unwrap();
        fs::create_dir_all(root.join("src/main/groovy")).unwrap();
        fs::create_dir_all(root.join("src/test/groovy")).unwrap();
        assert_eq!(
            resolver(root, home.path()).source_directories(),
            vec![root.join("src/main/groovy"), root.join("src/test/groovy")]
        );
    }

    #[test]
    fn test_resolution_is_memoized_until_descriptor_changes() {
        let dir = tempdir().unwrap();
        let home = tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("build.gradle"),
            "dependencies { implementation 'org.acme:lib:1.0' }",
        )
        .unwrap();
        let resolver = resolver(root, home.path());

        let first = resolver.resolve();
        let second = resolver.resolve();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.warnings.len(), 1);

        fs::write(root.join("build.gradle"), "dependencies { }").unwrap();
        let third = resolver.resolve();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(third.warnings.is_empty());

        resolver.invalidate();
        assert!(!Arc::ptr_eq(&third, &resolver.resolve()));
    }

    #[test]
    fn test_is_build_descriptor() {
        assert!(is_build_descriptor(Path::new("/p/build.gradle")));
        assert!(is_build_descriptor(Path::new("/p/settings.gradle.kts")));
        assert!(is_build_descriptor(Path::new("/p/pom.xml")));
        assert!(!is_build_descriptor(Path::new("/p/Build.groovy")));
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.10.0", "1.9.2"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "2.0.1"), Ordering::Less);
        assert_eq!(compare_versions("31.1-jre", "31.1-jre"), Ordering::Equal);
    }
}
