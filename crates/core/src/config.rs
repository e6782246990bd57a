//! Workspace configuration.
//!
//! Read from `<root>/.groovyscope/config.json` when present, then adjusted by
//! `GROOVYSCOPE_*` environment variables.

use groovyscope_api::Phase;
use groovyscope_groovy::ArchiveLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const CONFIG_DIR: &str = ".groovyscope";
pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_INDEX_DIR: &str = ".groovyscope/index";

pub const ENV_INDEX_DIR: &str = "GROOVYSCOPE_INDEX_DIR";
pub const ENV_WORKERS: &str = "GROOVYSCOPE_WORKERS";
pub const ENV_GRADLE_HOME: &str = "GROOVYSCOPE_GRADLE_HOME";
pub const ENV_MAVEN_REPO: &str = "GROOVYSCOPE_MAVEN_REPO";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Relative paths are resolved against the workspace root.
    pub index_dir: PathBuf,
    pub source_extensions: Vec<String>,
    pub exclude_dirs: Vec<String>,
    pub worker_threads: usize,
    pub max_file_size: u64,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    /// Phase workspace files are compiled to while indexing.
    pub index_phase: Phase,
    pub archive_limits: ArchiveLimits,
    pub gradle_user_home: Option<PathBuf>,
    pub maven_repository: Option<PathBuf>,
    pub event_channel_capacity: usize,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            source_extensions: vec!["groovy".into(), "gradle".into(), "gradle.kts".into()],
            exclude_dirs: [
                ".git",
                ".gradle",
                ".idea",
                "build",
                "target",
                "node_modules",
                "out",
                ".groovyscope",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_file_size: 10 * 1024 * 1024,
            cache_capacity: 1000,
            cache_ttl_secs: 1800,
            index_phase: Phase::SemanticAnalysis,
            archive_limits: ArchiveLimits::default(),
            gradle_user_home: None,
            maven_repository: None,
            event_channel_capacity: 1024,
        }
    }
}

impl WorkspaceConfig {
    /// Loads the workspace config file, falling back to defaults, and applies
    /// environment overrides.
    pub fn load(root: &Path) -> Self {
        let path = root.join(CONFIG_DIR).join(CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<WorkspaceConfig>(&text) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring malformed config at {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(ENV_INDEX_DIR) {
            self.index_dir = PathBuf::from(dir);
        }
        if let Ok(workers) = std::env::var(ENV_WORKERS) {
            match workers.parse::<usize>() {
                Ok(n) if n > 0 => self.worker_threads = n,
                _ => warn!("Ignoring invalid {}={}", ENV_WORKERS, workers),
            }
        }
        if let Ok(dir) = std::env::var(ENV_GRADLE_HOME) {
            self.gradle_user_home = Some(PathBuf::from(dir));
        }
        if let Ok(dir) = std::env::var(ENV_MAVEN_REPO) {
            self.maven_repository = Some(PathBuf::from(dir));
        }
    }

    pub fn index_path(&self, root: &Path) -> PathBuf {
        if self.index_dir.is_absolute() {
            self.index_dir.clone()
        } else {
            root.join(&self.index_dir)
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// `~/.gradle` unless configured.
    pub fn gradle_home(&self) -> PathBuf {
        self.gradle_user_home.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".gradle")
        })
    }

    /// `~/.m2/repository` unless configured.
    pub fn maven_repo(&self) -> PathBuf {
        self.maven_repository.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".m2/repository")
        })
    }

    /// Full-suffix match, so `build.gradle.kts` is recognized as `gradle.kts`.
    pub fn is_source_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.source_extensions.iter().any(|ext| {
            name.len() > ext.len() + 1
                && name.ends_with(ext.as_str())
                && name.as_bytes()[name.len() - ext.len() - 1] == b'.'
        })
    }

    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.exclude_dirs.iter().any(|d| d == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = WorkspaceConfig::default();
        assert_eq!(config.index_phase, Phase::SemanticAnalysis);
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.archive_limits.max_entries, 100_000);
        assert!(config.worker_threads > 0);
    }

    #[test]
    fn test_source_file_matching() {
        let config = WorkspaceConfig::default();
        assert!(config.is_source_file(Path::new("/ws/src/Foo.groovy")));
        assert!(config.is_source_file(Path::new("/ws/build.gradle")));
        assert!(config.is_source_file(Path::new("/ws/build.gradle.kts")));
        assert!(!config.is_source_file(Path::new("/ws/Foo.java")));
        assert!(!config.is_source_file(Path::new("/ws/README")));
        assert!(!config.is_source_file(Path::new("/ws/notgroovy")));
        assert!(!config.is_source_file(Path::new("/ws/Foo.GROOVY")));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_DIR).join(CONFIG_FILE),
            r#"{"cache_capacity": 5, "index_phase": "parse"}"#,
        )
        .unwrap();

        let config = WorkspaceConfig::load(dir.path());
        assert_eq!(config.cache_capacity, 5);
        assert_eq!(config.index_phase, Phase::Parse);
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        std::fs::write(dir.path().join(CONFIG_DIR).join(CONFIG_FILE), "{ nope").unwrap();

        let config = WorkspaceConfig::load(dir.path());
        assert_eq!(config.cache_capacity, WorkspaceConfig::default().cache_capacity);
    }

    #[test]
    fn test_index_path_relative_to_root() {
        let config = WorkspaceConfig::default();
        assert_eq!(
            config.index_path(Path::new("/ws")),
            PathBuf::from("/ws/.groovyscope/index")
        );
    }
}
