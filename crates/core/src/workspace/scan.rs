use crate::config::WorkspaceConfig;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Source files under `root`, sorted, honoring `.gitignore` and the
/// configured excluded directory names.
pub(crate) fn collect_sources(root: &Path, config: &WorkspaceConfig) -> Vec<PathBuf> {
    let index_dir = config.index_path(root);
    let excludes = config.exclude_dirs.clone();

    let mut files: Vec<PathBuf> = WalkBuilder::new(root)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if !is_dir || entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !excludes.iter().any(|e| *e == name) && entry.path() != index_dir
        })
        .build()
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            if entry.file_type().is_some_and(|t| t.is_file()) && config.is_source_file(path) {
                return Some(path.to_path_buf());
            }
            None
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_collects_recognized_sources_only() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/main/groovy/app")).unwrap();
        fs::create_dir_all(root.join("build/classes")).unwrap();
        fs::write(root.join("src/main/groovy/app/Main.groovy"), "class Main {}").unwrap();
        fs::write(root.join("src/main/groovy/app/notes.txt"), "x").unwrap();
        fs::write(root.join("build/classes/Gen.groovy"), "class Gen {}").unwrap();
        fs::write(root.join("build.gradle"), "").unwrap();
        fs::write(root.join("settings.gradle.kts"), "").unwrap();

        let files = collect_sources(root, &WorkspaceConfig::default());
        assert_eq!(
            files,
            vec![
                root.join("build.gradle"),
                root.join("settings.gradle.kts"),
                root.join("src/main/groovy/app/Main.groovy"),
            ]
        );
    }
}
