//! On-disk layout of the symbol index.
//!
//! ```text
//! <dir>/MANIFEST            JSON, format version and workspace root
//! <dir>/files/<hash>.seg    one segment per source file
//! <dir>/archives/<hash>.seg one segment per library archive
//! ```
//!
//! Segments are MessagePack, zstd-compressed, and written through a temp
//! file so a crash never leaves a half-written segment behind.

use crate::error::{GroovyscopeError, Result};
use groovyscope_api::SymbolRecord;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;

pub const FORMAT_VERSION: u32 = 1;
const MANIFEST: &str = "MANIFEST";
const FILES_DIR: &str = "files";
const ARCHIVES_DIR: &str = "archives";
const SEGMENT_EXT: &str = "seg";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    created_at_ms: u64,
    workspace_root: PathBuf,
}

/// Symbols of one source file, stamped with the submission that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSegment {
    pub path: PathBuf,
    pub version: u64,
    pub content_hash: u64,
    pub records: Vec<SymbolRecord>,
}

/// Symbols of one archive, stamped with the archive's size and mtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSegment {
    pub path: PathBuf,
    pub stamp: ArchiveStamp,
    pub records: Vec<SymbolRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStamp {
    pub size: u64,
    /// Seconds since the epoch.
    pub mtime: u64,
}

impl ArchiveStamp {
    /// Size and mtime of an archive. For a class directory, the summed size
    /// and newest mtime of the files below it.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        if metadata.is_dir() {
            return Ok(WalkDir::new(path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .filter_map(|entry| entry.metadata().ok())
                .fold(Self::default(), |stamp, m| Self {
                    size: stamp.size + m.len(),
                    mtime: stamp.mtime.max(mtime_secs(&m)),
                }));
        }
        Ok(Self {
            size: metadata.len(),
            mtime: mtime_secs(&metadata),
        })
    }
}

fn mtime_secs(metadata: &fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Serialize, Deserialize)]
enum Segment {
    File(FileSegment),
    Archive(ArchiveSegment),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    segment: Segment,
}

/// Everything read back from disk when the store was opened.
#[derive(Debug, Default)]
pub struct Loaded {
    pub files: Vec<FileSegment>,
    pub archives: Vec<ArchiveSegment>,
    /// Why the previous contents were discarded, if they were.
    pub cold_start: Option<String>,
}

pub struct SegmentStore {
    dir: PathBuf,
}

fn segment_name(path: &Path) -> String {
    format!(
        "{:016x}.{SEGMENT_EXT}",
        xxh3_64(path.to_string_lossy().as_bytes())
    )
}

fn encode(segment: Segment) -> Result<Vec<u8>> {
    let envelope = Envelope {
        format_version: FORMAT_VERSION,
        segment,
    };
    let bytes = rmp_serde::to_vec(&envelope)?;
    let compressed = zstd::encode_all(&bytes[..], 0)
        .map_err(|e| GroovyscopeError::Index(format!("Zstd compression failed: {}", e)))?;
    Ok(compressed)
}

fn decode(bytes: &[u8]) -> Result<Segment> {
    let decompressed = zstd::decode_all(bytes)
        .map_err(|e| GroovyscopeError::Index(format!("Zstd decompression failed: {}", e)))?;
    let envelope: Envelope = rmp_serde::from_slice(&decompressed)?;
    if envelope.format_version != FORMAT_VERSION {
        return Err(GroovyscopeError::Index(format!(
            "segment format {} (expected {})",
            envelope.format_version, FORMAT_VERSION
        )));
    }
    Ok(envelope.segment)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, bytes)?;
    fs::rename(temp_path, path)?;
    Ok(())
}

impl SegmentStore {
    /// Opens the store at `dir`, creating it if needed. Unreadable contents
    /// are wiped and reported through [`Loaded::cold_start`]; only failing to
    /// create the directory is an error.
    pub fn open(dir: &Path, workspace_root: &Path) -> Result<(Self, Loaded)> {
        fs::create_dir_all(dir)?;
        let store = Self {
            dir: dir.to_path_buf(),
        };

        match store.load(workspace_root) {
            Ok(Some(loaded)) => {
                info!(
                    "Loaded index from {} ({} files, {} archives)",
                    dir.display(),
                    loaded.files.len(),
                    loaded.archives.len()
                );
                Ok((store, loaded))
            }
            Ok(None) => {
                store.reset(workspace_root)?;
                Ok((store, Loaded::default()))
            }
            Err(reason) => {
                warn!("Index at {} is unusable: {}. Will rebuild.", dir.display(), reason);
                store.reset(workspace_root)?;
                Ok((
                    store,
                    Loaded {
                        cold_start: Some(reason),
                        ..Loaded::default()
                    },
                ))
            }
        }
    }

    /// `Ok(None)` for a store that was never written.
    fn load(&self, workspace_root: &Path) -> std::result::Result<Option<Loaded>, String> {
        let manifest_path = self.dir.join(MANIFEST);
        let text = match fs::read_to_string(&manifest_path) {
            Ok(text) => text,
            Err(_) => {
                let has_segments =
                    self.dir.join(FILES_DIR).exists() || self.dir.join(ARCHIVES_DIR).exists();
                return if has_segments {
                    Err("manifest is missing".to_string())
                } else {
                    Ok(None)
                };
            }
        };

        let manifest: Manifest =
            serde_json::from_str(&text).map_err(|e| format!("manifest is unreadable: {e}"))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(format!(
                "format version mismatch (found {}, expected {})",
                manifest.format_version, FORMAT_VERSION
            ));
        }
        if manifest.workspace_root != workspace_root {
            return Err(format!(
                "index belongs to {}",
                manifest.workspace_root.display()
            ));
        }

        let mut loaded = Loaded::default();
        for sub in [FILES_DIR, ARCHIVES_DIR] {
            let dir = self.dir.join(sub);
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries {
                let path = entry.map_err(|e| e.to_string())?.path();
                match path.extension().and_then(|e| e.to_str()) {
                    Some(SEGMENT_EXT) => {}
                    // Leftover from an interrupted write.
                    Some("tmp") => {
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    _ => continue,
                }
                let bytes = fs::read(&path).map_err(|e| e.to_string())?;
                let segment =
                    decode(&bytes).map_err(|e| format!("{}: {}", path.display(), e))?;
                let (key, expected_sub) = match &segment {
                    Segment::File(s) => (s.path.as_path(), FILES_DIR),
                    Segment::Archive(s) => (s.path.as_path(), ARCHIVES_DIR),
                };
                let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if expected_sub != sub || segment_name(key) != file_name {
                    return Err(format!("{} is misplaced", path.display()));
                }
                match segment {
                    Segment::File(s) => loaded.files.push(s),
                    Segment::Archive(s) => loaded.archives.push(s),
                }
            }
        }
        Ok(Some(loaded))
    }

    fn reset(&self, workspace_root: &Path) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        fs::create_dir_all(self.dir.join(FILES_DIR))?;
        fs::create_dir_all(self.dir.join(ARCHIVES_DIR))?;
        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            created_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            workspace_root: workspace_root.to_path_buf(),
        };
        write_atomic(
            &self.dir.join(MANIFEST),
            serde_json::to_string_pretty(&manifest)?.as_bytes(),
        )
    }

    fn file_path(&self, path: &Path) -> PathBuf {
        self.dir.join(FILES_DIR).join(segment_name(path))
    }

    fn archive_path(&self, path: &Path) -> PathBuf {
        self.dir.join(ARCHIVES_DIR).join(segment_name(path))
    }

    pub fn write_file(&self, segment: &FileSegment) -> Result<()> {
        let target = self.file_path(&segment.path);
        write_atomic(&target, &encode(Segment::File(segment.clone()))?)
    }

    pub fn write_archive(&self, segment: &ArchiveSegment) -> Result<()> {
        let target = self.archive_path(&segment.path);
        write_atomic(&target, &encode(Segment::Archive(segment.clone()))?)
    }

    pub fn delete_file(&self, path: &Path) -> Result<()> {
        remove_if_exists(&self.file_path(path))
    }

    pub fn delete_archive(&self, path: &Path) -> Result<()> {
        remove_if_exists(&self.archive_path(path))
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groovyscope_api::{Location, SymbolKind, SymbolOrigin};
    use tempfile::tempdir;

    fn segment(path: &str) -> FileSegment {
        FileSegment {
            path: PathBuf::from(path),
            version: 3,
            content_hash: 42,
            records: vec![SymbolRecord::new(
                "a.Foo",
                SymbolKind::Class,
                Location::new(path, 1, 1),
                SymbolOrigin::Workspace,
            )],
        }
    }

    #[test]
    fn test_segments_survive_reopen() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("index");
        let (store, loaded) = SegmentStore::open(&index, Path::new("/ws")).unwrap();
        assert!(loaded.cold_start.is_none());
        store.write_file(&segment("/ws/Foo.groovy")).unwrap();

        let (_, loaded) = SegmentStore::open(&index, Path::new("/ws")).unwrap();
        assert!(loaded.cold_start.is_none());
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.files[0].version, 3);
        assert_eq!(loaded.files[0].records[0].qualified_name, "a.Foo");
    }

    #[test]
    fn test_corrupt_segment_forces_cold_start() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("index");
        let (store, _) = SegmentStore::open(&index, Path::new("/ws")).unwrap();
        store.write_file(&segment("/ws/Foo.groovy")).unwrap();
        let seg = store.file_path(Path::new("/ws/Foo.groovy"));
        fs::write(&seg, b"garbage").unwrap();

        let (_, loaded) = SegmentStore::open(&index, Path::new("/ws")).unwrap();
        assert!(loaded.cold_start.is_some());
        assert!(loaded.files.is_empty());
        assert!(!seg.exists());
    }

    #[test]
    fn test_manifest_mismatches_force_cold_start() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("index");
        SegmentStore::open(&index, Path::new("/ws")).unwrap();

        let (_, loaded) = SegmentStore::open(&index, Path::new("/elsewhere")).unwrap();
        assert!(loaded.cold_start.is_some());

        fs::write(index.join(MANIFEST), "{}").unwrap();
        let (_, loaded) = SegmentStore::open(&index, Path::new("/elsewhere")).unwrap();
        assert!(loaded.cold_start.is_some());
    }
}
