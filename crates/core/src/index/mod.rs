//! Persistent symbol index over workspace files and library archives.
//!
//! Each source file and each archive owns one immutable segment. Replacing
//! a file's symbols swaps its segment in a single map insert, so a reader
//! sees either the whole old record set or the whole new one. Writers for
//! the same key take that key's lock; different keys never contend.

mod store;

pub use store::{ArchiveSegment, ArchiveStamp, FORMAT_VERSION, FileSegment};

use crate::error::{GroovyscopeError, Result};
use crate::pipeline::TypeLookup;
use dashmap::DashMap;
use groovyscope_api::{SymbolKind, SymbolOrigin, SymbolRecord};
use groovyscope_groovy::{ArchiveLimits, extract_archive, extract_class_dir};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use store::SegmentStore;
use tracing::{debug, info, warn};

/// How [`SymbolIndex::open`] found the persisted store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenReport {
    /// False when the index lives in memory only.
    pub persistent: bool,
    /// Why previously stored segments were discarded.
    pub cold_start: Option<String>,
    pub files_loaded: usize,
    pub archives_loaded: usize,
}

/// Outcome of [`SymbolIndex::replace_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replaced {
    Replaced,
    /// Same content as the stored segment; only the version moved.
    Unchanged,
    /// A newer version is already stored; nothing was written.
    Stale { current: u64 },
}

pub struct SymbolIndex {
    store: Option<SegmentStore>,
    files: DashMap<PathBuf, Arc<FileSegment>>,
    archives: DashMap<PathBuf, Arc<ArchiveSegment>>,
    /// Qualified type name -> segment owner -> kind.
    types: DashMap<String, BTreeMap<PathBuf, SymbolKind>>,
    /// Every qualified name, sorted, -> segments declaring it.
    names: RwLock<BTreeMap<String, BTreeSet<PathBuf>>>,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    closed: AtomicBool,
    report: OpenReport,
}

impl SymbolIndex {
    /// Opens the index stored in `dir`. A corrupt store is wiped and the
    /// index starts empty; a directory that cannot be created leaves the
    /// index in memory only.
    pub fn open(dir: &Path, workspace_root: &Path) -> Self {
        let (store, loaded) = match SegmentStore::open(dir, workspace_root) {
            Ok((store, loaded)) => (Some(store), loaded),
            Err(e) => {
                warn!(
                    "Cannot use index directory {}: {}. Keeping the index in memory.",
                    dir.display(),
                    e
                );
                (
                    None,
                    store::Loaded {
                        cold_start: Some(e.to_string()),
                        ..Default::default()
                    },
                )
            }
        };

        let mut index = Self::empty(store);
        index.report = OpenReport {
            persistent: index.store.is_some(),
            cold_start: loaded.cold_start,
            files_loaded: loaded.files.len(),
            archives_loaded: loaded.archives.len(),
        };
        for segment in loaded.files {
            index.index_records(&segment.path, &segment.records);
            index.files.insert(segment.path.clone(), Arc::new(segment));
        }
        for segment in loaded.archives {
            index.index_records(&segment.path, &segment.records);
            index.archives.insert(segment.path.clone(), Arc::new(segment));
        }
        index
    }

    pub fn in_memory() -> Self {
        Self::empty(None)
    }

    fn empty(store: Option<SegmentStore>) -> Self {
        Self {
            store,
            files: DashMap::new(),
            archives: DashMap::new(),
            types: DashMap::new(),
            names: RwLock::new(BTreeMap::new()),
            locks: DashMap::new(),
            closed: AtomicBool::new(false),
            report: OpenReport::default(),
        }
    }

    pub fn open_report(&self) -> &OpenReport {
        &self.report
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GroovyscopeError::Closed);
        }
        Ok(())
    }

    fn lock_for(&self, key: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn index_records(&self, owner: &Path, records: &[SymbolRecord]) {
        for record in records.iter().filter(|r| r.kind.is_type()) {
            self.types
                .entry(record.qualified_name.clone())
                .or_default()
                .insert(owner.to_path_buf(), record.kind);
        }
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            names
                .entry(record.qualified_name.clone())
                .or_default()
                .insert(owner.to_path_buf());
        }
    }

    /// Forgets `owner` under each of `names`.
    fn unindex_names(&self, owner: &Path, dropped: &HashSet<&str>) {
        for name in dropped {
            let now_empty = match self.types.get_mut(*name) {
                Some(mut owners) => {
                    owners.remove(owner);
                    owners.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.types.remove_if(*name, |_, owners| owners.is_empty());
            }
        }
        let mut names = self.names.write().unwrap_or_else(PoisonError::into_inner);
        for name in dropped {
            let now_empty = match names.get_mut(*name) {
                Some(owners) => {
                    owners.remove(owner);
                    owners.is_empty()
                }
                None => false,
            };
            if now_empty {
                names.remove(*name);
            }
        }
    }

    fn unindex_records(&self, owner: &Path, records: &[SymbolRecord]) {
        let dropped: HashSet<&str> = records.iter().map(|r| r.qualified_name.as_str()).collect();
        self.unindex_names(owner, &dropped);
    }

    fn persist_file(&self, segment: &FileSegment) {
        if let Some(store) = &self.store {
            if let Err(e) = store.write_file(segment) {
                warn!("Failed to persist segment for {}: {}", segment.path.display(), e);
            }
        }
    }

    fn publish_file(&self, segment: FileSegment) {
        self.persist_file(&segment);
        self.index_records(&segment.path, &segment.records);
        let path = segment.path.clone();
        let segment = Arc::new(segment);
        if let Some(old) = self.files.insert(path.clone(), Arc::clone(&segment)) {
            // Only names the new segment no longer declares; a name that
            // changed kind was already re-indexed above.
            let kept: HashSet<&str> = segment
                .records
                .iter()
                .map(|r| r.qualified_name.as_str())
                .collect();
            let dropped: HashSet<&str> = old
                .records
                .iter()
                .map(|r| r.qualified_name.as_str())
                .filter(|name| !kept.contains(name))
                .collect();
            self.unindex_names(&path, &dropped);
        }
    }

    /// Adds one record to the segment of the file or archive it came from.
    pub fn add_symbol(&self, record: SymbolRecord) -> Result<()> {
        self.ensure_open()?;
        let owner = record.location.path.clone();
        let lock = self.lock_for(&owner);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_open()?;

        match record.origin {
            SymbolOrigin::Workspace => {
                let mut segment = self
                    .files
                    .get(&owner)
                    .map(|s| (**s.value()).clone())
                    .unwrap_or_else(|| FileSegment {
                        path: owner.clone(),
                        version: 0,
                        content_hash: 0,
                        records: Vec::new(),
                    });
                segment.records.push(record);
                self.publish_file(segment);
            }
            SymbolOrigin::Archive => {
                let mut segment = self
                    .archives
                    .get(&owner)
                    .map(|s| (**s.value()).clone())
                    .unwrap_or_else(|| ArchiveSegment {
                        path: owner.clone(),
                        stamp: ArchiveStamp::default(),
                        records: Vec::new(),
                    });
                segment.records.push(record);
                if let Some(store) = &self.store {
                    store.write_archive(&segment)?;
                }
                self.index_records(&owner, &segment.records);
                self.archives.insert(owner, Arc::new(segment));
            }
        }
        Ok(())
    }

    /// Replaces every record of `path` with `records` as one unit.
    ///
    /// Submissions older than the stored version are rejected; a submission
    /// with the stored content hash only advances the version.
    pub fn replace_file(
        &self,
        path: &Path,
        version: u64,
        content_hash: u64,
        records: Vec<SymbolRecord>,
    ) -> Result<Replaced> {
        self.ensure_open()?;
        let lock = self.lock_for(path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_open()?;

        let existing = self.files.get(path).map(|s| Arc::clone(s.value()));
        if let Some(existing) = &existing {
            if version < existing.version {
                debug!(
                    "Discarding stale symbols for {} (version {} < {})",
                    path.display(),
                    version,
                    existing.version
                );
                return Ok(Replaced::Stale {
                    current: existing.version,
                });
            }
            if content_hash == existing.content_hash && existing.version != 0 {
                let mut segment = (**existing).clone();
                segment.version = version;
                self.files.insert(path.to_path_buf(), Arc::new(segment));
                return Ok(Replaced::Unchanged);
            }
        }

        self.publish_file(FileSegment {
            path: path.to_path_buf(),
            version,
            content_hash,
            records,
        });
        Ok(Replaced::Replaced)
    }

    /// Drops every record whose origin file is `path`.
    pub fn remove_file(&self, path: &Path) -> Result<bool> {
        self.ensure_open()?;
        let lock = self.lock_for(path);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_open()?;

        let Some((_, old)) = self.files.remove(path) else {
            return Ok(false);
        };
        self.unindex_records(path, &old.records);
        if let Some(store) = &self.store {
            store.delete_file(path)?;
        }
        Ok(true)
    }

    /// Indexes the classes of an archive or class directory, skipping
    /// entries whose size and mtime match what is already stored. Returns
    /// the entry's record count.
    ///
    /// Reads the whole archive; call it off the async runtime.
    pub fn add_dependency(&self, archive: &Path, limits: &ArchiveLimits) -> Result<usize> {
        self.ensure_open()?;
        let lock = self.lock_for(archive);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_open()?;

        let stamp = ArchiveStamp::of(archive)?;
        if let Some(existing) = self.archives.get(archive) {
            if existing.stamp == stamp {
                debug!("Archive {} unchanged, skipping", archive.display());
                return Ok(existing.records.len());
            }
        }

        let records = if archive.is_dir() {
            extract_class_dir(archive, limits)?
        } else {
            extract_archive(archive, limits)?
        };
        let segment = ArchiveSegment {
            path: archive.to_path_buf(),
            stamp,
            records,
        };
        if let Some(store) = &self.store {
            store.write_archive(&segment)?;
        }
        let count = segment.records.len();
        if let Some(old) = self.archives.remove(archive) {
            self.unindex_records(archive, &old.1.records);
        }
        self.index_records(archive, &segment.records);
        self.archives.insert(archive.to_path_buf(), Arc::new(segment));
        info!("Indexed {} symbols from {}", count, archive.display());
        Ok(count)
    }

    pub fn remove_dependency(&self, archive: &Path) -> Result<bool> {
        self.ensure_open()?;
        let lock = self.lock_for(archive);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ensure_open()?;

        let Some((_, old)) = self.archives.remove(archive) else {
            return Ok(false);
        };
        self.unindex_records(archive, &old.records);
        if let Some(store) = &self.store {
            store.delete_archive(archive)?;
        }
        Ok(true)
    }

    /// Records whose qualified name starts with `query`, case-sensitively.
    ///
    /// Results are ordered by record key, so the same index contents always
    /// produce the same sequence.
    pub fn search(&self, query: &str) -> Result<Vec<SymbolRecord>> {
        self.ensure_open()?;
        let hits: Vec<(String, PathBuf)> = {
            let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
            names
                .range::<str, _>((Bound::Included(query), Bound::Unbounded))
                .take_while(|(name, _)| name.starts_with(query))
                .flat_map(|(name, owners)| owners.iter().map(|o| (name.clone(), o.clone())))
                .collect()
        };
        Ok(self.collect_records(hits))
    }

    /// Records whose qualified name is exactly `qualified_name`.
    pub fn lookup(&self, qualified_name: &str) -> Result<Vec<SymbolRecord>> {
        self.ensure_open()?;
        let hits: Vec<(String, PathBuf)> = {
            let names = self.names.read().unwrap_or_else(PoisonError::into_inner);
            names
                .get(qualified_name)
                .map(|owners| {
                    owners
                        .iter()
                        .map(|o| (qualified_name.to_string(), o.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(self.collect_records(hits))
    }

    /// Pulls the records named in `hits` from their owners' current segments.
    fn collect_records(&self, hits: Vec<(String, PathBuf)>) -> Vec<SymbolRecord> {
        let mut out = Vec::new();
        for (name, owner) in hits {
            let matching = |records: &[SymbolRecord]| -> Vec<SymbolRecord> {
                records
                    .iter()
                    .filter(|r| r.qualified_name == name)
                    .cloned()
                    .collect()
            };
            if let Some(segment) = self.files.get(&owner) {
                out.extend(matching(&segment.records));
            } else if let Some(segment) = self.archives.get(&owner) {
                out.extend(matching(&segment.records));
            }
        }
        out.sort_by_cached_key(|r| r.key());
        out.dedup();
        out
    }

    pub fn file_symbols(&self, path: &Path) -> Result<Vec<SymbolRecord>> {
        self.ensure_open()?;
        Ok(self
            .files
            .get(path)
            .map(|s| s.records.clone())
            .unwrap_or_default())
    }

    /// Stored version of `path`, if any.
    pub fn file_version(&self, path: &Path) -> Option<u64> {
        self.files.get(path).map(|s| s.version)
    }

    /// Highest version stamped on any stored file segment.
    pub fn max_file_version(&self) -> u64 {
        self.files.iter().map(|s| s.version).max().unwrap_or(0)
    }

    pub fn symbol_count(&self) -> Result<usize> {
        self.ensure_open()?;
        let files: usize = self.files.iter().map(|s| s.records.len()).sum();
        let archives: usize = self.archives.iter().map(|s| s.records.len()).sum();
        Ok(files + archives)
    }

    pub fn indexed_files(&self) -> Result<Vec<PathBuf>> {
        self.ensure_open()?;
        let mut files: Vec<PathBuf> = self.files.iter().map(|s| s.key().clone()).collect();
        files.sort();
        Ok(files)
    }

    pub fn dependencies(&self) -> Result<Vec<PathBuf>> {
        self.ensure_open()?;
        let mut archives: Vec<PathBuf> = self.archives.iter().map(|s| s.key().clone()).collect();
        archives.sort();
        Ok(archives)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Releases the in-memory segments. Segments are written as they are
    /// published, so nothing is pending. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Wait for writers that got past `ensure_open`.
        let locks: Vec<Arc<Mutex<()>>> = self.locks.iter().map(|l| Arc::clone(l.value())).collect();
        for lock in locks {
            drop(lock.lock().unwrap_or_else(PoisonError::into_inner));
        }
        self.files.clear();
        self.archives.clear();
        self.types.clear();
        self.names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.locks.clear();
        info!("Symbol index closed");
        Ok(())
    }
}

impl TypeLookup for SymbolIndex {
    fn type_kind(&self, qualified_name: &str) -> Option<SymbolKind> {
        if self.is_closed() {
            return None;
        }
        self.types
            .get(qualified_name)
            .and_then(|owners| owners.values().next().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groovyscope_api::Location;
    use tempfile::tempdir;

    fn record(name: &str, kind: SymbolKind, path: &str) -> SymbolRecord {
        SymbolRecord::new(name, kind, Location::new(path, 1, 1), SymbolOrigin::Workspace)
    }

    #[test]
    fn test_prefix_search_is_case_sensitive_and_ordered() {
        let index = SymbolIndex::in_memory();
        index
            .replace_file(
                Path::new("/ws/B.groovy"),
                1,
                10,
                vec![
                    record("app.FooBar", SymbolKind::Class, "/ws/B.groovy"),
                    record("app.foo", SymbolKind::Class, "/ws/B.groovy"),
                ],
            )
            .unwrap();
        index
            .replace_file(
                Path::new("/ws/A.groovy"),
                1,
                11,
                vec![record("app.Foo", SymbolKind::Class, "/ws/A.groovy")],
            )
            .unwrap();

        let names: Vec<String> = index
            .search("app.Foo")
            .unwrap()
            .into_iter()
            .map(|r| r.qualified_name)
            .collect();
        assert_eq!(names, vec!["app.Foo", "app.FooBar"]);
        assert_eq!(index.search("").unwrap().len(), 3);
    }

    #[test]
    fn test_replace_versions() {
        let index = SymbolIndex::in_memory();
        let path = Path::new("/ws/A.groovy");
        let v1 = vec![record("Foo", SymbolKind::Class, "/ws/A.groovy")];
        let v2 = vec![record("Baz", SymbolKind::Class, "/ws/A.groovy")];

        assert_eq!(index.replace_file(path, 2, 100, v1.clone()).unwrap(), Replaced::Replaced);
        assert_eq!(index.replace_file(path, 3, 100, v1).unwrap(), Replaced::Unchanged);
        assert_eq!(index.file_version(path), Some(3));
        assert_eq!(
            index.replace_file(path, 1, 200, v2.clone()).unwrap(),
            Replaced::Stale { current: 3 }
        );
        assert_eq!(index.search("Foo").unwrap().len(), 1);

        assert_eq!(index.replace_file(path, 4, 200, v2).unwrap(), Replaced::Replaced);
        assert!(index.search("Foo").unwrap().is_empty());
        assert_eq!(index.type_kind("Baz"), Some(SymbolKind::Class));
        assert_eq!(index.type_kind("Foo"), None);
    }

    #[test]
    fn test_kind_change_keeps_type_visible() {
        let index = SymbolIndex::in_memory();
        let path = Path::new("/ws/Foo.groovy");
        index
            .replace_file(path, 1, 1, vec![record("app.Foo", SymbolKind::Class, "/ws/Foo.groovy")])
            .unwrap();
        index
            .replace_file(
                path,
                2,
                2,
                vec![record("app.Foo", SymbolKind::Interface, "/ws/Foo.groovy")],
            )
            .unwrap();

        assert_eq!(index.type_kind("app.Foo"), Some(SymbolKind::Interface));
        let found = index.lookup("app.Foo").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, SymbolKind::Interface);
    }

    #[test]
    fn test_lookup_is_exact_and_tracks_owners() {
        let index = SymbolIndex::in_memory();
        index
            .replace_file(
                Path::new("/ws/A.groovy"),
                1,
                1,
                vec![
                    record("app.Foo", SymbolKind::Class, "/ws/A.groovy"),
                    record("app.FooBar", SymbolKind::Class, "/ws/A.groovy"),
                ],
            )
            .unwrap();
        index
            .replace_file(
                Path::new("/ws/B.groovy"),
                1,
                2,
                vec![record("app.Foo", SymbolKind::Class, "/ws/B.groovy")],
            )
            .unwrap();

        let owners: Vec<PathBuf> = index
            .lookup("app.Foo")
            .unwrap()
            .into_iter()
            .map(|r| r.location.path)
            .collect();
        assert_eq!(
            owners,
            vec![PathBuf::from("/ws/A.groovy"), PathBuf::from("/ws/B.groovy")]
        );
        assert!(index.lookup("app.Fo").unwrap().is_empty());

        index.remove_file(Path::new("/ws/A.groovy")).unwrap();
        assert_eq!(index.lookup("app.Foo").unwrap().len(), 1);
        assert!(index.lookup("app.FooBar").unwrap().is_empty());
        assert_eq!(index.search("app.Foo").unwrap().len(), 1);
        assert_eq!(index.type_kind("app.Foo"), Some(SymbolKind::Class));
    }

    #[test]
    fn test_search_prefix_stops_at_range_end() {
        let index = SymbolIndex::in_memory();
        let names = ["a.Z", "b.A", "b.B", "b.Ba", "bb.C", "c.A"];
        let records = names
            .iter()
            .map(|n| record(n, SymbolKind::Class, "/ws/All.groovy"))
            .collect();
        index.replace_file(Path::new("/ws/All.groovy"), 1, 1, records).unwrap();

        let found: Vec<String> = index
            .search("b.")
            .unwrap()
            .into_iter()
            .map(|r| r.qualified_name)
            .collect();
        assert_eq!(found, vec!["b.A", "b.B", "b.Ba"]);
        assert!(index.search("d").unwrap().is_empty());
        assert_eq!(index.search("").unwrap().len(), names.len());
    }

    #[test]
    fn test_remove_file_drops_every_record() {
        let index = SymbolIndex::in_memory();
        let path = Path::new("/ws/A.groovy");
        index.add_symbol(record("a.One", SymbolKind::Class, "/ws/A.groovy")).unwrap();
        index.add_symbol(record("a.One.run", SymbolKind::Method, "/ws/A.groovy")).unwrap();
        index.add_symbol(record("a.Two", SymbolKind::Class, "/ws/B.groovy")).unwrap();
        assert_eq!(index.file_symbols(path).unwrap().len(), 2);

        assert!(index.remove_file(path).unwrap());
        assert!(index.search("").unwrap().iter().all(|r| r.location.path != path));
        assert_eq!(index.symbol_count().unwrap(), 1);
        assert!(!index.remove_file(path).unwrap());
    }

    #[test]
    fn test_reopen_restores_segments() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("index");
        {
            let index = SymbolIndex::open(&store, Path::new("/ws"));
            assert!(index.open_report().persistent);
            index
                .replace_file(
                    Path::new("/ws/A.groovy"),
                    1,
                    7,
                    vec![record("a.Foo", SymbolKind::Class, "/ws/A.groovy")],
                )
                .unwrap();
            index.close().unwrap();
        }

        let index = SymbolIndex::open(&store, Path::new("/ws"));
        assert_eq!(index.open_report().files_loaded, 1);
        assert_eq!(index.search("a.").unwrap().len(), 1);
        assert_eq!(index.type_kind("a.Foo"), Some(SymbolKind::Class));
        assert_eq!(index.indexed_files().unwrap(), vec![PathBuf::from("/ws/A.groovy")]);
    }

    #[test]
    fn test_unusable_directory_falls_back_to_memory() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let index = SymbolIndex::open(&blocker.join("index"), Path::new("/ws"));
        assert!(!index.open_report().persistent);
        index.add_symbol(record("a.Foo", SymbolKind::Class, "/ws/A.groovy")).unwrap();
        assert_eq!(index.search("a").unwrap().len(), 1);
    }

    #[test]
    fn test_calls_after_close_fail() {
        let index = SymbolIndex::in_memory();
        index.close().unwrap();
        index.close().unwrap();
        assert!(matches!(index.search("x"), Err(GroovyscopeError::Closed)));
        assert!(matches!(
            index.add_symbol(record("a", SymbolKind::Class, "/a")),
            Err(GroovyscopeError::Closed)
        ));
        assert_eq!(index.type_kind("a"), None);
    }

    #[test]
    fn test_writer_waiting_on_key_lock_sees_close() {
        let index = Arc::new(SymbolIndex::in_memory());
        let path = PathBuf::from("/ws/A.groovy");
        let lock = index.lock_for(&path);
        let guard = lock.lock().unwrap();

        let writer = {
            let index = Arc::clone(&index);
            let path = path.clone();
            std::thread::spawn(move || {
                let records = vec![record("a.Foo", SymbolKind::Class, "/ws/A.groovy")];
                index.replace_file(&path, 1, 1, records)
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        let closer = {
            let index = Arc::clone(&index);
            std::thread::spawn(move || index.close())
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(guard);

        assert!(matches!(writer.join().unwrap(), Err(GroovyscopeError::Closed)));
        closer.join().unwrap().unwrap();
        assert!(index.files.is_empty());
        assert!(index.types.is_empty());
    }

    #[test]
    fn test_concurrent_writers_on_distinct_files() {
        let index = Arc::new(SymbolIndex::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    let path = PathBuf::from(format!("/ws/F{i}.groovy"));
                    for v in 1..=20u64 {
                        let records = vec![record(
                            &format!("p.F{i}"),
                            SymbolKind::Class,
                            path.to_str().unwrap(),
                        )];
                        index.replace_file(&path, v, v, records).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(index.symbol_count().unwrap(), 8);
        assert_eq!(index.file_version(Path::new("/ws/F3.groovy")), Some(20));
    }
}
