//! Workspace coordination.
//!
//! The coordinator owns the symbol index handle and the worker pool, drives
//! the initial scan and per-file updates through the pipeline, the tracker
//! and the index, and publishes the results on the event bus.
//!
//! Every write for a path carries a submission number taken from one
//! workspace-wide counter. A write only commits while its number is still
//! the latest submitted for that path, so the index always ends up with the
//! most recently submitted text.

mod documents;
mod events;
mod pool;
mod scan;
mod services;

pub use documents::{Documents, uri_to_path};
pub use events::{DEFAULT_CAPACITY, EventBus};
pub use pool::WorkerPool;
pub use services::{WorkspaceBuilder, WorkspaceServices};

use crate::config::WorkspaceConfig;
use crate::deps::DependencyTracker;
use crate::error::{GroovyscopeError, Result};
use crate::index::{Replaced, SymbolIndex};
use crate::pipeline::{CompilationPipeline, CompilationResult, CompiledTree, TypeLookup};
use crate::resolver::{DependencyResolver, is_build_descriptor};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::stream::{self, StreamExt};
use groovyscope_api::{
    AnalysisService, ApiError, ApiResult, FileIndexedEvent, FileUpdate, Phase, SymbolRecord,
    WorkspaceIndexedEvent,
};
use groovyscope_groovy::{extract_symbols, symbols};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::{Mutex, watch};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceState {
    Uninitialized,
    Initializing,
    Ready,
    /// At least one file is being (re)indexed. Queries are still answered.
    Indexing,
    Closed,
}

impl fmt::Display for WorkspaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkspaceState::Uninitialized => "uninitialized",
            WorkspaceState::Initializing => "initializing",
            WorkspaceState::Ready => "ready",
            WorkspaceState::Indexing => "indexing",
            WorkspaceState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct OpenDocument {
    text: Arc<str>,
    version: u64,
}

/// How a single file goes through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Parse only and publish declarations; the tracker is left alone.
    Declare,
    /// Compile to the index phase, resuming from a cached tree.
    Index,
    /// Rebuild from scratch so type references bind again.
    Rebind,
}

struct Analysis {
    tree: Arc<CompiledTree>,
    symbols: Vec<SymbolRecord>,
    stale: bool,
}

/// Flips `Ready` to `Indexing` while any file is being processed.
struct IndexingGuard<'a> {
    owner: &'a WorkspaceCoordinator,
}

impl Drop for IndexingGuard<'_> {
    fn drop(&mut self) {
        if self.owner.indexing.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.owner.state.send_if_modified(|state| {
                if *state == WorkspaceState::Indexing {
                    *state = WorkspaceState::Ready;
                    return true;
                }
                false
            });
        }
    }
}

pub struct WorkspaceCoordinator {
    root: PathBuf,
    config: WorkspaceConfig,
    pipeline: Arc<CompilationPipeline>,
    tracker: Arc<DependencyTracker>,
    index: RwLock<Arc<SymbolIndex>>,
    reopen_index: bool,
    resolver: Arc<DependencyResolver>,
    events: EventBus,
    pool: Arc<WorkerPool>,
    state: watch::Sender<WorkspaceState>,
    sequence: AtomicU64,
    submissions: DashMap<PathBuf, u64>,
    open_documents: DashMap<PathBuf, OpenDocument>,
    outlines: DashMap<PathBuf, u64>,
    path_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    indexing: AtomicUsize,
    init_lock: Mutex<()>,
    tasks: TaskTracker,
    closed: AtomicBool,
}

impl WorkspaceCoordinator {
    pub fn builder(root: impl Into<PathBuf>) -> WorkspaceBuilder {
        WorkspaceBuilder::new(root)
    }

    pub fn new(root: PathBuf, services: WorkspaceServices) -> Self {
        let reopen_index = services.index.is_none();
        let index = services
            .index
            .unwrap_or_else(|| Arc::new(SymbolIndex::in_memory()));
        let (state, _) = watch::channel(WorkspaceState::Uninitialized);
        Self {
            root,
            config: services.config,
            pipeline: services.pipeline,
            tracker: services.tracker,
            index: RwLock::new(index),
            reopen_index,
            resolver: services.resolver,
            events: services.events.scoped(),
            pool: services.pool,
            state,
            sequence: AtomicU64::new(0),
            submissions: DashMap::new(),
            open_documents: DashMap::new(),
            outlines: DashMap::new(),
            path_locks: DashMap::new(),
            indexing: AtomicUsize::new(0),
            init_lock: Mutex::new(()),
            tasks: TaskTracker::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn pipeline(&self) -> &Arc<CompilationPipeline> {
        &self.pipeline
    }

    pub fn tracker(&self) -> &Arc<DependencyTracker> {
        &self.tracker
    }

    pub fn resolver(&self) -> &Arc<DependencyResolver> {
        &self.resolver
    }

    /// The index currently in use. A later `initialize()` may replace it.
    pub fn index(&self) -> Arc<SymbolIndex> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn state(&self) -> WorkspaceState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WorkspaceState> {
        self.state.subscribe()
    }

    /// Files currently going through the pipeline.
    pub fn indexing_count(&self) -> usize {
        self.indexing.load(Ordering::Acquire)
    }

    /// Opens the index, indexes the resolved dependency archives, then
    /// scans every source file under the root.
    ///
    /// May be called again once `Ready` to rescan from scratch.
    pub async fn initialize(&self) -> Result<WorkspaceIndexedEvent> {
        let _init = self.init_lock.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(GroovyscopeError::Closed);
        }
        let previous = self.state();
        match previous {
            WorkspaceState::Uninitialized | WorkspaceState::Ready => {}
            WorkspaceState::Closed => return Err(GroovyscopeError::Closed),
            other => {
                return Err(GroovyscopeError::InvalidState(format!(
                    "cannot initialize while {other}"
                )));
            }
        }

        self.state.send_replace(WorkspaceState::Initializing);
        info!("Initializing workspace {}", self.root.display());

        match self.tasks.track_future(self.scan_workspace()).await {
            Ok(event) => {
                let next = if self.indexing_count() > 0 {
                    WorkspaceState::Indexing
                } else {
                    WorkspaceState::Ready
                };
                self.set_state_unless_closed(next);
                info!(
                    files = event.file_count,
                    symbols = event.symbol_count,
                    duration_ms = event.duration_ms,
                    "Workspace indexed"
                );
                self.events.publish_workspace_indexed(event.clone());
                Ok(event)
            }
            Err(e) => {
                warn!("Workspace initialization failed: {}", e);
                self.set_state_unless_closed(previous);
                Err(e)
            }
        }
    }

    /// Analyzes the in-memory text of an open document.
    pub async fn update_file_text(
        &self,
        path: &Path,
        text: String,
        version: u64,
    ) -> Result<FileUpdate> {
        self.tasks
            .track_future(async {
                self.ensure_accepting()?;
                let path = self.normalize(path);
                if !self.config.is_source_file(&path) {
                    debug!("Skipping unrecognized file {}", path.display());
                    return Ok(FileUpdate {
                        path,
                        ..Default::default()
                    });
                }

                let text: Arc<str> = Arc::from(text);
                // The version check, the buffer swap and the submission
                // number happen under one entry guard.
                let seq = match self.open_documents.entry(path.clone()) {
                    Entry::Occupied(doc) if doc.get().version > version => {
                        let current = doc.get().version;
                        drop(doc);
                        warn!(
                            path = %path.display(),
                            "Ignoring document version {} older than {}",
                            version,
                            current
                        );
                        return Ok(self.stale_update(path));
                    }
                    entry => {
                        let _doc = entry.insert(OpenDocument {
                            text: Arc::clone(&text),
                            version,
                        });
                        self.next_submission(&path)
                    }
                };
                self.process(path, text, seq, true).await
            })
            .await
    }

    /// Re-reads `path` from disk. A file that no longer exists is removed
    /// from the index, and a changed build descriptor re-resolves the
    /// dependency archives.
    pub async fn update_file(&self, path: &Path) -> Result<FileUpdate> {
        self.tasks
            .track_future(async {
                self.ensure_accepting()?;
                let path = self.normalize(path);
                self.reload(path).await
            })
            .await
    }

    /// Forgets the editor buffer of `path` and re-reads it from disk.
    pub async fn close_file(&self, path: &Path) -> Result<FileUpdate> {
        self.tasks
            .track_future(async {
                self.ensure_accepting()?;
                let path = self.normalize(path);
                self.open_documents.remove(&path);
                self.reload(path).await
            })
            .await
    }

    /// Compiles `text` to `phase` without touching the index.
    pub async fn compile(&self, path: &Path, text: String, phase: Phase) -> Result<CompilationResult> {
        self.tasks
            .track_future(async {
                self.ensure_accepting()?;
                let name = self.normalize(path).to_string_lossy().into_owned();
                let pipeline = Arc::clone(&self.pipeline);
                self.pool
                    .run(move || pipeline.compile_to_phase_with_result(&text, &name, phase))
                    .await
            })
            .await
    }

    pub async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolRecord>> {
        self.tasks
            .track_future(async {
                self.ensure_accepting()?;
                let index = self.index();
                let query = query.to_string();
                self.pool.run(move || index.search(&query)).await?
            })
            .await
    }

    /// Files invalidated by a change of `path`, `path` first.
    pub fn affected_files(&self, path: &Path) -> Vec<PathBuf> {
        let path = self.normalize(path);
        self.tracker
            .get_affected_files(&path, &self.pipeline.cached_trees())
    }

    /// Stops accepting work, waits for in-flight tasks, stops event
    /// handlers and releases the index. Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Closing workspace {}", self.root.display());
        self.tasks.close();
        self.tasks.wait().await;
        self.path_locks.clear();
        self.events.close();
        let result = self.index().close();
        self.state.send_replace(WorkspaceState::Closed);
        result
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(GroovyscopeError::Closed);
        }
        match self.state() {
            WorkspaceState::Closed => Err(GroovyscopeError::Closed),
            WorkspaceState::Uninitialized => Err(GroovyscopeError::InvalidState(
                "workspace is not initialized".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn set_state_unless_closed(&self, next: WorkspaceState) {
        self.state.send_if_modified(|state| {
            if *state == WorkspaceState::Closed || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    fn begin_indexing(&self) -> IndexingGuard<'_> {
        if self.indexing.fetch_add(1, Ordering::AcqRel) == 0 {
            self.state.send_if_modified(|state| {
                if *state == WorkspaceState::Ready {
                    *state = WorkspaceState::Indexing;
                    return true;
                }
                false
            });
        }
        IndexingGuard { owner: self }
    }

    /// Absolute path with a canonical parent, so editor and walker paths
    /// name the same key. The file itself may no longer exist.
    fn normalize(&self, path: &Path) -> PathBuf {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => parent
                .canonicalize()
                .map(|parent| parent.join(name))
                .unwrap_or(path),
            _ => path,
        }
    }

    fn next_submission(&self, path: &Path) -> u64 {
        let seq = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.submissions
            .entry(path.to_path_buf())
            .and_modify(|latest| *latest = (*latest).max(seq))
            .or_insert(seq);
        seq
    }

    fn is_latest(&self, path: &Path, seq: u64) -> bool {
        self.submissions.get(path).is_none_or(|latest| *latest == seq)
    }

    fn stale_update(&self, path: PathBuf) -> FileUpdate {
        let version = self.submissions.get(&path).map(|s| *s).unwrap_or(0);
        FileUpdate {
            path,
            version,
            stale: true,
            ..Default::default()
        }
    }

    fn path_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        self.path_locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn reload(&self, path: PathBuf) -> Result<FileUpdate> {
        if is_build_descriptor(&path) {
            self.resolver.invalidate();
            if let Err(e) = self.refresh_dependencies().await {
                warn!("Failed to refresh dependencies: {}", e);
            }
        }
        if !self.config.is_source_file(&path) {
            debug!("Skipping unrecognized file {}", path.display());
            return Ok(FileUpdate {
                path,
                ..Default::default()
            });
        }

        let open = self.open_documents.get(&path).map(|doc| Arc::clone(&doc.text));
        let text = match open {
            Some(text) => text,
            None => match tokio::fs::read_to_string(&path).await {
                Ok(text) => Arc::from(text),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return self.remove(path).await;
                }
                Err(e) => {
                    let seq = self.next_submission(&path);
                    warn!(path = %path.display(), "Cannot read file: {}", e);
                    self.events
                        .publish_file_indexed(FileIndexedEvent::failed(path, seq, e.to_string()));
                    return Err(e.into());
                }
            },
        };
        let seq = self.next_submission(&path);
        self.process(path, text, seq, true).await
    }

    /// Analyzes one file, commits it and, when its outline changed,
    /// recompiles everything that depends on it.
    async fn process(
        &self,
        path: PathBuf,
        text: Arc<str>,
        seq: u64,
        cascade: bool,
    ) -> Result<FileUpdate> {
        let _indexing = self.begin_indexing();
        let analysis = match self.analyze(&path, text, seq, Pass::Index).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(path = %path.display(), "Indexing failed: {}", e);
                self.events
                    .publish_file_indexed(FileIndexedEvent::failed(path, seq, e.to_string()));
                return Err(e);
            }
        };
        if analysis.stale {
            return Ok(self.stale_update(path));
        }

        let tree = analysis.tree;
        let outline_changed =
            self.outlines.insert(path.clone(), tree.outline_hash) != Some(tree.outline_hash);
        let affected = self.tracker.affected_files(&path);
        self.events.publish_file_indexed(FileIndexedEvent::succeeded(
            path.clone(),
            seq,
            analysis.symbols.clone(),
        ));

        let recompiled = if cascade && outline_changed && affected.len() > 1 {
            self.recompile_dependents(&affected[1..]).await
        } else {
            Vec::new()
        };

        Ok(FileUpdate {
            path,
            version: seq,
            symbols: analysis.symbols,
            diagnostics: tree.diagnostics.clone(),
            affected,
            recompiled,
            stale: false,
            removed: false,
        })
    }

    async fn remove(&self, path: PathBuf) -> Result<FileUpdate> {
        let _indexing = self.begin_indexing();
        let seq = self.next_submission(&path);
        let affected = self.tracker.affected_files(&path);
        {
            let lock = self.path_lock(&path);
            let _guard = lock.lock().await;
            if !self.is_latest(&path, seq) {
                return Ok(self.stale_update(path));
            }
            let index = self.index();
            let tracker = Arc::clone(&self.tracker);
            let target = path.clone();
            let removed = self
                .pool
                .run(move || {
                    tracker.remove_file(&target);
                    index.remove_file(&target)
                })
                .await??;
            self.pipeline.clear_cache(&path.to_string_lossy());
            self.outlines.remove(&path);
            info!(path = %path.display(), removed, "File removed");
        }
        // Only when no other task holds or waits on the lock.
        self.path_locks
            .remove_if(&path, |_, lock| Arc::strong_count(lock) == 1);

        self.events
            .publish_file_indexed(FileIndexedEvent::succeeded(path.clone(), seq, Vec::new()));
        let recompiled = match affected.get(1..) {
            Some(dependents) if !dependents.is_empty() => self.recompile_dependents(dependents).await,
            _ => Vec::new(),
        };
        Ok(FileUpdate {
            path,
            version: seq,
            affected,
            recompiled,
            removed: true,
            ..Default::default()
        })
    }

    /// Rebinds each dependent against the current index, in the order given.
    async fn recompile_dependents(&self, dependents: &[PathBuf]) -> Vec<PathBuf> {
        let mut recompiled = Vec::new();
        for path in dependents {
            let open = self.open_documents.get(path).map(|doc| Arc::clone(&doc.text));
            let text = match open {
                Some(text) => text,
                None => match tokio::fs::read_to_string(path).await {
                    Ok(text) => Arc::from(text),
                    Err(e) => {
                        debug!("Not recompiling {}: {}", path.display(), e);
                        continue;
                    }
                },
            };
            let seq = self.next_submission(path);
            match self.analyze(path, text, seq, Pass::Rebind).await {
                Ok(analysis) if analysis.stale => {}
                Ok(analysis) => {
                    self.outlines.insert(path.clone(), analysis.tree.outline_hash);
                    self.events.publish_file_indexed(FileIndexedEvent::succeeded(
                        path.clone(),
                        seq,
                        analysis.symbols,
                    ));
                    recompiled.push(path.clone());
                }
                Err(e) => {
                    warn!(path = %path.display(), "Recompiling dependent failed: {}", e);
                    self.events.publish_file_indexed(FileIndexedEvent::failed(
                        path.clone(),
                        seq,
                        e.to_string(),
                    ));
                }
            }
        }
        if !recompiled.is_empty() {
            debug!("Recompiled {} dependents", recompiled.len());
        }
        recompiled
    }

    /// Compiles on the worker pool, then commits symbols and dependency
    /// facts under the path's lock if `seq` is still the latest submission.
    async fn analyze(&self, path: &Path, text: Arc<str>, seq: u64, pass: Pass) -> Result<Analysis> {
        let pipeline = Arc::clone(&self.pipeline);
        let name = path.to_string_lossy().into_owned();
        let file = path.to_path_buf();
        let target = match pass {
            _ if symbols::is_kotlin_script(path) => Phase::Initialization,
            Pass::Declare => Phase::Parse,
            Pass::Index | Pass::Rebind => self.config.index_phase,
        };

        let (tree, symbols) = self
            .pool
            .run(move || {
                let tree = match pipeline.cached(&name) {
                    Some(existing) if pass == Pass::Rebind && existing.target >= target => {
                        pipeline.update_module(&existing, &text, &name)
                    }
                    Some(_) if pass == Pass::Rebind => {
                        pipeline.clear_cache(&name);
                        pipeline.compile_to_phase(&text, &name, target)
                    }
                    _ => pipeline.compile_to_phase(&text, &name, target),
                };
                let symbols = extract_symbols(&tree.module, &file);
                (tree, symbols)
            })
            .await?;

        let lock = self.path_lock(path);
        let _guard = lock.lock().await;
        if !self.is_latest(path, seq) {
            warn!(path = %path.display(), seq, "Discarding superseded analysis");
            return Ok(Analysis {
                tree,
                symbols,
                stale: true,
            });
        }

        let index = self.index();
        let tracker = Arc::clone(&self.tracker);
        let commit_tree = Arc::clone(&tree);
        let records = symbols.clone();
        let file = path.to_path_buf();
        let replaced = self
            .pool
            .run(move || -> Result<Replaced> {
                let replaced = index.replace_file(&file, seq, commit_tree.source_hash, records)?;
                if pass != Pass::Declare && !matches!(replaced, Replaced::Stale { .. }) {
                    tracker.record(&commit_tree);
                }
                Ok(replaced)
            })
            .await??;

        let stale = match replaced {
            Replaced::Stale { current } => {
                warn!(
                    path = %path.display(),
                    seq,
                    current,
                    "Index already holds a newer version"
                );
                true
            }
            Replaced::Replaced | Replaced::Unchanged => false,
        };
        Ok(Analysis {
            tree,
            symbols,
            stale,
        })
    }

    async fn scan_workspace(&self) -> Result<WorkspaceIndexedEvent> {
        let started = Instant::now();
        self.reopen_index().await?;
        let index = self.index();
        self.pipeline
            .set_type_lookup(Arc::clone(&index) as Arc<dyn TypeLookup>);
        self.pipeline.clear_all_caches();
        self.tracker.clear();
        self.outlines.clear();
        self.sequence
            .fetch_max(index.max_file_version(), Ordering::AcqRel);

        if let Err(e) = self.refresh_dependencies().await {
            warn!("Dependency indexing failed, continuing without archives: {}", e);
        }

        let root = self.root.clone();
        let config = self.config.clone();
        let resolver = Arc::clone(&self.resolver);
        let (files, source_roots) = tokio::task::spawn_blocking(move || {
            (scan::collect_sources(&root, &config), resolver.source_directories())
        })
        .await
        .map_err(|e| GroovyscopeError::Internal(e.to_string()))?;
        let outside = files
            .iter()
            .filter(|f| !source_roots.iter().any(|dir| f.starts_with(dir)))
            .filter(|f| !is_build_descriptor(f))
            .count();
        debug!(
            files = files.len(),
            source_roots = source_roots.len(),
            outside_source_roots = outside,
            "Collected workspace sources"
        );

        let present: HashSet<&PathBuf> = files.iter().collect();
        let gone: Vec<PathBuf> = index
            .indexed_files()?
            .into_iter()
            .filter(|f| !present.contains(f))
            .collect();
        if !gone.is_empty() {
            info!("Dropping {} files no longer in the workspace", gone.len());
            let stale_index = Arc::clone(&index);
            self.pool
                .run(move || -> Result<()> {
                    for file in &gone {
                        stale_index.remove_file(file)?;
                    }
                    Ok(())
                })
                .await??;
        }

        let concurrency = (self.pool.threads() * 2).max(1);

        // Declarations first, so references bind regardless of file order.
        let sources: Vec<(PathBuf, Arc<str>)> = stream::iter(files.iter().cloned())
            .map(|path| async move {
                let text = self.source_text(&path).await?;
                let seq = self.next_submission(&path);
                if let Err(e) = self.analyze(&path, Arc::clone(&text), seq, Pass::Declare).await {
                    debug!("Declaring {} failed: {}", path.display(), e);
                }
                Some((path, text))
            })
            .buffer_unordered(concurrency)
            .filter_map(|source| async move { source })
            .collect()
            .await;

        let symbol_count: usize = stream::iter(sources)
            .map(|(path, text)| async move {
                let seq = self.next_submission(&path);
                match self.process(path, text, seq, false).await {
                    Ok(update) => update.symbols.len(),
                    Err(_) => 0,
                }
            })
            .buffer_unordered(concurrency)
            .fold(0, |total, count| async move { total + count })
            .await;

        Ok(WorkspaceIndexedEvent::new(
            self.root.clone(),
            files.len(),
            symbol_count,
            started.elapsed().as_millis() as u64,
        ))
    }

    /// Open buffer text, else the file on disk. Unreadable files are
    /// reported as failed and skipped.
    async fn source_text(&self, path: &Path) -> Option<Arc<str>> {
        if let Some(doc) = self.open_documents.get(path) {
            return Some(Arc::clone(&doc.text));
        }
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Some(Arc::from(text)),
            Err(e) => {
                warn!(path = %path.display(), "Cannot read file: {}", e);
                let seq = self.next_submission(path);
                self.events.publish_file_indexed(FileIndexedEvent::failed(
                    path.to_path_buf(),
                    seq,
                    e.to_string(),
                ));
                None
            }
        }
    }

    async fn reopen_index(&self) -> Result<()> {
        if !self.reopen_index {
            return Ok(());
        }
        let dir = self.config.index_path(&self.root);
        let root = self.root.clone();
        let index = tokio::task::spawn_blocking(move || SymbolIndex::open(&dir, &root))
            .await
            .map_err(|e| GroovyscopeError::Internal(e.to_string()))?;

        let report = index.open_report();
        match &report.cold_start {
            Some(reason) => warn!("Rebuilding symbol index from scratch: {}", reason),
            None => info!(
                files = report.files_loaded,
                archives = report.archives_loaded,
                persistent = report.persistent,
                "Symbol index opened"
            ),
        }

        let old = std::mem::replace(
            &mut *self.index.write().unwrap_or_else(PoisonError::into_inner),
            Arc::new(index),
        );
        old.close()
    }

    /// Resolves the classpath and brings the index's archive and class
    /// directory set in line with it. Returns the number of records indexed.
    async fn refresh_dependencies(&self) -> Result<usize> {
        let resolver = Arc::clone(&self.resolver);
        let classpath = self.pool.run(move || resolver.resolve()).await?;
        let index = self.index();

        let wanted: HashSet<PathBuf> = classpath.entries.iter().cloned().collect();
        let unused: Vec<PathBuf> = index
            .dependencies()?
            .into_iter()
            .filter(|a| !wanted.contains(a))
            .collect();
        if !unused.is_empty() {
            let unused_index = Arc::clone(&index);
            self.pool
                .run(move || -> Result<()> {
                    for archive in &unused {
                        unused_index.remove_dependency(archive)?;
                    }
                    Ok(())
                })
                .await??;
        }

        let limits = self.config.archive_limits;
        let concurrency = self.pool.threads().max(1);
        let records: usize = stream::iter(wanted)
            .map(|archive| {
                let index = Arc::clone(&index);
                async move {
                    let target = archive.clone();
                    match self
                        .pool
                        .run(move || index.add_dependency(&target, &limits))
                        .await
                        .and_then(|r| r)
                    {
                        Ok(count) => count,
                        Err(e) => {
                            warn!(entry = %archive.display(), "Skipping classpath entry: {}", e);
                            0
                        }
                    }
                }
            })
            .buffer_unordered(concurrency)
            .fold(0, |total, count| async move { total + count })
            .await;

        info!(
            build_system = %classpath.build_system,
            archives = classpath.archives().count(),
            class_dirs = classpath.class_directories().count(),
            records,
            warnings = classpath.warnings.len(),
            "Dependencies indexed"
        );
        Ok(records)
    }
}

impl Drop for WorkspaceCoordinator {
    fn drop(&mut self) {
        self.events.close();
    }
}

#[async_trait]
impl AnalysisService for WorkspaceCoordinator {
    async fn update_file_text(
        &self,
        path: PathBuf,
        text: String,
        version: u64,
    ) -> ApiResult<FileUpdate> {
        WorkspaceCoordinator::update_file_text(self, &path, text, version)
            .await
            .map_err(ApiError::from)
    }

    async fn update_file(&self, path: PathBuf) -> ApiResult<FileUpdate> {
        WorkspaceCoordinator::update_file(self, &path)
            .await
            .map_err(ApiError::from)
    }

    async fn close_file(&self, path: PathBuf) -> ApiResult<FileUpdate> {
        WorkspaceCoordinator::close_file(self, &path)
            .await
            .map_err(ApiError::from)
    }

    async fn search_symbols(&self, query: String) -> ApiResult<Vec<SymbolRecord>> {
        WorkspaceCoordinator::search_symbols(self, &query)
            .await
            .map_err(ApiError::from)
    }
}
