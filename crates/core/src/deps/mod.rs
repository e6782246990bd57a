//! File-level dependency tracking.
//!
//! Every recorded file is a node; an edge `from -> to` means `from` refers to
//! something `to` declares and must be revisited when `to` changes. The graph
//! is published as an immutable snapshot and replaced wholesale by writers,
//! so queries never wait on an update in progress.

mod extract;

use crate::error::{GroovyscopeError, Result};
use crate::pipeline::CompiledTree;
use extract::{FileFacts, Target};
use groovyscope_api::{DependencyEdge, DependencyKind};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

#[derive(Clone, Default)]
struct TrackerState {
    graph: StableDiGraph<PathBuf, DependencyKind>,
    nodes: HashMap<PathBuf, NodeIndex>,
    facts: HashMap<PathBuf, FileFacts>,
    /// Qualified name -> files declaring it.
    declared: HashMap<String, BTreeSet<PathBuf>>,
    /// Package -> files in it.
    packages: HashMap<String, BTreeSet<PathBuf>>,
    /// Qualified name -> files referring to it.
    wanted: HashMap<String, BTreeSet<PathBuf>>,
    /// Package -> files star-importing it.
    wanted_packages: HashMap<String, BTreeSet<PathBuf>>,
}

impl TrackerState {
    fn node(&mut self, path: &Path) -> NodeIndex {
        if let Some(idx) = self.nodes.get(path) {
            return *idx;
        }
        let idx = self.graph.add_node(path.to_path_buf());
        self.nodes.insert(path.to_path_buf(), idx);
        idx
    }

    fn targets(&self, from: &Path, target: &Target) -> Vec<PathBuf> {
        let files = match target {
            Target::Type(candidates) => candidates
                .iter()
                .find_map(|name| self.declared.get(name).filter(|f| !f.is_empty())),
            Target::Package(package) => self.packages.get(package),
        };
        files
            .map(|f| f.iter().filter(|p| p.as_path() != from).cloned().collect())
            .unwrap_or_default()
    }

    fn edges_for(&self, from: &Path, facts: &FileFacts) -> BTreeSet<(PathBuf, DependencyKind)> {
        facts
            .references
            .iter()
            .flat_map(|r| self.targets(from, &r.target).into_iter().map(move |to| (to, r.kind)))
            .collect()
    }

    fn add_edge(&mut self, from: &Path, to: &Path, kind: DependencyKind) {
        let a = self.node(from);
        let b = self.node(to);
        let exists = self
            .graph
            .edges_connecting(a, b)
            .any(|e| *e.weight() == kind);
        if !exists {
            self.graph.add_edge(a, b, kind);
        }
    }

    fn forget(&mut self, path: &Path) -> Option<FileFacts> {
        let old = self.facts.remove(path)?;
        for name in &old.declares {
            if let Some(files) = self.declared.get_mut(name) {
                files.remove(path);
            }
        }
        if let Some(files) = self.packages.get_mut(&old.package) {
            files.remove(path);
        }
        for reference in &old.references {
            match &reference.target {
                Target::Type(names) => {
                    for name in names {
                        if let Some(files) = self.wanted.get_mut(name) {
                            files.remove(path);
                        }
                    }
                }
                Target::Package(package) => {
                    if let Some(files) = self.wanted_packages.get_mut(package) {
                        files.remove(path);
                    }
                }
            }
        }
        Some(old)
    }

    fn record(&mut self, path: &Path, facts: FileFacts) {
        let previous = self.forget(path);
        let idx = self.node(path);

        let outgoing: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.id())
            .collect();
        for edge in outgoing {
            self.graph.remove_edge(edge);
        }

        for name in &facts.declares {
            self.declared
                .entry(name.clone())
                .or_default()
                .insert(path.to_path_buf());
        }
        let joined_package = previous.as_ref().is_none_or(|p| p.package != facts.package);
        self.packages
            .entry(facts.package.clone())
            .or_default()
            .insert(path.to_path_buf());
        for reference in &facts.references {
            match &reference.target {
                Target::Type(names) => {
                    for name in names {
                        self.wanted
                            .entry(name.clone())
                            .or_default()
                            .insert(path.to_path_buf());
                    }
                }
                Target::Package(package) => {
                    self.wanted_packages
                        .entry(package.clone())
                        .or_default()
                        .insert(path.to_path_buf());
                }
            }
        }

        for (to, kind) in self.edges_for(path, &facts) {
            self.add_edge(path, &to, kind);
        }

        // Files already referring to a name this file now declares depend on it.
        let old_names: HashSet<&String> = previous
            .as_ref()
            .map(|p| p.declares.iter().collect())
            .unwrap_or_default();
        let mut referrers: BTreeSet<PathBuf> = facts
            .declares
            .iter()
            .filter(|name| !old_names.contains(name))
            .filter_map(|name| self.wanted.get(name))
            .flatten()
            .cloned()
            .collect();
        if joined_package {
            if let Some(files) = self.wanted_packages.get(&facts.package) {
                referrers.extend(files.iter().cloned());
            }
        }
        referrers.remove(path);

        for referrer in referrers {
            let Some(their_facts) = self.facts.get(&referrer) else {
                continue;
            };
            let new_edges: Vec<_> = their_facts
                .references
                .iter()
                .filter(|r| self.targets(&referrer, &r.target).iter().any(|t| t == path))
                .map(|r| r.kind)
                .collect();
            for kind in new_edges {
                self.add_edge(&referrer, path, kind);
            }
        }

        self.facts.insert(path.to_path_buf(), facts);
    }

    fn remove(&mut self, path: &Path) -> bool {
        let known = self.forget(path).is_some();
        match self.nodes.remove(path) {
            Some(idx) => {
                self.graph.remove_node(idx);
                true
            }
            None => known,
        }
    }

    /// Breadth-first over incoming edges, `path` first.
    fn affected(&self, path: &Path) -> Vec<PathBuf> {
        let mut out = vec![path.to_path_buf()];
        let Some(start) = self.nodes.get(path) else {
            return out;
        };
        let mut seen = HashSet::from([*start]);
        let mut queue = VecDeque::from([*start]);
        while let Some(idx) = queue.pop_front() {
            // Deterministic order among siblings.
            let mut dependents: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .filter(|n| seen.insert(*n))
                .collect();
            dependents.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
            for n in dependents {
                out.push(self.graph[n].clone());
                queue.push_back(n);
            }
        }
        out
    }

    fn edges_from(&self, path: &Path) -> Vec<DependencyEdge> {
        let Some(idx) = self.nodes.get(path) else {
            return Vec::new();
        };
        let mut edges: Vec<DependencyEdge> = self
            .graph
            .edges_directed(*idx, Direction::Outgoing)
            .map(|e| DependencyEdge {
                from: path.to_path_buf(),
                to: self.graph[e.target()].clone(),
                kind: *e.weight(),
            })
            .collect();
        edges.sort_by(|a, b| (&a.to, a.kind).cmp(&(&b.to, b.kind)));
        edges
    }
}

pub struct DependencyTracker {
    current: Arc<RwLock<Arc<TrackerState>>>,
    writer: Mutex<()>,
}

impl Default for DependencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(TrackerState::default()))),
            writer: Mutex::new(()),
        }
    }

    fn snapshot(&self) -> Arc<TrackerState> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update<R>(&self, f: impl FnOnce(&mut TrackerState) -> R) -> R {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = (*self.snapshot()).clone();
        let out = f(&mut state);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
        out
    }

    /// Edges out of `tree`'s file against the files recorded so far.
    ///
    /// Fails unless the tree reached import resolution.
    pub fn get_dependencies(&self, tree: &CompiledTree) -> Result<Vec<DependencyEdge>> {
        if !extract::has_bindings(tree) {
            return Err(GroovyscopeError::InvalidState(format!(
                "{} is at phase {}, dependencies need {}",
                tree.source_name,
                tree.phase,
                groovyscope_api::Phase::ImportResolution
            )));
        }
        let path = tree.path();
        let state = self.snapshot();
        let facts = extract::facts(tree);
        let mut edges: Vec<DependencyEdge> = state
            .edges_for(&path, &facts)
            .into_iter()
            .map(|(to, kind)| DependencyEdge {
                from: path.clone(),
                to,
                kind,
            })
            .collect();
        edges.sort_by(|a, b| (&a.to, a.kind).cmp(&(&b.to, b.kind)));
        Ok(edges)
    }

    /// Replaces the recorded facts and outgoing edges of `tree`'s file.
    ///
    /// A tree that stopped before import resolution only updates what the
    /// file declares; its previous references are kept until it binds again.
    pub fn record(&self, tree: &CompiledTree) {
        let path = tree.path();
        let mut facts = extract::facts(tree);
        self.update(|state| {
            if !extract::has_bindings(tree) {
                if let Some(previous) = state.facts.get(&path) {
                    facts.references = previous.references.clone();
                }
            }
            state.record(&path, facts);
        });
        debug!("Recorded dependencies of {}", path.display());
    }

    pub fn remove_file(&self, path: &Path) -> bool {
        self.update(|state| state.remove(path))
    }

    pub fn clear(&self) {
        self.update(|state| *state = TrackerState::default());
    }

    /// Files to revisit after `changed` changed, `changed` first, then its
    /// direct dependents, then theirs.
    pub fn affected_files(&self, changed: &Path) -> Vec<PathBuf> {
        self.snapshot().affected(changed)
    }

    /// Like [`affected_files`](Self::affected_files), also taking into
    /// account trees whose files were never recorded.
    pub fn get_affected_files(&self, changed: &Path, trees: &[Arc<CompiledTree>]) -> Vec<PathBuf> {
        let snapshot = self.snapshot();
        let unknown: Vec<_> = trees
            .iter()
            .filter(|t| !snapshot.facts.contains_key(&t.path()))
            .collect();
        if unknown.is_empty() {
            return snapshot.affected(changed);
        }
        let mut state = (*snapshot).clone();
        for tree in unknown {
            state.record(&tree.path(), extract::facts(tree));
        }
        state.affected(changed)
    }

    pub fn edges_from(&self, path: &Path) -> Vec<DependencyEdge> {
        self.snapshot().edges_from(path)
    }

    pub fn file_count(&self) -> usize {
        self.snapshot().facts.len()
    }
}
