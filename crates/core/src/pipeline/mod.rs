//! Phase-gated compilation of single source units.
//!
//! A unit is driven through [`Phase::ALL`] in order and stops at the target
//! phase or at the first phase that reports errors. Trees are cached by
//! source name and never mutated after publication: advancing a cached tree
//! clones it, runs the missing phases and swaps the result in.

mod cache;
mod phases;
pub mod tree;

pub use tree::{
    ClassStub, CompilationResult, CompiledTree, MemberDescriptor, Resolution, SyntheticMember,
    TypeBinding,
};

use crate::config::WorkspaceConfig;
use cache::TreeCache;
use groovyscope_api::{Diagnostic, Phase, Severity, SymbolKind};
use phases::{PhaseContext, run_phase};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

/// Answers whether a qualified type name exists outside the unit being compiled.
pub trait TypeLookup: Send + Sync {
    fn type_kind(&self, qualified_name: &str) -> Option<SymbolKind>;
}

pub struct CompilationPipeline {
    cache: TreeCache,
    max_file_size: u64,
    lookup: RwLock<Option<Arc<dyn TypeLookup>>>,
}

impl CompilationPipeline {
    pub fn new(cache_capacity: usize, cache_ttl: Duration, max_file_size: u64) -> Self {
        Self {
            cache: TreeCache::new(cache_capacity, cache_ttl),
            max_file_size,
            lookup: RwLock::new(None),
        }
    }

    pub fn from_config(config: &WorkspaceConfig) -> Self {
        Self::new(config.cache_capacity, config.cache_ttl(), config.max_file_size)
    }

    pub fn set_type_lookup(&self, lookup: Arc<dyn TypeLookup>) {
        *self.lookup.write().unwrap_or_else(PoisonError::into_inner) = Some(lookup);
    }

    fn type_lookup(&self) -> Option<Arc<dyn TypeLookup>> {
        self.lookup
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Compiles `source` up to `target`, answering from the cache when possible.
    ///
    /// Sources over the size limit yield an empty halted tree carrying the
    /// rejection diagnostic; it is not cached.
    pub fn compile_to_phase(&self, source: &str, source_name: &str, target: Phase) -> Arc<CompiledTree> {
        match self.compile(source, source_name, target) {
            Ok(tree) => tree,
            Err(diagnostic) => {
                let mut tree = CompiledTree::new(source_name, xxh3_64(source.as_bytes()), target);
                tree.halted = true;
                tree.diagnostics.push(diagnostic);
                Arc::new(tree)
            }
        }
    }

    pub fn compile_to_phase_with_result(
        &self,
        source: &str,
        source_name: &str,
        target: Phase,
    ) -> CompilationResult {
        match self.compile(source, source_name, target) {
            Ok(tree) => CompilationResult::from_tree(tree),
            Err(diagnostic) => CompilationResult::rejected(diagnostic),
        }
    }

    /// Recompiles `new_text` from scratch to the phase `existing` was built
    /// for. Nothing from `existing` is reused; the fresh tree replaces it in
    /// the cache.
    pub fn update_module(
        &self,
        existing: &CompiledTree,
        new_text: &str,
        source_name: &str,
    ) -> Arc<CompiledTree> {
        let target = existing.target.max(existing.phase);
        match self.check_size(new_text, source_name) {
            Ok(()) => {
                let tree = Arc::new(self.build(new_text, source_name, target));
                self.cache.insert(source_name, Arc::clone(&tree));
                tree
            }
            Err(diagnostic) => {
                self.cache.remove(source_name);
                let mut tree = CompiledTree::new(source_name, xxh3_64(new_text.as_bytes()), target);
                tree.halted = true;
                tree.diagnostics.push(diagnostic);
                Arc::new(tree)
            }
        }
    }

    pub fn cached(&self, source_name: &str) -> Option<Arc<CompiledTree>> {
        self.cache.get(source_name)
    }

    pub fn cached_trees(&self) -> Vec<Arc<CompiledTree>> {
        self.cache.values()
    }

    pub fn clear_cache(&self, source_name: &str) {
        self.cache.remove(source_name);
    }

    pub fn clear_all_caches(&self) {
        self.cache.clear();
    }

    fn check_size(&self, source: &str, source_name: &str) -> Result<(), Diagnostic> {
        if source.len() as u64 > self.max_file_size {
            return Err(Diagnostic::new(
                Severity::Syntax,
                format!(
                    "file is {} bytes, larger than the {} byte limit",
                    source.len(),
                    self.max_file_size
                ),
                1,
                1,
                source_name,
            ));
        }
        Ok(())
    }

    fn compile(
        &self,
        source: &str,
        source_name: &str,
        target: Phase,
    ) -> Result<Arc<CompiledTree>, Diagnostic> {
        if let Err(diagnostic) = self.check_size(source, source_name) {
            self.cache.remove(source_name);
            return Err(diagnostic);
        }

        let hash = xxh3_64(source.as_bytes());
        if let Some(cached) = self.cache.get(source_name).filter(|t| t.source_hash == hash) {
            if cached.satisfies(target) {
                return Ok(cached);
            }
            debug!(
                "Resuming {} from {} to {}",
                source_name,
                cached.phase.as_str(),
                target.as_str()
            );
            let mut tree = (*cached).clone();
            tree.target = target;
            self.advance(&mut tree, source, target);
            let tree = Arc::new(tree);
            self.cache.insert(source_name, Arc::clone(&tree));
            return Ok(tree);
        }

        let tree = Arc::new(self.build(source, source_name, target));
        self.cache.insert(source_name, Arc::clone(&tree));
        Ok(tree)
    }

    fn build(&self, source: &str, source_name: &str, target: Phase) -> CompiledTree {
        let mut tree = CompiledTree::new(source_name, xxh3_64(source.as_bytes()), target);
        let lookup = self.type_lookup();
        let ctx = PhaseContext {
            source,
            lookup: lookup.as_deref(),
        };
        run_phase(Phase::Initialization, &mut tree, &ctx);
        drive(&mut tree, &ctx, target);
        tree
    }

    fn advance(&self, tree: &mut CompiledTree, source: &str, target: Phase) {
        let lookup = self.type_lookup();
        let ctx = PhaseContext {
            source,
            lookup: lookup.as_deref(),
        };
        drive(tree, &ctx, target);
    }
}

fn drive(tree: &mut CompiledTree, ctx: &PhaseContext<'_>, target: Phase) {
    while !tree.halted && tree.phase < target {
        let Some(next) = tree.phase.next() else {
            break;
        };
        run_phase(next, tree, ctx);
    }
}
