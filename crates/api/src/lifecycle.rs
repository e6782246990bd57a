use crate::ApiResult;
use crate::models::{Diagnostic, SymbolRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a single file update.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FileUpdate {
    pub path: PathBuf,
    /// Submission number stamped on the index write, increasing across the
    /// whole workspace.
    pub version: u64,
    pub symbols: Vec<SymbolRecord>,
    pub diagnostics: Vec<Diagnostic>,
    /// Files invalidated by this change, the changed file first.
    pub affected: Vec<PathBuf>,
    /// Dependents that were actually recompiled.
    pub recompiled: Vec<PathBuf>,
    /// True when a newer submission for the same path won.
    pub stale: bool,
    /// True when the file no longer exists and its records were dropped.
    pub removed: bool,
}

/// Entry points consumed by the editor-facing protocol layer.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Analyze in-memory text of an open document.
    async fn update_file_text(
        &self,
        path: PathBuf,
        text: String,
        version: u64,
    ) -> ApiResult<FileUpdate>;

    /// Re-read a file from disk, removing it from the index if it is gone.
    async fn update_file(&self, path: PathBuf) -> ApiResult<FileUpdate>;

    /// Forget editor state for a path; the on-disk content becomes authoritative again.
    async fn close_file(&self, path: PathBuf) -> ApiResult<FileUpdate>;

    async fn search_symbols(&self, query: String) -> ApiResult<Vec<SymbolRecord>>;
}
