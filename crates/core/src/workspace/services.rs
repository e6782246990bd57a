//! Explicit wiring of the services a workspace runs on.

use super::events::EventBus;
use super::pool::WorkerPool;
use super::WorkspaceCoordinator;
use crate::config::WorkspaceConfig;
use crate::deps::DependencyTracker;
use crate::error::Result;
use crate::index::SymbolIndex;
use crate::pipeline::CompilationPipeline;
use crate::resolver::DependencyResolver;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything the coordinator needs, constructed up front.
pub struct WorkspaceServices {
    pub config: WorkspaceConfig,
    pub pipeline: Arc<CompilationPipeline>,
    pub tracker: Arc<DependencyTracker>,
    /// `None` opens the persisted index under `config.index_dir` on every
    /// `initialize()`. A supplied index is used as is for the coordinator's
    /// whole life.
    pub index: Option<Arc<SymbolIndex>>,
    pub resolver: Arc<DependencyResolver>,
    pub events: EventBus,
    pub pool: Arc<WorkerPool>,
}

pub struct WorkspaceBuilder {
    root: PathBuf,
    config: Option<WorkspaceConfig>,
    pipeline: Option<Arc<CompilationPipeline>>,
    tracker: Option<Arc<DependencyTracker>>,
    index: Option<Arc<SymbolIndex>>,
    resolver: Option<Arc<DependencyResolver>>,
    events: Option<EventBus>,
    pool: Option<Arc<WorkerPool>>,
}

impl WorkspaceBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: None,
            pipeline: None,
            tracker: None,
            index: None,
            resolver: None,
            events: None,
            pool: None,
        }
    }

    pub fn with_config(mut self, config: WorkspaceConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Arc<CompilationPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<DependencyTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_index(mut self, index: Arc<SymbolIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<DependencyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_worker_pool(mut self, pool: Arc<WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Fills every service not supplied from the config, which itself
    /// defaults to [`WorkspaceConfig::load`].
    pub fn services(self) -> Result<(PathBuf, WorkspaceServices)> {
        let root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let config = self.config.unwrap_or_else(|| WorkspaceConfig::load(&root));

        let pool = match self.pool {
            Some(pool) => pool,
            None => Arc::new(WorkerPool::new(config.worker_threads)?),
        };
        let services = WorkspaceServices {
            pipeline: self
                .pipeline
                .unwrap_or_else(|| Arc::new(CompilationPipeline::from_config(&config))),
            tracker: self.tracker.unwrap_or_default(),
            index: self.index,
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(DependencyResolver::new(&root, &config))),
            events: self
                .events
                .unwrap_or_else(|| EventBus::new(config.event_channel_capacity)),
            pool,
            config,
        };
        Ok((root, services))
    }

    pub fn build(self) -> Result<WorkspaceCoordinator> {
        let (root, services) = self.services()?;
        Ok(WorkspaceCoordinator::new(root, services))
    }
}
