pub mod config;
pub mod deps;
pub mod error;
pub mod index;
pub mod logging;
pub mod pipeline;
pub mod resolver;
pub mod workspace;

pub use config::WorkspaceConfig;
pub use deps::DependencyTracker;
pub use error::{GroovyscopeError, Result};
pub use index::SymbolIndex;
pub use pipeline::{CompilationPipeline, CompilationResult, CompiledTree};
pub use resolver::{DependencyResolver, ResolvedClasspath};
pub use workspace::{
    Documents, EventBus, WorkerPool, WorkspaceBuilder, WorkspaceCoordinator, WorkspaceServices,
    WorkspaceState,
};
