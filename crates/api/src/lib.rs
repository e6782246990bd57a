pub mod error;
pub mod events;
pub mod lifecycle;
pub mod models;

pub use error::{ApiError, ApiResult};
pub use events::{EventMeta, FileIndexedEvent, WorkspaceIndexedEvent};
pub use lifecycle::{AnalysisService, FileUpdate};
pub use models::*;
