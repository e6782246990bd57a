//! Maps editor notifications, addressed by `file://` URI, onto an
//! [`AnalysisService`].

use groovyscope_api::{AnalysisService, ApiError, ApiResult, FileUpdate, SymbolRecord};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

pub struct Documents<S: AnalysisService> {
    service: Arc<S>,
}

impl<S: AnalysisService> Documents<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    pub async fn did_open(&self, uri: &str, text: String, version: u64) -> ApiResult<FileUpdate> {
        self.service
            .update_file_text(uri_to_path(uri)?, text, version)
            .await
    }

    /// Full-text sync: `text` is the whole new document.
    pub async fn did_change(&self, uri: &str, text: String, version: u64) -> ApiResult<FileUpdate> {
        self.service
            .update_file_text(uri_to_path(uri)?, text, version)
            .await
    }

    pub async fn did_close(&self, uri: &str) -> ApiResult<FileUpdate> {
        self.service.close_file(uri_to_path(uri)?).await
    }

    pub async fn workspace_symbol(&self, query: &str) -> ApiResult<Vec<SymbolRecord>> {
        self.service.search_symbols(query.to_string()).await
    }
}

pub fn uri_to_path(uri: &str) -> ApiResult<PathBuf> {
    let url = Url::parse(uri).map_err(|e| ApiError::InvalidArgument(format!("{uri}: {e}")))?;
    if url.scheme() != "file" {
        return Err(ApiError::InvalidArgument(format!(
            "unsupported URI scheme '{}'",
            url.scheme()
        )));
    }
    url.to_file_path()
        .map_err(|_| ApiError::InvalidArgument(format!("{uri} is not a file path")))
}
