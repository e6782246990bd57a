use crate::models::SymbolRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity and timestamp shared by every published event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub event_id: u64,
    pub occurred_at_ms: u64,
}

impl EventMeta {
    pub fn now() -> Self {
        let occurred_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            event_id: NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed),
            occurred_at_ms,
        }
    }
}

/// Published once per file after it was (re)indexed or failed to index.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileIndexedEvent {
    pub meta: EventMeta,
    pub path: PathBuf,
    pub version: u64,
    pub result: Result<Vec<SymbolRecord>, String>,
}

impl FileIndexedEvent {
    pub fn succeeded(path: PathBuf, version: u64, symbols: Vec<SymbolRecord>) -> Self {
        Self {
            meta: EventMeta::now(),
            path,
            version,
            result: Ok(symbols),
        }
    }

    pub fn failed(path: PathBuf, version: u64, message: impl Into<String>) -> Self {
        Self {
            meta: EventMeta::now(),
            path,
            version,
            result: Err(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn symbols(&self) -> &[SymbolRecord] {
        match &self.result {
            Ok(symbols) => symbols,
            Err(_) => &[],
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }
}

/// Published when a full workspace scan completes.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkspaceIndexedEvent {
    pub meta: EventMeta,
    pub path: PathBuf,
    pub file_count: usize,
    pub symbol_count: usize,
    pub duration_ms: u64,
}

impl WorkspaceIndexedEvent {
    pub fn new(path: PathBuf, file_count: usize, symbol_count: usize, duration_ms: u64) -> Self {
        Self {
            meta: EventMeta::now(),
            path,
            file_count,
            symbol_count,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_increase() {
        let a = EventMeta::now();
        let b = EventMeta::now();
        assert!(b.event_id > a.event_id);
    }

    #[test]
    fn test_failed_event_has_no_symbols() {
        let event = FileIndexedEvent::failed(PathBuf::from("/ws/A.groovy"), 3, "boom");
        assert!(!event.is_success());
        assert!(event.symbols().is_empty());
        assert_eq!(event.error_message(), Some("boom"));
    }
}
