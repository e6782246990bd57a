//! Process-wide event bus: one broadcast channel per event type.

use super::pool::panic_message;
use groovyscope_api::{FileIndexedEvent, WorkspaceIndexedEvent};
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::sync::broadcast::{self, Sender, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone, Debug)]
pub struct EventBus {
    file_indexed: Sender<FileIndexedEvent>,
    workspace_indexed: Sender<WorkspaceIndexedEvent>,
    cancel: CancellationToken,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (file_indexed, _) = broadcast::channel(capacity);
        let (workspace_indexed, _) = broadcast::channel(capacity);
        Self {
            file_indexed,
            workspace_indexed,
            cancel: CancellationToken::new(),
        }
    }

    pub fn publish_file_indexed(&self, event: FileIndexedEvent) {
        if self.file_indexed.send(event).is_err() {
            debug!("No subscribers for file indexed events");
        }
    }

    pub fn publish_workspace_indexed(&self, event: WorkspaceIndexedEvent) {
        if self.workspace_indexed.send(event).is_err() {
            debug!("No subscribers for workspace indexed events");
        }
    }

    pub fn subscribe_file_indexed(&self) -> broadcast::Receiver<FileIndexedEvent> {
        self.file_indexed.subscribe()
    }

    pub fn subscribe_workspace_indexed(&self) -> broadcast::Receiver<WorkspaceIndexedEvent> {
        self.workspace_indexed.subscribe()
    }

    /// Runs `handler` for every file event on its own task. A panicking
    /// handler is logged and keeps receiving later events.
    pub fn on_file_indexed<F>(&self, handler: F)
    where
        F: Fn(FileIndexedEvent) + Send + Sync + 'static,
    {
        spawn_handler("file_indexed", self.subscribe_file_indexed(), self.cancel.clone(), handler);
    }

    pub fn on_workspace_indexed<F>(&self, handler: F)
    where
        F: Fn(WorkspaceIndexedEvent) + Send + Sync + 'static,
    {
        spawn_handler(
            "workspace_indexed",
            self.subscribe_workspace_indexed(),
            self.cancel.clone(),
            handler,
        );
    }

    /// A handle on the same channels whose `close` only stops handlers
    /// registered through it. Closing `self` stops those as well.
    pub fn scoped(&self) -> EventBus {
        Self {
            file_indexed: self.file_indexed.clone(),
            workspace_indexed: self.workspace_indexed.clone(),
            cancel: self.cancel.child_token(),
        }
    }

    /// Stops every handler task registered through `on_*`.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn spawn_handler<E, F>(
    channel: &'static str,
    mut rx: broadcast::Receiver<E>,
    cancel: CancellationToken,
    handler: F,
) where
    E: Clone + Send + 'static,
    F: Fn(E) + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                            error!(channel, "Event handler panicked: {}", panic_message(payload));
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(channel, "Event handler lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!(channel, "Event handler stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_workspace_indexed();
        bus.publish_workspace_indexed(WorkspaceIndexedEvent::new(PathBuf::from("/ws"), 2, 5, 10));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.file_count, 2);
        assert_eq!(event.symbol_count, 5);
    }

    #[tokio::test]
    async fn test_publishing_without_subscribers_is_harmless() {
        let bus = EventBus::default();
        bus.publish_file_indexed(FileIndexedEvent::failed(PathBuf::from("/ws/A.groovy"), 1, "x"));
    }

    #[tokio::test]
    async fn test_panicking_handler_keeps_receiving() {
        let bus = EventBus::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bus.on_file_indexed(move |event| {
            counter.fetch_add(1, Ordering::SeqCst);
            if !event.is_success() {
                panic!("handler failure");
            }
        });
        let mut observer = bus.subscribe_file_indexed();

        bus.publish_file_indexed(FileIndexedEvent::failed(PathBuf::from("/ws/A.groovy"), 1, "x"));
        bus.publish_file_indexed(FileIndexedEvent::succeeded(
            PathBuf::from("/ws/B.groovy"),
            1,
            Vec::new(),
        ));
        observer.recv().await.unwrap();
        observer.recv().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while seen.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        bus.close();
    }

    async fn wait_for(count: &AtomicUsize, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while count.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_closing_a_scoped_bus_spares_the_parent() {
        let bus = EventBus::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bus.on_file_indexed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let scoped = bus.scoped();
        let scoped_seen = Arc::new(AtomicUsize::new(0));
        let scoped_counter = scoped_seen.clone();
        scoped.on_file_indexed(move |_| {
            scoped_counter.fetch_add(1, Ordering::SeqCst);
        });

        scoped.publish_file_indexed(FileIndexedEvent::failed(PathBuf::from("/ws/A.groovy"), 1, "x"));
        wait_for(&seen, 1).await;
        wait_for(&scoped_seen, 1).await;

        scoped.close();
        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.publish_file_indexed(FileIndexedEvent::failed(PathBuf::from("/ws/B.groovy"), 2, "y"));
        wait_for(&seen, 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scoped_seen.load(Ordering::SeqCst), 1);
        bus.close();
    }
}
