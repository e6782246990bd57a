//! Bounded pool for CPU-bound analysis work.

use crate::error::{GroovyscopeError, Result};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::sync::oneshot;
use tracing::error;

/// A fixed-size rayon pool whose jobs are awaited from async code.
///
/// A panicking job is caught at the job boundary and surfaces as
/// [`GroovyscopeError::Internal`]; the pool itself keeps running.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("groovyscope-worker-{i}"))
            .build()
            .map_err(|e| GroovyscopeError::Internal(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub async fn run<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            let outcome = catch_unwind(AssertUnwindSafe(job)).map_err(panic_message);
            // The caller may have gone away; the result is simply dropped.
            let _ = tx.send(outcome);
        });

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => {
                error!("Worker job panicked: {}", message);
                Err(GroovyscopeError::Internal(format!("worker panicked: {message}")))
            }
            Err(e) => Err(GroovyscopeError::Internal(e.to_string())),
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
