//! Task executor dispatching engine work off the calling context.

use std::future::Future;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Executes engine tasks on a worker context distinct from the caller.
///
/// Every submitted task produces exactly one completion, delivered through
/// the returned [`TaskHandle`]. Tasks are independent; the executor makes no
/// ordering guarantees between them.
pub struct TaskExecutor {
    kind: ExecutorKind,
}

enum ExecutorKind {
    /// Spawn onto the ambient tokio runtime's workers.
    Ambient(Handle),
    /// A privately owned runtime, shut down when the executor drops.
    Dedicated(Runtime),
}

impl TaskExecutor {
    /// Builds an executor that spawns onto the ambient tokio runtime.
    ///
    /// Fails when called outside of a tokio runtime.
    pub fn ambient() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Internal(format!("no tokio runtime available: {}", e)))?;
        Ok(Self {
            kind: ExecutorKind::Ambient(handle),
        })
    }

    /// Builds an executor backed by its own multi-thread runtime.
    ///
    /// Intended for embedders calling in from outside a tokio runtime. The
    /// runtime shuts down when the executor drops, so the executor itself
    /// must be dropped outside of async context.
    pub fn dedicated(worker_threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("ledge-engine")
            .enable_all()
            .build()
            .map_err(|e| Error::Internal(format!("failed to build worker runtime: {}", e)))?;
        Ok(Self {
            kind: ExecutorKind::Dedicated(runtime),
        })
    }

    fn handle(&self) -> &Handle {
        match &self.kind {
            ExecutorKind::Ambient(handle) => handle,
            ExecutorKind::Dedicated(runtime) => runtime.handle(),
        }
    }

    /// Submits a task for execution. The task starts immediately.
    pub fn submit<T, F>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.handle().spawn(async move {
            // The receiver may be gone when the caller was cancelled.
            let _ = tx.send(task.await);
        });
        TaskHandle { rx }
    }
}

/// Receives the single completion of a submitted task.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Waits for the task's completion.
    pub async fn join(self) -> Result<T> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::Internal(
                "task worker dropped before completing".to_string(),
            )),
        }
    }
}
