//! Bounded set of background workers
//!
//! Accepts, connects and receive loops each run as one owned tokio task.
//! The set caps how many may be alive at once and aborts all of them on
//! shutdown, so repeated establish/teardown cycles never leak tasks.

use std::future::Future;
use std::sync::Mutex;

use rfchat_core::EstablishError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct WorkerSetInner {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    closed: bool,
}

/// Owner of every background task spawned by a link
#[derive(Debug)]
pub struct WorkerSet {
    max_workers: usize,
    inner: Mutex<WorkerSetInner>,
}

impl WorkerSet {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            inner: Mutex::new(WorkerSetInner::default()),
        }
    }

    /// Spawn a named worker if the set is open and below its bound
    pub fn spawn<F>(&self, name: &'static str, task: F) -> Result<(), EstablishError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.closed {
            return Err(EstablishError::ShuttingDown);
        }

        inner.handles.retain(|(_, handle)| !handle.is_finished());
        if inner.handles.len() >= self.max_workers {
            warn!(
                "Refusing {} worker: {} of {} slots busy",
                name,
                inner.handles.len(),
                self.max_workers
            );
            return Err(EstablishError::WorkersExhausted {
                max: self.max_workers,
            });
        }

        inner.handles.push((name, tokio::spawn(task)));
        debug!("Spawned {} worker ({} alive)", name, inner.handles.len());
        Ok(())
    }

    /// Number of workers that have not finished yet
    pub fn active(&self) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.handles.retain(|(_, handle)| !handle.is_finished());
        inner.handles.len()
    }

    /// Abort every worker and refuse new ones
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.closed = true;
        for (name, handle) in inner.handles.drain(..) {
            if !handle.is_finished() {
                debug!("Aborting {} worker", name);
                handle.abort();
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bound_is_enforced() {
        let workers = WorkerSet::new(1);
        workers
            .spawn("sleeper", tokio::time::sleep(Duration::from_secs(60)))
            .unwrap();

        let err = workers.spawn("second", async {}).unwrap_err();
        assert_eq!(err, EstablishError::WorkersExhausted { max: 1 });
        workers.shutdown();
    }

    #[tokio::test]
    async fn test_finished_workers_are_reaped() {
        let workers = WorkerSet::new(1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        workers
            .spawn("short", async move {
                let _ = tx.send(());
            })
            .unwrap();
        rx.await.unwrap();

        // The task may still be winding down right after signalling
        for _ in 0..100 {
            if workers.active() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(workers.spawn("next", async {}).is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_and_closes() {
        let workers = WorkerSet::new(2);
        workers
            .spawn("sleeper", tokio::time::sleep(Duration::from_secs(60)))
            .unwrap();
        workers.shutdown();

        assert!(workers.is_shut_down());
        assert_eq!(workers.active(), 0);
        assert_eq!(
            workers.spawn("late", async {}).unwrap_err(),
            EstablishError::ShuttingDown
        );
    }
}
