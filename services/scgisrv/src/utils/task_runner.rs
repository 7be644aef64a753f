//! Where CPU-bound request preparation runs
//!
//! `InlineTaskRunner` runs the job on the awaiting task, which is the
//! default. `BlockingTaskRunner` moves it to tokio's blocking pool.

use tokio::sync::oneshot;

use crate::error::{Result, ScgiSrvError};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait TaskRunner: Send + Sync {
    fn execute(&self, job: Job);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InlineTaskRunner;

impl TaskRunner for InlineTaskRunner {
    fn execute(&self, job: Job) {
        job();
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingTaskRunner;

impl TaskRunner for BlockingTaskRunner {
    fn execute(&self, job: Job) {
        tokio::task::spawn_blocking(job);
    }
}

/// Run `f` on `runner` and wait for its result
pub async fn run<T, F>(runner: &dyn TaskRunner, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    runner.execute(Box::new(move || {
        let _ = tx.send(f());
    }));
    rx.await
        .map_err(|_| ScgiSrvError::internal("task runner dropped the job"))
}
