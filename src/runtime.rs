//! Contains the worker pool that runs blocking driver calls off the async executor.

mod join_handle;

use std::{num::NonZeroUsize, sync::Arc};

use tokio::sync::Semaphore;

pub(crate) use self::join_handle::BlockingJoinHandle;
use crate::{
    error::{ErrorKind, Result},
    trace::EXECUTOR_TRACING_EVENT_TARGET,
};

/// Environment variable that overrides the default worker pool size.
pub const MAX_WORKERS_ENV_VAR: &str = "MONGODB_MOTOR_MAX_WORKERS";

const MAX_DEFAULT_WORKERS: usize = 32;

/// The number of blocking calls a client may run at once when none is configured:
/// `min(32, available_parallelism + 4)`, unless overridden by [`MAX_WORKERS_ENV_VAR`].
pub(crate) fn default_max_workers() -> usize {
    if let Some(from_env) = std::env::var(MAX_WORKERS_ENV_VAR)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|n| *n > 0)
    {
        return from_env;
    }

    let cpus = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    (cpus + 4).min(MAX_DEFAULT_WORKERS)
}

/// A bounded pool that runs blocking driver calls off the async executor.
///
/// Each call waits for a permit, then runs on tokio's blocking thread pool. At most
/// `max_workers` calls dispatched through the same pool run at once. Dropping the future
/// returned by [`WorkerPool::execute`] before a permit is granted means the call never runs;
/// dropping it afterwards only abandons the wait, and the blocking call still runs to completion.
#[derive(Clone, Debug)]
pub(crate) struct WorkerPool {
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl WorkerPool {
    pub(crate) fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub(crate) fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Runs `call` on the pool and resolves with its result.
    pub(crate) async fn execute<F, T>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ErrorKind::Shutdown)?;

        tracing::trace!(
            target: EXECUTOR_TRACING_EVENT_TARGET,
            operation,
            availablePermits = self.permits.available_permits(),
            maxWorkers = self.max_workers,
            "Operation dispatched to worker pool"
        );

        BlockingJoinHandle::spawn(move || {
            let _permit = permit;
            call()
        })
        .await?
    }

    /// Stops the pool from accepting new calls. Calls already running are not interrupted.
    pub(crate) fn close(&self) {
        self.permits.close();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}
