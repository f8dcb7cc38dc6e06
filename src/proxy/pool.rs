//! Bounded worker pool with join-before-return semantics

use futures::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Default number of tasks allowed to run at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 50;

/// Default bookkeeping group size
pub const DEFAULT_GROUP_SIZE: usize = 300;

/// Runs one task per item while holding at most `max_concurrency`
/// admission tokens at any instant.
///
/// Items are walked in fixed-size groups for logging only. Groups are not
/// serialized: the token pool is the only throttle.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    tokens: Arc<Semaphore>,
    max_concurrency: usize,
    group_size: usize,
}

impl WorkerPool {
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            tokens: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            group_size: DEFAULT_GROUP_SIZE,
        }
    }

    pub fn with_group_size(mut self, group_size: usize) -> Self {
        self.group_size = group_size.max(1);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Tokens currently held by running tasks
    pub fn in_flight(&self) -> usize {
        self.max_concurrency - self.tokens.available_permits()
    }

    /// Admit and run `task(item)` for every item, then wait for all of them.
    ///
    /// Admission blocks while every token is taken. Each token is released
    /// when its task finishes, including when the task panics. A panicking
    /// task is logged and does not affect the others.
    pub async fn run<I, F, Fut>(&self, items: Vec<I>, task: F)
    where
        I: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let total = items.len();
        let groups = total.div_ceil(self.group_size);
        let mut running = JoinSet::new();
        let mut items = items.into_iter();

        for group in 0..groups {
            debug!(group = group + 1, groups, total, "admitting group");
            for item in items.by_ref().take(self.group_size) {
                // The semaphore lives as long as the pool and is never closed.
                let Ok(token) = Arc::clone(&self.tokens).acquire_owned().await else {
                    error!("admission pool closed, abandoning remaining tasks");
                    break;
                };
                let fut = task(item);
                running.spawn(async move {
                    let _token = token;
                    fut.await;
                });
            }
        }

        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "verification task aborted");
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}
