use std::{future::Future, sync::Arc};

use tokio::sync::Semaphore;

use crate::common::errors::ResolveError;

/// Bounds how many extractor jobs run at once.
///
/// A slot is held only while the job's future is alive. Dropping the future
/// (a timeout, a stopped session) frees the slot immediately, so jobs must
/// clean up their own resources on drop.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free slot, then drives `job` to completion.
    pub async fn run<F, Fut, T>(&self, job: F) -> Result<T, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResolveError>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ResolveError::Pool(e.to_string()))?;
        job().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6).map(|_| {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            async move {
                pool.run(|| async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }
        });

        for result in futures::future::join_all(jobs).await {
            result.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_job_errors_propagate() {
        let pool = WorkerPool::new(1);
        let result: Result<(), _> = pool
            .run(|| async { Err(ResolveError::BadOutput("nope".into())) })
            .await;
        assert!(matches!(result, Err(ResolveError::BadOutput(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_job_frees_its_slot() {
        let pool = WorkerPool::new(1);
        let hung = tokio::time::timeout(
            Duration::from_secs(20),
            pool.run(|| std::future::pending::<Result<(), ResolveError>>()),
        )
        .await;
        assert!(hung.is_err());
        assert_eq!(pool.available(), 1);

        let next = pool.run(|| async { Ok(7) }).await.unwrap();
        assert_eq!(next, 7);
    }
}
