//! Bounded admission for bulk jobs.
//!
//! Work is admitted through an [`AdmissionPool`] (a counting semaphore), in
//! chunks, with fixed pauses between admissions and between chunks. Results
//! come back in submission order regardless of completion order.

use crate::errors::AppError;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

/// A slot in the pool. Dropping it releases the slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

/// Semaphore-backed worker pool with a fixed number of in-flight slots.
#[derive(Debug, Clone)]
pub struct AdmissionPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits for a free slot.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AppError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::InternalError("Admission pool closed".to_string()))?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Returns a slot to the pool.
    pub fn release(&self, permit: AdmissionPermit) {
        drop(permit);
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Chunking and throttling parameters for a bulk job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub chunk_size: usize,
    pub concurrency: usize,
    /// Pause after each chunk except the last.
    pub chunk_pause: Duration,
    /// Pause after each admission.
    pub admission_delay: Duration,
}

impl ChunkPolicy {
    /// Throttling tuned for third-party APIs: larger jobs get more workers,
    /// with 50-record chunks, a 1s pause between chunks and 50ms between
    /// admissions.
    pub fn for_record_count(records: usize) -> Self {
        let concurrency = if records > 10_000 {
            5
        } else if records > 1_000 {
            8
        } else {
            3
        };

        Self {
            chunk_size: 50,
            concurrency,
            chunk_pause: Duration::from_secs(1),
            admission_delay: Duration::from_millis(50),
        }
    }

    /// No pauses; used for in-process work and tests.
    pub fn unthrottled(concurrency: usize) -> Self {
        Self {
            chunk_size: usize::MAX,
            concurrency,
            chunk_pause: Duration::ZERO,
            admission_delay: Duration::ZERO,
        }
    }

    fn effective_chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }
}

fn split_into_chunks<T>(items: Vec<T>, chunk_size: usize) -> Vec<Vec<T>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    for item in items {
        current.push(item);
        if current.len() == chunk_size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

async fn join_in_order<R>(handles: Vec<JoinHandle<R>>) -> Result<Vec<R>, AppError> {
    futures::future::try_join_all(handles)
        .await
        .map_err(|e| AppError::InternalError(format!("Worker task failed: {}", e)))
}

/// Runs `f` over every item with at most `policy.concurrency` in flight.
pub async fn process_in_chunks<T, R, F, Fut>(
    items: Vec<T>,
    policy: &ChunkPolicy,
    f: F,
) -> Result<Vec<R>, AppError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let pool = AdmissionPool::new(policy.concurrency);
    let f = Arc::new(f);
    let mut results = Vec::with_capacity(items.len());

    let chunks = split_into_chunks(items, policy.effective_chunk_size());
    let chunk_count = chunks.len();

    for (index, chunk) in chunks.into_iter().enumerate() {
        let mut handles = Vec::with_capacity(chunk.len());

        for item in chunk {
            let permit = pool.acquire().await?;
            let f = f.clone();
            handles.push(tokio::spawn(async move {
                let result = f(item).await;
                drop(permit);
                result
            }));

            if !policy.admission_delay.is_zero() {
                tokio::time::sleep(policy.admission_delay).await;
            }
        }

        results.extend(join_in_order(handles).await?);

        if index + 1 < chunk_count && !policy.chunk_pause.is_zero() {
            tracing::debug!(
                "Chunk {}/{} complete, pausing {:?}",
                index + 1,
                chunk_count,
                policy.chunk_pause
            );
            tokio::time::sleep(policy.chunk_pause).await;
        }
    }

    Ok(results)
}

/// Outcome of [`process_with_failsafe`].
#[derive(Debug)]
pub struct FailsafeOutcome<T, R, E> {
    /// Results for admitted items, in submission order.
    pub completed: Vec<Result<R, E>>,
    /// Items never admitted because the failure limit was reached.
    pub skipped: Vec<T>,
}

impl<T, R, E> FailsafeOutcome<T, R, E> {
    pub fn stopped_early(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Like [`process_in_chunks`], but stops admitting new items once
/// `max_consecutive_failures` results in a row have been errors.
pub async fn process_with_failsafe<T, R, E, F, Fut>(
    items: Vec<T>,
    policy: &ChunkPolicy,
    max_consecutive_failures: usize,
    f: F,
) -> Result<FailsafeOutcome<T, R, E>, AppError>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let pool = AdmissionPool::new(policy.concurrency);
    let f = Arc::new(f);
    let consecutive_failures = Arc::new(AtomicUsize::new(0));
    let limit = max_consecutive_failures.max(1);

    let mut completed = Vec::with_capacity(items.len());
    let mut skipped = Vec::new();

    let chunks = split_into_chunks(items, policy.effective_chunk_size());
    let chunk_count = chunks.len();

    let mut stopped = false;

    for (index, chunk) in chunks.into_iter().enumerate() {
        if stopped {
            skipped.extend(chunk);
            continue;
        }

        let mut handles = Vec::with_capacity(chunk.len());
        let mut remaining = chunk.into_iter();

        while let Some(item) = remaining.next() {
            // Checked after acquiring so every earlier result has been counted
            // when concurrency is 1.
            let permit = pool.acquire().await?;
            if consecutive_failures.load(Ordering::SeqCst) >= limit {
                drop(permit);
                skipped.push(item);
                skipped.extend(remaining.by_ref());
                break;
            }

            let f = f.clone();
            let failures = consecutive_failures.clone();
            handles.push(tokio::spawn(async move {
                let result = f(item).await;
                if result.is_ok() {
                    failures.store(0, Ordering::SeqCst);
                } else {
                    failures.fetch_add(1, Ordering::SeqCst);
                }
                drop(permit);
                result
            }));

            if !policy.admission_delay.is_zero() {
                tokio::time::sleep(policy.admission_delay).await;
            }
        }

        completed.extend(join_in_order(handles).await?);

        let failures = consecutive_failures.load(Ordering::SeqCst);
        if failures >= limit {
            tracing::error!(
                "Stopping bulk job after {} consecutive failures",
                failures
            );
            stopped = true;
            continue;
        }

        if index + 1 < chunk_count && !policy.chunk_pause.is_zero() {
            tokio::time::sleep(policy.chunk_pause).await;
        }
    }

    Ok(FailsafeOutcome { completed, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_scales_with_record_count() {
        assert_eq!(ChunkPolicy::for_record_count(10).concurrency, 3);
        assert_eq!(ChunkPolicy::for_record_count(1_001).concurrency, 8);
        assert_eq!(ChunkPolicy::for_record_count(10_001).concurrency, 5);
        assert_eq!(ChunkPolicy::for_record_count(10).chunk_size, 50);
    }

    #[tokio::test]
    async fn acquire_and_release_track_capacity() {
        let pool = AdmissionPool::new(2);
        let first = pool.acquire().await.unwrap();
        let _second = pool.acquire().await.unwrap();
        assert_eq!(pool.available(), 0);

        pool.release(first);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn results_keep_submission_order() {
        let policy = ChunkPolicy {
            chunk_size: 4,
            concurrency: 3,
            chunk_pause: Duration::ZERO,
            admission_delay: Duration::ZERO,
        };

        let items: Vec<u64> = (0..10).collect();
        let results = process_in_chunks(items, &policy, |n| async move {
            // Later items finish first
            tokio::time::sleep(Duration::from_millis(10 - n)).await;
            n * 2
        })
        .await
        .unwrap();

        assert_eq!(results, (0..10).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn never_exceeds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let policy = ChunkPolicy::unthrottled(2);

        let (flight, max_seen) = (in_flight.clone(), peak.clone());
        process_in_chunks((0..12).collect::<Vec<u32>>(), &policy, move |_| {
            let flight = flight.clone();
            let max_seen = max_seen.clone();
            async move {
                let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn failsafe_stops_after_consecutive_failures() {
        let policy = ChunkPolicy {
            chunk_size: 1,
            concurrency: 1,
            chunk_pause: Duration::ZERO,
            admission_delay: Duration::ZERO,
        };

        let outcome = process_with_failsafe(
            (0..20).collect::<Vec<u32>>(),
            &policy,
            3,
            |n| async move { Err::<u32, String>(format!("item {} failed", n)) },
        )
        .await
        .unwrap();

        assert_eq!(outcome.completed.len(), 3);
        assert_eq!(outcome.skipped.len(), 17);
        assert!(outcome.stopped_early());
    }

    #[tokio::test]
    async fn failsafe_resets_on_success() {
        let policy = ChunkPolicy {
            chunk_size: 1,
            concurrency: 1,
            chunk_pause: Duration::ZERO,
            admission_delay: Duration::ZERO,
        };

        // Fails twice, then succeeds, repeatedly: never three in a row
        let outcome = process_with_failsafe(
            (0..9).collect::<Vec<u32>>(),
            &policy,
            3,
            |n| async move {
                if n % 3 == 2 {
                    Ok(n)
                } else {
                    Err(format!("item {} failed", n))
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome.completed.len(), 9);
        assert!(!outcome.stopped_early());
    }
}
