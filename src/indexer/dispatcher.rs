use crate::error::IndexerError;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Folds task results as they are collected, so finished results are not kept around
pub trait Tally<T> {
    fn record(&mut self, value: T);
}

impl<T> Tally<T> for Vec<T> {
    fn record(&mut self, value: T) {
        self.push(value);
    }
}

/// Bounded fan-out of independent tasks.
///
/// Each task holds one admission permit for its whole lifetime. The permit
/// moves into the task and is released when the task finishes, whether it
/// returns, fails or panics.
pub struct Dispatcher<T, A> {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    tasks: JoinSet<T>,
    cancel: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    tally: A,
    panicked: usize,
}

/// Everything the dispatched tasks produced
#[derive(Debug)]
pub struct DispatchSummary<A> {
    /// Results folded in completion order
    pub tally: A,
    /// Tasks that panicked or were aborted
    pub panicked: usize,
    /// Highest number of tasks observed running at once
    pub max_in_flight: usize,
}

struct InFlight {
    current: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(current: &Arc<AtomicUsize>, max: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self {
            current: current.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T: Send + 'static, A: Tally<T>> Dispatcher<T, A> {
    /// Dispatcher admitting at most `capacity` tasks at once (minimum 1)
    pub fn new(capacity: usize, cancel: CancellationToken, tally: A) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            tasks: JoinSet::new(),
            cancel,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            tally,
            panicked: 0,
        }
    }

    /// Wait for an admission permit, then start `task`.
    ///
    /// Returns [`IndexerError::Cancelled`] without starting anything when the
    /// token fires while waiting.
    pub async fn dispatch<F>(&mut self, task: F) -> Result<(), IndexerError>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(IndexerError::Cancelled),
            permit = self.semaphore.clone().acquire_owned() => permit
                .map_err(|_| IndexerError::other("admission semaphore closed"))?,
        };

        let in_flight = self.in_flight.clone();
        let max_in_flight = self.max_in_flight.clone();

        self.tasks.spawn(async move {
            let _permit = permit;
            let _running = InFlight::enter(&in_flight, &max_in_flight);
            task.await
        });

        self.reap();
        Ok(())
    }

    /// Collect tasks that already finished without waiting
    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            self.record(result);
        }
    }

    fn record(&mut self, result: Result<T, JoinError>) {
        match result {
            Ok(value) => self.tally.record(value),
            Err(e) => {
                tracing::error!("Dispatched task did not complete: {}", e);
                self.panicked += 1;
            }
        }
    }

    /// Tasks started and not yet collected
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Token that stops admission, shared with the dispatched work
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for every dispatched task to finish
    pub async fn join(mut self) -> DispatchSummary<A> {
        while let Some(result) = self.tasks.join_next().await {
            self.record(result);
        }

        DispatchSummary {
            tally: self.tally,
            panicked: self.panicked,
            max_in_flight: self.max_in_flight.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_never_exceeds_capacity() {
        let mut dispatcher = Dispatcher::new(3, CancellationToken::new(), Vec::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..20u64 {
            let active = active.clone();
            let peak = peak.clone();
            dispatcher
                .dispatch(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5 + i % 3)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    i
                })
                .await
                .unwrap();
            assert!(dispatcher.available_permits() <= 3);
        }

        let summary = dispatcher.join().await;
        assert_eq!(summary.tally.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(summary.max_in_flight <= 3);
        assert!(summary.max_in_flight >= 1);
    }

    #[tokio::test]
    async fn test_permits_are_returned_after_failures_and_panics() {
        let mut dispatcher: Dispatcher<Result<(), String>, Vec<_>> =
            Dispatcher::new(2, CancellationToken::new(), Vec::new());

        dispatcher.dispatch(async { Ok(()) }).await.unwrap();
        dispatcher
            .dispatch(async { Err("embedding failed".to_string()) })
            .await
            .unwrap();
        dispatcher
            .dispatch(async {
                if true {
                    panic!("pipeline bug");
                }
                Ok(())
            })
            .await
            .unwrap();
        dispatcher.dispatch(async { Ok(()) }).await.unwrap();

        let semaphore = dispatcher.semaphore.clone();
        let summary = dispatcher.join().await;

        assert_eq!(summary.tally.len(), 3);
        assert_eq!(summary.panicked, 1);
        assert_eq!(semaphore.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_admission_wait() {
        let cancel = CancellationToken::new();
        let mut dispatcher = Dispatcher::new(1, cancel.clone(), Vec::new());

        let release = CancellationToken::new();
        let hold = release.clone();
        dispatcher
            .dispatch(async move { hold.cancelled().await })
            .await
            .unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        // Only permit is held, so this waits until the token fires
        let result = dispatcher.dispatch(async {}).await;
        assert!(matches!(result, Err(IndexerError::Cancelled)));

        release.cancel();
        let summary = dispatcher.join().await;
        assert_eq!(summary.tally.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_is_bumped_to_one() {
        let dispatcher: Dispatcher<(), Vec<()>> =
            Dispatcher::new(0, CancellationToken::new(), Vec::new());
        assert_eq!(dispatcher.capacity(), 1);
        assert_eq!(dispatcher.pending(), 0);
    }
}
