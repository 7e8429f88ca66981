//! Single-flight execution of producers
//!
//! Concurrent requests for the same key share one producer execution. The
//! producer runs on its own task, so it completes even if every caller stops
//! waiting, and its slot is released however it ends.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use log::debug;

use crate::error::FetchError;

type Outcome<T> = Result<T, FetchError>;
type SharedOutcome<T> = Shared<BoxFuture<'static, Outcome<T>>>;
type Registry<K, T> = Arc<Mutex<HashMap<K, SharedOutcome<T>>>>;

/// Registry of in-flight producer executions keyed by `K`.
pub struct SingleFlight<K, T> {
    inflight: Registry<K, T>,
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of producers currently running
    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        lock(&self.inflight).contains_key(key)
    }

    /// Run `producer` for `key`, or wait for the execution already running.
    ///
    /// `producer` is only called when this caller acquires the slot. Every
    /// caller sharing the slot receives a clone of the same outcome.
    pub async fn run<F, Fut>(&self, key: K, producer: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        let shared = {
            let mut inflight = lock(&self.inflight);
            match inflight.get(&key) {
                Some(existing) => {
                    debug!("Joining in-flight producer for {:?}", key);
                    existing.clone()
                }
                None => {
                    let guard = SlotGuard {
                        registry: Arc::clone(&self.inflight),
                        key: key.clone(),
                    };
                    let work = producer();
                    let handle = tokio::spawn(async move {
                        let _slot = guard;
                        work.await
                    });
                    let shared = async move {
                        handle.await.unwrap_or_else(|e| {
                            Err(FetchError::Producer(format!("producer task failed: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();
                    inflight.insert(key, shared.clone());
                    shared
                }
            }
        };

        shared.await
    }
}

/// Releases a slot when the producer task finishes, panics included.
struct SlotGuard<K, T>
where
    K: Eq + Hash,
{
    registry: Registry<K, T>,
    key: K,
}

impl<K, T> Drop for SlotGuard<K, T>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.key);
    }
}

fn lock<K, T>(
    registry: &Mutex<HashMap<K, SharedOutcome<T>>>,
) -> MutexGuard<'_, HashMap<K, SharedOutcome<T>>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_producer(
        calls: Arc<AtomicUsize>,
        delay: Duration,
        outcome: Outcome<u32>,
    ) -> impl FnOnce() -> BoxFuture<'static, Outcome<u32>> {
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                outcome
            }
            .boxed()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_execution() {
        let flights: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let flights = Arc::clone(&flights);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flights
                    .run(
                        "TCS.NS".to_string(),
                        counting_producer(calls, Duration::from_millis(100), Ok(42)),
                    )
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_is_shared_by_all_waiters() {
        let flights: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let failure = FetchError::Producer("upstream 503".to_string());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = Arc::clone(&flights);
            let calls = Arc::clone(&calls);
            let failure = failure.clone();
            handles.push(tokio::spawn(async move {
                flights
                    .run(
                        "INFY.NS".to_string(),
                        counting_producer(calls, Duration::from_millis(100), Err(failure)),
                    )
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Err(failure.clone()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slot_released_after_completion() {
        let flights: SingleFlight<String, u32> = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let outcome = flights
                .run(
                    "key".to_string(),
                    counting_producer(Arc::clone(&calls), Duration::ZERO, Ok(1)),
                )
                .await;
            assert_eq!(outcome, Ok(1));
            assert!(!flights.is_in_flight(&"key".to_string()));
        }

        // Sequential calls each get their own execution
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panicking_producer_releases_slot() {
        let flights: SingleFlight<String, u32> = SingleFlight::new();

        let outcome = flights
            .run("key".to_string(), || async {
                let explode = true;
                if explode {
                    panic!("model exploded");
                }
                Ok(0)
            })
            .await;

        assert!(matches!(outcome, Err(FetchError::Producer(_))));
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let flights: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let a = flights.run(
            "A".to_string(),
            counting_producer(Arc::clone(&calls), Duration::from_millis(50), Ok(1)),
        );
        let b = flights.run(
            "B".to_string(),
            counting_producer(Arc::clone(&calls), Duration::from_millis(50), Ok(2)),
        );
        let (a, b) = tokio::join!(a, b);

        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_producer_runs_to_completion_when_caller_goes_away() {
        let flights: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let caller = {
            let flights = Arc::clone(&flights);
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                flights
                    .run("key".to_string(), move || async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(7)
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        caller.abort();
        assert!(flights.is_in_flight(&"key".to_string()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }
}
