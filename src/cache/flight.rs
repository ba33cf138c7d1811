//! At-most-one in-flight operation per key.
//!
//! The first caller for a key spawns the work on its own task; every caller,
//! the first included, subscribes to a broadcast channel and receives a clone
//! of the same result. Dropping a caller never cancels the work. The key is
//! released before the result is broadcast, so a caller arriving after
//! completion starts fresh work instead of waiting on a finished flight.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error};

/// The work ended without producing a result (it panicked or the runtime shut down).
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("in-flight operation was abandoned before completing")]
pub struct FlightAbandoned;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlightStats {
    pub total: u64,
    pub coalesced: u64,
}

type InFlight<K, V> = Arc<DashMap<K, broadcast::Sender<V>>>;

#[derive(Debug)]
pub struct SingleFlight<K, V>
where
    K: Eq + Hash,
{
    in_flight: InFlight<K, V>,
    total: AtomicU64,
    coalesced: AtomicU64,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            in_flight: Arc::new(DashMap::new()),
            total: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key`, or join the run already in progress.
    ///
    /// `work` is only called by the caller that starts the flight.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Result<V, FlightAbandoned>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        self.total.fetch_add(1, Ordering::Relaxed);

        let mut receiver = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                let receiver = entry.get().subscribe();
                drop(entry);
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(key = ?key, "Joining in-flight operation");
                receiver
            }
            Entry::Vacant(entry) => {
                let (sender, receiver) = broadcast::channel(1);
                entry.insert(sender.clone());
                let guard = FlightGuard {
                    in_flight: Arc::clone(&self.in_flight),
                    key: Some(key),
                };
                let future = work();
                tokio::spawn(async move {
                    let value = future.await;
                    drop(guard);
                    let _ = sender.send(value);
                });
                receiver
            }
        };

        receiver.recv().await.map_err(|_| FlightAbandoned)
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn stats(&self) -> FlightStats {
        FlightStats {
            total: self.total.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// Releases the key when the spawned work finishes or unwinds. Unwinding also
/// drops the sender, which wakes every waiter with `FlightAbandoned`.
struct FlightGuard<K, V>
where
    K: Eq + Hash,
{
    in_flight: InFlight<K, V>,
    key: Option<K>,
}

impl<K, V> Drop for FlightGuard<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if std::thread::panicking() {
                error!("In-flight operation panicked; releasing waiters");
            }
            self.in_flight.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flight = Arc::new(SingleFlight::<&'static str, u32>::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let executions = Arc::clone(&executions);
            handles.push(tokio::spawn(async move {
                flight
                    .run("products", || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        7
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.expect("join"), Ok(7));
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(flight.stats().total, 8);
        assert_eq!(flight.stats().coalesced, 7);
        assert!(!flight.is_in_flight(&"products"));
    }

    #[tokio::test]
    async fn sequential_calls_run_again() {
        let flight = SingleFlight::<u8, u8>::new();
        assert_eq!(flight.run(1, || async { 1 }).await, Ok(1));
        assert_eq!(flight.run(1, || async { 2 }).await, Ok(2));
        assert_eq!(flight.stats().coalesced, 0);
    }

    #[tokio::test]
    async fn aborted_leader_does_not_cancel_the_work() {
        let flight = Arc::new(SingleFlight::<u8, u8>::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let leader = {
            let flight = Arc::clone(&flight);
            let executions = Arc::clone(&executions);
            tokio::spawn(async move {
                flight
                    .run(9, || async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        executions.fetch_add(1, Ordering::SeqCst);
                        42
                    })
                    .await
            })
        };
        while !flight.is_in_flight(&9) {
            tokio::task::yield_now().await;
        }

        let follower = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move { flight.run(9, || async { 1 }).await })
        };
        while flight.stats().coalesced == 0 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        assert_eq!(follower.await.expect("join"), Ok(42));
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert!(!flight.is_in_flight(&9));
    }

    #[tokio::test]
    async fn panicking_work_releases_waiters() {
        let flight = SingleFlight::<u8, u8>::new();
        let result = flight
            .run(3, || async {
                if flight_should_panic() {
                    panic!("boom");
                }
                0
            })
            .await;
        assert_eq!(result, Err(FlightAbandoned));
        assert!(!flight.is_in_flight(&3));
        assert_eq!(flight.run(3, || async { 5 }).await, Ok(5));
    }

    fn flight_should_panic() -> bool {
        true
    }
}
