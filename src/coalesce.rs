//! In-Flight Call Coalescing
//!
//! Collapses concurrent loads for the same key into one execution. The first
//! caller for a key registers a shared future; callers arriving while it is
//! registered await that same future and receive a clone of its outcome.
//! The registration is dropped as soon as the future resolves, or once every
//! waiter has gone away, so the next call for the key starts a fresh
//! execution. A panicking execution resolves to `Error::Internal` for all of
//! its waiters.

use crate::error::{Error, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

type SharedCall<T> = Shared<BoxFuture<'static, Result<T>>>;

/// One registered execution
struct InFlight<T: Clone> {
    /// Distinguishes successive executions for the same key
    generation: u64,
    /// Callers currently awaiting `future`
    waiters: usize,
    future: SharedCall<T>,
}

/// Outcome of a coalesced call
#[derive(Debug, Clone)]
pub struct Coalesced<T> {
    pub result: Result<T>,
    /// True if this caller joined another caller's execution
    pub shared: bool,
}

/// Per-key call deduplication
pub struct CallCoalescer<T: Clone> {
    calls: Mutex<HashMap<String, InFlight<T>>>,
    next_generation: AtomicU64,
}

impl<T> CallCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Run `work` for `key` unless an execution for `key` is already in flight
    ///
    /// `work` is only invoked when this caller starts a new execution.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Coalesced<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (generation, future, shared) = {
            let mut calls = self.calls.lock();
            match calls.get_mut(key) {
                Some(call) => {
                    call.waiters += 1;
                    (call.generation, call.future.clone(), true)
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let future = catch_panic(work()).boxed().shared();
                    calls.insert(
                        key.to_string(),
                        InFlight {
                            generation,
                            waiters: 1,
                            future: future.clone(),
                        },
                    );
                    (generation, future, false)
                }
            }
        };

        let mut waiter = Waiter {
            coalescer: self,
            key,
            generation,
            completed: false,
        };
        let result = future.await;
        waiter.completed = true;

        Coalesced { result, shared }
    }

    /// Number of keys with an execution in flight
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

impl<T: Clone> CallCoalescer<T> {
    /// Release one waiter of `generation` for `key`
    ///
    /// The registration goes away when the execution completed, or when its
    /// last waiter was cancelled before completion.
    fn release(&self, key: &str, generation: u64, completed: bool) {
        let mut calls = self.calls.lock();
        let remove = match calls.get_mut(key) {
            Some(call) if call.generation == generation => {
                call.waiters = call.waiters.saturating_sub(1);
                completed || call.waiters == 0
            }
            _ => false,
        };
        if remove {
            calls.remove(key);
        }
    }

    #[cfg(test)]
    fn waiters(&self, key: &str) -> usize {
        self.calls.lock().get(key).map_or(0, |call| call.waiters)
    }
}

/// Releases its caller's hold on an execution, including on cancellation
struct Waiter<'a, T: Clone> {
    coalescer: &'a CallCoalescer<T>,
    key: &'a str,
    generation: u64,
    completed: bool,
}

impl<T: Clone> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        self.coalescer
            .release(self.key, self.generation, self.completed);
    }
}

/// Turn a panic inside `work` into an error every waiter can clone
async fn catch_panic<T, Fut>(work: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            error!("Coalesced call panicked");
            Err(Error::Internal("coalesced call panicked".to_string()))
        }
    }
}

impl<T> Default for CallCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_single_call() {
        let coalescer = CallCoalescer::<String>::new();
        let out = coalescer
            .run("key", || async { Ok("bar".to_string()) })
            .await;

        assert_eq!(out.result.unwrap(), "bar");
        assert!(!out.shared);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_error_is_propagated() {
        let coalescer = CallCoalescer::<String>::new();
        let out = coalescer
            .run("key", || async { Err(Error::Internal("boom".into())) })
            .await;

        assert_eq!(out.result.unwrap_err().to_string(), "Internal error: boom");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_share_one_execution() {
        let coalescer = Arc::new(CallCoalescer::<String>::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let coalescer = coalescer.clone();
                let executions = executions.clone();
                tokio::spawn(async move {
                    coalescer
                        .run("key", move || async move {
                            executions.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok("bar".to_string())
                        })
                        .await
                })
            })
            .collect();

        let outcomes = futures::future::join_all(tasks).await;

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        let shared = outcomes
            .into_iter()
            .map(|o| o.unwrap())
            .inspect(|o| assert_eq!(o.result.as_ref().unwrap(), "bar"))
            .filter(|o| o.shared)
            .count();
        assert_eq!(shared, 9);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_new_generation_after_completion() {
        let coalescer = CallCoalescer::<u32>::new();

        let first = coalescer.run("key", || async { Ok(1) }).await;
        let second = coalescer.run("key", || async { Ok(2) }).await;

        assert_eq!(first.result.unwrap(), 1);
        assert_eq!(second.result.unwrap(), 2);
        assert!(!second.shared);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_distinct_keys_do_not_block() {
        let coalescer = Arc::new(CallCoalescer::<&'static str>::new());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let slow = {
            let coalescer = coalescer.clone();
            tokio::spawn(async move {
                coalescer
                    .run("slow", move || async move {
                        let _ = release_rx.await;
                        Ok("slow")
                    })
                    .await
            })
        };

        // Completes while "slow" is still pending
        let fast = coalescer.run("fast", || async { Ok("fast") }).await;
        assert_eq!(fast.result.unwrap(), "fast");

        release_tx.send(()).unwrap();
        assert_eq!(slow.await.unwrap().result.unwrap(), "slow");
    }

    async fn exploding_load() -> Result<u32> {
        panic!("loader exploded")
    }

    #[tokio::test]
    async fn test_panicking_call_releases_key() {
        let coalescer = CallCoalescer::<u32>::new();

        let first = coalescer.run("key", exploding_load).await;
        assert_matches!(first.result, Err(Error::Internal(_)));
        assert_eq!(coalescer.in_flight(), 0);

        let second = coalescer.run("key", || async { Ok(2) }).await;
        assert_eq!(second.result.unwrap(), 2);
        assert!(!second.shared);
    }

    #[tokio::test]
    async fn test_cancelled_sole_caller_releases_key() {
        let coalescer = Arc::new(CallCoalescer::<u32>::new());

        let stuck = {
            let coalescer = coalescer.clone();
            tokio::spawn(async move {
                coalescer
                    .run("key", || async {
                        futures::future::pending::<()>().await;
                        Ok(1)
                    })
                    .await
            })
        };
        while coalescer.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        stuck.abort();
        assert!(stuck.await.unwrap_err().is_cancelled());
        assert_eq!(coalescer.in_flight(), 0);

        let next = coalescer.run("key", || async { Ok(2) }).await;
        assert_eq!(next.result.unwrap(), 2);
        assert!(!next.shared);
    }

    #[tokio::test]
    async fn test_cancelled_caller_keeps_execution_for_others() {
        let coalescer = Arc::new(CallCoalescer::<u32>::new());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let leader = {
            let coalescer = coalescer.clone();
            tokio::spawn(async move {
                coalescer
                    .run("key", move || async move {
                        let _ = release_rx.await;
                        Ok(7)
                    })
                    .await
            })
        };
        while coalescer.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let follower = {
            let coalescer = coalescer.clone();
            tokio::spawn(async move {
                // Joins the leader's execution, so this load never runs
                coalescer.run("key", exploding_load).await
            })
        };
        while coalescer.waiters("key") < 2 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        let _ = leader.await;
        assert_eq!(coalescer.in_flight(), 1);

        release_tx.send(()).unwrap();
        let out = follower.await.unwrap();
        assert_eq!(out.result.unwrap(), 7);
        assert!(out.shared);
        assert_eq!(coalescer.in_flight(), 0);
    }
}
