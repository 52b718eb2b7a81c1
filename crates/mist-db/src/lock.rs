use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{MistError, MistResult};

/// Exclusive access to the value behind a [`LockManager`].
pub type LockGuard<'a, T> = MutexGuard<'a, T>;

/// Serializes every read and write against a store.
///
/// Requests are granted strictly in arrival order. A queued request can be
/// abandoned by dropping its future, by an optional deadline, or through
/// [`acquire_or_cancel`](Self::acquire_or_cancel); abandoning one never
/// disturbs the requests queued behind it.
pub struct LockManager<T> {
    inner: Mutex<T>,
    timeout: Option<Duration>,
    tickets: AtomicU64,
    queued: AtomicUsize,
}

struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<T> LockManager<T> {
    pub fn new(value: T, timeout: Option<Duration>) -> Self {
        Self {
            inner: Mutex::new(value),
            timeout,
            tickets: AtomicU64::new(0),
            queued: AtomicUsize::new(0),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Requests currently waiting for the lock.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Wait for exclusive access, failing with
    /// [`LockTimeout`](MistError::LockTimeout) once the deadline passes.
    pub async fn acquire(&self) -> MistResult<LockGuard<'_, T>> {
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst);
        let waiting = Waiting::enter(&self.queued);
        let guard = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inner.lock()).await {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(ticket, ?limit, "lock request timed out");
                    return Err(MistError::LockTimeout(limit));
                }
            },
            None => self.inner.lock().await,
        };
        drop(waiting);
        debug!(ticket, "lock acquired");
        Ok(guard)
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`Cancelled`](MistError::Cancelled) if `cancel` completes first.
    pub async fn acquire_or_cancel<F>(&self, cancel: F) -> MistResult<LockGuard<'_, T>>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            guard = self.acquire() => guard,
            () = cancel => {
                debug!("lock request cancelled");
                Err(MistError::Cancelled)
            }
        }
    }

    /// Access without queueing; possible only with exclusive ownership.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SETTLE: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn requests_are_granted_in_arrival_order() {
        let lock = Arc::new(LockManager::new(Vec::new(), None));
        let held = lock.acquire().await.unwrap();

        let mut handles = Vec::new();
        for id in 1..=3u32 {
            let lock = Arc::clone(&lock);
            handles.push(tokio::spawn(async move {
                let mut order = lock.acquire().await.unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
                order.push(id);
            }));
            tokio::time::sleep(SETTLE).await;
        }
        assert_eq!(lock.queued(), 3);

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*lock.acquire().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(lock.queued(), 0);
    }

    #[tokio::test]
    async fn queued_request_times_out() {
        let lock = LockManager::new((), Some(Duration::from_millis(20)));
        let _held = lock.acquire().await.unwrap();
        let err = lock.acquire().await.unwrap_err();
        assert_eq!(err.code(), MistError::LOCK_TIMEOUT);
        assert_eq!(lock.queued(), 0);
    }

    #[tokio::test]
    async fn cancelled_request_leaves_queue_intact() {
        let lock = Arc::new(LockManager::new(Vec::new(), None));
        let held = lock.acquire().await.unwrap();

        let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel::<()>();
        let cancelled = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                lock.acquire_or_cancel(async {
                    let _ = cancel_rx.await;
                })
                .await
                .map(|_| ())
            })
        };
        tokio::time::sleep(SETTLE).await;

        let survivor = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                lock.acquire().await.unwrap().push("survivor");
            })
        };
        tokio::time::sleep(SETTLE).await;

        cancel_tx.send(()).unwrap();
        let err = cancelled.await.unwrap().unwrap_err();
        assert!(matches!(err, MistError::Cancelled));

        drop(held);
        survivor.await.unwrap();
        assert_eq!(*lock.acquire().await.unwrap(), vec!["survivor"]);
    }

    #[tokio::test]
    async fn uncontended_acquire_ignores_timeout() {
        let lock = LockManager::new(5, Some(Duration::from_millis(1)));
        assert_eq!(*lock.acquire().await.unwrap(), 5);
        assert_eq!(*lock.acquire().await.unwrap(), 5);
    }
}
