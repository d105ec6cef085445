//! Trailing-edge debouncer for bursty input (search-as-you-type).
//!
//! Each `call` issues a new `TaskId` and arms a timer. When a timer fires it
//! only delivers if its id is still the latest, so a burst collapses into a
//! single delivery of the last value.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::task::{TaskId, TaskSeq};

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

struct Pending<T> {
    seq: TaskSeq,
    value: Option<T>,
}

struct Inner<T> {
    delay: Duration,
    callback: Callback<T>,
    pending: Mutex<Pending<T>>,
}

impl<T> Inner<T> {
    fn pending(&self) -> MutexGuard<'_, Pending<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(&self, id: TaskId) {
        let value = {
            let mut pending = self.pending();
            if !pending.seq.is_latest(id) {
                return;
            }
            pending.value.take()
        };
        if let Some(value) = value {
            debug!(task = id.0, "debounce window elapsed");
            (self.callback)(value);
        }
    }
}

/// Delays delivery until input has been quiet for `delay`.
///
/// Dropping the debouncer discards any pending value.
pub struct Debouncer<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F>(delay: Duration, callback: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                delay,
                callback: Arc::new(callback),
                pending: Mutex::new(Pending {
                    seq: TaskSeq::default(),
                    value: None,
                }),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Replaces the pending value and restarts the window.
    ///
    /// # Panics
    /// Panics if no tokio runtime is running.
    pub fn call(&self, value: T) {
        let id = {
            let mut pending = self.inner.pending();
            pending.value = Some(value);
            pending.seq.next_id()
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            inner.fire(id);
        });
    }

    /// Delivers the pending value now, if any. Returns whether one was delivered.
    pub fn flush(&self) -> bool {
        let value = {
            let mut pending = self.inner.pending();
            pending.seq.invalidate();
            pending.value.take()
        };
        match value {
            Some(value) => {
                (self.inner.callback)(value);
                true
            }
            None => false,
        }
    }

    /// Drops the pending value without delivering it.
    pub fn cancel(&self) {
        let mut pending = self.inner.pending();
        pending.seq.invalidate();
        pending.value = None;
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let mut pending = self.inner.pending();
        pending.seq.invalidate();
        pending.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |value: &'static str| sink.lock().unwrap().push(value))
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_last_value() {
        let (seen, callback) = recorder();
        let debouncer = Debouncer::new(Duration::from_millis(500), callback);

        debouncer.call("d");
        sleep_ms(100).await;
        debouncer.call("du");
        sleep_ms(100).await;
        debouncer.call("dune");

        sleep_ms(499).await;
        assert!(seen.lock().unwrap().is_empty());

        sleep_ms(10).await;
        assert_eq!(*seen.lock().unwrap(), vec!["dune"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_calls_each_fire() {
        let (seen, callback) = recorder();
        let debouncer = Debouncer::new(Duration::from_millis(500), callback);

        debouncer.call("alien");
        sleep_ms(600).await;
        debouncer.call("aliens");
        sleep_ms(600).await;

        assert_eq!(*seen.lock().unwrap(), vec!["alien", "aliens"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_delivers_once() {
        let (seen, callback) = recorder();
        let debouncer = Debouncer::new(Duration::from_millis(500), callback);

        debouncer.call("heat");
        assert!(debouncer.flush());
        assert!(!debouncer.flush());

        sleep_ms(600).await;
        assert_eq!(*seen.lock().unwrap(), vec!["heat"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_drop_discard_pending() {
        let (seen, callback) = recorder();
        let debouncer = Debouncer::new(Duration::from_millis(500), callback);

        debouncer.call("cancelled");
        debouncer.cancel();
        sleep_ms(600).await;

        debouncer.call("dropped");
        drop(debouncer);
        sleep_ms(600).await;

        assert!(seen.lock().unwrap().is_empty());
    }
}
