//! Generic async resource: one fetch operation exposed as observable state.
//!
//! An `AsyncResource<T, P>` wraps `fn(P) -> Future<Result<T, FetchError>>` and
//! publishes `{value, is_loading, error}` through a `watch` channel. Callers
//! never write the state; they ask for a new fetch with `reload`.
//!
//! ## Ordering
//!
//! Each dispatched fetch takes a `TaskId` from the resource's `TaskSeq`.
//! A settled fetch only publishes if its id is still the latest issued, so
//! overlapping reloads resolve last-issued-wins. Stale results are dropped.
//!
//! ## Teardown
//!
//! The resource owns a `CancellationToken`. It is cancelled when the last
//! `AsyncResource` handle drops or `shutdown()` is called. In-flight fetches
//! race the token and nothing is published once it fires.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::task::{TaskId, TaskSeq};

pub type FetchFuture<T> = BoxFuture<'static, Result<T, FetchError>>;

/// Receives the message of every failed fetch (UI-layer alerts, stderr, ...).
pub type ErrorNotifier = Arc<dyn Fn(&str) + Send + Sync>;

type Fetcher<T, P> = Arc<dyn Fn(P) -> FetchFuture<T> + Send + Sync>;

/// Observable state of an [`AsyncResource`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    /// Last successful result. Untouched by failures.
    pub value: Option<T>,
    /// True from dispatch until the latest issued fetch settles.
    pub is_loading: bool,
    /// Message of the most recent failure; cleared when a fetch starts.
    pub error: Option<String>,
}

impl<T> ResourceState<T> {
    fn idle() -> Self {
        Self {
            value: None,
            is_loading: false,
            error: None,
        }
    }
}

struct Shared<T, P> {
    fetcher: Fetcher<T, P>,
    state: watch::Sender<ResourceState<T>>,
    seq: Mutex<TaskSeq>,
    cancel: CancellationToken,
    notifier: Option<ErrorNotifier>,
}

impl<T, P> Shared<T, P>
where
    T: Send + Sync + 'static,
    P: Send + 'static,
{
    fn seq(&self) -> MutexGuard<'_, TaskSeq> {
        self.seq.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues a new task id and flips the state to loading.
    fn begin(&self) -> Option<TaskId> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let mut seq = self.seq();
        let id = seq.next_id();
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });
        debug!(task = id.0, "fetch dispatched");
        Some(id)
    }

    fn shutdown(&self) {
        let mut seq = self.seq();
        if self.cancel.is_cancelled() {
            return;
        }
        seq.invalidate();
        self.cancel.cancel();
        self.state.send_if_modified(|state| {
            let was_loading = state.is_loading;
            state.is_loading = false;
            was_loading
        });
        debug!("resource shut down");
    }

    async fn run(&self, id: TaskId, params: P) {
        let fetch = (self.fetcher)(params);
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                debug!(task = id.0, "resource torn down, abandoning fetch");
                return;
            }
            result = fetch => result,
        };
        self.settle(id, result);
    }

    fn settle(&self, id: TaskId, result: Result<T, FetchError>) {
        let seq = self.seq();
        if self.cancel.is_cancelled() {
            return;
        }
        if !seq.is_latest(id) {
            debug!(task = id.0, latest = ?seq.latest(), "discarding stale fetch result");
            return;
        }

        match result {
            Ok(value) => {
                self.state.send_modify(|state| {
                    state.value = Some(value);
                    state.is_loading = false;
                });
                debug!(task = id.0, "fetch settled");
            }
            Err(err) => {
                let message = err.message();
                warn!(task = id.0, error = %message, "fetch failed");
                self.state.send_modify(|state| {
                    state.error = Some(message.clone());
                    state.is_loading = false;
                });
                drop(seq);
                if let Some(notify) = &self.notifier {
                    notify(&message);
                }
            }
        }
    }
}

/// Builder for [`AsyncResource`].
pub struct ResourceBuilder<T, P> {
    fetcher: Fetcher<T, P>,
    params: Option<P>,
    auto_start: bool,
    notifier: Option<ErrorNotifier>,
}

impl<T, P> ResourceBuilder<T, P>
where
    T: Send + Sync + 'static,
    P: Send + 'static,
{
    /// Parameters for the automatic first fetch (default: `P::default()`).
    #[must_use]
    pub fn params(mut self, params: P) -> Self {
        self.params = Some(params);
        self
    }

    /// Whether to dispatch one fetch as soon as the resource starts (default: true).
    #[must_use]
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Registers a callback invoked with the message of every failed fetch.
    #[must_use]
    pub fn on_error<F>(mut self, notify: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.notifier = Some(Arc::new(notify));
        self
    }

    /// Creates the resource, dispatching the first fetch when auto-start is on.
    ///
    /// # Panics
    /// Panics if auto-start is on and no tokio runtime is running.
    pub fn start(self) -> AsyncResource<T, P>
    where
        P: Default,
    {
        let ResourceBuilder {
            fetcher,
            params,
            auto_start,
            notifier,
        } = self;

        let (state, _) = watch::channel(ResourceState::idle());
        let cancel = CancellationToken::new();
        let resource = AsyncResource {
            shared: Arc::new(Shared {
                fetcher,
                state,
                seq: Mutex::new(TaskSeq::default()),
                cancel: cancel.clone(),
                notifier,
            }),
            teardown: Arc::new(cancel.drop_guard()),
        };

        if auto_start {
            resource.spawn_reload(params.unwrap_or_default());
        }
        resource
    }
}

/// Observable wrapper around one async fetch operation.
///
/// Cloning yields another handle to the same state. The resource is torn
/// down when the last handle drops.
pub struct AsyncResource<T, P = ()> {
    shared: Arc<Shared<T, P>>,
    teardown: Arc<DropGuard>,
}

impl<T, P> Clone for AsyncResource<T, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            teardown: Arc::clone(&self.teardown),
        }
    }
}

impl<T: fmt::Debug, P> fmt::Debug for AsyncResource<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResource")
            .field("state", &*self.shared.state.borrow())
            .field("shut_down", &self.shared.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<T, P> AsyncResource<T, P>
where
    T: Send + Sync + 'static,
    P: Send + 'static,
{
    /// Starts configuring a resource around `fetcher`.
    pub fn builder<F, Fut>(fetcher: F) -> ResourceBuilder<T, P>
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        ResourceBuilder {
            fetcher: Arc::new(move |params| fetcher(params).boxed()),
            params: None,
            auto_start: true,
            notifier: None,
        }
    }

    /// Creates a resource with default params that fetches immediately.
    ///
    /// # Panics
    /// Panics if no tokio runtime is running.
    pub fn new<F, Fut>(fetcher: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
        P: Default,
    {
        Self::builder(fetcher).start()
    }

    /// Requests a fresh fetch with `params`.
    ///
    /// The loading flag is raised, the previous error cleared and the fetch
    /// dispatched before this returns. The returned future only waits for it
    /// to settle; dropping it early does not abandon the fetch. Failures never
    /// surface here, only through the resource state.
    ///
    /// # Panics
    /// Panics if no tokio runtime is running.
    pub fn reload(&self, params: P) -> impl Future<Output = ()> + Send + 'static {
        let handle = self.spawn_reload(params);
        async move {
            if let Some(handle) = handle
                && let Err(err) = handle.await
            {
                warn!(error = %err, "reload task failed");
            }
        }
    }

    /// Dispatches a reload on the runtime without waiting for it.
    ///
    /// Returns `None` if the resource has been shut down.
    ///
    /// # Panics
    /// Panics if no tokio runtime is running.
    pub fn spawn_reload(&self, params: P) -> Option<JoinHandle<()>> {
        let id = self.shared.begin()?;
        let shared = Arc::clone(&self.shared);
        Some(tokio::spawn(async move {
            shared.run(id, params).await;
        }))
    }

    /// Returns a receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.shared.state.subscribe()
    }

    /// Tears the resource down. In-flight fetches are abandoned and later
    /// reloads are ignored.
    ///
    /// The final published state is settled (`is_loading == false`).
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }
}

impl<T, P> AsyncResource<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Send + 'static,
{
    /// Current state.
    pub fn snapshot(&self) -> ResourceState<T> {
        self.shared.state.borrow().clone()
    }

    /// Waits until no fetch is in flight, then returns the state.
    ///
    /// Returns immediately with the current state if the resource is shut down.
    pub async fn settled(&self) -> ResourceState<T> {
        let mut rx = self.shared.state.subscribe();
        let wait = async move {
            rx.wait_for(|state| !state.is_loading)
                .await
                .map(|state| (*state).clone())
                .ok()
        };
        tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => self.snapshot(),
            state = wait => state.unwrap_or_else(|| self.snapshot()),
        }
    }
}
