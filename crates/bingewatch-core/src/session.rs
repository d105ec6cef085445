//! Shared authentication state.
//!
//! A `SessionContext` owns exactly one `AsyncResource` bound to
//! `IdentityGateway::get_current_identity`. The application root creates it
//! once and hands clones around, or installs it with [`SessionProvider`] so
//! code further down can reach it through [`use_session`].

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::identity::{Identity, IdentityGateway};
use crate::resource::{AsyncResource, ResourceState};

tokio::task_local! {
    static CURRENT_SESSION: SessionContext;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("use_session must be called within a SessionProvider scope")]
    NoProvider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// First identity check still running.
    Initializing,
    Authenticated,
    Unauthenticated,
}

/// Snapshot of the session as seen by consumers.
///
/// `is_logged_in` has no backing field; it is always `identity.is_some()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    identity: Option<Identity>,
    loading: bool,
    error: Option<String>,
}

impl SessionState {
    fn from_resource(state: ResourceState<Option<Identity>>) -> Self {
        Self {
            identity: state.value.flatten(),
            loading: state.is_loading,
            error: state.error,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.identity.is_some()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    /// Message of the most recent failed identity check.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// True when the last identity check failed rather than finding nobody.
    pub fn auth_check_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.identity, self.loading) {
            (Some(_), _) => SessionPhase::Authenticated,
            (None, true) => SessionPhase::Initializing,
            (None, false) => SessionPhase::Unauthenticated,
        }
    }
}

/// Stream of [`SessionState`] changes.
pub struct SessionSubscription {
    rx: watch::Receiver<ResourceState<Option<Identity>>>,
}

impl SessionSubscription {
    pub fn current(&self) -> SessionState {
        SessionState::from_resource(self.rx.borrow().clone())
    }

    /// Waits for the next change. `None` once the session is gone.
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(SessionState::from_resource(
            self.rx.borrow_and_update().clone(),
        ))
    }
}

/// Handle to the application's single session.
///
/// Only reads the current identity. Sign-in and sign-out go through the
/// gateway directly; callers then `reload()` to pick up the new state.
///
/// Clones share one resource; the identity check is torn down when the last
/// clone drops.
#[derive(Debug, Clone)]
pub struct SessionContext {
    resource: AsyncResource<Option<Identity>>,
}

impl SessionContext {
    /// Creates the session and starts the first identity check.
    ///
    /// # Panics
    /// Panics if no tokio runtime is running.
    pub fn start(gateway: Arc<dyn IdentityGateway>) -> Self {
        Self::build(gateway, None::<fn(&str)>)
    }

    /// Like [`SessionContext::start`], also reporting failed checks to `notify`.
    ///
    /// # Panics
    /// Panics if no tokio runtime is running.
    pub fn start_with_notifier<F>(gateway: Arc<dyn IdentityGateway>, notify: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::build(gateway, Some(notify))
    }

    fn build<F>(gateway: Arc<dyn IdentityGateway>, notify: Option<F>) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let mut builder = AsyncResource::builder(move |()| {
            let gateway = Arc::clone(&gateway);
            async move { gateway.get_current_identity().await }
        });
        if let Some(notify) = notify {
            builder = builder.on_error(notify);
        }
        debug!("session started");
        Self {
            resource: builder.start(),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_resource(self.resource.snapshot())
    }

    /// Re-runs the identity check. Loading is raised and the check dispatched
    /// before this returns; awaiting waits for it to settle.
    pub fn reload(&self) -> impl Future<Output = ()> + Send + 'static {
        self.resource.reload(())
    }

    /// Waits for any running identity check, then returns the state.
    pub async fn settled(&self) -> SessionState {
        SessionState::from_resource(self.resource.settled().await)
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            rx: self.resource.subscribe(),
        }
    }

    pub fn shutdown(&self) {
        self.resource.shutdown();
    }
}

/// Installs a [`SessionContext`] for everything awaited inside a scope.
pub struct SessionProvider;

impl SessionProvider {
    pub async fn scope<F: Future>(session: SessionContext, fut: F) -> F::Output {
        CURRENT_SESSION.scope(session, fut).await
    }

    pub fn sync_scope<R>(session: SessionContext, f: impl FnOnce() -> R) -> R {
        CURRENT_SESSION.sync_scope(session, f)
    }
}

/// The session installed by the enclosing [`SessionProvider`].
///
/// # Panics
/// Panics when called outside a provider scope.
pub fn use_session() -> SessionContext {
    match try_use_session() {
        Ok(session) => session,
        Err(err) => panic!("{err}"),
    }
}

/// Like [`use_session`], but reports a missing provider instead of panicking.
///
/// # Errors
/// Returns [`SessionError::NoProvider`] outside a provider scope.
pub fn try_use_session() -> Result<SessionContext, SessionError> {
    CURRENT_SESSION
        .try_with(SessionContext::clone)
        .map_err(|_access| SessionError::NoProvider)
}
