//! Core bingewatch library (session state, async resources, API clients, config).

pub mod catalog;
pub mod config;
pub mod debounce;
pub mod error;
pub mod identity;
pub mod logging;
pub mod resource;
pub mod session;
pub mod task;

pub use error::FetchError;
pub use resource::{AsyncResource, ResourceState};
pub use session::{
    SessionContext, SessionError, SessionPhase, SessionProvider, SessionState, try_use_session,
    use_session,
};
