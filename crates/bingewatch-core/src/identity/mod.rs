//! Identity provider boundary.
//!
//! The rest of the crate only sees the three operations on
//! [`IdentityGateway`]; [`AppwriteGateway`] is the concrete backend.

mod appwrite;
mod callback;
mod store;

pub use appwrite::{AppwriteGateway, BrowserOpener, open_in_browser};
pub use callback::{CallbackParams, CallbackServer};
pub use store::SessionStore;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// The authenticated user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Avatar image URL (initials rendered by the provider).
    pub avatar: String,
}

/// An authenticated session as issued by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Expiry timestamp (ISO 8601) as reported by the provider.
    #[serde(default)]
    pub expire: String,
    #[serde(default)]
    pub provider: String,
    /// Credential sent back on every authenticated request.
    #[serde(default)]
    pub secret: String,
}

/// Remote identity service: login, current identity, logout.
pub trait IdentityGateway: Send + Sync {
    /// Runs the provider's sign-in flow. `None` on any failure.
    fn initiate_login(&self) -> BoxFuture<'_, Option<Session>>;

    /// The currently signed-in identity; `Ok(None)` when nobody is signed in.
    fn get_current_identity(&self) -> BoxFuture<'_, Result<Option<Identity>, FetchError>>;

    /// Terminates the current session. Returns whether it succeeded.
    fn end_session(&self) -> BoxFuture<'_, bool>;
}
