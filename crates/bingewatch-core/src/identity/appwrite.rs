//! Appwrite account API backend.
//!
//! Sign-in uses the OAuth2 token flow: the browser is sent to the provider,
//! Appwrite redirects back to a localhost listener with `userId` + `secret`,
//! and those are exchanged for a session. The session secret is persisted by
//! [`SessionStore`] and sent as `X-Appwrite-Session` afterwards.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::callback::{CallbackParams, CallbackServer};
use super::store::SessionStore;
use super::{Identity, IdentityGateway, Session};
use crate::config::Config;
use crate::error::FetchError;

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const SESSION_HEADER: &str = "X-Appwrite-Session";
const FALLBACK_COOKIES_HEADER: &str = "X-Fallback-Cookies";

/// Opens the provider consent page.
pub type BrowserOpener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(rename = "$id", default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

pub struct AppwriteGateway {
    http: reqwest::Client,
    endpoint: String,
    project_id: String,
    platform: String,
    oauth_provider: String,
    login_timeout: Duration,
    store: SessionStore,
    browser: BrowserOpener,
}

impl AppwriteGateway {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        let defaults = Config::default().identity;
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            login_timeout: defaults.login_timeout(),
            platform: defaults.platform,
            oauth_provider: defaults.oauth_provider,
            store: SessionStore::default(),
            browser: Arc::new(open_in_browser),
        }
    }

    /// Builds a gateway from config.
    ///
    /// # Errors
    /// Fails when the endpoint or project ID is missing.
    pub fn from_config(config: &Config) -> Result<Self> {
        let identity = &config.identity;
        let endpoint = identity.effective_endpoint().ok_or_else(|| {
            anyhow!("identity.endpoint or BINGEWATCH_APPWRITE_ENDPOINT is required")
        })?;
        let project_id = identity.effective_project_id().ok_or_else(|| {
            anyhow!("identity.project_id or BINGEWATCH_APPWRITE_PROJECT_ID is required")
        })?;

        let mut gateway = Self::new(config.http_client()?, endpoint, project_id);
        gateway.platform.clone_from(&identity.platform);
        gateway.oauth_provider.clone_from(&identity.oauth_provider);
        gateway.login_timeout = identity.login_timeout();
        Ok(gateway)
    }

    #[must_use]
    pub fn with_store(mut self, store: SessionStore) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Replaces how the consent page is opened (default: system browser).
    #[must_use]
    pub fn with_browser<F>(mut self, open: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.browser = Arc::new(open);
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Consent URL for the configured OAuth provider.
    pub fn oauth_url(&self, redirect_uri: &str) -> String {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs([
                ("project", self.project_id.as_str()),
                ("success", redirect_uri),
                ("failure", redirect_uri),
            ])
            .finish();
        format!(
            "{}/account/tokens/oauth2/{}?{query}",
            self.endpoint, self.oauth_provider
        )
    }

    /// Initials avatar URL for a display name.
    pub fn avatar_url(&self, name: &str) -> String {
        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs([("name", name), ("project", self.project_id.as_str())])
            .finish();
        format!("{}/avatars/initials?{query}", self.endpoint)
    }

    /// Runs the full browser sign-in and persists the resulting session.
    ///
    /// # Errors
    /// Fails if the callback never arrives, lacks credentials, or the
    /// session cannot be created or saved.
    pub async fn login(&self) -> Result<Session> {
        let server = CallbackServer::bind().await?;
        let redirect_uri = server.redirect_uri();
        let auth_url = self.oauth_url(&redirect_uri);

        debug!(port = server.port(), "waiting for OAuth callback");
        (self.browser)(&auth_url);

        let params = server.wait(self.login_timeout).await?;
        self.create_session(&params).await
    }

    /// Exchanges callback credentials for a session and stores it.
    ///
    /// # Errors
    /// Fails if the provider rejects the exchange or returns no secret.
    pub async fn create_session(&self, params: &CallbackParams) -> Result<Session> {
        let response = self
            .request(self.http.post(self.url("account/sessions/token")))
            .json(&serde_json::json!({
                "userId": params.user_id,
                "secret": params.secret,
            }))
            .send()
            .await
            .context("Failed to send session request")?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            bail!("Failed to create session (HTTP {status}): {message}");
        }

        let fallback = fallback_cookie(&response, &self.project_id);
        let mut session: Session = response
            .json()
            .await
            .context("Failed to parse session response")?;
        if session.secret.is_empty() {
            session.secret = fallback
                .ok_or_else(|| anyhow!("Failed to create session: no session secret returned"))?;
        }

        self.store.save(&session)?;
        info!(user = %session.user_id, "session created");
        Ok(session)
    }

    /// Fetches the signed-in account.
    ///
    /// No stored session or an HTTP 401 both mean nobody is signed in.
    pub async fn current_identity(&self) -> Result<Option<Identity>, FetchError> {
        let Some(session) = self.store.load()? else {
            debug!("no stored session");
            return Ok(None);
        };

        let response = self
            .authed(self.http.get(self.url("account")), &session)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            debug!("stored session rejected");
            return Ok(None);
        }
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(FetchError::status(status, message));
        }

        let bytes = response.bytes().await?;
        let account: Account = serde_json::from_slice(&bytes)?;
        if account.id.is_empty() {
            return Ok(None);
        }

        let avatar = self.avatar_url(&account.name);
        Ok(Some(Identity {
            id: account.id,
            name: account.name,
            email: account.email,
            avatar,
        }))
    }

    /// Deletes the current session remotely and forgets it locally.
    ///
    /// # Errors
    /// Fails if there is no session or the provider refuses the delete.
    pub async fn logout(&self) -> Result<()> {
        let session = self
            .store
            .load()?
            .ok_or_else(|| anyhow!("No active session"))?;

        let response = self
            .authed(
                self.http.delete(self.url("account/sessions/current")),
                &session,
            )
            .send()
            .await
            .context("Failed to send logout request")?;

        let status = response.status();
        // An expired session is as good as deleted.
        if !status.is_success() && status != StatusCode::UNAUTHORIZED {
            let message = error_message(response).await;
            bail!("Failed to end session (HTTP {status}): {message}");
        }

        self.store.clear()?;
        info!("session ended");
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(PROJECT_HEADER, &self.project_id)
            .header(
                reqwest::header::USER_AGENT,
                format!("bingewatch ({})", self.platform),
            )
    }

    fn authed(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        self.request(builder).header(SESSION_HEADER, &session.secret)
    }
}

impl IdentityGateway for AppwriteGateway {
    fn initiate_login(&self) -> BoxFuture<'_, Option<Session>> {
        async move {
            match self.login().await {
                Ok(session) => Some(session),
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "login failed");
                    None
                }
            }
        }
        .boxed()
    }

    fn get_current_identity(&self) -> BoxFuture<'_, Result<Option<Identity>, FetchError>> {
        self.current_identity().boxed()
    }

    fn end_session(&self) -> BoxFuture<'_, bool> {
        async move {
            match self.logout().await {
                Ok(()) => true,
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "logout failed");
                    false
                }
            }
        }
        .boxed()
    }
}

/// Opens `url` in the system browser, logging if that is not possible.
pub fn open_in_browser(url: &str) {
    if let Err(err) = open::that(url) {
        warn!(error = %err, "could not open browser");
    }
}

/// Reads `a_session_<project>` from the fallback cookie header, if present.
fn fallback_cookie(response: &Response, project_id: &str) -> Option<String> {
    let raw = response
        .headers()
        .get(FALLBACK_COOKIES_HEADER)?
        .to_str()
        .ok()?;
    let cookies: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw).ok()?;
    cookies
        .get(&format!("a_session_{project_id}"))
        .and_then(serde_json::Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|err| err.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body
            }
        })
}
