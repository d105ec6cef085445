//! Session command handlers (login, logout, whoami).
//!
//! Sign-in and sign-out go through the gateway; the session is reloaded
//! afterwards to pick up the new identity.

use std::sync::Arc;

use anyhow::{Result, bail};
use bingewatch_core::config::{Config, paths};
use bingewatch_core::identity::{AppwriteGateway, Identity, IdentityGateway, open_in_browser};
use bingewatch_core::{SessionContext, SessionProvider, SessionState, use_session};

fn start_session(config: &Config) -> Result<(Arc<AppwriteGateway>, SessionContext)> {
    let gateway = AppwriteGateway::from_config(config)?.with_browser(|url| {
        eprintln!("Opening your browser to sign in. If nothing happens, visit:");
        eprintln!("  {url}");
        open_in_browser(url);
    });
    let gateway = Arc::new(gateway);
    let checker: Arc<dyn IdentityGateway> = Arc::<AppwriteGateway>::clone(&gateway);
    Ok((gateway, SessionContext::start(checker)))
}

fn print_identity(identity: &Identity) {
    println!("{} <{}>", identity.name, identity.email);
    println!("id:     {}", identity.id);
    println!("avatar: {}", identity.avatar);
}

fn report_check_failure(state: &SessionState) {
    if let Some(err) = state.error() {
        eprintln!("Error: could not verify session: {err}");
    }
}

pub async fn login(config: &Config) -> Result<()> {
    let (gateway, session) = start_session(config)?;

    let state = session.settled().await;
    if let Some(identity) = state.identity() {
        println!("Already logged in as {}", identity.name);
        return Ok(());
    }

    if gateway.initiate_login().await.is_none() {
        bail!(
            "Error logging in. See logs in {} for details",
            paths::logs_dir().display()
        );
    }
    session.reload().await;

    let state = session.state();
    match state.identity() {
        Some(identity) => {
            println!("Welcome, {}!", identity.name);
            Ok(())
        }
        None => {
            report_check_failure(&state);
            bail!("Signed in, but the account could not be loaded")
        }
    }
}

pub async fn logout(config: &Config) -> Result<()> {
    let (gateway, session) = start_session(config)?;

    let state = session.settled().await;
    if !state.is_logged_in() && !state.auth_check_failed() {
        println!("Not logged in");
        return Ok(());
    }

    let ended = gateway.end_session().await;
    session.reload().await;
    if !ended {
        bail!(
            "Error logging out. See logs in {} for details",
            paths::logs_dir().display()
        );
    }
    println!("Logged out");
    Ok(())
}

pub async fn whoami(config: &Config) -> Result<()> {
    let (_gateway, session) = start_session(config)?;

    SessionProvider::scope(session, async {
        let state = use_session().settled().await;
        match state.identity() {
            Some(identity) => print_identity(identity),
            None => println!("Not logged in"),
        }
        report_check_failure(&state);
    })
    .await;
    Ok(())
}
