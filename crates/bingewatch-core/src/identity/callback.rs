//! Localhost listener for the OAuth redirect.
//!
//! The provider redirects the browser to `http://localhost:<port>/callback`
//! with `userId` and `secret` query parameters once consent is given.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

/// Local OAuth callback path (port is dynamic).
pub const LOCAL_CALLBACK_PATH: &str = "/callback";

const SUCCESS_PAGE: &str = "<html><body><h3>Signed in to bingewatch.</h3>\
<p>You can close this window and return to the terminal.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><h3>Sign-in failed.</h3>\
<p>Return to the terminal for details.</p></body></html>";

/// Credentials carried by the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub user_id: String,
    pub secret: String,
}

impl CallbackParams {
    /// Extracts `userId` and `secret` from a callback URL.
    ///
    /// # Errors
    /// Fails if the URL cannot be parsed or either parameter is missing.
    pub fn from_url(url: &url::Url) -> Result<Self> {
        let find = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        match (find("userId"), find("secret")) {
            (Some(user_id), Some(secret)) => Ok(Self { user_id, secret }),
            _ => bail!("Could not authenticate: callback is missing userId or secret"),
        }
    }
}

pub struct CallbackServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackServer {
    /// Binds a listener on a free localhost port.
    ///
    /// # Errors
    /// Fails if no local port can be bound.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind local OAuth callback listener")?;
        let addr = listener
            .local_addr()
            .context("Failed to read callback listener address")?;
        Ok(Self { listener, addr })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Builds the redirect URI for this listener.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}{LOCAL_CALLBACK_PATH}", self.port())
    }

    /// Waits for the browser to hit the callback path.
    ///
    /// Requests for other paths (favicon, probes) get a 404 and are skipped.
    ///
    /// # Errors
    /// Fails on timeout, I/O failure, or a callback without credentials.
    pub async fn wait(self, timeout: Duration) -> Result<CallbackParams> {
        tokio::time::timeout(timeout, self.accept_callback())
            .await
            .map_err(|_elapsed| anyhow!("Timed out waiting for the login callback"))?
    }

    async fn accept_callback(&self) -> Result<CallbackParams> {
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .context("Failed to accept callback connection")?;
            debug!(%peer, "callback connection");
            if let Some(result) = handle_connection(stream, self.port()).await? {
                return result;
            }
        }
    }
}

/// Returns `Ok(None)` for requests that are not the callback.
async fn handle_connection(
    stream: TcpStream,
    port: u16,
) -> Result<Option<Result<CallbackParams>>> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .context("Failed to read callback request")?;

    // Drain headers so the socket closes cleanly.
    let mut header = String::new();
    loop {
        header.clear();
        let read = reader
            .read_line(&mut header)
            .await
            .context("Failed to read callback headers")?;
        if read == 0 || header.trim().is_empty() {
            break;
        }
    }

    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let url = url::Url::parse(&format!("http://localhost:{port}{target}"))
        .context("Failed to parse callback request target")?;

    if url.path() != LOCAL_CALLBACK_PATH {
        respond(reader.get_mut(), "404 Not Found", "").await?;
        return Ok(None);
    }

    let params = CallbackParams::from_url(&url);
    let page = if params.is_ok() {
        SUCCESS_PAGE
    } else {
        FAILURE_PAGE
    };
    respond(reader.get_mut(), "200 OK", page).await?;
    Ok(Some(params))
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) -> Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream
        .write_all(response.as_bytes())
        .await
        .context("Failed to write callback response")?;
    stream.shutdown().await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    fn can_bind_localhost() -> bool {
        std::net::TcpListener::bind("127.0.0.1:0").is_ok()
    }

    async fn send(port: u16, target: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_params_from_url() {
        let url = url::Url::parse("http://localhost:1/callback?userId=u1&secret=abc").unwrap();
        assert_eq!(
            CallbackParams::from_url(&url).unwrap(),
            CallbackParams {
                user_id: "u1".to_string(),
                secret: "abc".to_string()
            }
        );

        let missing = url::Url::parse("http://localhost:1/callback?userId=u1").unwrap();
        assert!(CallbackParams::from_url(&missing).is_err());
    }

    #[tokio::test]
    async fn test_wait_skips_other_paths_and_returns_params() {
        if !can_bind_localhost() {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        }
        let server = CallbackServer::bind().await.unwrap();
        let port = server.port();
        assert!(server.redirect_uri().ends_with("/callback"));

        let waiter = tokio::spawn(server.wait(Duration::from_secs(5)));

        let favicon = send(port, "/favicon.ico").await;
        assert!(favicon.starts_with("HTTP/1.1 404"));

        let ok = send(port, "/callback?userId=u1&secret=s1").await;
        assert!(ok.starts_with("HTTP/1.1 200"));

        let params = waiter.await.unwrap().unwrap();
        assert_eq!(params.user_id, "u1");
        assert_eq!(params.secret, "s1");
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        if !can_bind_localhost() {
            eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
            return;
        }
        let server = CallbackServer::bind().await.unwrap();
        let err = server.wait(Duration::from_millis(20)).await.unwrap_err();
        assert!(err.to_string().contains("Timed out"));
    }
}
