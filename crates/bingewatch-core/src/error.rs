//! Failure classification for fetch operations.
//!
//! Anything an `AsyncResource` wraps returns `Result<T, FetchError>`. The kind
//! is decided once, at the HTTP/provider boundary; the resource itself only
//! ever looks at the message.

use thiserror::Error;

/// Message used when a failure carries nothing readable.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport failure (connect, TLS, timeout).
    #[error("{0}")]
    Http(String),
    /// Server answered with a non-success status.
    #[error("{message}")]
    Status { status: u16, message: String },
    /// Response body could not be decoded.
    #[error("{0}")]
    Decode(String),
    /// The provider rejected the request or returned something unusable.
    #[error("{0}")]
    Provider(String),
    #[error("An unknown error occurred")]
    Unknown,
}

impl FetchError {
    pub fn provider(message: impl Into<String>) -> Self {
        FetchError::Provider(message.into())
    }

    pub fn status(status: reqwest::StatusCode, message: impl Into<String>) -> Self {
        FetchError::Status {
            status: status.as_u16(),
            message: message.into(),
        }
    }

    /// Human-readable message, falling back to [`UNKNOWN_ERROR_MESSAGE`].
    pub fn message(&self) -> String {
        let text = self.to_string();
        if text.trim().is_empty() {
            UNKNOWN_ERROR_MESSAGE.to_string()
        } else {
            text
        }
    }

    /// Classifies an `anyhow` error chain.
    ///
    /// Known error types keep their kind; any other error becomes
    /// `Provider` with the full context chain as its message.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        if let Some(fetch) = err.downcast_ref::<FetchError>() {
            return fetch.clone();
        }
        if let Some(http) = err.downcast_ref::<reqwest::Error>() {
            return FetchError::from_reqwest(http);
        }
        if let Some(json) = err.downcast_ref::<serde_json::Error>() {
            return FetchError::Decode(json.to_string());
        }
        let text = format!("{err:#}");
        if text.trim().is_empty() {
            FetchError::Unknown
        } else {
            FetchError::Provider(text)
        }
    }

    fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            return FetchError::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return FetchError::status(status, err.to_string());
        }
        FetchError::Http(err.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::from_reqwest(&err)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        FetchError::from_anyhow(&err)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn test_message_uses_provider_text() {
        assert_eq!(FetchError::provider("boom").message(), "boom");
    }

    #[test]
    fn test_unknown_and_empty_fall_back() {
        assert_eq!(FetchError::Unknown.message(), UNKNOWN_ERROR_MESSAGE);
        assert_eq!(FetchError::provider("  ").message(), UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn test_from_anyhow_keeps_fetch_error_kind() {
        let err = anyhow::Error::new(FetchError::Status {
            status: 503,
            message: "unavailable".to_string(),
        });
        assert_eq!(
            FetchError::from_anyhow(&err),
            FetchError::Status {
                status: 503,
                message: "unavailable".to_string()
            }
        );
    }

    #[test]
    fn test_from_anyhow_classifies_json_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{")
            .context("parse body")
            .unwrap_err();
        assert!(matches!(FetchError::from_anyhow(&err), FetchError::Decode(_)));
    }

    #[test]
    fn test_from_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("socket closed").context("load profile");
        assert_eq!(
            FetchError::from_anyhow(&err).message(),
            "load profile: socket closed"
        );
    }
}
