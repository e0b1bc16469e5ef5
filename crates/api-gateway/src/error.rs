//! Error classification for gateway calls

use reqwest::StatusCode;
use serde_json::Value;

/// User-facing message for a call that hit the timeout ceiling.
pub const TIMEOUT_MESSAGE: &str = "Request timeout - server did not respond";

/// Failures surfaced to the caller of `Gateway::call`.
///
/// Redirect outcomes are not errors; see `Outcome::Redirect`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 4xx/5xx from the API (other than 401), with the best message available
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The attempt exceeded the timeout ceiling and was aborted
    #[error("{}", TIMEOUT_MESSAGE)]
    Timeout,

    /// DNS, connect, or mid-response failure. The cause is kept for logging.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The request could not be assembled (bad endpoint, unusable token)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Upstream HTTP status, for `Api` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Error::Api { status, .. } if *status >= 500 => "server_error",
            Error::Api { .. } => "client_error",
            Error::Timeout => "timeout",
            Error::Network(_) => "network_failure",
            Error::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Classify a reqwest failure from sending or reading a response.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if err.is_builder() {
            Error::InvalidRequest(err.to_string())
        } else {
            Error::Network(err)
        }
    }

    /// Build an `Api` error from a failure status and its raw body.
    ///
    /// Uses the body's JSON `message` field when there is one, otherwise
    /// `API Error: <status> <reason phrase>`.
    pub(crate) fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|json| {
                json.get("message")
                    .and_then(Value::as_str)
                    .filter(|m| !m.trim().is_empty())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| {
                format!(
                    "API Error: {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown Status")
                )
            });
        Error::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Result alias for gateway calls.
pub type Result<T> = std::result::Result<T, Error>;
