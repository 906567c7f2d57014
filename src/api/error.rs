//! Error taxonomy for the transport and API layers

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Classification of a failed wire call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not establish a connection (refused, DNS, TLS handshake).
    ConnectionFailed,
    /// The request exceeded the configured timeout.
    Timeout,
    /// Anything else: malformed request, body read failure, redirect loop.
    Unexpected,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::ConnectionFailed => "connection failed",
            TransportErrorKind::Timeout => "timed out",
            TransportErrorKind::Unexpected => "unexpected transport error",
        };
        f.write_str(s)
    }
}

/// A request that never produced an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Connection failures and timeouts are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::ConnectionFailed | TransportErrorKind::Timeout
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::ConnectionFailed
        } else {
            TransportErrorKind::Unexpected
        };
        Self::new(kind, err.to_string())
    }
}

/// Failure of an authenticated API call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401 that survived the single refresh-and-retry cycle, or refresh failed.
    #[error("unauthorized: session expired or credentials rejected")]
    Unauthorized,
    /// Any other non-2xx status. `payload` holds the parsed JSON error body if any.
    #[error("HTTP {status}: {}", message.as_deref().unwrap_or("request failed"))]
    Http {
        status: u16,
        message: Option<String>,
        payload: Option<Value>,
    },
    /// A 2xx response with an empty body where data was required.
    #[error("server returned no content")]
    NoContent,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid response body: {0}")]
    InvalidBody(String),
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl ApiError {
    /// Build an `Http` error from a status code and raw error body.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let payload: Option<Value> = serde_json::from_slice(body).ok();
        let message = payload
            .as_ref()
            .and_then(|p| p.get("message"))
            .and_then(Value::as_str)
            .map(String::from);
        ApiError::Http {
            status,
            message,
            payload,
        }
    }
}
