//! Error taxonomy for the connection lifecycle.
//!
//! Every failure surfaced to the operator maps to one of these variants so
//! the UI layer can pick a toast style (field-level message, retry hint,
//! credential hint) without string matching.

use reqwest::StatusCode;

/// Errors produced by the connection client and lifecycle manager.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backend rejected missing or malformed fields, or local
    /// required-field validation failed before any network call.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// The KiotViet gateway rejected the credentials during a handshake.
    #[error("connection failed, check credentials: {0}")]
    Authentication(String),

    /// The referenced connection record no longer exists server-side.
    #[error("connection record not found: {0}")]
    NotFound(String),

    /// Transport-level failure (unreachable host, timeout, bad URL).
    #[error("network error: {0}")]
    Network(String),

    /// Caller misuse detected before anything is sent over the wire.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unexpected upstream status that fits none of the above.
    #[error("backend error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// True when retrying the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Convert a `reqwest::Error` into a user-friendly message.
pub(crate) fn friendly_transport_error(url: &str, err: &reqwest::Error) -> Error {
    if err.is_connect() {
        return Error::Network(format!("Cannot reach backend at {url}"));
    }
    if err.is_timeout() {
        return Error::Network(format!("Connection to {url} timed out"));
    }
    if err.is_builder() {
        return Error::Network(format!("Invalid backend URL: {url}"));
    }
    Error::Network(format!("Network error communicating with {url}: {err}"))
}

/// Map an unsuccessful HTTP status (plus the server's own message, when it
/// sent one) to a taxonomy variant.
pub(crate) fn error_from_status(status: StatusCode, message: Option<String>) -> Error {
    let detail = message.unwrap_or_else(|| default_status_message(status));
    match status.as_u16() {
        400 | 422 => Error::Validation { message: detail },
        401 | 403 => Error::Authentication(detail),
        404 => Error::NotFound(detail),
        s if s >= 500 => Error::Api {
            status: s,
            message: detail,
        },
        s => Error::Api {
            status: s,
            message: detail,
        },
    }
}

fn default_status_message(status: StatusCode) -> String {
    match status.as_u16() {
        400 | 422 => "Request rejected by the backend".to_string(),
        401 => "Credentials are invalid or expired".to_string(),
        403 => "Pharmacy not authorized".to_string(),
        404 => "Backend endpoint or record not found".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
