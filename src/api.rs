//! HTTP plumbing for the backend settings service.
//!
//! Owns URL normalisation, the shared `reqwest` client, response-envelope
//! unwrapping and the mapping of transport/status failures into the error
//! taxonomy. The typed operation wrappers live in [`crate::connect`].

use std::time::Duration;

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{error_from_status, friendly_transport_error, Error, Result};
use crate::types::Envelope;

/// Default timeout for backend requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout used for the lightweight test-connection call.
pub(crate) const TEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend base URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment (re-appended per request)
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip trailing /api
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Thin wrapper around `reqwest::Client` bound to one backend base URL.
/// Stateless apart from the connection pool; safe to clone.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    test_http: Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client for the given backend URL. The URL is normalised once
    /// here; per-request paths include the leading slash.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;
        let test_http = Client::builder()
            .timeout(TEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(ApiClient {
            http,
            test_http,
            base_url: normalize_base_url(base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform a request and unwrap the standard `{data, statusCode, total?}`
    /// envelope to `data`.
    pub async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.dispatch(&self.http, method, path, body).await
    }

    /// Same as [`request`](Self::request) but on the short-timeout client,
    /// used for handshake tests so a dead gateway fails fast.
    pub async fn request_short<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.dispatch(&self.test_http, method, path, body).await
    }

    async fn dispatch<T, B>(
        &self,
        client: &Client,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}/api{path}", self.base_url);
        debug!(%method, %url, "backend request");

        let mut req = client.request(method, &url);
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| friendly_transport_error(&self.base_url, &e))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = extract_server_message(&text);
            warn!(status = status.as_u16(), %url, "backend request failed");
            return Err(error_from_status(status, message));
        }

        let envelope: Envelope<T> = serde_json::from_str(&text)
            .map_err(|e| Error::Network(format!("Invalid JSON from backend: {e}")))?;
        Ok(envelope.data)
    }
}

/// Pull the human-readable message out of an error body. The backend uses
/// `message`, older endpoints use `error` or `details`.
fn extract_server_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    json.get("message")
        .or_else(|| json.get("error"))
        .or_else(|| json.get("details"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_adds_scheme_and_strips_api_suffix() {
        assert_eq!(
            normalize_base_url("pos.api.pharmalink.app/api/"),
            "https://pos.api.pharmalink.app"
        );
        assert_eq!(
            normalize_base_url("localhost:3000/api"),
            "http://localhost:3000"
        );
        assert_eq!(
            normalize_base_url("https://pos.api.pharmalink.app///"),
            "https://pos.api.pharmalink.app"
        );
        assert_eq!(
            normalize_base_url("  pos.api.pharmalink.app  "),
            "https://pos.api.pharmalink.app"
        );
    }

    #[test]
    fn server_message_extraction_prefers_message_key() {
        assert_eq!(
            extract_server_message(r#"{"message":"missing secret_id","error":"other"}"#),
            Some("missing secret_id".to_string())
        );
        assert_eq!(
            extract_server_message(r#"{"error":"record gone"}"#),
            Some("record gone".to_string())
        );
        assert_eq!(extract_server_message("not json"), None);
        assert_eq!(extract_server_message(r#"{"message":"  "}"#), None);
    }
}
