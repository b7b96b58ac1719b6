//! Typed connection operations against the backend settings service.
//!
//! One function per backend endpoint, all stateless; the lifecycle manager
//! sequences them. [`SettingsBackend`] is the seam between the two layers so
//! the manager can be driven by an in-memory backend in tests.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::ApiClient;
use crate::error::{Error, Result};
use crate::types::{ConnectionConfig, ConnectionForm, ConnectionPatch, Secret};

// ---------------------------------------------------------------------------
// Test-connection request
// ---------------------------------------------------------------------------

/// Input for [`test_connection`](SettingsBackend::test_connection). Exactly
/// one of the two modes must be supplied:
/// - `id`: re-validate the stored credentials with a fresh handshake
/// - `config`: validate a not-yet-saved credential set without persisting it
#[derive(Debug, Clone, Default)]
pub struct TestConnectionRequest {
    pub id: Option<String>,
    pub config: Option<ConnectionForm>,
}

impl TestConnectionRequest {
    pub fn by_id(id: impl Into<String>) -> Self {
        TestConnectionRequest {
            id: Some(id.into()),
            config: None,
        }
    }

    pub fn unsaved(config: ConnectionForm) -> Self {
        TestConnectionRequest {
            id: None,
            config: Some(config),
        }
    }

    /// Caller-misuse check, performed before anything goes over the wire.
    pub fn validate(&self) -> Result<()> {
        match (&self.id, &self.config) {
            (None, None) => Err(Error::InvalidArgument(
                "test_connection requires either id or config".into(),
            )),
            (Some(_), Some(_)) => Err(Error::InvalidArgument(
                "test_connection takes either id or config, not both".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Wire payload for the test endpoint; unset fields are omitted.
#[derive(Debug, Serialize)]
struct TestPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    store_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_id: Option<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<Secret>,
}

impl From<&TestConnectionRequest> for TestPayload {
    fn from(req: &TestConnectionRequest) -> Self {
        let config = req.config.as_ref();
        TestPayload {
            id: req.id.clone(),
            store_name: config.map(|c| c.store_name.clone()),
            client_id: config.and_then(|c| c.client_id.clone()),
            secret_id: config.and_then(|c| c.secret_id.clone()),
            username: config.and_then(|c| c.username.clone()),
            password: config.and_then(|c| c.password.clone()),
        }
    }
}

/// Handshake verdict returned by the test and connect endpoints.
#[derive(Debug, Deserialize)]
struct HandshakeResult {
    connection: bool,
}

// ---------------------------------------------------------------------------
// Backend seam
// ---------------------------------------------------------------------------

/// The six settings-service operations the lifecycle manager depends on.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// Fetch the stored config; `None` (absence) is a valid state, not an
    /// error.
    async fn get_config(&self) -> Result<Option<ConnectionConfig>>;

    /// Create the connection record. Callers gate on `id` absence; calling
    /// this twice for the same logical connection duplicates records.
    async fn create_connection(&self, form: &ConnectionForm) -> Result<ConnectionConfig>;

    /// Partial update: fields absent from the patch are left untouched
    /// server-side.
    async fn update_connection(&self, id: &str, patch: &ConnectionPatch)
        -> Result<ConnectionConfig>;

    /// Fresh handshake against the gateway with stored (`id`) or unsaved
    /// (`config`) credentials. Persists nothing.
    async fn test_connection(&self, req: &TestConnectionRequest) -> Result<bool>;

    /// Enable or disable automatic sync. Does not attempt a handshake.
    async fn toggle_active(&self, id: &str, enabled: bool) -> Result<ConnectionConfig>;

    /// Handshake with the gateway using the stored credentials for `id`;
    /// on success the server flips `connection = true`.
    async fn connect_to_gateway(&self, id: &str) -> Result<ConnectionConfig>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Connection client backed by the real settings service.
#[derive(Clone)]
pub struct ConnectClient {
    api: ApiClient,
}

impl ConnectClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(ConnectClient {
            api: ApiClient::new(base_url)?,
        })
    }

    pub fn from_api(api: ApiClient) -> Self {
        ConnectClient { api }
    }
}

#[async_trait]
impl SettingsBackend for ConnectClient {
    async fn get_config(&self) -> Result<Option<ConnectionConfig>> {
        self.api
            .request::<Option<ConnectionConfig>, ()>(Method::GET, "/pos-settings", None)
            .await
    }

    async fn create_connection(&self, form: &ConnectionForm) -> Result<ConnectionConfig> {
        let created: ConnectionConfig = self
            .api
            .request(Method::POST, "/pos-settings", Some(form))
            .await?;
        info!(id = %created.id, store = %created.store_name, "connection record created");
        Ok(created)
    }

    async fn update_connection(
        &self,
        id: &str,
        patch: &ConnectionPatch,
    ) -> Result<ConnectionConfig> {
        self.api
            .request(Method::PUT, &format!("/pos-settings/{id}"), Some(patch))
            .await
    }

    async fn test_connection(&self, req: &TestConnectionRequest) -> Result<bool> {
        req.validate()?;
        let payload = TestPayload::from(req);
        let result: HandshakeResult = self
            .api
            .request_short(Method::POST, "/kiotviet2/test-connection", Some(&payload))
            .await?;
        Ok(result.connection)
    }

    async fn toggle_active(&self, id: &str, enabled: bool) -> Result<ConnectionConfig> {
        let body = serde_json::json!({ "is_active": enabled });
        self.api
            .request(
                Method::PUT,
                &format!("/pos-settings/is-active/{id}"),
                Some(&body),
            )
            .await
    }

    async fn connect_to_gateway(&self, id: &str) -> Result<ConnectionConfig> {
        let body = serde_json::json!({ "id": id });
        let config: ConnectionConfig = self
            .api
            .request(Method::POST, "/kiotviet2/connect-to-kiotviet", Some(&body))
            .await?;
        info!(id = %config.id, connected = config.connection, "gateway handshake completed");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_requires_exactly_one_mode() {
        let neither = TestConnectionRequest::default();
        assert!(matches!(
            neither.validate(),
            Err(Error::InvalidArgument(_))
        ));

        let both = TestConnectionRequest {
            id: Some("cfg-1".into()),
            config: Some(ConnectionForm::api("Pharmacy A", "cid", "sid")),
        };
        assert!(matches!(both.validate(), Err(Error::InvalidArgument(_))));

        assert!(TestConnectionRequest::by_id("cfg-1").validate().is_ok());
        assert!(
            TestConnectionRequest::unsaved(ConnectionForm::user_password("P", "u", "p"))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_payload_by_id_carries_only_the_id() {
        let payload = TestPayload::from(&TestConnectionRequest::by_id("cfg-1"));
        let json = serde_json::to_value(&payload).expect("serialize");
        let obj = json.as_object().expect("object");
        assert_eq!(obj.len(), 1);
        assert_eq!(obj.get("id").and_then(|v| v.as_str()), Some("cfg-1"));
    }

    #[test]
    fn test_payload_for_unsaved_config_carries_edited_credentials() {
        let form = ConnectionForm::user_password("Pharmacy A", "u1", "p1");
        let payload = TestPayload::from(&TestConnectionRequest::unsaved(form));
        let json = serde_json::to_value(&payload).expect("serialize");
        let obj = json.as_object().expect("object");
        assert!(obj.get("id").is_none());
        assert_eq!(obj.get("username").and_then(|v| v.as_str()), Some("u1"));
        assert_eq!(obj.get("password").and_then(|v| v.as_str()), Some("p1"));
        assert_eq!(
            obj.get("store_name").and_then(|v| v.as_str()),
            Some("Pharmacy A")
        );
    }
}
