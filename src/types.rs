//! Data contracts shared between the connection client and the lifecycle
//! manager.
//!
//! Wire field names are snake_case to match the backend settings service
//! (`store_name`, `is_active`, ...). Partial payloads use `Option` fields
//! skipped during serialization, so a field absent from the struct is absent
//! from the wire and left untouched server-side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Secret wrapper
// ---------------------------------------------------------------------------

/// Credential material (passwords, client secrets). Zeroed on drop and
/// redacted from `Debug` output so secrets never leak into logs.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Secret::new(value)
    }
}

// ---------------------------------------------------------------------------
// Connection records
// ---------------------------------------------------------------------------

/// Which credential pair the connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// OAuth client credentials (`client_id` / `secret_id`).
    Api,
    /// Direct KiotViet account login (`username` / `password`).
    UserPassword,
}

/// The persisted record describing one pharmacy's link to KiotViet, as
/// returned by the backend settings service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,
    pub store_name: String,
    pub connection_type: ConnectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
    /// Whether automatic sync is enabled for this connection.
    pub is_active: bool,
    /// Server-computed: true only after a successful gateway handshake.
    /// Never fabricated client-side.
    pub connection: bool,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

/// Full credential form submitted when creating a connection (or testing an
/// unsaved credential set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionForm {
    pub store_name: String,
    pub connection_type: ConnectionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
}

impl ConnectionForm {
    pub fn api(
        store_name: impl Into<String>,
        client_id: impl Into<String>,
        secret_id: impl Into<String>,
    ) -> Self {
        ConnectionForm {
            store_name: store_name.into(),
            connection_type: ConnectionType::Api,
            client_id: Some(client_id.into()),
            secret_id: Some(Secret::new(secret_id)),
            username: None,
            password: None,
        }
    }

    pub fn user_password(
        store_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        ConnectionForm {
            store_name: store_name.into(),
            connection_type: ConnectionType::UserPassword,
            client_id: None,
            secret_id: None,
            username: Some(username.into()),
            password: Some(Secret::new(password)),
        }
    }

    /// Local required-field check for the selected connection type. Runs
    /// before any network call and short-circuits with a form-level error.
    pub fn validate(&self) -> Result<()> {
        if self.store_name.trim().is_empty() {
            return Err(Error::validation("store_name is required"));
        }
        match self.connection_type {
            ConnectionType::Api => {
                if self.client_id.as_deref().unwrap_or("").trim().is_empty() {
                    return Err(Error::validation(
                        "client_id is required for API connections",
                    ));
                }
                if self.secret_id.as_ref().map_or(true, Secret::is_empty) {
                    return Err(Error::validation(
                        "secret_id is required for API connections",
                    ));
                }
            }
            ConnectionType::UserPassword => {
                if self.username.as_deref().unwrap_or("").trim().is_empty() {
                    return Err(Error::validation(
                        "username is required for account connections",
                    ));
                }
                if self.password.as_ref().map_or(true, Secret::is_empty) {
                    return Err(Error::validation(
                        "password is required for account connections",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Partial update payload: only fields whose value differs from the last
/// fetched config are present; everything else is omitted from the wire.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<ConnectionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
}

impl ConnectionPatch {
    pub fn is_empty(&self) -> bool {
        self.store_name.is_none()
            && self.connection_type.is_none()
            && self.client_id.is_none()
            && self.secret_id.is_none()
            && self.username.is_none()
            && self.password.is_none()
    }

    /// True when the patch touches credential material (store identity or
    /// either credential pair). A credential change resets the server-side
    /// `connection` flag and requires a fresh handshake.
    pub fn touches_credentials(&self) -> bool {
        self.store_name.is_some()
            || self.connection_type.is_some()
            || self.client_id.is_some()
            || self.secret_id.is_some()
            || self.username.is_some()
            || self.password.is_some()
    }

    /// Build the patch containing only the fields of `form` that differ from
    /// the last fetched `config`. Unedited fields stay out of the payload so
    /// the backend leaves them untouched.
    pub fn diff(config: &ConnectionConfig, form: &ConnectionForm) -> Self {
        let mut patch = ConnectionPatch::default();
        if form.store_name != config.store_name {
            patch.store_name = Some(form.store_name.clone());
        }
        if form.connection_type != config.connection_type {
            patch.connection_type = Some(form.connection_type);
        }
        if form.client_id != config.client_id {
            patch.client_id = form.client_id.clone();
        }
        if form.secret_id != config.secret_id {
            patch.secret_id = form.secret_id.clone();
        }
        if form.username != config.username {
            patch.username = form.username.clone();
        }
        if form.password != config.password {
            patch.password = form.password.clone();
        }
        patch
    }
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Standard backend response envelope. All responses are unwrapped to `data`
/// before reaching the lifecycle layer.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(default)]
    pub total: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ConnectionConfig {
        ConnectionConfig {
            id: "cfg-1".into(),
            store_name: "Pharmacy A".into(),
            connection_type: ConnectionType::UserPassword,
            client_id: None,
            secret_id: None,
            username: Some("u1".into()),
            password: Some("p1".into()),
            is_active: true,
            connection: true,
            last_sync: None,
        }
    }

    #[test]
    fn secret_debug_is_redacted() {
        let s = Secret::new("hunter2");
        assert_eq!(format!("{s:?}"), "Secret(***)");
        assert_eq!(s.expose(), "hunter2");
    }

    #[test]
    fn api_form_requires_client_credentials() {
        let form = ConnectionForm::api("Pharmacy A", "cid", "sid");
        assert!(form.validate().is_ok());

        let mut missing_secret = form.clone();
        missing_secret.secret_id = Some(Secret::new(""));
        assert!(matches!(
            missing_secret.validate(),
            Err(Error::Validation { .. })
        ));

        let mut missing_client = form;
        missing_client.client_id = None;
        assert!(matches!(
            missing_client.validate(),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn user_form_requires_account_credentials() {
        let form = ConnectionForm::user_password("Pharmacy A", "u1", "p1");
        assert!(form.validate().is_ok());

        let mut missing_store = form.clone();
        missing_store.store_name = "  ".into();
        assert!(missing_store.validate().is_err());

        let mut missing_password = form;
        missing_password.password = None;
        assert!(missing_password.validate().is_err());
    }

    #[test]
    fn diff_contains_only_changed_fields() {
        let config = sample_config();
        let mut form = ConnectionForm::user_password("Pharmacy A", "u1", "p1");
        assert!(ConnectionPatch::diff(&config, &form).is_empty());

        form.username = Some("new".into());
        let patch = ConnectionPatch::diff(&config, &form);
        assert_eq!(patch.username.as_deref(), Some("new"));
        assert!(patch.password.is_none());
        assert!(patch.store_name.is_none());
        assert!(patch.touches_credentials());
    }

    #[test]
    fn patch_serialization_omits_absent_fields() {
        let config = sample_config();
        let mut form = ConnectionForm::user_password("Pharmacy A", "u1", "p1");
        form.password = Some("p2".into());
        let patch = ConnectionPatch::diff(&config, &form);

        let json = serde_json::to_value(&patch).expect("serialize patch");
        let obj = json.as_object().expect("object payload");
        assert_eq!(obj.len(), 1, "only the changed field goes on the wire");
        assert_eq!(obj.get("password").and_then(|v| v.as_str()), Some("p2"));
    }

    #[test]
    fn envelope_unwraps_data() {
        let raw = r#"{"data":{"id":"cfg-9","store_name":"Pharmacy B","connection_type":"api","client_id":"cid","secret_id":"sid","is_active":false,"connection":false,"last_sync":null},"statusCode":200}"#;
        let envelope: Envelope<ConnectionConfig> =
            serde_json::from_str(raw).expect("parse envelope");
        assert_eq!(envelope.status_code, 200);
        assert_eq!(envelope.data.id, "cfg-9");
        assert_eq!(envelope.data.connection_type, ConnectionType::Api);
        assert!(!envelope.data.connection);
    }
}
