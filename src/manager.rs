//! Connection lifecycle manager.
//!
//! Sequences the settings-backend operations for one pharmacy: caches the
//! fetched config, enforces the single-flight guard so double submits never
//! reach the wire, runs the connect flow (create-or-update, then handshake
//! only while active), and reports every outcome through the notifier.
//! Failures never poison the cache; the last known-good config survives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::connect::{SettingsBackend, TestConnectionRequest};
use crate::error::{Error, Result};
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::state::{ConnectionEvent, ConnectionState};
use crate::store::ConfigStore;
use crate::types::{ConnectionConfig, ConnectionForm, ConnectionPatch};

/// Manager for one pharmacy's KiotViet connection.
pub struct ConnectionManager {
    pharmacy_id: String,
    backend: Arc<dyn SettingsBackend>,
    store: Arc<ConfigStore>,
    notifier: Arc<dyn Notifier>,
    /// Serialises mutations for this pharmacy. Held only for the duration of
    /// one mutation; contention means a double submit.
    mutation_guard: Mutex<()>,
    /// Optimistic in-flight flag for the UI spinner; rolled back on error as
    /// well as success.
    busy: AtomicBool,
}

impl ConnectionManager {
    pub fn new(
        pharmacy_id: impl Into<String>,
        backend: Arc<dyn SettingsBackend>,
        store: Arc<ConfigStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        ConnectionManager {
            pharmacy_id: pharmacy_id.into(),
            backend,
            store,
            notifier,
            mutation_guard: Mutex::new(()),
            busy: AtomicBool::new(false),
        }
    }

    /// Manager with the default tracing notifier and a private store.
    pub fn with_defaults(pharmacy_id: impl Into<String>, backend: Arc<dyn SettingsBackend>) -> Self {
        ConnectionManager::new(
            pharmacy_id,
            backend,
            Arc::new(ConfigStore::new()),
            Arc::new(TracingNotifier),
        )
    }

    /// Whether a mutation for this pharmacy is currently in flight. The UI
    /// disables the triggering control while this is true.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Current lifecycle state, derived from the last known config.
    pub fn state(&self) -> ConnectionState {
        let cached = self.store.last_known(&self.pharmacy_id).flatten();
        ConnectionState::from_config(cached.as_ref())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Cached config, refetching when the cache is missing or invalidated.
    pub async fn config(&self) -> Result<Option<ConnectionConfig>> {
        if let Some(cached) = self.store.fresh(&self.pharmacy_id) {
            return Ok(cached);
        }
        self.refresh().await
    }

    /// Force a refetch of the stored config. A response superseded by a
    /// newer fetch for the same pharmacy is discarded on arrival.
    pub async fn refresh(&self) -> Result<Option<ConnectionConfig>> {
        let token = self.store.begin_fetch(&self.pharmacy_id);
        let fetched = self.backend.get_config().await?;
        if !self
            .store
            .complete_fetch(&self.pharmacy_id, token, fetched.clone())
        {
            debug!(pharmacy = %self.pharmacy_id, "refresh superseded, returning current cache");
            return Ok(self.store.last_known(&self.pharmacy_id).flatten());
        }
        Ok(fetched)
    }

    // -----------------------------------------------------------------------
    // Test
    // -----------------------------------------------------------------------

    /// Validate credentials against the gateway without persisting anything.
    ///
    /// A dirty form (unsaved edits) is tested as-is; with no dirty form the
    /// stored credentials are re-validated by id, which requires a saved
    /// record.
    pub async fn test(&self, dirty_form: Option<ConnectionForm>) -> Result<bool> {
        let request = match dirty_form {
            Some(form) => {
                form.validate()?;
                TestConnectionRequest::unsaved(form)
            }
            None => {
                let id = self.current_id().await?.ok_or_else(|| {
                    Error::InvalidArgument(
                        "no saved connection to test; supply the edited form".into(),
                    )
                })?;
                TestConnectionRequest::by_id(id)
            }
        };

        match self.backend.test_connection(&request).await {
            Ok(true) => {
                self.notifier.notify(Notice::success(
                    "Connection test",
                    "Credentials verified with KiotViet",
                ));
                Ok(true)
            }
            Ok(false) => {
                self.notifier.notify(Notice::failure(
                    "Connection test",
                    &Error::Authentication("gateway rejected the credentials".into()),
                ));
                Ok(false)
            }
            Err(err) => {
                self.notifier.notify(Notice::failure("Connection test", &err));
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Toggle
    // -----------------------------------------------------------------------

    /// Enable or disable automatic sync. Never touches credentials; the
    /// server keeps them so re-enabling restores the prior state.
    pub async fn toggle(&self, enabled: bool) -> Result<ConnectionConfig> {
        let _guard = self.acquire_guard()?;
        self.busy.store(true, Ordering::SeqCst);
        let result = self.toggle_inner(enabled).await;
        self.busy.store(false, Ordering::SeqCst);

        match result {
            Ok(config) => {
                self.notifier.notify(Notice::success(
                    if enabled { "Sync enabled" } else { "Sync disabled" },
                    format!(
                        "KiotViet connection {}",
                        if enabled { "enabled" } else { "disabled" }
                    ),
                ));
                Ok(config)
            }
            Err(err) => {
                self.notifier
                    .notify(Notice::failure("Failed to update connection status", &err));
                Err(err)
            }
        }
    }

    async fn toggle_inner(&self, enabled: bool) -> Result<ConnectionConfig> {
        let id = self.current_id().await?.ok_or_else(|| {
            Error::InvalidArgument("cannot toggle a connection that has not been saved".into())
        })?;

        // Reducer guard: toggling is legal from any created state; this also
        // documents that re-enabling restores the last-known verified flag.
        let was_verified = self
            .store
            .last_known(&self.pharmacy_id)
            .flatten()
            .map(|c| c.connection)
            .unwrap_or(false);
        self.state().apply(if enabled {
            ConnectionEvent::Enabled { was_verified }
        } else {
            ConnectionEvent::Disabled
        })?;

        let updated = self.backend.toggle_active(&id, enabled).await?;
        self.store.invalidate(&self.pharmacy_id);
        let refreshed = self.refresh().await?;
        Ok(refreshed.unwrap_or(updated))
    }

    // -----------------------------------------------------------------------
    // Connect
    // -----------------------------------------------------------------------

    /// The "Connect" action: create when no record exists, otherwise send a
    /// partial update with only the changed fields, then — only if the saved
    /// record is active — run the gateway handshake. Returns the final
    /// server-truth config.
    pub async fn connect(&self, form: ConnectionForm) -> Result<Option<ConnectionConfig>> {
        form.validate()?;

        let _guard = self.acquire_guard()?;
        self.busy.store(true, Ordering::SeqCst);
        let result = self.connect_inner(form).await;
        self.busy.store(false, Ordering::SeqCst);

        match result {
            Ok(config) => {
                self.notifier.notify(Notice::success(
                    "Connection saved",
                    match &config {
                        Some(c) if c.connection => "Connected to KiotViet".to_string(),
                        Some(_) => "Settings saved; connection not verified yet".to_string(),
                        None => "Settings saved".to_string(),
                    },
                ));
                Ok(config)
            }
            Err(err) => {
                self.notifier.notify(Notice::failure("Connection failed", &err));
                Err(err)
            }
        }
    }

    async fn connect_inner(&self, form: ConnectionForm) -> Result<Option<ConnectionConfig>> {
        let cached = self.config().await?;

        let credentials_changed = match &cached {
            None => {
                // Reducer guard against duplicate creates.
                self.state().apply(ConnectionEvent::Created)?;
                let created = self.backend.create_connection(&form).await?;
                info!(id = %created.id, "created connection record");
                true
            }
            Some(existing) => {
                let patch = ConnectionPatch::diff(existing, &form);
                if patch.is_empty() {
                    debug!(id = %existing.id, "no field changes, skipping update");
                    false
                } else {
                    let touches = patch.touches_credentials();
                    self.backend.update_connection(&existing.id, &patch).await?;
                    touches
                }
            }
        };

        // Cache now reflects the save. Credential changes reset the server's
        // `connection` flag, so the refetched state already demands a
        // re-verify.
        self.store.invalidate(&self.pharmacy_id);
        let saved = self.refresh().await?;

        let Some(saved) = saved else {
            return Ok(None);
        };

        // Handshake only when the operator has the record enabled.
        if !ConnectionState::from_config(Some(&saved)).handshake_allowed() {
            debug!(id = %saved.id, "record inactive, skipping gateway handshake");
            return Ok(Some(saved));
        }
        if saved.connection && !credentials_changed {
            // Already verified and nothing changed.
            return Ok(Some(saved));
        }

        self.backend.connect_to_gateway(&saved.id).await?;
        self.store.invalidate(&self.pharmacy_id);
        let verified = self.refresh().await?;
        Ok(verified.or(Some(saved)))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn current_id(&self) -> Result<Option<String>> {
        Ok(self.config().await?.map(|c| c.id))
    }

    /// Double-submit guard: a second mutation while one is in flight is a
    /// caller error and never reaches the wire.
    fn acquire_guard(&self) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        self.mutation_guard.try_lock().map_err(|_| {
            Error::InvalidArgument("another request for this connection is already in flight".into())
        })
    }
}
