//! Pharmalink — pharmacy back-office bridge to the KiotViet POS platform.
//!
//! Wraps the backend settings service with a typed connection client, drives
//! the credential connection lifecycle (create, partial update, test, toggle,
//! gateway handshake) through an explicit state machine, and exposes the
//! sync triggers for orders, inventory, branches, and purchase orders.
//!
//! The embedding UI talks to [`ConnectionManager`] and [`SyncService`];
//! everything below them is stateless HTTP plumbing.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod connect;
pub mod error;
pub mod manager;
pub mod notify;
pub mod state;
pub mod store;
pub mod sync;
pub mod types;

pub use api::ApiClient;
pub use connect::{ConnectClient, SettingsBackend, TestConnectionRequest};
pub use error::{Error, Result};
pub use manager::ConnectionManager;
pub use notify::{Notice, Notifier, Severity, TracingNotifier};
pub use state::{ConnectionEvent, ConnectionState};
pub use store::ConfigStore;
pub use sync::{BranchSummary, SyncBackend, SyncKind, SyncOutcome, SyncService};
pub use types::{
    ConnectionConfig, ConnectionForm, ConnectionPatch, ConnectionType, Envelope, Secret,
};

/// Initialize structured logging for binaries embedding the crate.
///
/// Honors `RUST_LOG`; defaults to `info` globally with debug output for this
/// crate. Call once at startup.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pharmalink=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}
