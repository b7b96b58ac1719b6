//! Explicit connection lifecycle state machine.
//!
//! The UI-facing states are derived from server truth (the fetched
//! [`ConnectionConfig`]), never guessed locally; the reducer exists so every
//! mutation path goes through one place that rejects illegal transitions
//! (handshake while inactive, toggle before a record exists).

use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::ConnectionConfig;

/// Client-observed lifecycle of one pharmacy connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No record exists yet; the first successful "Connect" creates one.
    NoConnection,
    /// Record exists, automatic sync disabled. Credentials are retained.
    CreatedInactive,
    /// Record exists and is enabled, but the gateway handshake has not
    /// verified the current credentials.
    CreatedActive,
    /// Gateway handshake succeeded with the stored credentials.
    Verified,
}

/// Lifecycle events applied by the manager after each successful mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// `create_connection` succeeded; records start out inactive.
    Created,
    /// `toggle_active(id, true)` succeeded. `was_verified` carries the
    /// last-known server `connection` flag so re-enabling restores the
    /// prior verified state instead of resetting it.
    Enabled { was_verified: bool },
    /// `toggle_active(id, false)` succeeded.
    Disabled,
    /// `connect_to_gateway` succeeded.
    HandshakeSucceeded,
    /// A save changed credential material; the server resets `connection`
    /// and a fresh handshake is required.
    CredentialsChanged,
}

impl ConnectionState {
    /// Derive the state from the last fetched config. `None` means no record
    /// exists, which is a valid state.
    pub fn from_config(config: Option<&ConnectionConfig>) -> Self {
        match config {
            None => ConnectionState::NoConnection,
            Some(c) if !c.is_active => ConnectionState::CreatedInactive,
            Some(c) if c.connection => ConnectionState::Verified,
            Some(_) => ConnectionState::CreatedActive,
        }
    }

    /// Apply one lifecycle event. Illegal transitions are caller errors and
    /// never reach the wire.
    pub fn apply(self, event: ConnectionEvent) -> Result<Self> {
        use ConnectionEvent::*;
        use ConnectionState::*;

        match (self, event) {
            (NoConnection, Created) => Ok(CreatedInactive),
            (NoConnection, _) => Err(illegal(self, event)),

            // A record exists; creating again would duplicate it.
            (_, Created) => Err(illegal(self, event)),

            (CreatedInactive, Enabled { was_verified }) => {
                Ok(if was_verified { Verified } else { CreatedActive })
            }
            (CreatedInactive, Disabled) => Ok(CreatedInactive),
            // Handshake while inactive is the transition this reducer exists
            // to forbid.
            (CreatedInactive, HandshakeSucceeded) => Err(illegal(self, event)),
            (CreatedInactive, CredentialsChanged) => Ok(CreatedInactive),

            (CreatedActive, Disabled) => Ok(CreatedInactive),
            (CreatedActive, Enabled { .. }) => Ok(CreatedActive),
            (CreatedActive, HandshakeSucceeded) => Ok(Verified),
            (CreatedActive, CredentialsChanged) => Ok(CreatedActive),

            (Verified, Disabled) => Ok(CreatedInactive),
            (Verified, Enabled { .. }) => Ok(Verified),
            (Verified, HandshakeSucceeded) => Ok(Verified),
            // Edited-then-saved credentials must be re-verified.
            (Verified, CredentialsChanged) => Ok(CreatedActive),
        }
    }

    /// Whether the connect flow should run the gateway handshake after
    /// create/update. Skipped when the operator has disabled the record.
    pub fn handshake_allowed(self) -> bool {
        matches!(self, ConnectionState::CreatedActive | ConnectionState::Verified)
    }
}

fn illegal(state: ConnectionState, event: ConnectionEvent) -> Error {
    Error::InvalidArgument(format!("illegal transition: {event:?} in state {state:?}"))
}
