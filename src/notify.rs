//! Operator notification seam (the toast channel).
//!
//! The lifecycle manager reports every mutation outcome here with a
//! human-readable message; the embedding UI decides how to render it. The
//! default implementation logs through `tracing` so headless embedders get
//! structured output for free.

use tracing::{error, info, warn};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One operator-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notice {
            severity: Severity::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    /// Build the failure notice for an error, picking the severity from the
    /// taxonomy: retryable failures warn, everything else is an error.
    pub fn failure(title: impl Into<String>, err: &Error) -> Self {
        Notice {
            severity: if err.is_retryable() {
                Severity::Warning
            } else {
                Severity::Error
            },
            title: title.into(),
            message: err.to_string(),
        }
    }
}

/// Sink for operator notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default notifier: structured log lines, one per notice.
#[derive(Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.severity {
            Severity::Info => info!(title = %notice.title, "{}", notice.message),
            Severity::Warning => warn!(title = %notice.title, "{}", notice.message),
            Severity::Error => error!(title = %notice.title, "{}", notice.message),
        }
    }
}
