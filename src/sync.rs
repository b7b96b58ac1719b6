//! Data-sync triggers against the backend settings service.
//!
//! The back office pulls orders, inventory, and branches from KiotViet by
//! asking the backend to run a sync pass; purchase orders flow the other way
//! (pushed to KiotViet per import order). Each successful pass may bump the
//! stored config's `last_sync`, so the cached config is invalidated after
//! every trigger.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::info;

use crate::api::ApiClient;
use crate::error::Result;
use crate::notify::{Notice, Notifier};
use crate::store::ConfigStore;

/// Which data set a sync pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Orders,
    Inventory,
    Branches,
    /// One purchase order pushed to KiotViet.
    ImportOrder,
}

impl SyncKind {
    pub fn label(self) -> &'static str {
        match self {
            SyncKind::Orders => "orders",
            SyncKind::Inventory => "inventory",
            SyncKind::Branches => "branches",
            SyncKind::ImportOrder => "import order",
        }
    }
}

/// Result of one sync pass, mirroring the backend's sync-log rows.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub kind: SyncKind,
    pub records: u64,
    pub synced_at: DateTime<Utc>,
}

/// A branch row as returned by the branch-sync endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BranchSummary {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub is_active: bool,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// The sync endpoints the service depends on; split out so lifecycle tests
/// can run against an in-memory implementation.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    /// Pull new orders from KiotViet; returns the record count.
    async fn sync_orders(&self) -> Result<u64>;
    /// Pull inventory levels from KiotViet; returns the record count.
    async fn sync_inventory(&self) -> Result<u64>;
    /// Pull the branch list from KiotViet.
    async fn sync_branches(&self) -> Result<Vec<BranchSummary>>;
    /// Push one purchase order to KiotViet.
    async fn sync_import_order(&self, order_id: &str) -> Result<()>;
}

#[async_trait]
impl SyncBackend for ApiClient {
    async fn sync_orders(&self) -> Result<u64> {
        self.request::<u64, ()>(Method::POST, "/pos-settings/sync-orders", None)
            .await
    }

    async fn sync_inventory(&self) -> Result<u64> {
        self.request::<u64, ()>(Method::POST, "/pos-settings/sync-inventory", None)
            .await
    }

    async fn sync_branches(&self) -> Result<Vec<BranchSummary>> {
        self.request::<Vec<BranchSummary>, ()>(Method::POST, "/kiotviet/sync-branches", None)
            .await
    }

    async fn sync_import_order(&self, order_id: &str) -> Result<()> {
        self.request::<serde_json::Value, ()>(
            Method::POST,
            &format!("/import-orders/{order_id}/sync-to-kiotviet"),
            None,
        )
        .await?;
        Ok(())
    }
}

/// Sync trigger service for one pharmacy. Owns no data; the backend performs
/// the actual KiotViet round trips.
pub struct SyncService {
    pharmacy_id: String,
    backend: Arc<dyn SyncBackend>,
    store: Arc<ConfigStore>,
    notifier: Arc<dyn Notifier>,
}

impl SyncService {
    pub fn new(
        pharmacy_id: impl Into<String>,
        backend: Arc<dyn SyncBackend>,
        store: Arc<ConfigStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        SyncService {
            pharmacy_id: pharmacy_id.into(),
            backend,
            store,
            notifier,
        }
    }

    pub async fn sync_orders(&self) -> Result<SyncOutcome> {
        let records = self.run(SyncKind::Orders, self.backend.sync_orders()).await?;
        Ok(self.outcome(SyncKind::Orders, records))
    }

    pub async fn sync_inventory(&self) -> Result<SyncOutcome> {
        let records = self
            .run(SyncKind::Inventory, self.backend.sync_inventory())
            .await?;
        Ok(self.outcome(SyncKind::Inventory, records))
    }

    pub async fn sync_branches(&self) -> Result<(SyncOutcome, Vec<BranchSummary>)> {
        let branches = self
            .run(SyncKind::Branches, self.backend.sync_branches())
            .await?;
        let outcome = self.outcome(SyncKind::Branches, branches.len() as u64);
        Ok((outcome, branches))
    }

    pub async fn sync_import_order(&self, order_id: &str) -> Result<SyncOutcome> {
        self.run(
            SyncKind::ImportOrder,
            self.backend.sync_import_order(order_id),
        )
        .await?;
        Ok(self.outcome(SyncKind::ImportOrder, 1))
    }

    /// Shared wrapper: report the outcome and invalidate the cached config
    /// (a successful pass may update `last_sync` server-side).
    async fn run<T>(
        &self,
        kind: SyncKind,
        fut: impl std::future::Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        match fut.await {
            Ok(value) => {
                self.store.invalidate(&self.pharmacy_id);
                info!(pharmacy = %self.pharmacy_id, kind = kind.label(), "sync pass completed");
                self.notifier.notify(Notice::success(
                    "Sync completed",
                    format!("Synced {} from KiotViet", kind.label()),
                ));
                Ok(value)
            }
            Err(err) => {
                self.notifier
                    .notify(Notice::failure("Sync failed", &err));
                Err(err)
            }
        }
    }

    fn outcome(&self, kind: SyncKind, records: u64) -> SyncOutcome {
        SyncOutcome {
            kind,
            records,
            synced_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::notify::Severity;
    use crate::types::{ConnectionConfig, ConnectionType};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSyncBackend {
        fail: AtomicBool,
    }

    #[async_trait]
    impl SyncBackend for FakeSyncBackend {
        async fn sync_orders(&self) -> Result<u64> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::Network("backend unreachable".into()));
            }
            Ok(1247)
        }

        async fn sync_inventory(&self) -> Result<u64> {
            Ok(87)
        }

        async fn sync_branches(&self) -> Result<Vec<BranchSummary>> {
            Ok(vec![BranchSummary {
                id: "br-1".into(),
                external_id: "1000005382".into(),
                name: "Main branch".into(),
                is_active: true,
                last_sync_at: None,
            }])
        }

        async fn sync_import_order(&self, _order_id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        notices: Mutex<Vec<Notice>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: Notice) {
            self.notices.lock().expect("notice lock").push(notice);
        }
    }

    fn cached_config() -> ConnectionConfig {
        ConnectionConfig {
            id: "cfg-1".into(),
            store_name: "Pharmacy A".into(),
            connection_type: ConnectionType::Api,
            client_id: Some("cid".into()),
            secret_id: Some("sid".into()),
            username: None,
            password: None,
            is_active: true,
            connection: true,
            last_sync: None,
        }
    }

    fn service(
        backend: Arc<FakeSyncBackend>,
        store: Arc<ConfigStore>,
    ) -> (SyncService, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        (
            SyncService::new("ph-1", backend, store, notifier.clone()),
            notifier,
        )
    }

    #[tokio::test]
    async fn successful_sync_invalidates_cached_config() {
        let store = Arc::new(ConfigStore::new());
        let token = store.begin_fetch("ph-1");
        store.complete_fetch("ph-1", token, Some(cached_config()));

        let (service, notifier) = service(Arc::new(FakeSyncBackend::default()), store.clone());
        let outcome = service.sync_orders().await.expect("sync");
        assert_eq!(outcome.kind, SyncKind::Orders);
        assert_eq!(outcome.records, 1247);

        assert!(
            store.fresh("ph-1").is_none(),
            "config must be refetched after a sync pass"
        );
        assert!(store.last_known("ph-1").is_some());
        let notices = notifier.notices.lock().expect("notice lock");
        assert_eq!(notices.last().expect("notice").severity, Severity::Info);
    }

    #[tokio::test]
    async fn failed_sync_reports_and_keeps_cache_fresh() {
        let store = Arc::new(ConfigStore::new());
        let token = store.begin_fetch("ph-1");
        store.complete_fetch("ph-1", token, Some(cached_config()));

        let backend = Arc::new(FakeSyncBackend::default());
        backend.fail.store(true, Ordering::SeqCst);
        let (service, notifier) = service(backend, store.clone());

        let err = service.sync_orders().await.expect_err("sync fails");
        assert!(matches!(err, Error::Network(_)));
        assert!(
            store.fresh("ph-1").is_some(),
            "failed sync leaves the cache at last known-good"
        );
        let notices = notifier.notices.lock().expect("notice lock");
        assert_eq!(notices.last().expect("notice").severity, Severity::Warning);
    }

    #[tokio::test]
    async fn branch_sync_counts_returned_rows() {
        let store = Arc::new(ConfigStore::new());
        let (service, _) = service(Arc::new(FakeSyncBackend::default()), store);
        let (outcome, branches) = service.sync_branches().await.expect("sync");
        assert_eq!(outcome.records, 1);
        assert_eq!(branches[0].external_id, "1000005382");
    }
}
