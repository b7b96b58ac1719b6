//! Explicit per-pharmacy config cache.
//!
//! Replaces the implicit global query cache: one entry per pharmacy id,
//! manual invalidation after each mutation, and a per-key generation counter
//! so a fetch superseded by a newer one for the same key is discarded when
//! its response finally arrives. The last known-good value survives
//! invalidation so failures never blank the UI.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::types::ConnectionConfig;

#[derive(Default)]
struct Entry {
    /// Last successfully fetched value. `Some(None)` means the server
    /// confirmed no record exists; `None` means never fetched.
    value: Option<Option<ConnectionConfig>>,
    /// Bumped on every fetch start; completions with an older token lose.
    generation: u64,
    /// Set by `invalidate`; cleared by the next stored fetch.
    stale: bool,
}

/// Token handed out when a fetch begins; must be presented to store the
/// result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchToken(u64);

/// Config cache keyed by pharmacy id. Cheap to share behind an `Arc`; no
/// global singleton, the owner passes the instance around.
#[derive(Default)]
pub struct ConfigStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl ConfigStore {
    pub fn new() -> Self {
        ConfigStore::default()
    }

    /// Begin a fetch for `key`, superseding any fetch still in flight.
    pub fn begin_fetch(&self, key: &str) -> FetchToken {
        let mut entries = self.entries.lock().expect("config store poisoned");
        let entry = entries.entry(key.to_string()).or_default();
        entry.generation += 1;
        FetchToken(entry.generation)
    }

    /// Store a fetch result. Returns false (and drops the value) when a newer
    /// fetch for the same key has started since `token` was issued.
    pub fn complete_fetch(
        &self,
        key: &str,
        token: FetchToken,
        value: Option<ConnectionConfig>,
    ) -> bool {
        let mut entries = self.entries.lock().expect("config store poisoned");
        let entry = entries.entry(key.to_string()).or_default();
        if entry.generation != token.0 {
            debug!(key, "discarding superseded fetch result");
            return false;
        }
        entry.value = Some(value);
        entry.stale = false;
        true
    }

    /// Fresh cached value, or `None` when the entry is missing or stale.
    pub fn fresh(&self, key: &str) -> Option<Option<ConnectionConfig>> {
        let entries = self.entries.lock().expect("config store poisoned");
        entries
            .get(key)
            .filter(|e| !e.stale)
            .and_then(|e| e.value.clone())
    }

    /// Last known-good value regardless of staleness. This is what failure
    /// paths fall back to.
    pub fn last_known(&self, key: &str) -> Option<Option<ConnectionConfig>> {
        let entries = self.entries.lock().expect("config store poisoned");
        entries.get(key).and_then(|e| e.value.clone())
    }

    /// Mark the entry stale so the next read refetches. The cached value is
    /// retained as last known-good.
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.lock().expect("config store poisoned");
        if let Some(entry) = entries.get_mut(key) {
            entry.stale = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionForm, ConnectionType};

    fn config(id: &str) -> ConnectionConfig {
        let form = ConnectionForm::api("Pharmacy A", "cid", "sid");
        ConnectionConfig {
            id: id.into(),
            store_name: form.store_name.clone(),
            connection_type: ConnectionType::Api,
            client_id: form.client_id.clone(),
            secret_id: form.secret_id.clone(),
            username: None,
            password: None,
            is_active: false,
            connection: false,
            last_sync: None,
        }
    }

    #[test]
    fn fetch_store_and_invalidate_cycle() {
        let store = ConfigStore::new();
        assert!(store.fresh("ph-1").is_none());

        let token = store.begin_fetch("ph-1");
        assert!(store.complete_fetch("ph-1", token, Some(config("cfg-1"))));

        let cached = store.fresh("ph-1").expect("fresh entry");
        assert_eq!(cached.expect("record").id, "cfg-1");

        store.invalidate("ph-1");
        assert!(store.fresh("ph-1").is_none(), "stale entry misses");
        let last = store.last_known("ph-1").expect("last known survives");
        assert_eq!(last.expect("record").id, "cfg-1");
    }

    #[test]
    fn confirmed_absence_is_cached() {
        let store = ConfigStore::new();
        let token = store.begin_fetch("ph-1");
        store.complete_fetch("ph-1", token, None);
        let cached = store.fresh("ph-1").expect("fresh entry");
        assert!(cached.is_none(), "server-confirmed absence is a valid state");
    }

    #[test]
    fn superseded_fetch_is_discarded() {
        let store = ConfigStore::new();
        let old = store.begin_fetch("ph-1");
        let new = store.begin_fetch("ph-1");

        assert!(
            !store.complete_fetch("ph-1", old, Some(config("stale"))),
            "older fetch must lose"
        );
        assert!(store.complete_fetch("ph-1", new, Some(config("current"))));

        let cached = store.fresh("ph-1").expect("fresh entry");
        assert_eq!(cached.expect("record").id, "current");
    }

    #[test]
    fn keys_are_independent() {
        let store = ConfigStore::new();
        let t1 = store.begin_fetch("ph-1");
        let t2 = store.begin_fetch("ph-2");
        store.complete_fetch("ph-1", t1, Some(config("a")));
        store.complete_fetch("ph-2", t2, Some(config("b")));
        store.invalidate("ph-1");
        assert!(store.fresh("ph-1").is_none());
        assert!(store.fresh("ph-2").is_some());
    }
}
