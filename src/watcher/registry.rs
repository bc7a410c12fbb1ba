//! Tenant registry.
//!
//! Maps tenant ids to their watchers and rebuilds every persisted
//! tenant at startup. One registry per process; all watchers share the
//! same providers and store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::config::WatchSettings;
use crate::providers::{MatchDirectory, NotificationSink, StatsProvider};
use crate::storage::Store;
use crate::watcher::GameWatcher;

pub struct TenantRegistry {
    settings: WatchSettings,
    directory: Arc<dyn MatchDirectory>,
    stats: Arc<dyn StatsProvider>,
    sink: Arc<dyn NotificationSink>,
    store: Store,
    tenants: Mutex<HashMap<String, Arc<GameWatcher>>>,
}

impl TenantRegistry {
    pub fn new(
        settings: WatchSettings,
        directory: Arc<dyn MatchDirectory>,
        stats: Arc<dyn StatsProvider>,
        sink: Arc<dyn NotificationSink>,
        store: Store,
    ) -> Self {
        Self {
            settings,
            directory,
            stats,
            sink,
            store,
            tenants: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: &str) -> Option<Arc<GameWatcher>> {
        self.tenants.lock().unwrap().get(tenant_id).cloned()
    }

    /// The watcher for a tenant, creating an idle one on first sight.
    pub fn get_or_create(&self, tenant_id: &str) -> Arc<GameWatcher> {
        let mut tenants = self.tenants.lock().unwrap();
        tenants
            .entry(tenant_id.to_string())
            .or_insert_with(|| {
                info!(tenant = %tenant_id, "Creating watcher");
                GameWatcher::new(
                    tenant_id,
                    self.settings.clone(),
                    Arc::clone(&self.directory),
                    Arc::clone(&self.stats),
                    Arc::clone(&self.sink),
                    self.store.clone(),
                )
            })
            .clone()
    }

    /// Rebuild and start every tenant with a save file. A tenant that
    /// fails to restore is logged and skipped; the rest come up.
    pub async fn restore_all(&self) -> anyhow::Result<usize> {
        let tenant_ids = self.store.list()?;
        info!(tenants = tenant_ids.len(), "Restoring saved tenants");

        let mut restored = 0;
        for tenant_id in tenant_ids {
            let save = match self.store.load(&tenant_id) {
                Ok(Some(save)) => save,
                Ok(None) => continue,
                Err(e) => {
                    error!(tenant = %tenant_id, error = %e, "Failed to load save");
                    continue;
                }
            };

            let channel_ref = save.channel_ref.clone();
            if channel_ref.is_empty() {
                info!(tenant = %tenant_id, "Saved tenant has no channel, leaving stopped");
                let _ = self.get_or_create(&tenant_id);
                continue;
            }

            let watcher = self.get_or_create(&tenant_id);
            match watcher.start(channel_ref, Some(save)).await {
                Ok(()) => restored += 1,
                Err(e) => {
                    error!(tenant = %tenant_id, error = %e, "Failed to restore tenant");
                }
            }
        }

        info!(restored, "Tenant restore complete");
        Ok(restored)
    }

    /// Stop every running watcher, persisting final state.
    pub fn stop_all(&self) {
        let tenants = self.tenants.lock().unwrap();
        for (tenant_id, watcher) in tenants.iter() {
            if let Err(e) = watcher.stop() {
                error!(tenant = %tenant_id, error = %e, "Failed to stop watcher");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
