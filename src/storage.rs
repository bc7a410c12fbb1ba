//! Persistence layer.
//!
//! One JSON save file per tenant under the configured data directory,
//! fully overwritten on every save. Only what is needed to rebuild a
//! watcher is stored: the roster, the ledger, and the in-flight wagers;
//! odds and lock state are recomputed from timestamps at restore time.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{MatchKey, Side, TenantStatus};

// ---------------------------------------------------------------------------
// Save shape
// ---------------------------------------------------------------------------

/// Everything persisted for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSave {
    pub tenant_id: String,
    pub channel_ref: String,
    pub status: TenantStatus,
    pub roster: Vec<SavedIdentity>,
    pub ledger: Vec<SavedBalance>,
    pub in_flight: Vec<SavedWager>,
}

/// Roster entries persist only the lookup pair; the provider-side id is
/// re-resolved at restore time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedIdentity {
    pub handle: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedBalance {
    pub user_id: String,
    pub amount: i64,
}

/// An unresolved wager. Wagers without a display handle are never
/// persisted: nobody could have bet on them yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedWager {
    pub message_ref: String,
    #[serde(rename = "match")]
    pub match_info: SavedMatch,
    pub participants: Vec<SavedParticipant>,
    pub bets: Vec<SavedBet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedMatch {
    pub key: MatchKey,
    pub mode: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedParticipant {
    pub identity_id: String,
    pub side: Side,
    pub character_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedBet {
    pub user_id: String,
    pub amount: u64,
    pub side: Side,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// File-backed store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn path_for(&self, tenant_id: &str) -> PathBuf {
        self.data_dir.join(format!("{tenant_id}.json"))
    }

    /// Write a tenant save, replacing any previous file.
    pub fn save(&self, save: &TenantSave) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).context(format!(
            "Failed to create data directory {}",
            self.data_dir.display()
        ))?;

        let path = self.path_for(&save.tenant_id);
        let json = serde_json::to_string_pretty(save)
            .context("Failed to serialise tenant state")?;
        std::fs::write(&path, &json)
            .context(format!("Failed to write state to {}", path.display()))?;

        debug!(
            tenant = %save.tenant_id,
            roster = save.roster.len(),
            in_flight = save.in_flight.len(),
            "State saved"
        );
        Ok(())
    }

    /// Load a tenant save. Returns None if the file doesn't exist
    /// (fresh start).
    pub fn load(&self, tenant_id: &str) -> Result<Option<TenantSave>> {
        let path = self.path_for(tenant_id);
        if !path.exists() {
            info!(tenant = %tenant_id, "No saved state found, starting fresh");
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path)
            .context(format!("Failed to read state from {}", path.display()))?;
        let save: TenantSave = serde_json::from_str(&json)
            .context(format!("Failed to parse state from {}", path.display()))?;

        info!(
            tenant = %tenant_id,
            roster = save.roster.len(),
            in_flight = save.in_flight.len(),
            "State loaded from disk"
        );
        Ok(Some(save))
    }

    /// Delete a tenant's save file (for testing or reset).
    pub fn delete(&self, tenant_id: &str) -> Result<()> {
        let path = self.path_for(tenant_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .context(format!("Failed to delete state file {}", path.display()))?;
        }
        Ok(())
    }

    /// Tenant ids of every save file in the data directory.
    pub fn list(&self) -> Result<Vec<String>> {
        if !Path::new(&self.data_dir).exists() {
            return Ok(Vec::new());
        }

        let mut tenants = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir).context(format!(
            "Failed to read data directory {}",
            self.data_dir.display()
        ))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    tenants.push(stem.to_string());
                }
            }
        }
        tenants.sort();
        Ok(tenants)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
