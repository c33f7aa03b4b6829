//! Snapshot File - Atomic JSON Store Persistence
//!
//! Saves store snapshots to `store.json` using atomic writes
//! (write to tmp file, then rename). The file on disk is always
//! either the previous or the new snapshot, never a partial write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, instrument};

use super::memory::StoreSnapshot;

/// Atomic JSON snapshot file for crash recovery.
pub struct SnapshotFile {
    /// Path to store.json.
    path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
}

impl SnapshotFile {
    /// Open the snapshot location in `data_dir`, creating the directory.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

        Ok(Self {
            path: dir.join("store.json"),
            tmp_path: dir.join("store.json.tmp"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save a snapshot atomically (tmp → rename).
    #[instrument(skip(self, snapshot))]
    pub async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let json = serde_json::to_vec(snapshot).context("Failed to serialize snapshot")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp snapshot file")?;
        fs::rename(&self.tmp_path, &self.path)
            .await
            .context("Failed to rename snapshot file")?;

        info!(
            path = %self.path.display(),
            markets = snapshot.markets.len(),
            ledger_entries = snapshot.ledger.len(),
            bytes = json.len(),
            "Store snapshot saved"
        );
        Ok(())
    }

    /// Load the most recent snapshot; `None` on first startup.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            info!("No snapshot found, starting with an empty store");
            return Ok(None);
        }

        let json = fs::read(&self.path)
            .await
            .context("Failed to read snapshot file")?;
        let snapshot: StoreSnapshot =
            serde_json::from_slice(&json).context("Failed to parse snapshot JSON")?;

        info!(
            version = %snapshot.version,
            markets = snapshot.markets.len(),
            wallets = snapshot.wallets.len(),
            "Store snapshot loaded"
        );
        Ok(Some(snapshot))
    }
}
