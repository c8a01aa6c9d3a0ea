//! Snapshot publication and cold-start bootstrap.
//!
//! A snapshot is the full replica image plus the update-stream cursor it
//! reflects, appended to the snapshot stream under field [`SNAPSHOT_FIELD`].
//! Only the newest entry is ever read back. Resuming the update stream after
//! the snapshot cursor replays nothing the image already contains.

use crate::error::{Error, Result};
use crate::store::{ReplicaSnapshot, ReplicaStore};
use external_services::{EntryId, StreamLog};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Stream field carrying the snapshot image.
pub const SNAPSHOT_FIELD: &str = "snapshot";

/// Result of [`SnapshotManager::load_latest`].
pub struct LoadedSnapshot {
    pub store: ReplicaStore,
    /// Where the update consumer resumes.
    pub cursor: EntryId,
    /// False when the snapshot stream was empty.
    pub found: bool,
    /// Snapshot stream entry the store was loaded from.
    pub snapshot_id: Option<EntryId>,
}

pub struct SnapshotManager {
    log: Arc<dyn StreamLog>,
    retry_delay: Duration,
    require_snapshot: bool,
}

impl SnapshotManager {
    pub fn new(log: Arc<dyn StreamLog>) -> Self {
        Self {
            log,
            retry_delay: Duration::from_secs(5),
            require_snapshot: false,
        }
    }

    /// Delay between bootstrap attempts.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Keep waiting while the snapshot stream is empty instead of starting
    /// from an empty store.
    pub fn with_require_snapshot(mut self, require_snapshot: bool) -> Self {
        self.require_snapshot = require_snapshot;
        self
    }

    /// Serialize the store and append it to the snapshot stream.
    ///
    /// The store lock is held until the append completes, so the update
    /// consumer makes no progress meanwhile.
    pub async fn publish(&self, store: &ReplicaStore) -> Result<EntryId> {
        let guard = store.lock().await;
        let payload = guard.snapshot()?;
        let id = self.log.append(&payload).await?;

        info!(
            "Published snapshot {} to '{}' ({} orders, cursor {})",
            id,
            self.log.name(),
            guard.len(),
            guard.cursor()
        );
        drop(guard);

        counter!("order_replica_snapshots_published_total").increment(1);
        Ok(id)
    }

    /// Read and decode the newest snapshot, if any.
    pub async fn try_load(&self) -> Result<Option<(EntryId, ReplicaSnapshot)>> {
        let entry = match self.log.latest().await? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let payload = entry
            .payload
            .ok_or_else(|| Error::EmptySnapshot(entry.id.to_string()))?;
        let snapshot = ReplicaSnapshot::decode(&payload)?;
        Ok(Some((entry.id, snapshot)))
    }

    /// Load the newest snapshot, retrying every `retry_delay` until one is
    /// read and decoded.
    ///
    /// With an empty stream and `require_snapshot` unset, returns an empty
    /// store at cursor `0`.
    pub async fn load_latest(&self) -> LoadedSnapshot {
        loop {
            match self.try_load().await {
                Ok(Some((id, snapshot))) => {
                    let store = ReplicaStore::from_snapshot(snapshot);
                    let cursor = store.cursor().await;
                    info!(
                        "Loaded snapshot {} from '{}': {} orders, resuming after {}",
                        id,
                        self.log.name(),
                        store.len().await,
                        cursor
                    );
                    return LoadedSnapshot {
                        store,
                        cursor,
                        found: true,
                        snapshot_id: Some(id),
                    };
                }
                Ok(None) if !self.require_snapshot => {
                    info!("No snapshot in '{}', starting empty", self.log.name());
                    return LoadedSnapshot {
                        store: ReplicaStore::new(),
                        cursor: EntryId::ZERO,
                        found: false,
                        snapshot_id: None,
                    };
                }
                Ok(None) => {
                    info!(
                        "Waiting for a snapshot in '{}'. Retrying in {:?}",
                        self.log.name(),
                        self.retry_delay
                    );
                }
                Err(e) => {
                    warn!(
                        "Failed to load snapshot from '{}': {}. Retrying in {:?}",
                        self.log.name(),
                        e,
                        self.retry_delay
                    );
                }
            }

            tokio::time::sleep(self.retry_delay).await;
        }
    }
}
