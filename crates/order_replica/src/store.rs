//! In-memory order replica.
//!
//! A single `tokio::sync::Mutex` guards the whole map together with the
//! update-stream cursor. Every mutation and every snapshot read takes that
//! lock, so a snapshot never observes a partially applied update. The lock
//! is FIFO-fair: a waiting snapshot is served before later consumer writes.
//!
//! Record counts are moderate; cross-record consistency matters more here
//! than write throughput, so there is no per-key locking.

use crate::error::{Error, Result};
use crate::order::{OnChainData, Order};
use chrono::Utc;
use external_services::EntryId;
use normalizer::UpdateAction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Shared handle to the replica. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ReplicaStore {
    inner: Arc<ReplicaStoreInner>,
}

#[derive(Debug)]
struct ReplicaStoreInner {
    state: Mutex<ReplicaState>,
    /// Statistics
    total_upserts: AtomicU64,
    total_deletes: AtomicU64,
    total_enrichments: AtomicU64,
}

#[derive(Debug, Default)]
struct ReplicaState {
    /// order_hash -> Order
    orders: HashMap<String, Order>,
    /// Last applied update-stream entry.
    cursor: EntryId,
}

impl ReplicaState {
    fn advance(&mut self, id: EntryId) -> bool {
        if id > self.cursor {
            self.cursor = id;
            return true;
        }

        if id < self.cursor {
            warn!("Refusing to move cursor back from {} to {}", self.cursor, id);
        } else {
            debug!("Cursor already at {}", id);
        }
        false
    }
}

/// Effect of [`ReplicaStore::apply`] on the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The entry is at or behind the cursor. Nothing changed.
    Stale,
    Upserted,
    Deleted { existed: bool },
    Skipped,
}

/// Full image of the replica as written to the snapshot stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSnapshot {
    /// Update-stream position the image reflects.
    pub cursor: EntryId,
    /// Creation time (unix milliseconds).
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub orders: HashMap<String, Order>,
}

impl ReplicaSnapshot {
    /// Decode a snapshot payload.
    pub fn decode(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(Error::from)
    }
}

/// Borrowed form of [`ReplicaSnapshot`], serialized without cloning records.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a> {
    cursor: EntryId,
    created_at: i64,
    orders: &'a HashMap<String, Order>,
}

/// Exclusive access to the replica.
///
/// Holding a guard blocks every other store operation, including the update
/// consumer.
pub struct ReplicaGuard<'a> {
    state: MutexGuard<'a, ReplicaState>,
}

impl ReplicaGuard<'_> {
    /// Serialize the full replica, cursor included.
    pub fn snapshot(&self) -> Result<String> {
        let image = SnapshotRef {
            cursor: self.state.cursor,
            created_at: Utc::now().timestamp_millis(),
            orders: &self.state.orders,
        };
        Ok(serde_json::to_string(&image)?)
    }

    pub fn cursor(&self) -> EntryId {
        self.state.cursor
    }

    pub fn len(&self) -> usize {
        self.state.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.orders.is_empty()
    }
}

/// Store statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub order_count: usize,
    pub enriched_count: usize,
    pub cursor: String,
    pub total_upserts: u64,
    pub total_deletes: u64,
    pub total_enrichments: u64,
}

impl ReplicaStore {
    /// Create an empty store at cursor `0`.
    pub fn new() -> Self {
        Self::with_state(ReplicaState::default())
    }

    /// Create a store from a decoded snapshot. The snapshot cursor becomes
    /// the resume point.
    pub fn from_snapshot(snapshot: ReplicaSnapshot) -> Self {
        let mut orders = HashMap::with_capacity(snapshot.orders.len());

        for (order_hash, mut order) in snapshot.orders {
            if order_hash.is_empty() {
                warn!("Dropping snapshot record with empty orderHash");
                continue;
            }
            order.order_hash = order_hash.clone();
            orders.insert(order_hash, order);
        }

        Self::with_state(ReplicaState {
            orders,
            cursor: snapshot.cursor,
        })
    }

    fn with_state(state: ReplicaState) -> Self {
        Self {
            inner: Arc::new(ReplicaStoreInner {
                state: Mutex::new(state),
                total_upserts: AtomicU64::new(0),
                total_deletes: AtomicU64::new(0),
                total_enrichments: AtomicU64::new(0),
            }),
        }
    }

    /// Take exclusive access to the whole replica.
    pub async fn lock(&self) -> ReplicaGuard<'_> {
        ReplicaGuard {
            state: self.inner.state.lock().await,
        }
    }

    /// Get a copy of an order.
    pub async fn get(&self, order_hash: &str) -> Option<Order> {
        self.inner.state.lock().await.orders.get(order_hash).cloned()
    }

    /// Apply `mutate` to the order (or a fresh one carrying only the hash)
    /// and store the result. Returns the stored order.
    pub async fn upsert<F>(&self, order_hash: &str, mutate: F) -> Order
    where
        F: FnOnce(&mut Order),
    {
        let mut state = self.inner.state.lock().await;
        let order = state
            .orders
            .entry(order_hash.to_string())
            .or_insert_with(|| Order::new(order_hash));

        mutate(order);
        order.order_hash = order_hash.to_string();

        self.inner.total_upserts.fetch_add(1, Ordering::Relaxed);
        order.clone()
    }

    /// Merge enrichment results into an existing order.
    ///
    /// Returns `false` (and stores nothing) if the order no longer exists.
    pub(crate) async fn merge_on_chain_data(&self, order_hash: &str, data: OnChainData) -> bool {
        let mut state = self.inner.state.lock().await;
        match state.orders.get_mut(order_hash) {
            Some(order) => {
                order.on_chain_data = Some(data);
                self.inner.total_enrichments.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Remove an order, returning it if it existed.
    pub async fn delete(&self, order_hash: &str) -> Option<Order> {
        let removed = self.inner.state.lock().await.orders.remove(order_hash);
        if removed.is_some() {
            self.inner.total_deletes.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Last applied update-stream entry.
    pub async fn cursor(&self) -> EntryId {
        self.inner.state.lock().await.cursor
    }

    /// Advance the cursor. IDs at or before the current cursor are refused.
    pub async fn set_cursor(&self, id: EntryId) -> bool {
        self.inner.state.lock().await.advance(id)
    }

    /// Advance the cursor to `id` and apply `action` under one lock, so no
    /// snapshot sees the cursor past an entry whose effect is missing.
    ///
    /// Upserts replace the order book name (when present) and the off-chain
    /// data; on-chain data is left as is.
    pub async fn apply(&self, id: EntryId, action: UpdateAction) -> Applied {
        let mut state = self.inner.state.lock().await;
        if !state.advance(id) {
            return Applied::Stale;
        }

        match action {
            UpdateAction::Delete { order_hash } => {
                let existed = state.orders.remove(&order_hash).is_some();
                if existed {
                    self.inner.total_deletes.fetch_add(1, Ordering::Relaxed);
                }
                Applied::Deleted { existed }
            }
            UpdateAction::Upsert {
                order_hash,
                order_book_name,
                off_chain_data,
            } => {
                let order = state
                    .orders
                    .entry(order_hash.clone())
                    .or_insert_with(|| Order::new(order_hash));
                if let Some(name) = order_book_name {
                    order.order_book_name = name;
                }
                order.off_chain_data = off_chain_data;
                self.inner.total_upserts.fetch_add(1, Ordering::Relaxed);
                Applied::Upserted
            }
            UpdateAction::Skip { .. } => Applied::Skipped,
        }
    }

    /// All order hashes.
    pub async fn hashes(&self) -> Vec<String> {
        self.inner.state.lock().await.orders.keys().cloned().collect()
    }

    /// Copies of all orders, sorted by hash.
    pub async fn orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .inner
            .state
            .lock()
            .await
            .orders
            .values()
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.order_hash.cmp(&b.order_hash));
        orders
    }

    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.state.lock().await.orders.is_empty()
    }

    /// Get store statistics.
    pub async fn stats(&self) -> StoreStats {
        let (order_count, enriched_count, cursor) = {
            let state = self.inner.state.lock().await;
            let enriched = state.orders.values().filter(|o| o.is_enriched()).count();
            (state.orders.len(), enriched, state.cursor)
        };

        StoreStats {
            order_count,
            enriched_count,
            cursor: cursor.to_string(),
            total_upserts: self.inner.total_upserts.load(Ordering::Relaxed),
            total_deletes: self.inner.total_deletes.load(Ordering::Relaxed),
            total_enrichments: self.inner.total_enrichments.load(Ordering::Relaxed),
        }
    }
}

impl Default for ReplicaStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
