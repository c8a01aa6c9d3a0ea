//! Order replica library.
//!
//! Keeps an in-memory replica of an order set consistent with two Redis
//! streams: a snapshot stream holding full images of the replica, and an
//! update stream of incremental changes. Orders missing on-chain state are
//! enriched through per-order-book sources and the result is republished to
//! the update stream.
//!
//! # Architecture
//!
//! - **Single lock**: the whole map and the stream cursor sit behind one
//!   FIFO-fair mutex, so snapshots are always consistent with their cursor
//! - **Cursor first**: an entry's ID is recorded before the entry is applied
//! - **Pluggable sources**: [`OnChainSource`] implementations are registered
//!   per order book name
//!
//! # Example
//!
//! ```ignore
//! use order_replica::{Enricher, ReplicaService, SnapshotManager, SourceRegistry};
//!
//! let loaded = SnapshotManager::new(snapshot_log).load_latest().await;
//! let enricher = Arc::new(Enricher::new(loaded.store.clone(), registry, update_log.clone()));
//! let service = ReplicaService::new(loaded.store.clone(), update_log, enricher, config, shutdown_rx);
//!
//! // Spawn service
//! tokio::spawn(service.run());
//!
//! // Query the replica
//! let order = loaded.store.get("0xabc").await;
//! ```

pub mod api;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod order;
pub mod readiness;
pub mod service;
pub mod snapshot;
pub mod sources;
pub mod store;
pub mod traits;

#[cfg(test)]
mod testing;

pub use api::{create_router, AppState};
pub use config::ReplicaConfig;
pub use enrichment::{EnrichOutcome, EnrichSummary, Enricher, SourceRegistry};
pub use error::{Error, Result};
pub use order::{OnChainData, Order};
pub use readiness::wait_until_ready;
pub use service::{ReadFailurePolicy, ReplicaService, ReplicaServiceConfig, UPDATE_FIELD};
pub use snapshot::{LoadedSnapshot, SnapshotManager, SNAPSHOT_FIELD};
pub use sources::{Erc20Source, RedisReadinessProbe, RpcReadinessProbe};
pub use store::{Applied, ReplicaGuard, ReplicaSnapshot, ReplicaStore, StoreStats};
pub use traits::{OnChainSource, ReadinessProbe};
