//! Update stream consumer.
//!
//! Reads the update stream in batches after the store cursor, applies each
//! entry in order and enriches upserted orders inline. The cursor moves to
//! an entry in the same critical section that applies it, so a snapshot
//! never claims an entry whose effect it lacks. Enrichment runs after the
//! lock is released.

use crate::enrichment::Enricher;
use crate::error::{Error, Result};
use crate::store::{Applied, ReplicaStore};
use external_services::{LogEntry, StreamLog};
use metrics::{counter, gauge};
use normalizer::{UpdateAction, UpdateEntry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Stream field carrying an update payload.
pub const UPDATE_FIELD: &str = "data";

/// Upper bound for the read retry backoff.
pub const MAX_READ_BACKOFF: Duration = Duration::from_secs(30);

/// What to do when reading the update stream fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadFailurePolicy {
    /// Stop the consumer with an error on the first failure.
    #[default]
    Fatal,
    /// Retry with exponential backoff; fail after `max_attempts` consecutive
    /// failures.
    Retry { max_attempts: u32, base_delay: Duration },
}

/// Configuration for the replica service.
#[derive(Debug, Clone)]
pub struct ReplicaServiceConfig {
    /// Maximum entries per read.
    pub batch_size: usize,
    /// Sleep after each non-empty batch. Zero disables it.
    pub batch_pause: Duration,
    pub read_failure_policy: ReadFailurePolicy,
}

impl Default for ReplicaServiceConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_pause: Duration::from_millis(50),
            read_failure_policy: ReadFailurePolicy::Fatal,
        }
    }
}

/// Service that consumes the update stream and keeps the replica current.
pub struct ReplicaService {
    store: ReplicaStore,
    update_log: Arc<dyn StreamLog>,
    enricher: Arc<Enricher>,
    config: ReplicaServiceConfig,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ReplicaService {
    pub fn new(
        store: ReplicaStore,
        update_log: Arc<dyn StreamLog>,
        enricher: Arc<Enricher>,
        config: ReplicaServiceConfig,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            store,
            update_log,
            enricher,
            config,
            shutdown_rx,
        }
    }

    /// Run the consumer until shutdown or a fatal read failure.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "Starting ReplicaService on '{}' after {}",
            self.update_log.name(),
            self.store.cursor().await
        );

        let mut failures: u32 = 0;

        loop {
            let cursor = self.store.cursor().await;

            let read = tokio::select! {
                biased;  // Prioritize shutdown signal

                _ = self.shutdown_rx.recv() => {
                    info!("ReplicaService received shutdown signal");
                    break;
                }

                read = self.update_log.read_after(cursor, self.config.batch_size) => read,
            };

            let entries = match read {
                Ok(entries) => {
                    failures = 0;
                    entries
                }
                Err(e) => {
                    failures += 1;
                    let delay = match self.config.read_failure_policy {
                        ReadFailurePolicy::Retry {
                            max_attempts,
                            base_delay,
                        } if failures < max_attempts => backoff_delay(base_delay, failures),
                        _ => {
                            error!(
                                "Failed to read '{}' after {}: {}",
                                self.update_log.name(),
                                cursor,
                                e
                            );
                            return Err(Error::ReadFailed {
                                attempts: failures,
                                source: e,
                            });
                        }
                    };

                    warn!(
                        "Failed to read '{}' (attempt {}): {}. Retrying in {:?}",
                        self.update_log.name(),
                        failures,
                        e,
                        delay
                    );

                    tokio::select! {
                        biased;

                        _ = self.shutdown_rx.recv() => {
                            info!("ReplicaService received shutdown signal");
                            break;
                        }

                        _ = tokio::time::sleep(delay) => {}
                    }
                    continue;
                }
            };

            // Block timed out.
            if entries.is_empty() {
                continue;
            }

            debug!("Read {} entries after {}", entries.len(), cursor);
            for entry in entries {
                self.process_entry(entry).await;
            }

            self.update_metrics().await;

            if !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }
        }

        info!("ReplicaService stopped at {}", self.store.cursor().await);
        Ok(())
    }

    /// Apply one update entry. Failures are logged and the entry is skipped.
    ///
    /// Undecodable entries still advance the cursor.
    pub async fn process_entry(&self, entry: LogEntry) {
        counter!("order_replica_entries_received_total").increment(1);

        let decoded = match entry.payload.as_deref() {
            Some(payload) => UpdateEntry::decode(payload).map_err(|e| e.to_string()),
            None => Err(format!("no '{}' field", UPDATE_FIELD)),
        };

        let action = match decoded {
            Ok(update) => update.into_action(),
            Err(reason) => {
                if self.store.set_cursor(entry.id).await {
                    warn!("Skipping entry {}: {}", entry.id, reason);
                    counter!("order_replica_entries_dropped_total", "reason" => "malformed").increment(1);
                } else {
                    self.drop_stale(&entry);
                }
                return;
            }
        };

        let order_hash = match &action {
            UpdateAction::Delete { order_hash }
            | UpdateAction::Upsert { order_hash, .. }
            | UpdateAction::Skip { order_hash } => order_hash.clone(),
        };

        match self.store.apply(entry.id, action).await {
            Applied::Stale => self.drop_stale(&entry),
            Applied::Deleted { existed } => {
                if existed {
                    debug!("Deleted order {}", order_hash);
                } else {
                    debug!("Delete for unknown order {}", order_hash);
                }
                counter!("order_replica_deletes_total").increment(1);
            }
            Applied::Skipped => {
                debug!("Entry {} for {} carries no offChainData", entry.id, order_hash);
            }
            Applied::Upserted => {
                if let Err(e) = self.enricher.enrich(&order_hash).await {
                    warn!("Enrichment failed for order {}: {}", order_hash, e);
                }
            }
        }
    }

    fn drop_stale(&self, entry: &LogEntry) {
        debug!("Skipping entry {}: already applied", entry.id);
        counter!("order_replica_entries_dropped_total", "reason" => "stale").increment(1);
    }

    async fn update_metrics(&self) {
        gauge!("order_replica_orders").set(self.store.len().await as f64);
    }
}

/// `base * 2^(attempt - 1)`, capped at [`MAX_READ_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_READ_BACKOFF)
}

// ============================================================================
// Tests
// ============================================================================
