//! On-chain enrichment of replicated orders.
//!
//! For an order missing on-chain data, the [`Enricher`] picks the source
//! registered for the order's `orderBookName`, merges the result into the
//! store and republishes `{orderHash, onChainData}` to the update stream for
//! other consumers. That delta carries no `offChainData`, so this process's
//! own consumer skips it.

use crate::error::{Error, Result};
use crate::order::OnChainData;
use crate::store::ReplicaStore;
use crate::traits::OnChainSource;
use external_services::{EntryId, StreamLog};
use metrics::counter;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Order book name -> on-chain source.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn OnChainSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its family name, replacing any previous one.
    pub fn register(&mut self, source: Arc<dyn OnChainSource>) {
        let family = source.family().to_string();
        info!("Registering on-chain source for order book: {}", family);
        self.sources.insert(family, source);
    }

    /// Get the source for an order book name (exact match).
    pub fn get(&self, family: &str) -> Option<Arc<dyn OnChainSource>> {
        self.sources.get(family).cloned()
    }

    /// Registered family names, sorted.
    pub fn families(&self) -> Vec<&str> {
        let mut families: Vec<&str> = self.sources.keys().map(|s| s.as_str()).collect();
        families.sort_unstable();
        families
    }
}

/// Result of one enrichment attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// On-chain data was fetched, merged and republished.
    Enriched,
    /// The order already had complete on-chain data.
    AlreadyEnriched,
    /// The order is not (or no longer) in the store.
    Missing,
}

/// Counts from [`Enricher::enrich_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    pub enriched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Delta republished after a successful enrichment.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OnChainDelta<'a> {
    order_hash: &'a str,
    on_chain_data: &'a OnChainData,
}

/// Enrichment pipeline.
pub struct Enricher {
    store: ReplicaStore,
    registry: SourceRegistry,
    update_log: Arc<dyn StreamLog>,
}

impl Enricher {
    pub fn new(store: ReplicaStore, registry: SourceRegistry, update_log: Arc<dyn StreamLog>) -> Self {
        Self {
            store,
            registry,
            update_log,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Enrich one order if any on-chain field is missing.
    ///
    /// Errors leave the order untouched; it is retried on its next update.
    /// Callers log the error.
    pub async fn enrich(&self, order_hash: &str) -> Result<EnrichOutcome> {
        let order = match self.store.get(order_hash).await {
            Some(order) => order,
            None => return Ok(EnrichOutcome::Missing),
        };

        if order.is_enriched() {
            return Ok(EnrichOutcome::AlreadyEnriched);
        }

        let result = self.fetch(&order).await;
        let data = match result {
            Ok(data) => data,
            Err(e) => {
                counter!("order_replica_enrichments_total", "outcome" => "failed").increment(1);
                return Err(e);
            }
        };

        if !self.store.merge_on_chain_data(order_hash, data.clone()).await {
            debug!("Order {} was removed during enrichment", order_hash);
            return Ok(EnrichOutcome::Missing);
        }
        counter!("order_replica_enrichments_total", "outcome" => "enriched").increment(1);

        match self.publish_delta(order_hash, &data).await {
            Ok(id) => debug!(
                "Published on-chain data for {} to '{}' as {}",
                order_hash,
                self.update_log.name(),
                id
            ),
            Err(e) => warn!("Failed to publish on-chain data for {}: {}", order_hash, e),
        }

        Ok(EnrichOutcome::Enriched)
    }

    async fn fetch(&self, order: &crate::order::Order) -> Result<OnChainData> {
        if !order.has_off_chain_data() {
            return Err(Error::MissingOffChainData(order.order_hash.clone()));
        }

        let source = self
            .registry
            .get(&order.order_book_name)
            .ok_or_else(|| Error::UnknownOrderBook(order.order_book_name.clone()))?;

        source.fetch_on_chain_data(order).await
    }

    async fn publish_delta(&self, order_hash: &str, data: &OnChainData) -> Result<EntryId> {
        let payload = serde_json::to_string(&OnChainDelta {
            order_hash,
            on_chain_data: data,
        })?;
        Ok(self.update_log.append(&payload).await?)
    }

    /// Enrich every order in the store, e.g. after loading a snapshot.
    pub async fn enrich_all(&self) -> EnrichSummary {
        let mut summary = EnrichSummary::default();

        for order_hash in self.store.hashes().await {
            match self.enrich(&order_hash).await {
                Ok(EnrichOutcome::Enriched) => summary.enriched += 1,
                Ok(_) => summary.skipped += 1,
                Err(e) => {
                    warn!("Enrichment failed for order {}: {}", order_hash, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Enriched existing orders: {} enriched, {} skipped, {} failed",
            summary.enriched, summary.skipped, summary.failed
        );
        summary
    }
}
