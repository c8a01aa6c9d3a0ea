//! Traits for the replica's external collaborators.
//!
//! Each order book family implements [`OnChainSource`]; the enrichment
//! pipeline dispatches to it by family name. [`ReadinessProbe`] gates startup
//! until the on-chain data source answers.

use crate::error::Result;
use crate::order::{OnChainData, Order};
use async_trait::async_trait;

/// Trait for family-specific on-chain lookups.
///
/// # Example
///
/// ```ignore
/// #[async_trait]
/// impl OnChainSource for TempoSource {
///     fn family(&self) -> &str {
///         "tempo"
///     }
///
///     async fn fetch_on_chain_data(&self, order: &Order) -> Result<OnChainData> {
///         let request = self.convert(order)?;
///         // Query balances and order status
///     }
/// }
/// ```
#[async_trait]
pub trait OnChainSource: Send + Sync {
    /// Order book name this source handles (exact match on `orderBookName`).
    fn family(&self) -> &str;

    /// Convert the order's off-chain data into the family's request shape
    /// and look up its on-chain state.
    ///
    /// No timeout is applied by the caller.
    async fn fetch_on_chain_data(&self, order: &Order) -> Result<OnChainData>;
}

/// Startup readiness check for a dependency.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Dependency name, for logs.
    fn name(&self) -> &str;

    /// Succeeds once the dependency is reachable.
    async fn probe(&self) -> Result<()>;
}
