use oracle_common::types::PriceObservation;
use tracing::warn;

/// Uniform capability set every exchange adapter exposes (spec §4.2).
/// Mirrors the teacher's `PriceSourceTrait` in
/// `kembridge-1inch-service/src/services/price_oracle.rs`, generalised from
/// a single `get_price` call to the full fetch/list/enabled contract.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable string identifier used by the map and logs.
    fn source_name(&self) -> &str;

    /// `true` when the adapter has the credentials/endpoints it needs.
    fn is_enabled(&self) -> bool;

    /// Source-side symbol listing. Implementations are expected to consult
    /// `PriceCache`'s long-TTL cache rather than hit the network on every call.
    async fn get_supported_symbols(&self) -> oracle_common::Result<Vec<String>>;

    /// Fetches one symbol. Adapters may implement this by delegating to a
    /// single-element batch fetch.
    async fn get_price_data(&self, symbol: &str) -> oracle_common::Result<PriceObservation>;

    /// Fetches many symbols. The batch form is authoritative: a symbol the
    /// source does not support is skipped, not failed. The default
    /// implementation fans out `get_price_data` concurrently and drops
    /// per-symbol errors with a warning, matching spec §4.2's "adapter
    /// errors are surfaced as per-symbol omissions, not cycle-level
    /// failures".
    async fn get_price_data_batch(&self, symbols: &[String]) -> Vec<PriceObservation> {
        let futures = symbols.iter().map(|s| self.get_price_data(s));
        let results = futures::future::join_all(futures).await;
        results
            .into_iter()
            .zip(symbols.iter())
            .filter_map(|(r, symbol)| match r {
                Ok(obs) => Some(obs),
                Err(e) => {
                    warn!(source = self.source_name(), symbol, error = %e, "skipping symbol");
                    None
                }
            })
            .collect()
    }
}
