use std::sync::Arc;

use oracle_common::config::OracleConfig;
use oracle_common::CoreError;

use crate::adapter::SourceAdapter;
use crate::sources::{
    BinanceAdapter, CoinGeckoAdapter, CoinMarketCapAdapter, CoinbaseAdapter, KrakenAdapter,
    OkexAdapter,
};
use crate::symbol_map::SymbolMap;

/// Builds the adapter registry at startup from configuration, excluding
/// disabled adapters eagerly (spec §9 "the adapter registry is built at
/// startup from configuration; disabled adapters are excluded eagerly").
pub struct SourceRegistry {
    adapters: Vec<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    #[must_use]
    pub fn from_config(config: &OracleConfig) -> Self {
        let symbol_map = Arc::new(SymbolMap::new(config.symbol_mappings.mappings.clone()));
        let mut candidates: Vec<Arc<dyn SourceAdapter>> = Vec::new();

        if let Some(c) = &config.binance {
            candidates.push(Arc::new(BinanceAdapter::new(c.clone(), symbol_map.clone())));
        }
        if let Some(c) = &config.okex {
            candidates.push(Arc::new(OkexAdapter::new(c.clone(), symbol_map.clone())));
        }
        if let Some(c) = &config.coinbase {
            candidates.push(Arc::new(CoinbaseAdapter::new(c.clone(), symbol_map.clone())));
        }
        if let Some(c) = &config.coinmarketcap {
            candidates.push(Arc::new(CoinMarketCapAdapter::new(c.clone(), symbol_map.clone())));
        }
        if let Some(c) = &config.coingecko {
            candidates.push(Arc::new(CoinGeckoAdapter::new(c.clone(), symbol_map.clone())));
        }
        if let Some(c) = &config.kraken {
            candidates.push(Arc::new(KrakenAdapter::new(c.clone(), symbol_map.clone())));
        }

        let adapters = candidates.into_iter().filter(|a| a.is_enabled()).collect();
        Self { adapters }
    }

    #[must_use]
    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.adapters.len()
    }

    /// Raised so the daemon can fail fast with `ErrConfig` before running a
    /// cycle (SPEC_FULL.md §2, "health/readiness signal for the source set").
    #[must_use]
    pub fn has_quorum(&self) -> bool {
        self.enabled_count() > 0
    }

    pub fn require_quorum(&self) -> Result<(), CoreError> {
        if self.has_quorum() {
            Ok(())
        } else {
            Err(CoreError::Config("no enabled data source".to_string()))
        }
    }
}
