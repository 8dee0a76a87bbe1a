use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use moka::future::Cache;
use oracle_common::types::PriceObservation;
use tokio::sync::RwLock;
use tracing::warn;

use crate::adapter::SourceAdapter;

/// Short-TTL in-memory cache of per-source observations and per-source
/// supported-symbol lists, with stale-fallback policy (spec §4.4). Grounded
/// in the teacher's `CacheService` (key-builder style, batch merge) but
/// backed by `moka` in-process TTL caches rather than Redis, since the spec
/// requires an in-memory cache, not a shared remote one.
pub struct PriceCache {
    price_cache: Cache<(String, String), PriceObservation>,
    supported_cache: Cache<String, Vec<String>>,
    stale_supported: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl PriceCache {
    #[must_use]
    pub fn new(price_ttl: Duration, supported_ttl: Duration) -> Self {
        Self {
            price_cache: Cache::builder().time_to_live(price_ttl).build(),
            supported_cache: Cache::builder().time_to_live(supported_ttl).build(),
            stale_supported: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Default profile: 45 s price TTL, 1 h supported-symbols TTL (spec §4.4).
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Duration::from_secs(45), Duration::from_secs(3600))
    }

    /// `price:{symbol}` lookup. On miss, calls the adapter; a non-positive
    /// price is never cached nor returned (the cache's never-≤-0 guarantee).
    pub async fn get_price(
        &self,
        adapter: &dyn SourceAdapter,
        symbol: &str,
    ) -> oracle_common::Result<Option<PriceObservation>> {
        let key = (adapter.source_name().to_string(), symbol.to_string());
        if let Some(obs) = self.price_cache.get(&key).await {
            return Ok(Some(obs));
        }
        let obs = adapter.get_price_data(symbol).await?;
        if obs.price > BigDecimal::from(0) {
            self.price_cache.insert(key, obs.clone()).await;
            Ok(Some(obs))
        } else {
            warn!(source = adapter.source_name(), symbol, "dropping non-positive price, not caching");
            Ok(None)
        }
    }

    /// Computes the missing subset, issues one downstream batch call, merges
    /// results. Never returns a non-positive-price observation.
    pub async fn get_price_batch(
        &self,
        adapter: &dyn SourceAdapter,
        symbols: &[String],
    ) -> Vec<PriceObservation> {
        let mut hits = Vec::new();
        let mut missing = Vec::new();
        for symbol in symbols {
            let key = (adapter.source_name().to_string(), symbol.clone());
            match self.price_cache.get(&key).await {
                Some(obs) => hits.push(obs),
                None => missing.push(symbol.clone()),
            }
        }
        if !missing.is_empty() {
            let fetched = adapter.get_price_data_batch(&missing).await;
            for obs in fetched {
                if obs.price > BigDecimal::from(0) {
                    let key = (adapter.source_name().to_string(), obs.symbol.clone());
                    self.price_cache.insert(key, obs.clone()).await;
                    hits.push(obs);
                }
            }
        }
        hits
    }

    /// `supported:{}` lookup. On failure, falls back to the last known-good
    /// list if one exists; otherwise propagates the error.
    pub async fn get_supported_symbols(
        &self,
        adapter: &dyn SourceAdapter,
    ) -> oracle_common::Result<Vec<String>> {
        let source = adapter.source_name().to_string();
        if let Some(v) = self.supported_cache.get(&source).await {
            return Ok(v);
        }
        match adapter.get_supported_symbols().await {
            Ok(v) => {
                self.supported_cache.insert(source.clone(), v.clone()).await;
                self.stale_supported.write().await.insert(source, v.clone());
                Ok(v)
            }
            Err(e) => {
                if let Some(stale) = self.stale_supported.read().await.get(&source).cloned() {
                    warn!(source, "supported-symbols fetch failed, serving stale list");
                    Ok(stale)
                } else {
                    Err(e)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct MockAdapter {
        name: &'static str,
        calls: AtomicU32,
        fail_after: Option<u32>,
        price: Mutex<BigDecimal>,
    }

    #[async_trait::async_trait]
    impl SourceAdapter for MockAdapter {
        fn source_name(&self) -> &str {
            self.name
        }
        fn is_enabled(&self) -> bool {
            true
        }
        async fn get_supported_symbols(&self) -> oracle_common::Result<Vec<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| n >= limit) {
                return Err(oracle_common::CoreError::Http {
                    source_name: self.name.to_string(),
                    kind: oracle_common::HttpErrorKind::Connection,
                });
            }
            Ok(vec!["BTCUSDT".to_string()])
        }
        async fn get_price_data(
            &self,
            symbol: &str,
        ) -> oracle_common::Result<PriceObservation> {
            PriceObservation::try_new(
                symbol,
                self.name,
                self.price.lock().unwrap().clone(),
                Utc::now(),
                None,
                HashMap::new(),
            )
        }
    }

    #[tokio::test]
    async fn caches_positive_price_on_miss() {
        let cache = PriceCache::with_defaults();
        let adapter = MockAdapter {
            name: "binance",
            calls: AtomicU32::new(0),
            fail_after: None,
            price: Mutex::new("100".parse().unwrap()),
        };
        let first = cache.get_price(&adapter, "BTCUSDT").await.unwrap();
        assert!(first.is_some());
        *adapter.price.lock().unwrap() = "200".parse().unwrap();
        let second = cache.get_price(&adapter, "BTCUSDT").await.unwrap();
        assert_eq!(second.unwrap().price, "100".parse().unwrap());
    }

    #[tokio::test]
    async fn supported_symbols_falls_back_to_stale_on_failure() {
        let cache = PriceCache::new(Duration::from_millis(10), Duration::from_millis(10));
        let adapter = MockAdapter {
            name: "okex",
            calls: AtomicU32::new(0),
            fail_after: Some(1),
            price: Mutex::new("1".parse().unwrap()),
        };
        let first = cache.get_supported_symbols(&adapter).await.unwrap();
        assert_eq!(first, vec!["BTCUSDT".to_string()]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = cache.get_supported_symbols(&adapter).await.unwrap();
        assert_eq!(second, vec!["BTCUSDT".to_string()]);
    }
}
