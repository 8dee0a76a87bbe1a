use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use oracle_common::config::SourceConfig;
use oracle_common::resilient_http::{ResilientHttp, ResilientHttpConfig};
use oracle_common::types::PriceObservation;
use oracle_common::{CoreError, HttpErrorKind};
use reqwest::Client;

use crate::adapter::SourceAdapter;
use crate::symbol_map::SymbolMap;

/// CoinGecko `/simple/price` adapter. The source symbol here is expected to
/// be a CoinGecko coin id (e.g. `bitcoin`), supplied via `SymbolMap`.
pub struct CoinGeckoAdapter {
    client: Client,
    config: SourceConfig,
    http: ResilientHttp,
    symbol_map: Arc<SymbolMap>,
}

impl CoinGeckoAdapter {
    #[must_use]
    pub fn new(config: SourceConfig, symbol_map: Arc<SymbolMap>) -> Self {
        Self {
            client: Client::new(),
            http: ResilientHttp::new("coingecko", ResilientHttpConfig::default()),
            config,
            symbol_map,
        }
    }

    async fn fetch(&self, coin_id: &str) -> Result<f64, CoreError> {
        let url = format!("{}/api/v3/simple/price", self.config.base_url);
        let client = self.client.clone();
        let coin_id = coin_id.to_string();
        let api_key = self.config.api_key.clone();
        self.http
            .execute(|| {
                let client = client.clone();
                let url = url.clone();
                let coin_id = coin_id.clone();
                let api_key = api_key.clone();
                async move {
                    let mut req = client
                        .get(&url)
                        .query(&[("ids", coin_id.as_str()), ("vs_currencies", "usd")]);
                    if let Some(key) = api_key {
                        req = req.header("x-cg-pro-api-key", key);
                    }
                    let resp = req.send().await.map_err(|_| CoreError::Http {
                        source_name: "coingecko".to_string(),
                        kind: HttpErrorKind::Connection,
                    })?;
                    if !resp.status().is_success() {
                        return Err(CoreError::Http {
                            source_name: "coingecko".to_string(),
                            kind: HttpErrorKind::from_status(resp.status().as_u16()),
                        });
                    }
                    let body: serde_json::Value = resp.json().await.map_err(|_| CoreError::Http {
                        source_name: "coingecko".to_string(),
                        kind: HttpErrorKind::Unparseable,
                    })?;
                    body.get(&coin_id)
                        .and_then(|d| d.get("usd"))
                        .and_then(serde_json::Value::as_f64)
                        .ok_or_else(|| CoreError::Http {
                            source_name: "coingecko".to_string(),
                            kind: HttpErrorKind::Unparseable,
                        })
                }
            })
            .await
    }
}

#[async_trait]
impl SourceAdapter for CoinGeckoAdapter {
    fn source_name(&self) -> &str {
        "coingecko"
    }

    fn is_enabled(&self) -> bool {
        !self.config.base_url.is_empty()
    }

    async fn get_supported_symbols(&self) -> oracle_common::Result<Vec<String>> {
        let url = format!("{}/api/v3/coins/list", self.config.base_url);
        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|_| CoreError::Http {
                source_name: "coingecko".to_string(),
                kind: HttpErrorKind::Connection,
            })?
            .json()
            .await
            .map_err(|_| CoreError::Http {
                source_name: "coingecko".to_string(),
                kind: HttpErrorKind::Unparseable,
            })?;
        let ids = body
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|entry| entry.get("id").and_then(serde_json::Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    async fn get_price_data(&self, symbol: &str) -> oracle_common::Result<PriceObservation> {
        let coin_id = self.symbol_map.get_source_symbol(symbol, "coingecko");
        let price = self.fetch(&coin_id).await?;
        PriceObservation::try_new(
            symbol,
            "coingecko",
            bigdecimal::BigDecimal::try_from(price).map_err(|_| CoreError::Http {
                source_name: "coingecko".to_string(),
                kind: HttpErrorKind::Unparseable,
            })?,
            Utc::now(),
            None,
            HashMap::new(),
        )
    }
}
