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

/// Kraken `/0/public/Ticker` adapter.
pub struct KrakenAdapter {
    client: Client,
    config: SourceConfig,
    http: ResilientHttp,
    symbol_map: Arc<SymbolMap>,
}

impl KrakenAdapter {
    #[must_use]
    pub fn new(config: SourceConfig, symbol_map: Arc<SymbolMap>) -> Self {
        Self {
            client: Client::new(),
            http: ResilientHttp::new("kraken", ResilientHttpConfig::default()),
            config,
            symbol_map,
        }
    }

    async fn fetch(&self, pair: &str) -> Result<f64, CoreError> {
        let url = format!("{}/0/public/Ticker", self.config.base_url);
        let client = self.client.clone();
        let pair = pair.to_string();
        self.http
            .execute(|| {
                let client = client.clone();
                let url = url.clone();
                let pair = pair.clone();
                async move {
                    let resp = client
                        .get(&url)
                        .query(&[("pair", pair.as_str())])
                        .send()
                        .await
                        .map_err(|_| CoreError::Http {
                            source_name: "kraken".to_string(),
                            kind: HttpErrorKind::Connection,
                        })?;
                    if !resp.status().is_success() {
                        return Err(CoreError::Http {
                            source_name: "kraken".to_string(),
                            kind: HttpErrorKind::from_status(resp.status().as_u16()),
                        });
                    }
                    let body: serde_json::Value = resp.json().await.map_err(|_| CoreError::Http {
                        source_name: "kraken".to_string(),
                        kind: HttpErrorKind::Unparseable,
                    })?;
                    let errors = body.get("error").and_then(serde_json::Value::as_array);
                    if errors.is_some_and(|e| !e.is_empty()) {
                        return Err(CoreError::Http {
                            source_name: "kraken".to_string(),
                            kind: HttpErrorKind::Unparseable,
                        });
                    }
                    body.get("result")
                        .and_then(|r| r.as_object())
                        .and_then(|obj| obj.values().next())
                        .and_then(|entry| entry.get("c"))
                        .and_then(serde_json::Value::as_array)
                        .and_then(|arr| arr.first())
                        .and_then(serde_json::Value::as_str)
                        .and_then(|s| s.parse::<f64>().ok())
                        .ok_or_else(|| CoreError::Http {
                            source_name: "kraken".to_string(),
                            kind: HttpErrorKind::Unparseable,
                        })
                }
            })
            .await
    }
}

#[async_trait]
impl SourceAdapter for KrakenAdapter {
    fn source_name(&self) -> &str {
        "kraken"
    }

    fn is_enabled(&self) -> bool {
        !self.config.base_url.is_empty()
    }

    async fn get_supported_symbols(&self) -> oracle_common::Result<Vec<String>> {
        let url = format!("{}/0/public/AssetPairs", self.config.base_url);
        let body: serde_json::Value = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|_| CoreError::Http {
                source_name: "kraken".to_string(),
                kind: HttpErrorKind::Connection,
            })?
            .json()
            .await
            .map_err(|_| CoreError::Http {
                source_name: "kraken".to_string(),
                kind: HttpErrorKind::Unparseable,
            })?;
        let pairs = body
            .get("result")
            .and_then(|r| r.as_object())
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();
        Ok(pairs)
    }

    async fn get_price_data(&self, symbol: &str) -> oracle_common::Result<PriceObservation> {
        let pair = self.symbol_map.get_source_symbol(symbol, "kraken");
        let price = self.fetch(&pair).await?;
        PriceObservation::try_new(
            symbol,
            "kraken",
            bigdecimal::BigDecimal::try_from(price).map_err(|_| CoreError::Http {
                source_name: "kraken".to_string(),
                kind: HttpErrorKind::Unparseable,
            })?,
            Utc::now(),
            None,
            HashMap::new(),
        )
    }
}
