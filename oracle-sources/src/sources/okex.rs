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

/// OKEx/OKX public ticker adapter.
pub struct OkexAdapter {
    client: Client,
    config: SourceConfig,
    http: ResilientHttp,
    symbol_map: Arc<SymbolMap>,
}

impl OkexAdapter {
    #[must_use]
    pub fn new(config: SourceConfig, symbol_map: Arc<SymbolMap>) -> Self {
        Self {
            client: Client::new(),
            http: ResilientHttp::new("okex", ResilientHttpConfig::default()),
            config,
            symbol_map,
        }
    }

    async fn fetch(&self, inst_id: &str) -> Result<f64, CoreError> {
        let url = format!("{}/api/v5/market/ticker", self.config.base_url);
        let client = self.client.clone();
        let inst_id = inst_id.to_string();
        self.http
            .execute(|| {
                let client = client.clone();
                let url = url.clone();
                let inst_id = inst_id.clone();
                async move {
                    let resp = client
                        .get(&url)
                        .query(&[("instId", inst_id.as_str())])
                        .send()
                        .await
                        .map_err(|_| CoreError::Http {
                            source_name: "okex".to_string(),
                            kind: HttpErrorKind::Connection,
                        })?;
                    if !resp.status().is_success() {
                        return Err(CoreError::Http {
                            source_name: "okex".to_string(),
                            kind: HttpErrorKind::from_status(resp.status().as_u16()),
                        });
                    }
                    let body: serde_json::Value = resp.json().await.map_err(|_| CoreError::Http {
                        source_name: "okex".to_string(),
                        kind: HttpErrorKind::Unparseable,
                    })?;
                    body.get("data")
                        .and_then(serde_json::Value::as_array)
                        .and_then(|arr| arr.first())
                        .and_then(|entry| entry.get("last"))
                        .and_then(serde_json::Value::as_str)
                        .and_then(|s| s.parse::<f64>().ok())
                        .ok_or_else(|| CoreError::Http {
                            source_name: "okex".to_string(),
                            kind: HttpErrorKind::Unparseable,
                        })
                }
            })
            .await
    }
}

#[async_trait]
impl SourceAdapter for OkexAdapter {
    fn source_name(&self) -> &str {
        "okex"
    }

    fn is_enabled(&self) -> bool {
        !self.config.base_url.is_empty()
    }

    async fn get_supported_symbols(&self) -> oracle_common::Result<Vec<String>> {
        let url = format!("{}/api/v5/public/instruments", self.config.base_url);
        let body: serde_json::Value = self
            .client
            .get(&url)
            .query(&[("instType", "SPOT")])
            .send()
            .await
            .map_err(|_| CoreError::Http {
                source_name: "okex".to_string(),
                kind: HttpErrorKind::Connection,
            })?
            .json()
            .await
            .map_err(|_| CoreError::Http {
                source_name: "okex".to_string(),
                kind: HttpErrorKind::Unparseable,
            })?;
        let symbols = body
            .get("data")
            .and_then(serde_json::Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|s| s.get("instId").and_then(serde_json::Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(symbols)
    }

    async fn get_price_data(&self, symbol: &str) -> oracle_common::Result<PriceObservation> {
        let source_symbol = self.symbol_map.get_source_symbol(symbol, "okex");
        let price = self.fetch(&source_symbol).await?;
        PriceObservation::try_new(
            symbol,
            "okex",
            bigdecimal::BigDecimal::try_from(price).map_err(|_| CoreError::Http {
                source_name: "okex".to_string(),
                kind: HttpErrorKind::Unparseable,
            })?,
            Utc::now(),
            None,
            HashMap::new(),
        )
    }
}
