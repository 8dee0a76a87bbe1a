use std::collections::{HashMap, HashSet};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Canonical symbol form is `[A-Z0-9]{3,10}`, e.g. `BTCUSDT`.
#[must_use]
pub fn is_canonical_symbol(symbol: &str) -> bool {
    let len = symbol.len();
    (3..=10).contains(&len) && symbol.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Single observed value from one source (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceObservation {
    pub symbol: String,
    pub source: String,
    pub price: BigDecimal,
    pub timestamp: DateTime<Utc>,
    pub volume: Option<BigDecimal>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PriceObservation {
    /// Validates the two invariants (`price > 0`, canonical symbol form)
    /// before handing the observation to the aggregator.
    pub fn try_new(
        symbol: impl Into<String>,
        source: impl Into<String>,
        price: BigDecimal,
        timestamp: DateTime<Utc>,
        volume: Option<BigDecimal>,
        metadata: HashMap<String, String>,
    ) -> Result<Self, CoreError> {
        let symbol = symbol.into();
        if price <= BigDecimal::from(0) {
            return Err(CoreError::Config(format!(
                "price must be positive, got {price} for {symbol}"
            )));
        }
        if !is_canonical_symbol(&symbol) {
            return Err(CoreError::Config(format!(
                "symbol {symbol} is not in canonical form [A-Z0-9]{{3,10}}"
            )));
        }
        Ok(Self {
            symbol,
            source: source.into(),
            price,
            timestamp,
            volume,
            metadata,
        })
    }
}

/// Reconciled value for one symbol at one tick (spec §3, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedPrice {
    pub symbol: String,
    pub price: BigDecimal,
    pub timestamp: DateTime<Utc>,
    pub source_observations: Vec<PriceObservation>,
    pub standard_deviation: BigDecimal,
    /// 0..=100, ladder: 60 for one surviving source, 80 for two, 100 for three or more.
    pub confidence: u8,
}

/// Submission unit (spec §3, §4.6). All `prices[i].symbol` must be distinct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBatch {
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub prices: Vec<AggregatedPrice>,
}

impl PriceBatch {
    /// Enforces the "all symbols distinct" invariant; used by `BatchBuilder`
    /// and by tests that construct batches directly.
    #[must_use]
    pub fn symbols_are_distinct(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.prices.len());
        self.prices.iter().all(|p| seen.insert(p.symbol.as_str()))
    }
}

/// State machine over submitted batches (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Sent,
    Confirmed,
    Failed,
    Rejected,
    Unknown,
}

/// Observable outcome record for a batch (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatusInfo {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub transaction_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub error_message: Option<String>,
    pub processed_count: usize,
    pub total_count: usize,
    pub block_number: Option<u64>,
    pub fee_cost: Option<BigDecimal>,
}

/// Type of durable attestation record (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttestationType {
    Account,
    PriceFeed,
}

/// Summary of one symbol's price for an attestation record (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSummary {
    pub symbol: String,
    pub price: BigDecimal,
    pub confidence: u8,
}

/// Durable evidence of a submission, one per sub-batch (spec §3, §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub attestation_type: AttestationType,
    pub run_id: String,
    pub run_number: u64,
    pub repo_owner: String,
    pub repo_name: String,
    pub workflow: String,
    pub batch_id: Uuid,
    pub transaction_hash: String,
    pub created_at: DateTime<Utc>,
    pub price_count: usize,
    pub price_summaries: Vec<PriceSummary>,
    /// Hex-encoded attester signature over the canonical record bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// On-chain representation of one symbol's latest price (spec §3).
/// `price_scaled = round(price * 10^8)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoredPrice {
    pub price_scaled: i128,
    pub timestamp: i64,
    pub confidence: u8,
}

pub const PRICE_SCALE: i64 = 100_000_000; // 10^8, spec §3/§6

/// Scales a decimal price into the on-chain fixed-point representation.
#[must_use]
pub fn scale_price(price: &BigDecimal) -> i128 {
    let scaled = price * BigDecimal::from(PRICE_SCALE);
    // round-half-up via bigdecimal's with_scale(0), which rounds to nearest.
    let rounded = scaled.with_scale(0);
    rounded.to_string().parse::<i128>().unwrap_or(0)
}

/// Full on-chain contract state (spec §3, §4.10). Owned exclusively by
/// `oracle-contract`; nothing off-chain may mutate it except through a
/// successful `update_price_batch` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleContractState {
    pub owner: String,
    pub paused: bool,
    pub initialized: bool,
    pub reentrancy_guard: bool,
    pub circuit_breaker_triggered: bool,
    pub min_oracles: u32,
    pub oracle_count: u32,
    pub oracles: HashSet<String>,
    pub tee_accounts: HashSet<String>,
    pub prices: HashMap<String, StoredPrice>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_symbol_accepts_valid_forms() {
        assert!(is_canonical_symbol("BTCUSDT"));
        assert!(is_canonical_symbol("NEO"));
        assert!(is_canonical_symbol("A1B2C3D4E5"));
    }

    #[test]
    fn canonical_symbol_rejects_invalid_forms() {
        assert!(!is_canonical_symbol("bt"));
        assert!(!is_canonical_symbol("btcusdt"));
        assert!(!is_canonical_symbol("BTC-USDT"));
        assert!(!is_canonical_symbol("TOOLONGSYMBOLX"));
    }

    #[test]
    fn price_observation_rejects_nonpositive_price() {
        let err = PriceObservation::try_new(
            "BTCUSDT",
            "binance",
            BigDecimal::from(0),
            Utc::now(),
            None,
            HashMap::new(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn scale_price_matches_spec_example() {
        // S1: 50050.0 -> 5_005_000_000_000
        let price: BigDecimal = "50050.0".parse().unwrap();
        assert_eq!(scale_price(&price), 5_005_000_000_000);
    }
}
