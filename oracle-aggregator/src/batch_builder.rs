use chrono::Utc;
use oracle_common::types::{AggregatedPrice, PriceBatch};
use uuid::Uuid;

/// Default and hard-cap `MaxBatchSize` (spec §4.6, §6).
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;
pub const MAX_BATCH_SIZE_HARD_CAP: usize = 100;

/// Groups aggregated prices into one or more `PriceBatch`es of size ≤
/// `max_batch_size` (spec §4.6). All sub-batches share one `batchId` and
/// `createdAt`: the whole logical batch is one submission cycle from a
/// status perspective.
#[derive(Debug, Clone, Copy)]
pub struct BatchBuilder {
    max_batch_size: usize,
}

impl BatchBuilder {
    #[must_use]
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.clamp(1, MAX_BATCH_SIZE_HARD_CAP),
        }
    }

    /// Splits `prices` into sub-batches whose concatenation equals the
    /// input in order (spec §8 invariant 5). Empty input yields an empty
    /// `Vec` of sub-batches — the caller distinguishes "nothing to submit"
    /// from "one zero-length batch".
    #[must_use]
    pub fn build(&self, prices: Vec<AggregatedPrice>) -> Vec<PriceBatch> {
        if prices.is_empty() {
            return Vec::new();
        }
        let batch_id = Uuid::new_v4();
        let created_at = Utc::now();
        prices
            .chunks(self.max_batch_size)
            .map(|chunk| PriceBatch {
                batch_id,
                created_at,
                prices: chunk.to_vec(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn price(symbol: &str) -> AggregatedPrice {
        AggregatedPrice {
            symbol: symbol.to_string(),
            price: BigDecimal::from(1),
            timestamp: Utc::now(),
            source_observations: Vec::new(),
            standard_deviation: BigDecimal::from(0),
            confidence: 100,
        }
    }

    #[test]
    fn single_sub_batch_when_within_limit() {
        let builder = BatchBuilder::new(50);
        let prices: Vec<_> = (0..10).map(|i| price(&format!("SYM{i:03}"))).collect();
        let batches = builder.build(prices);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].prices.len(), 10);
    }

    #[test]
    fn scenario_s5_splits_120_into_three_sub_batches() {
        let builder = BatchBuilder::new(50);
        let prices: Vec<_> = (0..120).map(|i| price(&format!("S{i:04}"))).collect();
        let batches = builder.build(prices.clone());
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].prices.len(), 50);
        assert_eq!(batches[1].prices.len(), 50);
        assert_eq!(batches[2].prices.len(), 20);
        assert!(batches.iter().all(|b| b.batch_id == batches[0].batch_id));
        assert!(batches.iter().all(|b| b.created_at == batches[0].created_at));
        let concatenated: Vec<_> = batches.iter().flat_map(|b| b.prices.iter()).collect();
        let original: Vec<_> = prices.iter().collect();
        assert_eq!(
            concatenated.iter().map(|p| &p.symbol).collect::<Vec<_>>(),
            original.iter().map(|p| &p.symbol).collect::<Vec<_>>()
        );
    }

    #[test]
    fn max_batch_size_one_yields_one_sub_batch_per_price() {
        let builder = BatchBuilder::new(1);
        let prices: Vec<_> = (0..3).map(|i| price(&format!("S{i:03}"))).collect();
        let batches = builder.build(prices);
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.prices.len() == 1));
    }

    #[test]
    fn empty_input_yields_no_sub_batches() {
        let builder = BatchBuilder::new(50);
        assert!(builder.build(Vec::new()).is_empty());
    }
}
