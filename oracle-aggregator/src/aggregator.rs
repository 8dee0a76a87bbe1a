use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::Utc;
use oracle_common::types::{AggregatedPrice, PriceObservation};
use oracle_common::CoreError;
use tracing::warn;

/// Per-symbol aggregation: outlier rejection, central value, confidence
/// scoring (spec §4.5). Stateless; every method takes the observations it
/// needs and returns a fresh result.
#[derive(Debug, Default, Clone, Copy)]
pub struct Aggregator;

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Aggregates a single symbol's observations. Fails with `ErrNoData` on
    /// an empty input and `ErrMixedSymbols` if the observations don't share
    /// one canonical symbol (spec §4.5 invariant).
    pub fn aggregate(&self, observations: &[PriceObservation]) -> Result<AggregatedPrice, CoreError> {
        if observations.is_empty() {
            return Err(CoreError::NoData);
        }
        let symbol = &observations[0].symbol;
        if observations.iter().any(|o| &o.symbol != symbol) {
            return Err(CoreError::MixedSymbols);
        }

        let survivors = reject_outliers(observations);
        let prices: Vec<BigDecimal> = survivors.iter().map(|o| o.price.clone()).collect();
        let central = central_value(&prices);
        let std_dev = population_std_dev(&prices);
        let confidence = confidence_for(survivors.len());

        Ok(AggregatedPrice {
            symbol: symbol.clone(),
            price: central,
            timestamp: Utc::now(),
            source_observations: survivors.into_iter().cloned().collect(),
            standard_deviation: std_dev,
            confidence,
        })
    }

    /// Aggregates a map of `symbol -> observations`, one `AggregatedPrice`
    /// per symbol. Per-symbol failures are logged and dropped; other
    /// symbols proceed (spec §4.5).
    #[must_use]
    pub fn aggregate_many<'a, I>(&self, by_symbol: I) -> Vec<AggregatedPrice>
    where
        I: IntoIterator<Item = (&'a str, &'a [PriceObservation])>,
    {
        let mut out = Vec::new();
        for (symbol, observations) in by_symbol {
            match self.aggregate(observations) {
                Ok(agg) => out.push(agg),
                Err(e) => warn!(symbol, error = %e, "dropping symbol from this cycle"),
            }
        }
        out
    }
}

/// Confidence ladder (spec §3, §4.5, §8 invariant 3): 60 for one surviving
/// source, 80 for two, 100 for three or more.
#[must_use]
pub fn confidence_for(surviving_count: usize) -> u8 {
    match surviving_count {
        0 => 0,
        1 => 60,
        2 => 80,
        _ => 100,
    }
}

/// Median-absolute-deviation outlier rejection (spec §4.5 step 1). Only
/// engages when there are ≥3 observations; never returns an empty set from
/// a non-empty input.
fn reject_outliers(observations: &[PriceObservation]) -> Vec<&PriceObservation> {
    if observations.len() < 3 {
        return observations.iter().collect();
    }
    let prices: Vec<BigDecimal> = observations.iter().map(|o| o.price.clone()).collect();
    let m = median(&prices);
    let deviations: Vec<BigDecimal> = prices.iter().map(|p| (p - &m).abs()).collect();
    let mad = median(&deviations);
    let threshold = &mad * BigDecimal::from(3);

    let kept: Vec<&PriceObservation> = observations
        .iter()
        .zip(prices.iter())
        .filter(|(_, p)| (*p - &m).abs() <= threshold)
        .map(|(o, _)| o)
        .collect();

    if kept.is_empty() {
        observations.iter().collect()
    } else {
        kept
    }
}

/// Central value per spec §4.5 step 2: median for ≥3 survivors (average of
/// the two middles when even), arithmetic mean for 2, passthrough for 1.
fn central_value(sorted_inputs: &[BigDecimal]) -> BigDecimal {
    match sorted_inputs.len() {
        0 => BigDecimal::from(0),
        1 => sorted_inputs[0].clone(),
        2 => (&sorted_inputs[0] + &sorted_inputs[1]) / BigDecimal::from(2),
        _ => median(sorted_inputs),
    }
}

fn median(values: &[BigDecimal]) -> BigDecimal {
    let mut sorted = values.to_vec();
    sorted.sort();
    let n = sorted.len();
    if n == 0 {
        return BigDecimal::from(0);
    }
    if n % 2 == 1 {
        sorted[n / 2].clone()
    } else {
        (&sorted[n / 2 - 1] + &sorted[n / 2]) / BigDecimal::from(2)
    }
}

/// Population standard deviation; 0 for singletons (spec §4.5 step 3).
/// Computed via `f64` for the square root since `bigdecimal` has no native
/// `sqrt`; precision loss here is immaterial, the value is advisory metadata.
fn population_std_dev(values: &[BigDecimal]) -> BigDecimal {
    if values.len() < 2 {
        return BigDecimal::from(0);
    }
    let n = BigDecimal::from(values.len() as i64);
    let mean: BigDecimal = values.iter().sum::<BigDecimal>() / &n;
    let variance: BigDecimal =
        values.iter().map(|v| (v - &mean).square()).sum::<BigDecimal>() / n;
    let variance_f64 = variance.to_f64().unwrap_or(0.0);
    BigDecimal::try_from(variance_f64.sqrt()).unwrap_or_else(|_| BigDecimal::from(0))
}

trait Square {
    fn square(&self) -> BigDecimal;
}

impl Square for BigDecimal {
    fn square(&self) -> BigDecimal {
        self * self
    }
}
