use oracle_common::types::{AggregatedPrice, AttestationRecord, AttestationType, PriceSummary};
use oracle_submitter::signing::sign;
use secp256k1::SecretKey;
use uuid::Uuid;

/// CI run metadata populated from environment variables (spec §4.9
/// supplement): the original distilled-away workflow publishes these
/// fields from GitHub Actions' `GITHUB_*` env vars, not as free-form
/// caller input.
#[derive(Debug, Clone, Default)]
pub struct CiContext {
    pub run_id: String,
    pub run_number: u64,
    pub repo_owner: String,
    pub repo_name: String,
    pub workflow: String,
}

impl CiContext {
    /// Reads `GITHUB_RUN_ID`, `GITHUB_RUN_NUMBER`, `GITHUB_REPOSITORY`
    /// (split on `/`), and `GITHUB_WORKFLOW`; missing vars fall back to
    /// empty strings / zero rather than failing, since a local or
    /// non-Actions run still needs to produce an attestation record.
    #[must_use]
    pub fn from_env() -> Self {
        let (repo_owner, repo_name) = std::env::var("GITHUB_REPOSITORY")
            .ok()
            .and_then(|full| full.split_once('/').map(|(o, n)| (o.to_string(), n.to_string())))
            .unwrap_or_default();
        Self {
            run_id: std::env::var("GITHUB_RUN_ID").unwrap_or_default(),
            run_number: std::env::var("GITHUB_RUN_NUMBER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            repo_owner,
            repo_name,
            workflow: std::env::var("GITHUB_WORKFLOW").unwrap_or_default(),
        }
    }
}

/// Builds and signs one `AttestationRecord` per successfully submitted
/// sub-batch (spec §4.9).
#[must_use]
pub fn build_record(
    ci: &CiContext,
    batch_id: Uuid,
    transaction_hash: &str,
    prices: &[AggregatedPrice],
    attester_key: Option<&SecretKey>,
) -> AttestationRecord {
    let price_summaries: Vec<PriceSummary> = prices
        .iter()
        .map(|p| PriceSummary {
            symbol: p.symbol.clone(),
            price: p.price.clone(),
            confidence: p.confidence,
        })
        .collect();

    let mut record = AttestationRecord {
        attestation_type: AttestationType::PriceFeed,
        run_id: ci.run_id.clone(),
        run_number: ci.run_number,
        repo_owner: ci.repo_owner.clone(),
        repo_name: ci.repo_name.clone(),
        workflow: ci.workflow.clone(),
        batch_id,
        transaction_hash: transaction_hash.to_string(),
        created_at: chrono::Utc::now(),
        price_count: prices.len(),
        price_summaries,
        signature: None,
    };

    if let Some(key) = attester_key {
        let canonical = serde_json::to_vec(&record).expect("attestation record is always serializable");
        let witness = sign("attester", key, &canonical);
        record.signature = Some(witness.signature_hex);
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use std::str::FromStr;

    fn sample_price() -> AggregatedPrice {
        AggregatedPrice {
            symbol: "BTCUSDT".to_string(),
            price: BigDecimal::from_str("50050.0").unwrap(),
            timestamp: Utc::now(),
            source_observations: Vec::new(),
            standard_deviation: BigDecimal::from(0),
            confidence: 100,
        }
    }

    #[test]
    fn ci_context_from_env_falls_back_to_defaults_when_unset() {
        std::env::remove_var("GITHUB_RUN_ID");
        std::env::remove_var("GITHUB_REPOSITORY");
        let ctx = CiContext::from_env();
        assert_eq!(ctx.run_id, "");
        assert_eq!(ctx.run_number, 0);
    }

    #[test]
    fn build_record_without_key_has_no_signature() {
        let ci = CiContext::default();
        let record = build_record(&ci, Uuid::new_v4(), "0xabc", &[sample_price()], None);
        assert!(record.signature.is_none());
        assert_eq!(record.price_count, 1);
    }

    #[test]
    fn build_record_with_key_is_signed() {
        use secp256k1::rand::rngs::OsRng;
        use secp256k1::Secp256k1;
        let secp = Secp256k1::new();
        let (secret_key, _) = secp.generate_keypair(&mut OsRng);
        let ci = CiContext::default();
        let record = build_record(&ci, Uuid::new_v4(), "0xabc", &[sample_price()], Some(&secret_key));
        assert!(record.signature.is_some());
    }
}
