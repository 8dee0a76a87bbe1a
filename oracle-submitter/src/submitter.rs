use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use oracle_common::error::CoreError;
use oracle_common::types::{scale_price, BatchStatus, BatchStatusInfo, PriceBatch};
use serde_json::json;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use crate::signing::dual_sign;

/// Chain calls the submitter needs, abstracted behind a trait so tests can
/// substitute a fake without a live RPC endpoint. The concrete
/// implementation wraps `RpcClient::invoke_function`/`call`.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn invoke_update(
        &self,
        script_hash: &str,
        payload: &[u8],
        attester_witness_hex: &str,
        fee_payer_witness_hex: &str,
    ) -> Result<String, CoreError>;

    async fn get_confirmations(&self, transaction_hash: &str) -> Result<u64, CoreError>;
}

#[async_trait]
impl ChainRpc for crate::rpc_client::RpcClient {
    async fn invoke_update(
        &self,
        script_hash: &str,
        payload: &[u8],
        attester_witness_hex: &str,
        fee_payer_witness_hex: &str,
    ) -> Result<String, CoreError> {
        #[derive(serde::Serialize)]
        struct WitnessParam<'a> {
            invocation: &'a str,
        }
        let witnesses = vec![
            WitnessParam { invocation: attester_witness_hex },
            WitnessParam { invocation: fee_payer_witness_hex },
        ];
        let args = json!([{ "type": "ByteArray", "value": hex::encode(payload) }]);
        #[derive(serde::Deserialize)]
        struct InvokeResult {
            txid: String,
        }
        let result: InvokeResult = self
            .invoke_function(script_hash, "updatePriceBatch", args, witnesses)
            .await?;
        Ok(result.txid)
    }

    async fn get_confirmations(&self, transaction_hash: &str) -> Result<u64, CoreError> {
        #[derive(serde::Deserialize)]
        struct ConfirmationResult {
            confirmations: u64,
        }
        let result: ConfirmationResult = self
            .call("getrawtransaction", json!([transaction_hash, 1]))
            .await?;
        Ok(result.confirmations)
    }
}

const MAX_CONFIRMATION_POLLS: u32 = 30;
const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Dual-signs, submits, and tracks sub-batch submissions (spec §4.7, C7
/// Submitter). The in-memory status table mirrors
/// `SwapExecutor::active_swaps`: an `Arc<RwLock<HashMap<...>>>` keyed by the
/// logical id, updated at each lifecycle transition rather than recomputed.
pub struct BatchSubmitter {
    rpc: Arc<dyn ChainRpc>,
    script_hash: String,
    attester_address: String,
    attester_wif: String,
    fee_payer_address: String,
    fee_payer_wif: String,
    statuses: Arc<RwLock<HashMap<Uuid, BatchStatusInfo>>>,
    poll_interval: Duration,
}

impl BatchSubmitter {
    #[must_use]
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        script_hash: impl Into<String>,
        attester_address: impl Into<String>,
        attester_wif: impl Into<String>,
        fee_payer_address: impl Into<String>,
        fee_payer_wif: impl Into<String>,
    ) -> Self {
        Self {
            rpc,
            script_hash: script_hash.into(),
            attester_address: attester_address.into(),
            attester_wif: attester_wif.into(),
            fee_payer_address: fee_payer_address.into(),
            fee_payer_wif: fee_payer_wif.into(),
            statuses: Arc::new(RwLock::new(HashMap::new())),
            poll_interval: CONFIRMATION_POLL_INTERVAL,
        }
    }

    /// Overrides the confirmation poll interval; used by tests to avoid a
    /// real-time 2s wait per poll.
    #[cfg(test)]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn status(&self, batch_id: Uuid) -> Option<BatchStatusInfo> {
        self.statuses.read().await.get(&batch_id).cloned()
    }

    async fn set_status(&self, info: BatchStatusInfo) {
        self.statuses.write().await.insert(info.batch_id, info);
    }

    fn build_payload(batch: &PriceBatch) -> Vec<u8> {
        let symbols: Vec<&str> = batch.prices.iter().map(|p| p.symbol.as_str()).collect();
        let scaled: Vec<String> = batch
            .prices
            .iter()
            .map(|p| scale_price(&p.price).to_string())
            .collect();
        let timestamps: Vec<i64> = batch.prices.iter().map(|p| p.timestamp.timestamp()).collect();
        let confidences: Vec<u8> = batch.prices.iter().map(|p| p.confidence).collect();
        serde_json::to_vec(&json!({
            "symbols": symbols,
            "prices": scaled,
            "timestamps": timestamps,
            "confidences": confidences,
        }))
        .expect("batch payload is always serializable")
    }

    /// Submits one sub-batch. An empty sub-batch is a no-op success with no
    /// RPC call (resolved open question: nothing to attest, nothing to
    /// confirm).
    pub async fn submit(&self, batch: &PriceBatch) -> Result<bool, CoreError> {
        if batch.prices.is_empty() {
            return Ok(true);
        }

        self.set_status(BatchStatusInfo {
            batch_id: batch.batch_id,
            status: BatchStatus::Processing,
            transaction_hash: None,
            timestamp: Utc::now(),
            error_message: None,
            processed_count: 0,
            total_count: batch.prices.len(),
            block_number: None,
            fee_cost: None,
        })
        .await;

        let payload = Self::build_payload(batch);
        let (attester_witness, fee_payer_witness) = dual_sign(
            &self.attester_address,
            &self.attester_wif,
            &self.fee_payer_address,
            &self.fee_payer_wif,
            &payload,
        )?;

        let tx_result = self
            .rpc
            .invoke_update(
                &self.script_hash,
                &payload,
                &attester_witness.signature_hex,
                &fee_payer_witness.signature_hex,
            )
            .await;

        match tx_result {
            Ok(tx_hash) => {
                info!(batch_id = %batch.batch_id, tx_hash, "batch submitted");
                self.set_status(BatchStatusInfo {
                    batch_id: batch.batch_id,
                    status: BatchStatus::Sent,
                    transaction_hash: Some(tx_hash.clone()),
                    timestamp: Utc::now(),
                    error_message: None,
                    processed_count: batch.prices.len(),
                    total_count: batch.prices.len(),
                    block_number: None,
                    fee_cost: None,
                })
                .await;
                self.poll_confirmation(batch.batch_id, &tx_hash).await;
                Ok(true)
            }
            Err(err) => {
                warn!(batch_id = %batch.batch_id, error = %err, "batch submission failed");
                self.set_status(BatchStatusInfo {
                    batch_id: batch.batch_id,
                    status: BatchStatus::Failed,
                    transaction_hash: None,
                    timestamp: Utc::now(),
                    error_message: Some(err.to_string()),
                    processed_count: 0,
                    total_count: batch.prices.len(),
                    block_number: None,
                    fee_cost: None,
                })
                .await;
                Err(err)
            }
        }
    }

    /// Polls up to `MAX_CONFIRMATION_POLLS` times at
    /// `CONFIRMATION_POLL_INTERVAL`; a batch that never reaches one
    /// confirmation stays `Sent`/`Pending`, it is never marked `Failed` by
    /// polling alone (spec §4.7).
    async fn poll_confirmation(&self, batch_id: Uuid, transaction_hash: &str) {
        for attempt in 0..MAX_CONFIRMATION_POLLS {
            match self.rpc.get_confirmations(transaction_hash).await {
                Ok(confirmations) if confirmations >= 1 => {
                    self.set_status(BatchStatusInfo {
                        batch_id,
                        status: BatchStatus::Confirmed,
                        transaction_hash: Some(transaction_hash.to_string()),
                        timestamp: Utc::now(),
                        error_message: None,
                        processed_count: 0,
                        total_count: 0,
                        block_number: None,
                        fee_cost: None,
                    })
                    .await;
                    return;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(batch_id = %batch_id, attempt, error = %err, "confirmation poll failed");
                }
            }
            if attempt + 1 < MAX_CONFIRMATION_POLLS {
                sleep(self.poll_interval).await;
            }
        }
        info!(batch_id = %batch_id, "confirmation polling exhausted, leaving batch pending");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use oracle_common::types::AggregatedPrice;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeRpc {
        confirmations_sequence: Vec<u64>,
        call_count: AtomicU64,
        fail_invoke: bool,
    }

    #[async_trait]
    impl ChainRpc for FakeRpc {
        async fn invoke_update(
            &self,
            _script_hash: &str,
            _payload: &[u8],
            _attester_witness_hex: &str,
            _fee_payer_witness_hex: &str,
        ) -> Result<String, CoreError> {
            if self.fail_invoke {
                return Err(CoreError::Rpc {
                    code: -1,
                    message: "simulated failure".to_string(),
                });
            }
            Ok("0xdeadbeef".to_string())
        }

        async fn get_confirmations(&self, _transaction_hash: &str) -> Result<u64, CoreError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(self
                .confirmations_sequence
                .get(idx)
                .copied()
                .unwrap_or(*self.confirmations_sequence.last().unwrap_or(&0)))
        }
    }

    fn price(symbol: &str) -> AggregatedPrice {
        AggregatedPrice {
            symbol: symbol.to_string(),
            price: BigDecimal::from_str("100.5").unwrap(),
            timestamp: Utc::now(),
            source_observations: Vec::new(),
            standard_deviation: BigDecimal::from(0),
            confidence: 100,
        }
    }

    fn wif_for_tests() -> String {
        use secp256k1::rand::rngs::OsRng;
        use secp256k1::Secp256k1;
        use sha2::{Digest, Sha256};
        let secp = Secp256k1::new();
        let (secret_key, _) = secp.generate_keypair(&mut OsRng);
        let mut body = vec![0x80u8];
        body.extend_from_slice(&secret_key.secret_bytes());
        let digest1 = Sha256::digest(&body);
        let digest2 = Sha256::digest(digest1);
        body.extend_from_slice(&digest2[..4]);
        bs58::encode(body).into_string()
    }

    fn submitter(rpc: Arc<dyn ChainRpc>) -> BatchSubmitter {
        BatchSubmitter::new(
            rpc,
            "0x1111111111111111111111111111111111111111",
            "oracle1",
            wif_for_tests(),
            "tee1",
            wif_for_tests(),
        )
        .with_poll_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op_success() {
        let rpc = Arc::new(FakeRpc {
            confirmations_sequence: vec![],
            call_count: AtomicU64::new(0),
            fail_invoke: false,
        });
        let sub = submitter(rpc);
        let batch = PriceBatch {
            batch_id: Uuid::new_v4(),
            created_at: Utc::now(),
            prices: vec![],
        };
        let result = sub.submit(&batch).await.unwrap();
        assert!(result);
        assert!(sub.status(batch.batch_id).await.is_none());
    }

    #[tokio::test]
    async fn successful_submission_reaches_confirmed_status() {
        let rpc = Arc::new(FakeRpc {
            confirmations_sequence: vec![0, 1],
            call_count: AtomicU64::new(0),
            fail_invoke: false,
        });
        let sub = submitter(rpc);
        let batch = PriceBatch {
            batch_id: Uuid::new_v4(),
            created_at: Utc::now(),
            prices: vec![price("BTCUSDT")],
        };
        let result = sub.submit(&batch).await.unwrap();
        assert!(result);
        let status = sub.status(batch.batch_id).await.unwrap();
        assert_eq!(status.status, BatchStatus::Confirmed);
    }

    #[tokio::test]
    async fn failed_invoke_sets_failed_status_and_returns_err() {
        let rpc = Arc::new(FakeRpc {
            confirmations_sequence: vec![],
            call_count: AtomicU64::new(0),
            fail_invoke: true,
        });
        let sub = submitter(rpc);
        let batch = PriceBatch {
            batch_id: Uuid::new_v4(),
            created_at: Utc::now(),
            prices: vec![price("BTCUSDT")],
        };
        let result = sub.submit(&batch).await;
        assert!(result.is_err());
        let status = sub.status(batch.batch_id).await.unwrap();
        assert_eq!(status.status, BatchStatus::Failed);
    }
}
