use async_trait::async_trait;
use bigdecimal::BigDecimal;
use oracle_common::error::CoreError;
use serde_json::json;
use tracing::{info, warn};

/// Native-asset balance/transfer calls the sweeper needs. The real
/// implementation dispatches to chain-specific RPCs (`getnep17balances`,
/// a signed transfer invocation); tests substitute a fake. Grounded on the
/// same trait-boundary-around-an-external-call shape as
/// `oracle-sources::SourceAdapter`.
#[async_trait]
pub trait AssetRpc: Send + Sync {
    async fn query_balance(&self, address: &str) -> Result<BigDecimal, CoreError>;
    async fn transfer_native(&self, from: &str, to: &str, amount: &BigDecimal) -> Result<String, CoreError>;
}

/// Maps the spec §9 abstract `QueryBalance`/`TransferNative` calls onto
/// concrete JSON-RPC methods (`getnep17balances`, `sendtoaddress`).
#[async_trait]
impl AssetRpc for crate::rpc_client::RpcClient {
    async fn query_balance(&self, address: &str) -> Result<BigDecimal, CoreError> {
        #[derive(serde::Deserialize)]
        struct Balance {
            amount: String,
        }
        #[derive(serde::Deserialize)]
        struct BalancesResult {
            balance: Vec<Balance>,
        }
        let result: BalancesResult = self.call("getnep17balances", json!([address])).await?;
        let amount = result
            .balance
            .first()
            .map(|b| b.amount.as_str())
            .unwrap_or("0");
        amount
            .parse::<BigDecimal>()
            .map_err(|e| CoreError::Rpc {
                code: -1,
                message: format!("unparseable balance amount: {e}"),
            })
    }

    async fn transfer_native(&self, from: &str, to: &str, amount: &BigDecimal) -> Result<String, CoreError> {
        #[derive(serde::Deserialize)]
        struct SendResult {
            txid: String,
        }
        let result: SendResult = self
            .call("sendtoaddress", json!([from, to, amount.to_string()]))
            .await?;
        Ok(result.txid)
    }
}

/// Moves residual native tokens from the attester account to the fee-payer
/// account before submission (spec §4.8, C8 AssetSweeper): the attester
/// accumulates small balances it doesn't need (it only ever signs, never
/// pays fees), so once its balance exceeds the sweep threshold the excess
/// is swept over to the account that actually spends it. Below threshold:
/// skip, the sweep is an optimisation, not a correctness requirement.
/// Failures are logged and swallowed — a sweep hiccup must never block the
/// price update it is meant to support.
pub struct AssetSweeper {
    rpc: std::sync::Arc<dyn AssetRpc>,
    threshold: BigDecimal,
    attester_address: String,
    fee_payer_address: String,
}

impl AssetSweeper {
    #[must_use]
    pub fn new(
        rpc: std::sync::Arc<dyn AssetRpc>,
        attester_address: impl Into<String>,
        fee_payer_address: impl Into<String>,
    ) -> Self {
        Self {
            rpc,
            threshold: BigDecimal::from(1),
            attester_address: attester_address.into(),
            fee_payer_address: fee_payer_address.into(),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: BigDecimal) -> Self {
        self.threshold = threshold;
        self
    }

    /// Checks the attester account balance and, if it exceeds `threshold`,
    /// transfers the excess to the fee-payer account. Never returns an
    /// error to the caller.
    pub async fn check_and_sweep(&self) {
        let balance = match self.rpc.query_balance(&self.attester_address).await {
            Ok(b) => b,
            Err(err) => {
                warn!(error = %err, "asset sweep balance check failed, continuing without sweep");
                return;
            }
        };

        if balance <= self.threshold {
            return;
        }

        let excess = &balance - &self.threshold;
        match self
            .rpc
            .transfer_native(&self.attester_address, &self.fee_payer_address, &excess)
            .await
        {
            Ok(tx_hash) => info!(tx_hash, %excess, "swept attester surplus to fee-payer"),
            Err(err) => warn!(error = %err, "asset sweep transfer failed, continuing without sweep"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakeAssetRpc {
        balance: BigDecimal,
        transfer_called: AtomicBool,
        fail_balance: bool,
        fail_transfer: bool,
    }

    #[async_trait]
    impl AssetRpc for FakeAssetRpc {
        async fn query_balance(&self, _address: &str) -> Result<BigDecimal, CoreError> {
            if self.fail_balance {
                return Err(CoreError::Rpc {
                    code: -1,
                    message: "balance query failed".to_string(),
                });
            }
            Ok(self.balance.clone())
        }

        async fn transfer_native(&self, _from: &str, _to: &str, _amount: &BigDecimal) -> Result<String, CoreError> {
            self.transfer_called.store(true, Ordering::SeqCst);
            if self.fail_transfer {
                return Err(CoreError::Rpc {
                    code: -1,
                    message: "transfer failed".to_string(),
                });
            }
            Ok("0xsweep".to_string())
        }
    }

    #[tokio::test]
    async fn skips_transfer_when_balance_at_or_below_threshold() {
        let rpc = Arc::new(FakeAssetRpc {
            balance: BigDecimal::from(1),
            transfer_called: AtomicBool::new(false),
            fail_balance: false,
            fail_transfer: false,
        });
        let sweeper = AssetSweeper::new(rpc.clone(), "attester", "fee-payer");
        sweeper.check_and_sweep().await;
        assert!(!rpc.transfer_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn sweeps_excess_when_balance_exceeds_threshold() {
        let rpc = Arc::new(FakeAssetRpc {
            balance: BigDecimal::from(10),
            transfer_called: AtomicBool::new(false),
            fail_balance: false,
            fail_transfer: false,
        });
        let sweeper = AssetSweeper::new(rpc.clone(), "attester", "fee-payer");
        sweeper.check_and_sweep().await;
        assert!(rpc.transfer_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn balance_check_failure_never_panics_or_blocks() {
        let rpc = Arc::new(FakeAssetRpc {
            balance: BigDecimal::from(10),
            transfer_called: AtomicBool::new(false),
            fail_balance: true,
            fail_transfer: false,
        });
        let sweeper = AssetSweeper::new(rpc.clone(), "attester", "fee-payer");
        sweeper.check_and_sweep().await;
        assert!(!rpc.transfer_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn transfer_failure_never_panics() {
        let rpc = Arc::new(FakeAssetRpc {
            balance: BigDecimal::from(10),
            transfer_called: AtomicBool::new(false),
            fail_balance: false,
            fail_transfer: true,
        });
        let sweeper = AssetSweeper::new(rpc, "attester", "fee-payer");
        sweeper.check_and_sweep().await;
    }
}
