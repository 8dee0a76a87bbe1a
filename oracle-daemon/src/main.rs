use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use oracle_aggregator::{Aggregator, BatchBuilder};
use oracle_attestation::{build_record, AttestationStore, CiContext};
use oracle_common::config::OracleConfig;
use oracle_common::logging::init_logging;
use oracle_common::types::PriceObservation;
use oracle_sources::{PriceCache, SourceRegistry};
use oracle_submitter::{decode_wif, AssetSweeper, BatchSubmitter, RpcClient};
use secp256k1::SecretKey;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Configuration failure, no enabled source, or catastrophic submission
/// failure (spec §6 "Exit codes"): the driver is the external collaborator
/// the spec defers this numbering to, implemented here as the one
/// concrete entrypoint this workspace ships.
const EXIT_OK: u8 = 0;
const EXIT_CONFIG_ERROR: u8 = 1;
const EXIT_NO_SOURCES: u8 = 2;
const EXIT_SUBMISSION_FAILURE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match OracleConfig::from_env() {
        Ok(c) => c,
        Err(err) => {
            error!(error = %err, "configuration invalid, aborting");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let registry = SourceRegistry::from_config(&config);
    if registry.require_quorum().is_err() {
        error!("no enabled data source, aborting");
        return ExitCode::from(EXIT_NO_SOURCES);
    }

    let attester_key = match decode_wif(&config.batch_processing.tee_account_private_key) {
        Ok(key) => key,
        Err(err) => {
            error!(error = %err, "attester private key invalid, aborting");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let cancellation = CancellationToken::new();
    match run_cycle(&config, &registry, &attester_key, cancellation).await {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(()) => ExitCode::from(EXIT_SUBMISSION_FAILURE),
    }
}

/// Runs one aggregation cycle: concurrent adapter fan-out, aggregation,
/// batching, then sequential sweep → submit → attest per sub-batch with
/// background confirmation polling (spec §5). Returns `Err(())` on
/// catastrophic submission failure; adapter/aggregation/attestation errors
/// are recovered locally per spec §7 and never surface here.
async fn run_cycle(
    config: &OracleConfig,
    registry: &SourceRegistry,
    attester_key: &SecretKey,
    cancellation: CancellationToken,
) -> Result<(), ()> {
    let cache = Arc::new(PriceCache::with_defaults());
    let observations = collect_observations(config, registry, &cache, &cancellation).await;

    if observations.is_empty() {
        error!("cycle collected zero observations for every symbol");
        return Err(());
    }

    let mut by_symbol: HashMap<String, Vec<PriceObservation>> = HashMap::new();
    for obs in observations {
        by_symbol.entry(obs.symbol.clone()).or_default().push(obs);
    }

    let aggregator = Aggregator::new();
    let aggregated = aggregator.aggregate_many(
        by_symbol.iter().map(|(symbol, obs)| (symbol.as_str(), obs.as_slice())),
    );

    if aggregated.is_empty() {
        warn!("aggregation produced no prices this cycle");
        return Ok(());
    }

    let batch_builder = BatchBuilder::new(config.batch_processing.max_batch_size);
    let sub_batches = batch_builder.build(aggregated);

    let rpc = Arc::new(RpcClient::new(
        config.batch_processing.rpc_endpoint.clone(),
        Duration::from_secs(30),
        3,
    ));
    let submitter = Arc::new(BatchSubmitter::new(
        rpc.clone(),
        config.batch_processing.contract_script_hash.clone(),
        config.batch_processing.tee_account_address.clone(),
        config.batch_processing.tee_account_private_key.clone(),
        config.batch_processing.master_account_address.clone(),
        config.batch_processing.master_account_private_key.clone(),
    ));
    let sweeper = config.batch_processing.check_and_transfer_tee_assets.then(|| {
        AssetSweeper::new(
            rpc.clone(),
            config.batch_processing.tee_account_address.clone(),
            config.batch_processing.master_account_address.clone(),
        )
    });
    let attestations = AttestationStore::new();
    let ci = CiContext::from_env();

    let mut any_failed = false;
    for batch in &sub_batches {
        if cancellation.is_cancelled() {
            warn!("cycle cancelled, discarding remaining sub-batches");
            break;
        }

        if let Some(sweeper) = &sweeper {
            sweeper.check_and_sweep().await;
        }

        match submitter.submit(batch).await {
            Ok(true) => {
                if let Some(status) = submitter.status(batch.batch_id).await {
                    if let Some(tx_hash) = status.transaction_hash {
                        let record = build_record(
                            &ci,
                            batch.batch_id,
                            &tx_hash,
                            &batch.prices,
                            Some(attester_key),
                        );
                        attestations.record(record).await;
                    }
                }
            }
            Ok(false) | Err(_) => {
                error!(batch_id = %batch.batch_id, "batch submission failed");
                any_failed = true;
            }
        }
    }

    if any_failed {
        Err(())
    } else {
        info!(sub_batches = sub_batches.len(), "cycle complete");
        Ok(())
    }
}

async fn collect_observations(
    config: &OracleConfig,
    registry: &SourceRegistry,
    cache: &Arc<PriceCache>,
    cancellation: &CancellationToken,
) -> Vec<PriceObservation> {
    let fetches = registry.adapters().iter().cloned().map(|adapter| {
        let cache = cache.clone();
        let symbols = config.symbols.clone();
        let cancellation = cancellation.clone();
        async move {
            if cancellation.is_cancelled() {
                return Vec::new();
            }
            cache.get_price_batch(adapter.as_ref(), &symbols).await
        }
    });

    futures::future::join_all(fetches).await.into_iter().flatten().collect()
}
