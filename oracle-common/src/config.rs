use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Per-source endpoint configuration (spec §6). Shared shape for all six
/// exchanges; unused fields (`api_secret`, `passphrase`) are simply `None`
/// for sources that don't need them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceConfig {
    pub base_url: String,
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub passphrase: Option<String>,
}

fn default_timeout_seconds() -> u64 {
    30
}

/// `SymbolMappings.Mappings` (spec §4.1, §6): canonical symbol -> (source name -> source symbol).
/// An empty string value means "source does not list this pair".
pub type SymbolMappings = HashMap<String, HashMap<String, String>>;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SymbolMappingsSection {
    #[serde(default)]
    pub mappings: SymbolMappings,
}

/// `BatchProcessing` section (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProcessingConfig {
    pub rpc_endpoint: String,
    pub contract_script_hash: String,
    pub tee_account_address: String,
    pub tee_account_private_key: String,
    pub master_account_address: String,
    pub master_account_private_key: String,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default)]
    pub check_and_transfer_tee_assets: bool,
}

fn default_max_batch_size() -> usize {
    50
}

pub const MAX_BATCH_SIZE_HARD_CAP: usize = 100;

impl BatchProcessingConfig {
    /// Validation expectations from spec §6.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.contract_script_hash.starts_with("0x")
            || self.contract_script_hash.len() != 42
            || !self.contract_script_hash[2..].bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(CoreError::Config(format!(
                "contract_script_hash must be 0x-prefixed and 40 hex chars, got {}",
                self.contract_script_hash
            )));
        }
        for (label, addr) in [
            ("tee_account_address", &self.tee_account_address),
            ("master_account_address", &self.master_account_address),
        ] {
            if !addr.starts_with('N') {
                return Err(CoreError::Config(format!(
                    "{label} must start with 'N', got {addr}"
                )));
            }
        }
        for (label, key) in [
            ("tee_account_private_key", &self.tee_account_private_key),
            ("master_account_private_key", &self.master_account_private_key),
        ] {
            if key.len() < 52 {
                return Err(CoreError::Config(format!(
                    "{label} must be a WIF key of at least 52 chars"
                )));
            }
        }
        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_SIZE_HARD_CAP {
            return Err(CoreError::Config(format!(
                "max_batch_size must be in 1..={MAX_BATCH_SIZE_HARD_CAP}, got {}",
                self.max_batch_size
            )));
        }
        if !self.rpc_endpoint.starts_with("https://") && !is_localhost(&self.rpc_endpoint) {
            return Err(CoreError::Config(format!(
                "rpc_endpoint must be HTTPS in production, got {}",
                self.rpc_endpoint
            )));
        }
        Ok(())
    }
}

fn is_localhost(url: &str) -> bool {
    url.contains("localhost") || url.contains("127.0.0.1")
}

/// Root configuration document (spec §6), loaded file -> environment (env wins),
/// mirroring `ServiceConfig::from_env`'s layering in the teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub symbols: Vec<String>,
    #[serde(default)]
    pub symbol_mappings: SymbolMappingsSection,
    pub binance: Option<SourceConfig>,
    #[serde(rename = "okex")]
    pub okex: Option<SourceConfig>,
    pub coinbase: Option<SourceConfig>,
    pub coinmarketcap: Option<SourceConfig>,
    pub coingecko: Option<SourceConfig>,
    pub kraken: Option<SourceConfig>,
    pub batch_processing: BatchProcessingConfig,
}

impl OracleConfig {
    /// Loads `oracle.toml` (or `oracle.json`) if present, then applies the
    /// recognised environment overrides from spec §6 (add-only, env wins),
    /// exactly the file -> environment precedence `kembridge-common::config`
    /// uses for `ServiceConfig`/`GatewayConfig`.
    pub fn from_env() -> Result<Self, CoreError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("oracle").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        let mut raw: Self = builder
            .build()
            .map_err(|e| CoreError::Config(format!("failed to build config: {e}")))?
            .try_deserialize()
            .map_err(|e| CoreError::Config(format!("failed to parse config: {e}")))?;

        raw.apply_named_env_overrides();
        raw.batch_processing.validate()?;
        Ok(raw)
    }

    /// The named overrides from spec §6 that don't fit the generic
    /// `Environment` source's naming convention.
    fn apply_named_env_overrides(&mut self) {
        if let Ok(symbols) = std::env::var("SYMBOLS") {
            self.symbols = symbols
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(v) = std::env::var("NEO_RPC_ENDPOINT") {
            self.batch_processing.rpc_endpoint = v;
        }
        if let Ok(v) = std::env::var("CONTRACT_SCRIPT_HASH") {
            self.batch_processing.contract_script_hash = v;
        }
        if let Ok(v) = std::env::var("TEE_ACCOUNT_ADDRESS") {
            self.batch_processing.tee_account_address = v;
        }
        if let Ok(v) = std::env::var("TEE_ACCOUNT_PRIVATE_KEY") {
            self.batch_processing.tee_account_private_key = v;
        }
        if let Ok(v) = std::env::var("MASTER_ACCOUNT_ADDRESS") {
            self.batch_processing.master_account_address = v;
        }
        if let Ok(v) = std::env::var("MASTER_ACCOUNT_PRIVATE_KEY") {
            self.batch_processing.master_account_private_key = v;
        }
        if let Ok(v) = std::env::var("CHECK_AND_TRANSFER_TEE_ASSETS") {
            self.batch_processing.check_and_transfer_tee_assets =
                v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Ok(v) = std::env::var("COINMARKETCAP_API_KEY") {
            self.coinmarketcap.get_or_insert_with(Default::default).api_key = Some(v);
        }
        if let Ok(v) = std::env::var("COINGECKO_API_KEY") {
            self.coingecko.get_or_insert_with(Default::default).api_key = Some(v);
        }
        if let Ok(v) = std::env::var("KRAKEN_API_KEY") {
            self.kraken.get_or_insert_with(Default::default).api_key = Some(v);
        }
        if let Ok(v) = std::env::var("KRAKEN_SECRET") {
            self.kraken.get_or_insert_with(Default::default).api_secret = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_batch_processing() -> BatchProcessingConfig {
        BatchProcessingConfig {
            rpc_endpoint: "https://node.example.com".to_string(),
            contract_script_hash: format!("0x{}", "a".repeat(40)),
            tee_account_address: "NTeeAccount1111111111111111111".to_string(),
            tee_account_private_key: "L".to_string().repeat(52),
            master_account_address: "NMasterAccount111111111111111".to_string(),
            master_account_private_key: "K".to_string().repeat(52),
            max_batch_size: 50,
            check_and_transfer_tee_assets: false,
        }
    }

    #[test]
    fn validate_accepts_well_formed_config() {
        assert!(valid_batch_processing().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_script_hash() {
        let mut cfg = valid_batch_processing();
        cfg.contract_script_hash = "deadbeef".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_https_remote_endpoint() {
        let mut cfg = valid_batch_processing();
        cfg.rpc_endpoint = "http://remote.example.com".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_allows_localhost_over_http() {
        let mut cfg = valid_batch_processing();
        cfg.rpc_endpoint = "http://localhost:10332".to_string();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_oversize_batch() {
        let mut cfg = valid_batch_processing();
        cfg.max_batch_size = 101;
        assert!(cfg.validate().is_err());
    }
}
