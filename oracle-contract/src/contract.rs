use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use oracle_common::types::{OracleContractState, StoredPrice};
use tracing::info;

use crate::events::ContractEvent;

/// Scope of a transaction signer. The spec's on-chain model only ever
/// requires "called-by-entry" scoped witnesses, mirrored here as the single
/// variant the dual-witness check understands (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WitnessScope {
    CalledByEntry,
}

/// One transaction signer presented to the contract call.
#[derive(Debug, Clone)]
pub struct Signer {
    pub address: String,
    pub scope: WitnessScope,
}

impl Signer {
    #[must_use]
    pub fn called_by_entry(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            scope: WitnessScope::CalledByEntry,
        }
    }
}

/// The nine per-update preconditions of spec §4.10, named for property
/// tests that exercise each failing in isolation (spec §8 invariant 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionFailure {
    NotDualWitnessed,
    Paused,
    CircuitBreakerTriggered,
    InsufficientOracles,
    InvalidFields,
    ConfidenceTooLow,
    Stale,
    NotMonotonic,
    DeviationExceeded,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// On-chain storage of latest `{price, timestamp, confidence}` per symbol;
/// access control; dual-witness check; circuit breaker; upgrade path (spec
/// §4.10). Structural idioms (owner-guard helper, idempotent init, explicit
/// event structs, extensive negative-path test coverage) are grounded on
/// `near-contracts/src/lib.rs`'s `BridgeContract`; the storage/witness/
/// precondition semantics are NEO-flavored per spec, not NEAR's.
#[derive(Debug, Clone)]
pub struct OracleContract {
    state: OracleContractState,
    events: Vec<ContractEvent>,
}

impl Default for OracleContract {
    fn default() -> Self {
        Self::new()
    }
}

impl OracleContract {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: OracleContractState {
                owner: String::new(),
                paused: false,
                initialized: false,
                reentrancy_guard: false,
                circuit_breaker_triggered: false,
                min_oracles: 0,
                oracle_count: 0,
                oracles: HashSet::new(),
                tee_accounts: HashSet::new(),
                prices: std::collections::HashMap::new(),
            },
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &OracleContractState {
        &self.state
    }

    /// Drains accumulated events (e.g. for a test assertion or an indexer
    /// poll); the contract keeps no history of its own past events.
    pub fn drain_events(&mut self) -> Vec<ContractEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: ContractEvent) {
        info!(?event, "oracle contract event");
        self.events.push(event);
    }

    // ---- Initialisation (spec §4.10 "Initialisation") ----

    /// Succeeds once; subsequent calls return `false` without mutating
    /// state (spec §8 invariant 6).
    pub fn initialize(&mut self, owner: impl Into<String>, initial_tee_account: Option<String>) -> bool {
        if self.state.initialized {
            return false;
        }
        let owner = owner.into();
        self.state.owner = owner.clone();
        self.state.min_oracles = 1;
        self.state.oracle_count = 0;
        self.state.circuit_breaker_triggered = false;
        self.state.initialized = true;
        self.emit(ContractEvent::Initialized { owner: owner.clone() });
        if let Some(tee) = initial_tee_account {
            self.state.tee_accounts.insert(tee.clone());
            self.emit(ContractEvent::TeeAccountAdded { addr: tee });
        }
        true
    }

    fn is_owner(&self, caller: &str) -> bool {
        self.state.initialized && caller == self.state.owner
    }

    // ---- Admin operations (owner-witness required, spec §4.10 "Admin operations") ----

    pub fn change_owner(&mut self, caller: &str, new_owner: impl Into<String>) -> bool {
        if !self.is_owner(caller) {
            return false;
        }
        let new_owner = new_owner.into();
        let old = std::mem::replace(&mut self.state.owner, new_owner.clone());
        self.emit(ContractEvent::OwnerChanged { old, new: new_owner });
        true
    }

    pub fn set_paused(&mut self, caller: &str, paused: bool) -> bool {
        if !self.is_owner(caller) {
            return false;
        }
        self.state.paused = paused;
        self.emit(ContractEvent::ContractPaused { paused });
        true
    }

    pub fn set_circuit_breaker(&mut self, caller: &str, triggered: bool) -> bool {
        if !self.is_owner(caller) {
            return false;
        }
        self.state.circuit_breaker_triggered = triggered;
        self.emit(ContractEvent::CircuitBreakerTriggered { triggered });
        true
    }

    pub fn set_min_oracles(&mut self, caller: &str, n: u32) -> bool {
        if !self.is_owner(caller) || n < 1 {
            return false;
        }
        self.state.min_oracles = n;
        self.emit(ContractEvent::MinOraclesUpdated { n });
        true
    }

    /// Upgrade path. `nef`/`manifest`/`data` are opaque payload bytes in the
    /// real protocol; here only the resulting content hash is observable.
    pub fn update(&mut self, caller: &str, nef: &[u8], manifest: &[u8], data: &[u8]) -> bool {
        if !self.is_owner(caller) {
            return false;
        }
        let mut hasher_input = Vec::with_capacity(nef.len() + manifest.len() + data.len());
        hasher_input.extend_from_slice(nef);
        hasher_input.extend_from_slice(manifest);
        hasher_input.extend_from_slice(data);
        let hash = format!("{:x}", simple_checksum(&hasher_input));
        self.emit(ContractEvent::ContractUpgraded { hash });
        true
    }

    pub fn add_oracle(&mut self, caller: &str, addr: impl Into<String>) -> bool {
        if !self.is_owner(caller) {
            return false;
        }
        let addr = addr.into();
        if !self.state.oracles.insert(addr.clone()) {
            return false;
        }
        self.state.oracle_count += 1;
        self.emit(ContractEvent::OracleAdded { addr });
        true
    }

    pub fn remove_oracle(&mut self, caller: &str, addr: &str) -> bool {
        if !self.is_owner(caller) {
            return false;
        }
        if !self.state.oracles.remove(addr) {
            return false;
        }
        self.state.oracle_count = self.state.oracle_count.saturating_sub(1);
        self.emit(ContractEvent::OracleRemoved { addr: addr.to_string() });
        true
    }

    pub fn add_tee_account(&mut self, caller: &str, addr: impl Into<String>) -> bool {
        if !self.is_owner(caller) {
            return false;
        }
        let addr = addr.into();
        if !self.state.tee_accounts.insert(addr.clone()) {
            return false;
        }
        self.emit(ContractEvent::TeeAccountAdded { addr });
        true
    }

    pub fn remove_tee_account(&mut self, caller: &str, addr: &str) -> bool {
        if !self.is_owner(caller) {
            return false;
        }
        if !self.state.tee_accounts.remove(addr) {
            return false;
        }
        self.emit(ContractEvent::TeeAccountRemoved { addr: addr.to_string() });
        true
    }

    // ---- Dual-witness oracle check (spec §4.10, §8 invariant 8) ----

    /// Requires at least two *distinct* called-by-entry signers, one of
    /// which is a registered oracle and one of which is a registered TEE
    /// account. A single signer satisfying both roles counts once, not
    /// twice.
    #[must_use]
    pub fn check_dual_witness(&self, signers: &[Signer]) -> bool {
        let scoped: HashSet<&str> = signers
            .iter()
            .filter(|s| s.scope == WitnessScope::CalledByEntry)
            .map(|s| s.address.as_str())
            .collect();
        if scoped.len() < 2 {
            return false;
        }
        let has_oracle = scoped.iter().any(|a| self.state.oracles.contains(*a));
        let has_tee = scoped.iter().any(|a| self.state.tee_accounts.contains(*a));
        has_oracle && has_tee
    }

    // ---- Per-update preconditions (spec §4.10, evaluated in this order) ----

    fn call_level_preconditions(&self, signers: &[Signer]) -> Result<(), PreconditionFailure> {
        if !self.check_dual_witness(signers) {
            return Err(PreconditionFailure::NotDualWitnessed);
        }
        if self.state.paused {
            return Err(PreconditionFailure::Paused);
        }
        if self.state.circuit_breaker_triggered {
            return Err(PreconditionFailure::CircuitBreakerTriggered);
        }
        if self.state.oracle_count < self.state.min_oracles {
            return Err(PreconditionFailure::InsufficientOracles);
        }
        Ok(())
    }

    fn entry_preconditions(
        &self,
        symbol: &str,
        price_scaled: i128,
        timestamp: i64,
        confidence: u8,
        now: i64,
    ) -> Result<(), PreconditionFailure> {
        if symbol.is_empty() || price_scaled <= 0 || timestamp <= 0 || confidence > 100 {
            return Err(PreconditionFailure::InvalidFields);
        }
        if confidence < 50 {
            return Err(PreconditionFailure::ConfidenceTooLow);
        }
        if now - timestamp > 3600 {
            return Err(PreconditionFailure::Stale);
        }
        let prior = self.state.prices.get(symbol);
        if let Some(prior) = prior {
            if timestamp <= prior.timestamp {
                return Err(PreconditionFailure::NotMonotonic);
            }
            let delta = (price_scaled - prior.price_scaled).abs();
            let pct = delta.saturating_mul(100) / prior.price_scaled.max(1);
            if pct > 10 && confidence < 100 {
                return Err(PreconditionFailure::DeviationExceeded);
            }
        }
        Ok(())
    }

    fn apply_entry(&mut self, symbol: &str, price_scaled: i128, timestamp: i64, confidence: u8) {
        self.state.prices.insert(
            symbol.to_string(),
            StoredPrice {
                price_scaled,
                timestamp,
                confidence,
            },
        );
        self.emit(ContractEvent::PriceUpdated {
            symbol: symbol.to_string(),
            price: price_scaled,
            timestamp,
            confidence,
        });
    }

    /// Single-symbol update: any of the nine preconditions failing fails
    /// the whole call, mutating nothing (spec §4.10).
    pub fn update_price(
        &mut self,
        signers: &[Signer],
        symbol: &str,
        price_scaled: i128,
        timestamp: i64,
        confidence: u8,
    ) -> bool {
        self.with_reentrancy_guard(|this| {
            if this.call_level_preconditions(signers).is_err() {
                return false;
            }
            let now = now_unix();
            if this
                .entry_preconditions(symbol, price_scaled, timestamp, confidence, now)
                .is_err()
            {
                return false;
            }
            this.apply_entry(symbol, price_scaled, timestamp, confidence);
            true
        })
    }

    /// Batch update: the four call-level preconditions (witness, paused,
    /// breaker, oracle count) gate the whole call; a single entry failing
    /// one of the five per-entry preconditions is skipped, not fatal (spec
    /// §4.10).
    pub fn update_price_batch(
        &mut self,
        signers: &[Signer],
        entries: &[(String, i128, i64, u8)],
    ) -> bool {
        self.with_reentrancy_guard(|this| {
            if this.call_level_preconditions(signers).is_err() {
                return false;
            }
            let now = now_unix();
            for (symbol, price_scaled, timestamp, confidence) in entries {
                if this
                    .entry_preconditions(symbol, *price_scaled, *timestamp, *confidence, now)
                    .is_ok()
                {
                    this.apply_entry(symbol, *price_scaled, *timestamp, *confidence);
                }
            }
            true
        })
    }

    /// Sets the reentrancy guard on entry, clears it on exit (spec §4.10
    /// "Reentrancy"); a call made while the guard is set returns `false`
    /// immediately without running `f`.
    fn with_reentrancy_guard(&mut self, f: impl FnOnce(&mut Self) -> bool) -> bool {
        if self.state.reentrancy_guard {
            return false;
        }
        self.state.reentrancy_guard = true;
        let result = f(self);
        self.state.reentrancy_guard = false;
        result
    }

    // ---- Read side (spec §4.10 "Read side") ----

    #[must_use]
    pub fn get_price(&self, symbol: &str) -> i128 {
        self.state.prices.get(symbol).map_or(0, |p| p.price_scaled)
    }

    #[must_use]
    pub fn get_timestamp(&self, symbol: &str) -> i64 {
        self.state.prices.get(symbol).map_or(0, |p| p.timestamp)
    }

    #[must_use]
    pub fn get_confidence_score(&self, symbol: &str) -> u8 {
        self.state.prices.get(symbol).map_or(0, |p| p.confidence)
    }

    #[must_use]
    pub fn get_price_data(&self, symbol: &str) -> (i128, i64, u8) {
        self.state
            .prices
            .get(symbol)
            .map_or((0, 0, 0), |p| (p.price_scaled, p.timestamp, p.confidence))
    }

    #[must_use]
    pub fn is_oracle(&self, addr: &str) -> bool {
        self.state.oracles.contains(addr)
    }

    #[must_use]
    pub fn is_tee_account(&self, addr: &str) -> bool {
        self.state.tee_accounts.contains(addr)
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    #[must_use]
    pub fn is_circuit_breaker_triggered(&self) -> bool {
        self.state.circuit_breaker_triggered
    }

    #[must_use]
    pub fn get_oracle_count(&self) -> u32 {
        self.state.oracle_count
    }

    #[must_use]
    pub fn get_min_oracles(&self) -> u32 {
        self.state.min_oracles
    }

    #[must_use]
    pub fn get_owner(&self) -> &str {
        &self.state.owner
    }
}

fn simple_checksum(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf29ce484222325_u64, |acc, b| {
        (acc ^ u64::from(*b)).wrapping_mul(0x100000001b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> OracleContract {
        let mut c = OracleContract::new();
        assert!(c.initialize("owner1", Some("tee1".to_string())));
        assert!(c.add_oracle("owner1", "oracle1"));
        c.drain_events();
        c
    }

    fn witnesses() -> Vec<Signer> {
        vec![
            Signer::called_by_entry("oracle1"),
            Signer::called_by_entry("tee1"),
        ]
    }

    #[test]
    fn initialize_is_idempotent_by_rejection() {
        let mut c = OracleContract::new();
        assert!(c.initialize("owner1", None));
        let owner_before = c.get_owner().to_string();
        assert!(!c.initialize("owner2", None));
        assert_eq!(c.get_owner(), owner_before);
    }

    #[test]
    fn scenario_s1_update_succeeds_with_full_preconditions() {
        let mut c = setup();
        let ok = c.update_price(&witnesses(), "BTCUSDT", 5_005_000_000_000, now_unix(), 100);
        assert!(ok);
        assert_eq!(c.get_price("BTCUSDT"), 5_005_000_000_000);
        assert!(matches!(
            c.drain_events().as_slice(),
            [ContractEvent::PriceUpdated { .. }]
        ));
    }

    #[test]
    fn dual_witness_rejects_single_signer_satisfying_both_roles() {
        let mut c = OracleContract::new();
        c.initialize("owner1", None);
        c.add_oracle("owner1", "dual1");
        c.add_tee_account("owner1", "dual1");
        let signers = vec![Signer::called_by_entry("dual1")];
        assert!(!c.check_dual_witness(&signers));
    }

    #[test]
    fn precondition_1_rejects_without_dual_witness() {
        let mut c = setup();
        let result = c.update_price(&[Signer::called_by_entry("oracle1")], "BTCUSDT", 1, now_unix(), 100);
        assert!(!result);
    }

    #[test]
    fn precondition_2_rejects_when_paused() {
        let mut c = setup();
        c.set_paused("owner1", true);
        let result = c.update_price(&witnesses(), "BTCUSDT", 1, now_unix(), 100);
        assert!(!result);
    }

    #[test]
    fn precondition_3_rejects_when_circuit_breaker_triggered() {
        let mut c = setup();
        c.set_circuit_breaker("owner1", true);
        let result = c.update_price(&witnesses(), "BTCUSDT", 1, now_unix(), 100);
        assert!(!result);
    }

    #[test]
    fn precondition_4_rejects_when_oracle_count_below_minimum() {
        let mut c = setup();
        c.set_min_oracles("owner1", 2);
        let result = c.update_price(&witnesses(), "BTCUSDT", 1, now_unix(), 100);
        assert!(!result);
    }

    #[test]
    fn precondition_5_rejects_invalid_fields() {
        let mut c = setup();
        assert!(!c.update_price(&witnesses(), "", 1, now_unix(), 100));
        assert!(!c.update_price(&witnesses(), "BTCUSDT", 0, now_unix(), 100));
        assert!(!c.update_price(&witnesses(), "BTCUSDT", 1, 0, 100));
        assert!(!c.update_price(&witnesses(), "BTCUSDT", 1, now_unix(), 101));
    }

    #[test]
    fn precondition_6_boundary_confidence_50_passes_49_fails() {
        let mut c = setup();
        assert!(c.update_price(&witnesses(), "SYM1", 1, now_unix(), 50));
        assert!(!c.update_price(&witnesses(), "SYM2", 1, now_unix(), 49));
    }

    #[test]
    fn precondition_7_boundary_freshness_window() {
        let mut c = setup();
        let now = now_unix();
        assert!(c.update_price(&witnesses(), "SYM1", 1, now - 3600, 100));
        assert!(!c.update_price(&witnesses(), "SYM2", 1, now - 3601, 100));
    }

    #[test]
    fn precondition_8_monotonic_timestamp() {
        let mut c = setup();
        let t = now_unix() - 100;
        assert!(c.update_price(&witnesses(), "NEOUSDT", 1_000_000_000, t, 100));
        assert!(!c.update_price(&witnesses(), "NEOUSDT", 1_000_000_001, t, 100));
        assert!(!c.update_price(&witnesses(), "NEOUSDT", 1_000_000_001, t - 1, 100));
    }

    #[test]
    fn scenario_s3_deviation_guard_rejects_with_insufficient_confidence() {
        let mut c = setup();
        let t0 = now_unix() - 100;
        assert!(c.update_price(&witnesses(), "NEOUSDT", 1_000_000_000, t0, 100));
        c.drain_events();
        let rejected = c.update_price(&witnesses(), "NEOUSDT", 1_150_000_000, t0 + 1, 80);
        assert!(!rejected);
        assert!(c.drain_events().is_empty());
        assert_eq!(c.get_price("NEOUSDT"), 1_000_000_000);
    }

    #[test]
    fn scenario_s4_deviation_guard_accepts_with_confidence_100() {
        let mut c = setup();
        let t0 = now_unix() - 100;
        assert!(c.update_price(&witnesses(), "NEOUSDT", 1_000_000_000, t0, 100));
        c.drain_events();
        let accepted = c.update_price(&witnesses(), "NEOUSDT", 1_150_000_000, t0 + 1, 100);
        assert!(accepted);
        assert_eq!(c.get_price("NEOUSDT"), 1_150_000_000);
    }

    #[test]
    fn scenario_s6_paused_batch_skips_all_entries_with_no_events() {
        let mut c = setup();
        c.set_paused("owner1", true);
        c.drain_events();
        let entries = vec![
            ("BTCUSDT".to_string(), 1, now_unix(), 100),
            ("ETHUSDT".to_string(), 1, now_unix(), 100),
        ];
        let result = c.update_price_batch(&witnesses(), &entries);
        assert!(!result);
        assert!(c.drain_events().is_empty());
        assert_eq!(c.get_price("BTCUSDT"), 0);
    }

    #[test]
    fn batch_form_skips_failing_entry_but_applies_others() {
        let mut c = setup();
        let entries = vec![
            ("BTCUSDT".to_string(), 1, now_unix(), 100),
            ("ETHUSDT".to_string(), 1, now_unix(), 10), // confidence too low
        ];
        let result = c.update_price_batch(&witnesses(), &entries);
        assert!(result);
        assert_eq!(c.get_price("BTCUSDT"), 1);
        assert_eq!(c.get_price("ETHUSDT"), 0);
    }

    #[test]
    fn reentrancy_guard_rejects_nested_call() {
        let mut c = setup();
        c.state.reentrancy_guard = true;
        let result = c.update_price(&witnesses(), "BTCUSDT", 1, now_unix(), 100);
        assert!(!result);
    }

    #[test]
    fn admin_ops_require_owner_witness_and_never_throw() {
        let mut c = setup();
        assert!(!c.set_paused("not-owner", true));
        assert!(!c.add_oracle("not-owner", "oracle2"));
        assert!(!c.remove_oracle("owner1", "does-not-exist"));
        assert!(c.change_owner("owner1", "owner2"));
        assert!(!c.set_paused("owner1", true)); // owner1 no longer owner
        assert!(c.set_paused("owner2", true));
    }

    #[test]
    fn read_side_returns_zero_for_missing_symbol() {
        let c = setup();
        assert_eq!(c.get_price("MISSING"), 0);
        assert_eq!(c.get_timestamp("MISSING"), 0);
        assert_eq!(c.get_confidence_score("MISSING"), 0);
        assert_eq!(c.get_price_data("MISSING"), (0, 0, 0));
    }
}
